//! Glycoscope command line.
//!
//! `train` works on files only. Every other subcommand builds `CoreServices`
//! from the layered settings and runs one operation as the user named by
//! `--user` / `--role`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use glycoscope_lib::authorization::RequestContext;
use glycoscope_lib::config::{self, Settings};
use glycoscope_lib::core_state::{CoreError, CoreServices};
use glycoscope_lib::models::{ChartKind, Role};
use glycoscope_lib::pipeline::features::{RawObservation, RawValue};
use glycoscope_lib::pipeline::knowledge::{KnowledgeSource, NewKnowledgeDocument};
use glycoscope_lib::pipeline::training::run_training;

#[derive(Parser)]
#[command(name = "glycoscope")]
#[command(about = "Diabetes risk scoring, explained reports and a grounded health chatbot")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Identity the request runs as
    #[arg(short, long, global = true, default_value = "local")]
    user: String,

    /// Role of that identity (`patient` or `admin`)
    #[arg(long, global = true, default_value = "patient", value_parser = parse_role)]
    role: Role,

    #[command(subcommand)]
    command: Commands,
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::from_str(s).map_err(|e| e.to_string())
}

fn parse_chart(s: &str) -> Result<ChartKind, String> {
    ChartKind::from_str(s).map_err(|e| e.to_string())
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a labelled CSV and publish it if it passes acceptance
    Train {
        /// Path to the dataset (Pima column layout with an `Outcome` column)
        #[arg(short, long)]
        dataset: PathBuf,
    },

    #[command(flatten)]
    Core(CoreCommands),
}

/// Subcommands that run against `CoreServices`.
#[derive(Subcommand)]
enum CoreCommands {
    /// Score one observation and record the assessment
    Predict(PredictArgs),

    /// Generate (or regenerate) the PDF report for an assessment
    Report {
        assessment_id: Uuid,

        /// Copy the rendered PDF to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write one chart PNG of a generated report
    Chart {
        assessment_id: Uuid,

        #[arg(value_parser = parse_chart)]
        kind: ChartKind,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Ask the health chatbot a question
    Chat { question: String },

    /// Manage the chatbot knowledge base
    #[command(subcommand)]
    Kb(KbCommands),

    /// Recent assessments of the current user
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Compare an assessment with 2 or 3 earlier ones of the same user
    Compare {
        assessment_id: Uuid,

        /// Earlier assessments to compare against
        #[arg(long = "past", required = true, num_args = 1..)]
        past: Vec<Uuid>,

        /// Copy the trend chart PNG to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Aggregate counts over your assessments (all assessments for admins)
    Stats,
}

#[derive(Args)]
struct PredictArgs {
    /// JSON file holding the observation; flags below override its fields
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long)]
    pregnancies: Option<String>,
    #[arg(long)]
    glucose: Option<String>,
    #[arg(long)]
    blood_pressure: Option<String>,
    #[arg(long)]
    skin_thickness: Option<String>,
    #[arg(long)]
    insulin: Option<String>,
    #[arg(long)]
    bmi: Option<String>,
    #[arg(long)]
    dpf: Option<String>,
    #[arg(long)]
    age: Option<String>,
}

impl PredictArgs {
    fn to_raw(&self) -> Result<RawObservation> {
        let mut raw = match &self.input {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => RawObservation::default(),
        };
        let overrides = [
            (&mut raw.pregnancies, &self.pregnancies),
            (&mut raw.glucose, &self.glucose),
            (&mut raw.blood_pressure, &self.blood_pressure),
            (&mut raw.skin_thickness, &self.skin_thickness),
            (&mut raw.insulin, &self.insulin),
            (&mut raw.bmi, &self.bmi),
            (&mut raw.diabetes_pedigree_function, &self.dpf),
            (&mut raw.age, &self.age),
        ];
        for (field, flag) in overrides {
            if let Some(value) = flag {
                *field = Some(RawValue::from(value.as_str()));
            }
        }
        Ok(raw)
    }
}

#[derive(Subcommand)]
enum KbCommands {
    /// Add a document from a text/markdown file, a URL, or pasted text
    Add {
        #[arg(short, long)]
        title: Option<String>,

        #[arg(long, conflicts_with_all = ["url", "text"])]
        file: Option<PathBuf>,

        #[arg(long, conflicts_with = "text")]
        url: Option<String>,

        #[arg(long)]
        text: Option<String>,
    },

    /// Delete a document and drop it from retrieval
    Delete { id: Uuid },

    /// List stored documents
    List,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn train(dataset: &std::path::Path, settings: &Settings) -> Result<()> {
    let metadata = run_training(dataset, &settings.paths.model_dir(), &settings.training)?;
    print_json(&metadata)
}

fn run(cli: Cli, settings: Settings) -> Result<()> {
    let ctx = RequestContext::new(cli.user, cli.role);
    match cli.command {
        // Training needs neither the database nor a serving model.
        Commands::Train { dataset } => train(&dataset, &settings),
        Commands::Core(command) => dispatch(&CoreServices::open(settings)?, &ctx, command),
    }
}

fn dispatch(core: &CoreServices, ctx: &RequestContext, command: CoreCommands) -> Result<()> {
    match command {
        CoreCommands::Predict(args) => print_json(&core.predict(ctx, &args.to_raw()?)?),
        CoreCommands::Report {
            assessment_id,
            output,
        } => {
            let artifact = core.generate_report(ctx, &assessment_id)?;
            if let Some(output) = output {
                let pdf = core.report_document(ctx, &assessment_id)?;
                std::fs::write(&output, pdf)
                    .with_context(|| format!("writing {}", output.display()))?;
            }
            print_json(&artifact)
        }
        CoreCommands::Chart {
            assessment_id,
            kind,
            output,
        } => {
            let png = core.chart_image(ctx, &assessment_id, kind)?;
            std::fs::write(&output, png).with_context(|| format!("writing {}", output.display()))?;
            Ok(())
        }
        CoreCommands::Chat { question } => print_json(&core.chat(ctx, &question)?),
        CoreCommands::Kb(KbCommands::Add {
            title,
            file,
            url,
            text,
        }) => {
            let source = match (file, url, text) {
                (Some(path), _, _) => KnowledgeSource::Upload { path },
                (_, Some(url), _) => KnowledgeSource::Url { url },
                (_, _, Some(text)) => KnowledgeSource::PastedText { text },
                _ => anyhow::bail!("one of --file, --url or --text is required"),
            };
            let doc = core.add_knowledge_document(ctx, &NewKnowledgeDocument { title, source })?;
            print_json(&doc)
        }
        CoreCommands::Kb(KbCommands::Delete { id }) => {
            core.delete_knowledge_document(ctx, &id)?;
            Ok(())
        }
        CoreCommands::Kb(KbCommands::List) => print_json(&core.list_knowledge_documents()?),
        CoreCommands::History { limit } => print_json(&core.assessment_history(ctx, limit)?),
        CoreCommands::Compare {
            assessment_id,
            past,
            output,
        } => {
            let comparison = core.compare_assessments(ctx, &assessment_id, &past)?;
            if let Some(output) = output {
                std::fs::copy(&comparison.chart_ref, &output)
                    .with_context(|| format!("writing {}", output.display()))?;
            }
            print_json(&comparison)
        }
        CoreCommands::Stats => print_json(&core.assessment_statistics(ctx)?),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    glycoscope_lib::init_tracing(cli.verbose);

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(version = config::APP_VERSION, data_dir = %settings.paths.data_dir.display(), "Starting");

    match run(cli, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            match e.downcast_ref::<CoreError>() {
                Some(core) => eprintln!("{}", core.user_message()),
                None => eprintln!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn train_and_core_commands_parse_apart() {
        let cli = Cli::try_parse_from(["glycoscope", "train", "--dataset", "pima.csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Train { .. }));

        let cli = Cli::try_parse_from(["glycoscope", "--role", "admin", "stats"]).unwrap();
        assert!(matches!(cli.command, Commands::Core(CoreCommands::Stats)));
        assert_eq!(cli.role, Role::Admin);
    }

    #[test]
    fn compare_takes_past_assessments() {
        let (current, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let cli = Cli::try_parse_from([
            "glycoscope".to_string(),
            "compare".into(),
            current.to_string(),
            "--past".into(),
            a.to_string(),
            b.to_string(),
        ])
        .unwrap();
        match cli.command {
            Commands::Core(CoreCommands::Compare {
                assessment_id,
                past,
                ..
            }) => {
                assert_eq!(assessment_id, current);
                assert_eq!(past, vec![a, b]);
            }
            _ => panic!("expected compare"),
        }
    }
}
