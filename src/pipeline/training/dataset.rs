use std::io::Read;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;

use super::TrainingError;
use crate::models::{ClinicalObservation, Measurements};
use crate::pipeline::features::validate_measurements;

/// One CSV record with the conventional column headers.
#[derive(Debug, Deserialize)]
struct DatasetRecord {
    #[serde(rename = "Pregnancies")]
    pregnancies: f64,
    #[serde(rename = "Glucose")]
    glucose: f64,
    #[serde(rename = "BloodPressure")]
    blood_pressure: f64,
    #[serde(rename = "SkinThickness")]
    skin_thickness: f64,
    #[serde(rename = "Insulin")]
    insulin: f64,
    #[serde(rename = "BMI")]
    bmi: f64,
    #[serde(rename = "DiabetesPedigreeFunction")]
    diabetes_pedigree_function: f64,
    #[serde(rename = "Age")]
    age: f64,
    #[serde(rename = "Outcome")]
    outcome: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledObservation {
    pub observation: ClinicalObservation,
    pub diabetic: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub rows: Vec<LabeledObservation>,
    /// Records that failed range validation or carried an invalid outcome.
    pub rejected: usize,
}

pub fn load_dataset(path: &Path) -> Result<Dataset, TrainingError> {
    let file = std::fs::File::open(path).map_err(|e| TrainingError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_dataset(file)
}

/// Parse CSV and apply the same validation as live requests.
pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset, TrainingError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut dataset = Dataset::default();

    for result in csv_reader.deserialize::<DatasetRecord>() {
        let record = result?;
        if record.outcome > 1 {
            dataset.rejected += 1;
            continue;
        }
        let measurements = Measurements {
            pregnancies: record.pregnancies,
            glucose: record.glucose,
            blood_pressure: record.blood_pressure,
            skin_thickness: record.skin_thickness,
            insulin: record.insulin,
            bmi: record.bmi,
            diabetes_pedigree_function: record.diabetes_pedigree_function,
            age: record.age,
        };
        match validate_measurements(measurements) {
            Ok(observation) => dataset.rows.push(LabeledObservation {
                observation,
                diabetic: record.outcome == 1,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Dataset row rejected");
                dataset.rejected += 1;
            }
        }
    }

    if dataset.rows.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    Ok(dataset)
}

/// Seeded, class-stratified split. Returns `(train, test)`.
pub fn stratified_split(
    rows: Vec<LabeledObservation>,
    test_fraction: f64,
    seed: u64,
) -> (Vec<LabeledObservation>, Vec<LabeledObservation>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut positives, mut negatives): (Vec<_>, Vec<_>) =
        rows.into_iter().partition(|r| r.diabetic);
    positives.shuffle(&mut rng);
    negatives.shuffle(&mut rng);

    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [positives, negatives] {
        let n_test = (class.len() as f64 * test_fraction).round() as usize;
        let mut class = class;
        let held_out = class.split_off(class.len() - n_test.min(class.len()));
        train.extend(class);
        test.extend(held_out);
    }
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Pregnancies,Glucose,BloodPressure,SkinThickness,Insulin,BMI,DiabetesPedigreeFunction,Age,Outcome\n";

    #[test]
    fn reads_rows_and_rejects_implausible_ones() {
        let csv = format!(
            "{HEADER}6,148,72,35,0,33.6,0.627,50,1\n1,85,66,29,0,26.6,0.351,31,0\n1,0,66,29,0,26.6,0.351,31,0\n2,120,70,20,80,30.0,0.4,40,3\n"
        );
        let dataset = read_dataset(csv.as_bytes()).unwrap();
        assert_eq!(dataset.rows.len(), 2);
        assert_eq!(dataset.rejected, 2);
        assert!(dataset.rows[0].diabetic);
        assert_eq!(dataset.rows[0].observation.glucose(), 148.0);
    }

    #[test]
    fn malformed_csv_is_an_error() {
        let csv = format!("{HEADER}6,abc,72,35,0,33.6,0.627,50,1\n");
        assert!(matches!(
            read_dataset(csv.as_bytes()),
            Err(TrainingError::Csv(_))
        ));
    }

    #[test]
    fn header_only_is_empty_dataset() {
        assert!(matches!(
            read_dataset(HEADER.as_bytes()),
            Err(TrainingError::EmptyDataset)
        ));
    }

    fn labeled(n: usize, positive_every: usize) -> Vec<LabeledObservation> {
        let csv: String = (0..n)
            .map(|i| {
                let outcome = usize::from(i % positive_every == 0);
                format!("1,{},70,20,80,30.0,0.4,40,{outcome}\n", 80 + i)
            })
            .collect();
        read_dataset(format!("{HEADER}{csv}").as_bytes()).unwrap().rows
    }

    #[test]
    fn split_is_stratified_and_reproducible() {
        let rows = labeled(100, 4);
        let (train_a, test_a) = stratified_split(rows.clone(), 0.2, 42);
        let (train_b, test_b) = stratified_split(rows, 0.2, 42);

        assert_eq!(test_a, test_b);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a.len(), 20);
        assert_eq!(test_a.iter().filter(|r| r.diabetic).count(), 5);
        assert_eq!(train_a.len(), 80);
    }

    #[test]
    fn different_seed_changes_split() {
        let rows = labeled(100, 4);
        let (_, test_a) = stratified_split(rows.clone(), 0.2, 1);
        let (_, test_b) = stratified_split(rows, 0.2, 2);
        assert_ne!(test_a, test_b);
    }
}
