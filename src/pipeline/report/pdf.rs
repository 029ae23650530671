//! PDF rendering via `printpdf`: A4, Helvetica, paginated, charts embedded.

use std::io::{BufWriter, Cursor};

use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::image_crate::ImageDecoder;
use printpdf::*;
use thiserror::Error;

use super::{Block, ReportDocument, SectionKind};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const TOP: f32 = 280.0;
const BOTTOM_MARGIN: f32 = 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_LEFT;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("Cannot embed {chart} chart: {reason}")]
    Image { chart: &'static str, reason: String },

    #[error("PDF save error: {0}")]
    Save(String),
}

/// Builtin fonts only cover WinAnsi; keep text inside it.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '²' => '2',
            'µ' => 'u',
            '–' | '—' => '-',
            '×' => 'x',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c if c.is_ascii() => c,
            _ => '?',
        })
        .collect()
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Cursor over the current page; opens a new page when space runs out.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, PdfError> {
        let (doc, page1, layer1) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| PdfError::Font(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| PdfError::Font(e.to_string()))?;
        let mono = doc
            .add_builtin_font(BuiltinFont::Courier)
            .map_err(|e| PdfError::Font(e.to_string()))?;
        Ok(Self {
            doc,
            layer,
            font,
            bold,
            mono,
            y: TOP,
            pages: 1,
        })
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < BOTTOM_MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
            self.pages += 1;
        }
    }

    fn text(&mut self, text: &str, size: f32, indent: f32, line_height: f32, style: Style) {
        self.ensure_space(line_height);
        let font = match style {
            Style::Regular => &self.font,
            Style::Bold => &self.bold,
            Style::Mono => &self.mono,
        };
        self.layer
            .use_text(pdf_safe(text), size, Mm(MARGIN_LEFT + indent), Mm(self.y), font);
        self.y -= line_height;
    }

    fn wrapped(&mut self, text: &str, size: f32, indent: f32, max_chars: usize, style: Style) {
        let line_height = size * 0.5;
        for line in wrap_text(text, max_chars) {
            self.text(&line, size, indent, line_height, style);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn chart(&mut self, png: &[u8], chart: &'static str, width_mm: f32) -> Result<(), PdfError> {
        let image_err = |reason: String| PdfError::Image { chart, reason };
        let decoder = PngDecoder::new(Cursor::new(png)).map_err(|e| image_err(e.to_string()))?;
        let (px_w, px_h) = decoder.dimensions();
        let dpi = px_w as f32 * 25.4 / width_mm;
        let height_mm = px_h as f32 * 25.4 / dpi;

        self.ensure_space(height_mm);
        let image = Image::try_from(decoder).map_err(|e| image_err(e.to_string()))?;
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN_LEFT + (CONTENT_WIDTH - width_mm) / 2.0)),
                translate_y: Some(Mm(self.y - height_mm)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.y -= height_mm;
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, PdfError> {
        tracing::debug!(pages = self.pages, "Report PDF laid out");
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        buf.into_inner()
            .map_err(|e| PdfError::Save(e.to_string()))
    }
}

#[derive(Clone, Copy)]
enum Style {
    Regular,
    Bold,
    Mono,
}

fn format_row(cells: &[String]) -> String {
    const WIDTHS: [usize; 4] = [20, 16, 22, 10];
    cells
        .iter()
        .zip(WIDTHS)
        .map(|(cell, w)| format!("{:<w$}", pdf_safe(cell)))
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Render an assembled document. Returns PDF bytes.
pub fn render_pdf(document: &ReportDocument) -> Result<Vec<u8>, PdfError> {
    let mut w = PageWriter::new(&document.title)?;

    for section in &document.sections {
        if section.kind == SectionKind::Header {
            w.text(&document.title, 16.0, 0.0, 9.0, Style::Bold);
        } else {
            w.gap(4.0);
            w.ensure_space(16.0);
            w.text(
                &section.kind.heading().to_uppercase(),
                12.0,
                0.0,
                7.0,
                Style::Bold,
            );
        }

        for block in &section.blocks {
            match block {
                Block::Banner(text) => {
                    w.text(text, 12.0, 0.0, 7.0, Style::Bold);
                }
                Block::Paragraph(text) => {
                    w.wrapped(text, 9.5, 0.0, 95, Style::Regular);
                    w.gap(2.0);
                }
                Block::Fields(fields) => {
                    for (key, value) in fields {
                        w.text(&format!("{key}: {value}"), 9.0, 0.0, 5.0, Style::Regular);
                    }
                }
                Block::Table { headers, rows } => {
                    w.text(&format_row(headers), 8.5, 0.0, 5.0, Style::Bold);
                    for row in rows {
                        w.text(&format_row(row), 8.5, 0.0, 4.5, Style::Mono);
                    }
                }
                Block::Chart { kind, caption, png } => {
                    w.gap(3.0);
                    let width = match kind {
                        crate::models::ChartKind::Bar => CONTENT_WIDTH,
                        _ => 110.0,
                    };
                    w.chart(png, kind.as_str(), width)?;
                    w.gap(2.0);
                    w.wrapped(caption, 8.0, 0.0, 110, Style::Regular);
                }
                Block::Recommendations(groups) => {
                    for group in groups {
                        w.gap(1.5);
                        w.text(&group.category, 10.0, 0.0, 5.5, Style::Bold);
                        for item in &group.items {
                            w.wrapped(&format!("- {item}"), 9.0, 5.0, 95, Style::Regular);
                        }
                    }
                }
                Block::Disclaimer(text) => {
                    w.gap(4.0);
                    w.wrapped(text, 7.5, 0.0, 120, Style::Regular);
                }
            }
        }
    }

    w.finish()
}
