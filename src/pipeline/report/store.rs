//! Filesystem store for generated reports and chart images.
//!
//! Everything for one assessment lives under `<root>/<assessment_id>/`.
//! Writes go to a temporary file in that directory and are renamed over the
//! target, so a reader never sees a half-written file and regeneration
//! simply replaces the previous output.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::models::ChartKind;

pub const DOCUMENT_FILE: &str = "report.pdf";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No stored output at {0}")]
    NotFound(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn assessment_dir(&self, assessment_id: &Uuid) -> PathBuf {
        self.root.join(assessment_id.to_string())
    }

    pub fn chart_path(&self, assessment_id: &Uuid, kind: ChartKind) -> PathBuf {
        self.assessment_dir(assessment_id).join(kind.file_name())
    }

    pub fn document_path(&self, assessment_id: &Uuid) -> PathBuf {
        self.assessment_dir(assessment_id).join(DOCUMENT_FILE)
    }

    /// Trend chart of one comparison, kept beside the current assessment's report.
    pub fn comparison_chart_path(&self, assessment_id: &Uuid, comparison_id: &Uuid) -> PathBuf {
        self.assessment_dir(assessment_id)
            .join(format!("comparison-{comparison_id}.png"))
    }

    pub fn write_comparison_chart(
        &self,
        assessment_id: &Uuid,
        comparison_id: &Uuid,
        bytes: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let path = self.comparison_chart_path(assessment_id, comparison_id);
        replace_file(&path, bytes)?;
        Ok(path)
    }

    pub fn write_chart(
        &self,
        assessment_id: &Uuid,
        kind: ChartKind,
        bytes: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let path = self.chart_path(assessment_id, kind);
        replace_file(&path, bytes)?;
        Ok(path)
    }

    pub fn write_document(&self, assessment_id: &Uuid, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.document_path(assessment_id);
        replace_file(&path, bytes)?;
        Ok(path)
    }

    pub fn read_chart(&self, assessment_id: &Uuid, kind: ChartKind) -> Result<Vec<u8>, StoreError> {
        read_file(&self.chart_path(assessment_id, kind))
    }

    pub fn read_document(&self, assessment_id: &Uuid) -> Result<Vec<u8>, StoreError> {
        read_file(&self.document_path(assessment_id))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    tmp.write_all(bytes).map_err(io_error(path))?;
    tmp.as_file().sync_all().map_err(io_error(path))?;
    tmp.persist(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StoreError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let id = Uuid::new_v4();

        let path = store.write_document(&id, b"%PDF-1.3 one").unwrap();
        assert_eq!(path, dir.path().join(id.to_string()).join(DOCUMENT_FILE));
        store.write_document(&id, b"%PDF-1.3 two").unwrap();
        assert_eq!(store.read_document(&id).unwrap(), b"%PDF-1.3 two");
    }

    #[test]
    fn reading_absent_output_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(matches!(
            store.read_chart(&Uuid::new_v4(), ChartKind::Pie),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn assessments_do_not_share_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.write_chart(&a, ChartKind::Bar, b"a").unwrap();
        store.write_chart(&b, ChartKind::Bar, b"b").unwrap();
        assert_eq!(store.read_chart(&a, ChartKind::Bar).unwrap(), b"a");
        assert_eq!(store.read_chart(&b, ChartKind::Bar).unwrap(), b"b");
    }
}
