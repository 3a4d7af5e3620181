use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::loader::{LoadOutcome, RecordLoader};
use crate::resolver::Resolver;
use crate::source::{SourceError, list_source_files, read_file};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to recreate destination tables: {0}")]
    Schema(#[source] DbError),
    #[error("cannot list source files: {0}")]
    Source(#[from] SourceError),
}

/// Result of loading one source file.
#[derive(Debug)]
pub struct FileSummary {
    pub path: PathBuf,
    pub extracted_at: String,
    pub outcome: LoadOutcome,
    /// Lines skipped as invalid.
    pub rejected: usize,
    /// Set when the file could not be read at all.
    pub error: Option<String>,
}

impl FileSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.rejected == 0 && self.outcome.all_succeeded()
    }
}

#[derive(Debug, Default)]
pub struct LoadSummary {
    pub files: Vec<FileSummary>,
}

impl LoadSummary {
    /// Every file read, every line valid, every insert accepted.
    pub fn success(&self) -> bool {
        self.files.iter().all(FileSummary::succeeded)
    }

    pub fn records(&self) -> usize {
        self.files.iter().map(|f| f.outcome.records.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().map(|f| f.outcome.failed_count()).sum()
    }

    pub fn rejected(&self) -> usize {
        self.files.iter().map(|f| f.rejected).sum()
    }
}

/// Full reload: rebuild the destination schema, then load every source file.
pub struct LoadDriver<'a> {
    db: &'a Database,
    resolver: &'a Resolver<'a>,
    source_dir: PathBuf,
}

impl<'a> LoadDriver<'a> {
    pub fn new(
        db: &'a Database,
        resolver: &'a Resolver<'a>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { db, resolver, source_dir: source_dir.into() }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Drops and recreates every destination table, then loads.
    ///
    /// Schema setup errors are returned. Everything after that is recorded
    /// in the summary and never aborts the run.
    pub fn reload(&self) -> Result<LoadSummary, DriverError> {
        // Listed first so a bad source dir doesn't wipe the tables
        let files = list_source_files(&self.source_dir)?;

        self.db.recreate_tables().map_err(DriverError::Schema)?;
        log::info!("Recreated destination tables");

        if files.is_empty() {
            log::warn!("No source files in {}", self.source_dir.display());
        }

        let loader = RecordLoader::new(self.db, self.resolver);
        let mut summary = LoadSummary::default();

        for path in files {
            let extracted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            log::info!("Processing {}", path.display());

            let file_summary = match read_file(&path) {
                Ok(file) => {
                    let outcome = loader.load(&file.records, &extracted_at);
                    FileSummary {
                        path,
                        extracted_at,
                        outcome,
                        rejected: file.rejected.len(),
                        error: None,
                    }
                }
                Err(e) => {
                    log::error!("{e}");
                    FileSummary {
                        path,
                        extracted_at,
                        outcome: LoadOutcome::default(),
                        rejected: 0,
                        error: Some(e.to_string()),
                    }
                }
            };

            if !file_summary.succeeded() {
                log::error!(
                    "{}: {} failed, {} rejected",
                    file_summary.path.display(),
                    file_summary.outcome.failed_count(),
                    file_summary.rejected
                );
            }
            summary.files.push(file_summary);
        }

        Ok(summary)
    }
}
