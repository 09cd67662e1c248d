//! Pipeline orchestration: drives each eligible file through extraction,
//! classification, inference, validation, and rename, and accumulates a
//! run-scoped report.
//!
//! Files are processed independently; a failure in one file is captured into
//! its result and never aborts the rest of the batch. Execution is strictly
//! sequential, one file at a time.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::classify::ClassificationTable;
use crate::error::{ConfigError, ReciboError, RenameError};
use crate::extract::TextExtract;
use crate::llm::InferDateAmount;
use crate::rename::{self, is_eligible};
use crate::validate;

/// Terminal status of one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Renamed (or, under dry-run, a destination name was computed).
    Success,
    /// Rejected by the eligibility predicate; not a failure.
    Skipped,
    /// A stage failed; the originating error is attached.
    Failed,
}

/// Result for one input file. Created once, never mutated.
#[derive(Debug)]
pub struct FileResult {
    pub source_path: PathBuf,
    pub new_name: Option<String>,
    pub label: Option<String>,
    pub status: FileStatus,
    pub error: Option<ReciboError>,
}

impl FileResult {
    /// Short category for the attached error, for report rendering.
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(|e| match e {
            ReciboError::Config(_) => "config",
            ReciboError::Extraction(_) => "extraction",
            ReciboError::Llm(_) => "llm",
            ReciboError::Validation(_) => "validation",
            ReciboError::Rename(_) => "rename",
            ReciboError::Io(_) | ReciboError::Unexpected(_) => "unexpected",
        })
    }

    /// File name portion of the source path.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Ordered, append-only sequence of per-file results plus run totals.
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<FileResult>,
}

impl RunReport {
    pub fn successes(&self) -> usize {
        self.count(FileStatus::Success)
    }

    pub fn skipped(&self) -> usize {
        self.count(FileStatus::Skipped)
    }

    pub fn failures(&self) -> usize {
        self.count(FileStatus::Failed)
    }

    fn count(&self, status: FileStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Every file that was not a full success, in processing order.
    pub fn non_successes(&self) -> impl Iterator<Item = &FileResult> {
        self.results.iter().filter(|r| r.status != FileStatus::Success)
    }
}

/// Drives receipts through the pipeline stages.
pub struct Pipeline<E, M> {
    extractor: E,
    model: M,
    table: ClassificationTable,
    max_amount: u64,
    dry_run: bool,
}

impl<E: TextExtract, M: InferDateAmount> Pipeline<E, M> {
    pub fn new(
        extractor: E,
        model: M,
        table: ClassificationTable,
        max_amount: u64,
        dry_run: bool,
    ) -> Self {
        Self {
            extractor,
            model,
            table,
            max_amount,
            dry_run,
        }
    }

    /// Process every file in `files_dir` and return the run report.
    ///
    /// A summary is always produced, even when every file fails; only an
    /// unusable directory aborts the run.
    pub async fn run(&self, files_dir: &Path) -> Result<RunReport, ReciboError> {
        if !files_dir.is_dir() {
            return Err(ConfigError::BadFilesDir(files_dir.to_path_buf()).into());
        }

        let mut names: Vec<std::ffi::OsString> = std::fs::read_dir(files_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name())
            .collect();
        names.sort();

        info!(
            dir = %files_dir.display(),
            files = names.len(),
            dry_run = self.dry_run,
            "starting run"
        );

        let mut report = RunReport::default();
        for name in names {
            let path = files_dir.join(&name);

            // A name that is not UTF-8 can never carry the destination
            // pattern; report it instead of dropping it from the listing.
            let Some(name) = name.to_str() else {
                warn!(file = %path.display(), "file name is not valid UTF-8");
                report.results.push(FileResult {
                    source_path: path,
                    new_name: None,
                    label: None,
                    status: FileStatus::Failed,
                    error: Some(ReciboError::Unexpected(
                        "file name is not valid UTF-8".to_string(),
                    )),
                });
                continue;
            };

            if !is_eligible(name) {
                debug!(file = %name, "skipped by eligibility predicate");
                report.results.push(FileResult {
                    source_path: path,
                    new_name: None,
                    label: None,
                    status: FileStatus::Skipped,
                    error: None,
                });
                continue;
            }

            report.results.push(self.process_file(&path).await);
        }

        info!(
            successes = report.successes(),
            skipped = report.skipped(),
            failures = report.failures(),
            "run finished"
        );
        Ok(report)
    }

    /// Run one file through all stages, capturing any failure into its result.
    async fn process_file(&self, path: &Path) -> FileResult {
        info!(file = %path.display(), "processing");

        match self.stages(path).await {
            Ok((new_name, label)) => {
                info!(file = %path.display(), new_name = %new_name, "success");
                FileResult {
                    source_path: path.to_path_buf(),
                    new_name: Some(new_name),
                    label: Some(label),
                    status: FileStatus::Success,
                    error: None,
                }
            }
            // Another run renamed the file between listing and applying.
            Err(ReciboError::Rename(RenameError::AlreadyProcessed(_))) => {
                warn!(file = %path.display(), "renamed concurrently, skipping");
                FileResult {
                    source_path: path.to_path_buf(),
                    new_name: None,
                    label: None,
                    status: FileStatus::Skipped,
                    error: None,
                }
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "failed");
                FileResult {
                    source_path: path.to_path_buf(),
                    new_name: None,
                    label: None,
                    status: FileStatus::Failed,
                    error: Some(e),
                }
            }
        }
    }

    /// Stage sequence for one file. The first failing stage wins; no rename
    /// happens unless every prior stage succeeded.
    async fn stages(&self, path: &Path) -> Result<(String, String), ReciboError> {
        let document = self.extractor.extract(path)?;
        let label = self.table.classify(&document.raw_text).to_string();
        let reply = self.model.infer(&document.raw_text).await?;
        let record = validate::validate(&reply, self.max_amount)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let new_name = rename::compute_name(&record, &label, extension);

        rename::apply(path, &new_name, self.dry_run)?;
        Ok((new_name, label))
    }
}
