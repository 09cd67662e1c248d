//! Canonical destination names and the filesystem rename step.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::classify::UNIDENTIFIED;
use crate::error::RenameError;
use crate::validate::ValidatedRecord;

lazy_static! {
    /// Filenames already carrying a date prefix were produced by an earlier run.
    static ref DATE_PREFIX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();
}

/// Extensions accepted into the pipeline.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Eligibility predicate: supported extension, no date prefix, and not
/// already labeled as unidentified. Files failing this are skipped, not
/// failed.
pub fn is_eligible(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    let Some((_, extension)) = lower.rsplit_once('.') else {
        return false;
    };

    SUPPORTED_EXTENSIONS.contains(&extension)
        && !DATE_PREFIX.is_match(file_name)
        && !lower.contains(UNIDENTIFIED)
}

/// Compute the canonical destination name:
/// `YYYY-MM-DD-R$<amount with two decimals>-<label>.<ext>`.
pub fn compute_name(record: &ValidatedRecord, label: &str, extension: &str) -> String {
    format!(
        "{}-R${:.2}-{}.{}",
        record.payment_date.format("%Y-%m-%d"),
        record.amount,
        label,
        extension.to_lowercase()
    )
}

/// Outcome of applying (or simulating) a rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The file was renamed to this path.
    Renamed(PathBuf),
    /// Dry-run: this path would have been the destination.
    DryRun(PathBuf),
}

impl RenameOutcome {
    /// Destination path, applied or simulated.
    pub fn destination(&self) -> &Path {
        match self {
            RenameOutcome::Renamed(path) | RenameOutcome::DryRun(path) => path,
        }
    }
}

/// Rename `original` to `new_name` in the same directory.
///
/// The eligibility predicate is re-checked first so a file another run
/// already renamed is not processed twice (best-effort; concurrent runs are
/// not coordinated). An existing, distinct destination is a collision, never
/// an overwrite. Under dry-run nothing on the filesystem is touched.
pub fn apply(
    original: &Path,
    new_name: &str,
    dry_run: bool,
) -> Result<RenameOutcome, RenameError> {
    let file_name = original
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RenameError::SourceMissing(original.to_path_buf()))?;

    if !is_eligible(file_name) {
        debug!(file = file_name, "source no longer eligible, not renaming");
        return Err(RenameError::AlreadyProcessed(original.to_path_buf()));
    }

    let destination = original.with_file_name(new_name);

    if dry_run {
        info!(
            "[dry-run] would rename {} -> {}",
            original.display(),
            destination.display()
        );
        return Ok(RenameOutcome::DryRun(destination));
    }

    if !original.exists() {
        return Err(RenameError::SourceMissing(original.to_path_buf()));
    }

    if destination.exists() && destination != original {
        return Err(RenameError::Collision(destination));
    }

    std::fs::rename(original, &destination)?;
    info!("renamed {} -> {}", original.display(), destination.display());
    Ok(RenameOutcome::Renamed(destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn record(date: &str, amount: &str) -> ValidatedRecord {
        ValidatedRecord {
            payment_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            amount: Decimal::from_str(amount).unwrap(),
        }
    }

    #[test]
    fn test_compute_name_format() {
        let name = compute_name(&record("2023-02-17", "107.10"), "energia", "pdf");
        assert_eq!(name, "2023-02-17-R$107.10-energia.pdf");
    }

    #[test]
    fn test_compute_name_always_two_decimals_no_separator() {
        assert_eq!(
            compute_name(&record("2023-02-17", "10799.1"), "aluguel", "PDF"),
            "2023-02-17-R$10799.10-aluguel.pdf"
        );
        assert_eq!(
            compute_name(&record("2020-08-20", "41"), "agua", "jpeg"),
            "2020-08-20-R$41.00-agua.jpeg"
        );
    }

    #[test]
    fn test_compute_name_matches_output_pattern() {
        let pattern = Regex::new(r"^\d{4}-\d{2}-\d{2}-R\$\d+\.\d{2}-[a-z0-9]+\.\w+$").unwrap();
        for (date, amount, label, ext) in [
            ("2023-02-17", "107.10", "energia", "pdf"),
            ("2020-08-20", "41.00", "agua", "png"),
            ("2024-12-31", "10799.10", "condominio", "jpg"),
        ] {
            let name = compute_name(&record(date, amount), label, ext);
            assert!(pattern.is_match(&name), "{name} does not match");
        }
    }

    #[test]
    fn test_eligibility_predicate() {
        assert!(is_eligible("nota.pdf"));
        assert!(is_eligible("Recibo Internet.JPG"));
        assert!(!is_eligible("2024-01-01-R$50.00-agua.pdf"));
        assert!(!is_eligible("nota-naoidentificado.pdf"));
        assert!(!is_eligible("planilha.xlsx"));
        assert!(!is_eligible("sem_extensao"));
    }

    #[test]
    fn test_apply_renames_file() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("nota.pdf");
        std::fs::write(&original, b"%PDF").unwrap();

        let outcome = apply(&original, "2023-02-17-R$107.10-energia.pdf", false).unwrap();
        let expected = dir.path().join("2023-02-17-R$107.10-energia.pdf");
        assert_eq!(outcome, RenameOutcome::Renamed(expected.clone()));
        assert!(!original.exists());
        assert!(expected.exists());
    }

    #[test]
    fn test_apply_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("nota.pdf");
        std::fs::write(&original, b"%PDF").unwrap();

        let outcome = apply(&original, "2023-02-17-R$107.10-energia.pdf", true).unwrap();
        assert!(matches!(outcome, RenameOutcome::DryRun(_)));
        assert!(original.exists());
        assert!(!dir.path().join("2023-02-17-R$107.10-energia.pdf").exists());
    }

    #[test]
    fn test_apply_rejects_collision() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("nota.pdf");
        let taken = dir.path().join("2023-02-17-R$107.10-energia.pdf");
        std::fs::write(&original, b"%PDF").unwrap();
        std::fs::write(&taken, b"%PDF").unwrap();

        let err = apply(&original, "2023-02-17-R$107.10-energia.pdf", false).unwrap_err();
        assert!(matches!(err, RenameError::Collision(_)));
        assert!(original.exists());
    }

    #[test]
    fn test_apply_rechecks_eligibility() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("2024-01-01-R$50.00-agua.pdf");
        std::fs::write(&original, b"%PDF").unwrap();

        let err = apply(&original, "2024-01-01-R$51.00-agua.pdf", false).unwrap_err();
        assert!(matches!(err, RenameError::AlreadyProcessed(_)));
    }

    #[test]
    fn test_apply_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("nota.pdf");

        let err = apply(&original, "2023-02-17-R$107.10-energia.pdf", false).unwrap_err();
        assert!(matches!(err, RenameError::SourceMissing(_)));
    }
}
