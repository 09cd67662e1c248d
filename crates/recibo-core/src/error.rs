//! Error types for the recibo-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the recibo library.
#[derive(Error, Debug)]
pub enum ReciboError {
    /// Fatal configuration error; aborts the run before any file is touched.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Text extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Language-model error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Model reply validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Rename error.
    #[error("rename error: {0}")]
    Rename(#[from] RenameError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure outside the categorized stages.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Fatal errors detected before any file is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Classification CSV is missing a required column.
    #[error("CSV is missing required column '{0}'")]
    MissingColumn(String),

    /// Two classification rules carry the same label.
    #[error("duplicate classification label '{0}'")]
    DuplicateLabel(String),

    /// A keyword cell parsed to an empty list.
    #[error("rule '{0}' has no keywords")]
    EmptyKeywords(String),

    /// Keyword cell is neither a JSON array of strings nor a comma list.
    #[error("cannot parse keywords for '{label}': {value}")]
    BadKeywords { label: String, value: String },

    /// The CSV produced no usable rules.
    #[error("classification table is empty")]
    EmptyTable,

    /// Failed to read or parse the CSV file.
    #[error("failed to read classification CSV: {0}")]
    Csv(String),

    /// The OCR engine could not be verified at startup.
    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    /// The input directory does not exist or is not a directory.
    #[error("files directory not usable: {}", .0.display())]
    BadFilesDir(PathBuf),
}

/// Errors raised while turning a file's bytes into text.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// File extension not handled by the extractor.
    #[error("unsupported file format: {0}")]
    Unsupported(String),

    /// The file could not be opened or parsed.
    #[error("corrupt file: {0}")]
    Corrupt(String),

    /// No text survived extraction and OCR fallback.
    #[error("no text content extracted")]
    EmptyContent,

    /// Image dimensions are zero or beyond the configured bound.
    #[error("image dimensions out of bounds: {width}x{height}")]
    DimensionExceeded { width: u32, height: u32 },

    /// The OCR engine failed on this file.
    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// Errors from the language-model call.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The call exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The endpoint could not be reached.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The reply is not valid JSON or is missing required fields.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The model answered that it could not extract the fields.
    #[error("model could not extract payment data")]
    Refused,
}

/// Errors from validating the structured model reply.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Date is not a real calendar date in YYYY-MM-DD form.
    #[error("invalid payment date: {0}")]
    BadDate(String),

    /// Amount is negative, non-finite, or has more than two fraction digits.
    #[error("invalid payment amount: {0}")]
    BadAmount(String),

    /// Amount is above the configured plausibility ceiling.
    #[error("implausible payment amount: {0}")]
    ImplausibleValue(String),
}

/// Errors from computing or applying the destination name.
#[derive(Error, Debug)]
pub enum RenameError {
    /// Destination already exists and differs from the source.
    #[error("destination already exists: {}", .0.display())]
    Collision(PathBuf),

    /// The source no longer passes the eligibility predicate.
    #[error("file already processed: {}", .0.display())]
    AlreadyProcessed(PathBuf),

    /// The source file disappeared before the rename.
    #[error("source file missing: {}", .0.display())]
    SourceMissing(PathBuf),

    /// Filesystem rename failed.
    #[error("rename failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the recibo library.
pub type Result<T> = std::result::Result<T, ReciboError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Rendering one level is enough for reports: the wrapping variant's
    // message contains the leaf message exactly once.
    #[test]
    fn test_display_carries_leaf_message_once() {
        let err = ReciboError::from(ExtractionError::Corrupt("bad xref".to_string()));
        assert_eq!(err.to_string(), "extraction error: corrupt file: bad xref");
        assert_eq!(err.to_string().matches("bad xref").count(), 1);

        let err = ReciboError::from(RenameError::Collision(PathBuf::from("a.pdf")));
        assert_eq!(
            err.to_string(),
            "rename error: destination already exists: a.pdf"
        );
    }
}
