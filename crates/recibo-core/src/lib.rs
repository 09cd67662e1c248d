//! Core library for payment-receipt processing.
//!
//! This crate provides:
//! - Text extraction from PDF/JPEG/PNG receipts (text layer + OCR fallback)
//! - Keyword classification against a CSV-defined table
//! - Date/amount inference through an OpenAI-compatible LLM endpoint
//! - Reply validation and deterministic renaming of processed files

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod ocr;
pub mod pipeline;
pub mod rename;
pub mod validate;

pub use classify::{ClassificationRule, ClassificationTable, UNIDENTIFIED};
pub use config::ReciboConfig;
pub use error::{ReciboError, Result};
pub use extract::{ExtractedDocument, FileExtractor, TextExtract};
pub use llm::{InferDateAmount, ModelClient, ModelReply};
pub use ocr::{OcrEngine, TesseractOcr};
pub use pipeline::{FileResult, FileStatus, Pipeline, RunReport};
pub use rename::{RenameOutcome, compute_name, is_eligible};
pub use validate::{ValidatedRecord, validate};
