//! OCR engine backed by the external Tesseract binary.
//!
//! The binary is verified once at startup; a missing or non-functional
//! installation is a fatal configuration error, never a per-file one.

use std::path::Path;
use std::process::Command;

use image::DynamicImage;
use tracing::{debug, info};

use crate::config::OcrConfig;
use crate::error::{ConfigError, ExtractionError};

/// Text recognition over image files and decoded images.
///
/// Implemented by [`TesseractOcr`] in production; tests substitute a stub so
/// extraction can be exercised without the binary.
pub trait OcrEngine {
    /// Run OCR over an image file on disk.
    fn recognize_file(&self, path: &Path) -> Result<String, ExtractionError>;

    /// Run OCR over an already-decoded image.
    fn recognize_image(&self, image: &DynamicImage) -> Result<String, ExtractionError>;
}

/// Handle to a verified Tesseract installation.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    bin: String,
    language: String,
}

impl TesseractOcr {
    /// Verify the binary responds to `--version` and return a usable engine.
    pub fn verify(config: &OcrConfig) -> Result<Self, ConfigError> {
        let output = Command::new(&config.tesseract_bin)
            .arg("--version")
            .output()
            .map_err(|e| {
                ConfigError::OcrUnavailable(format!("{}: {}", config.tesseract_bin, e))
            })?;

        if !output.status.success() {
            return Err(ConfigError::OcrUnavailable(format!(
                "{} --version exited with {}",
                config.tesseract_bin, output.status
            )));
        }

        // Older Tesseract releases print the version banner to stderr.
        let banner = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = String::from_utf8_lossy(banner);
        info!(
            version = %version.lines().next().unwrap_or("unknown"),
            language = %config.language,
            "Tesseract OCR verified"
        );

        Ok(Self {
            bin: config.tesseract_bin.clone(),
            language: config.language.clone(),
        })
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize_file(&self, path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new(&self.bin)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| ExtractionError::Ocr(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(path = %path.display(), chars = text.len(), "OCR completed");
        Ok(text)
    }

    /// Run OCR over a decoded image by staging it as a temporary PNG.
    ///
    /// The temp file is removed when the guard drops, on every exit path.
    fn recognize_image(&self, image: &DynamicImage) -> Result<String, ExtractionError> {
        let staged = tempfile::Builder::new()
            .prefix("recibo-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ExtractionError::Ocr(format!("temp file: {}", e)))?;

        image
            .save_with_format(staged.path(), image::ImageFormat::Png)
            .map_err(|e| ExtractionError::Ocr(format!("staging PNG: {}", e)))?;

        self.recognize_file(staged.path())
    }
}
