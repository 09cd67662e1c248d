//! Configuration structures for the receipt pipeline.

use serde::{Deserialize, Serialize};

/// Main configuration for the recibo pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReciboConfig {
    /// Language-model endpoint configuration.
    pub llm: LlmConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Raster image configuration.
    pub image: ImageConfig,

    /// Reply validation configuration.
    pub validation: ValidationConfig,
}

impl Default for ReciboConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            ocr: OcrConfig::default(),
            pdf: PdfConfig::default(),
            image: ImageConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

/// Language-model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model name passed to the endpoint.
    pub model: String,

    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,

    /// API key (a placeholder for local Ollama).
    pub api_key: String,

    /// Hard timeout for one completion call, in seconds.
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemma3:4b".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: "ollama".to_string(),
            timeout_seconds: 60,
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract recognition language (e.g., "por", "eng").
    pub language: String,

    /// Name or path of the tesseract binary.
    pub tesseract_bin: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "por".to_string(),
            tesseract_bin: "tesseract".to_string(),
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Maximum page count before a PDF is rejected as corrupt.
    pub max_pages: usize,

    /// Minimum text-layer length before falling back to OCR.
    pub min_text_length: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            max_pages: 20,
            min_text_length: 20,
        }
    }
}

/// Raster image configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Maximum pixel count (width * height) accepted for OCR.
    pub max_pixels: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_pixels: 50_000_000,
        }
    }
}

/// Plausibility bounds for the structured model reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Amounts above this value are rejected as implausible.
    pub max_amount: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_amount: 1_000_000,
        }
    }
}

impl ReciboConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Apply `RECIBO_*` environment overrides on top of the current values.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("RECIBO_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("RECIBO_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("RECIBO_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("RECIBO_OCR_LANG") {
            self.ocr.language = v;
        }
    }

    /// API key with all but a hint masked, for logging.
    pub fn masked_api_key(&self) -> String {
        "*".repeat(self.llm.api_key.len())
    }
}
