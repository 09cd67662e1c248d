//! Text extraction from receipt files.
//!
//! PDFs go through the text layer first with an OCR fallback for scanned
//! documents; raster images go straight to OCR after a dimension check.

mod pdf;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{ImageConfig, PdfConfig};
use crate::error::ExtractionError;
use crate::ocr::OcrEngine;

/// Where the text of a document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDetail {
    /// A PDF with its page count.
    Pdf { pages: usize },
    /// A raster image with its pixel dimensions.
    Image { width: u32, height: u32 },
}

/// Text extracted from one receipt file. Scoped to a single pipeline run for
/// that file and discarded once a result is produced.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub source_path: PathBuf,
    pub raw_text: String,
    pub detail: SourceDetail,
}

/// Seam for text extraction, so the pipeline can be driven with stub
/// documents in tests.
pub trait TextExtract {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError>;
}

/// Production extractor dispatching on file extension.
pub struct FileExtractor<O: OcrEngine> {
    ocr: O,
    pdf: PdfConfig,
    image: ImageConfig,
}

impl<O: OcrEngine> FileExtractor<O> {
    pub fn new(ocr: O, pdf: PdfConfig, image: ImageConfig) -> Self {
        Self { ocr, pdf, image }
    }

    fn extract_image(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let (width, height) = image::image_dimensions(path)
            .map_err(|e| ExtractionError::Corrupt(e.to_string()))?;

        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 || pixels > self.image.max_pixels {
            return Err(ExtractionError::DimensionExceeded { width, height });
        }

        debug!(path = %path.display(), width, height, "running OCR on image");
        let raw_text = self.ocr.recognize_file(path)?;

        if raw_text.trim().is_empty() {
            return Err(ExtractionError::EmptyContent);
        }

        Ok(ExtractedDocument {
            source_path: path.to_path_buf(),
            raw_text,
            detail: SourceDetail::Image { width, height },
        })
    }
}

impl<O: OcrEngine> TextExtract for FileExtractor<O> {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        info!(path = %path.display(), "extracting text");

        let document = match extension.as_str() {
            "pdf" => {
                let (raw_text, pages) = pdf::extract(path, &self.ocr, &self.pdf, &self.image)?;
                ExtractedDocument {
                    source_path: path.to_path_buf(),
                    raw_text,
                    detail: SourceDetail::Pdf { pages },
                }
            }
            "jpg" | "jpeg" | "png" => self.extract_image(path)?,
            other => return Err(ExtractionError::Unsupported(other.to_string())),
        };

        debug!(
            path = %path.display(),
            chars = document.raw_text.len(),
            "extraction finished"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use pretty_assertions::assert_eq;

    struct StubOcr {
        text: &'static str,
    }

    impl OcrEngine for StubOcr {
        fn recognize_file(&self, _path: &Path) -> Result<String, ExtractionError> {
            Ok(self.text.to_string())
        }

        fn recognize_image(&self, _image: &DynamicImage) -> Result<String, ExtractionError> {
            Ok(self.text.to_string())
        }
    }

    fn extractor(text: &'static str, image: ImageConfig) -> FileExtractor<StubOcr> {
        FileExtractor::new(StubOcr { text }, PdfConfig::default(), image)
    }

    fn write_png(dir: &std::path::Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let img = DynamicImage::new_rgb8(width, height);
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();
        path
    }

    #[test]
    fn test_image_goes_through_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "nota.png", 10, 10);

        let doc = extractor("conta de luz", ImageConfig::default())
            .extract(&path)
            .unwrap();
        assert_eq!(doc.raw_text, "conta de luz");
        assert_eq!(doc.detail, SourceDetail::Image { width: 10, height: 10 });
    }

    #[test]
    fn test_oversized_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "nota.png", 10, 10);

        let err = extractor("texto", ImageConfig { max_pixels: 50 })
            .extract(&path)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::DimensionExceeded { width: 10, height: 10 }));
    }

    #[test]
    fn test_blank_ocr_output_is_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nota.jpg");
        let img = DynamicImage::new_rgb8(10, 10);
        img.save_with_format(&path, image::ImageFormat::Jpeg).unwrap();

        let err = extractor("  \n ", ImageConfig::default())
            .extract(&path)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyContent));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let err = extractor("texto", ImageConfig::default())
            .extract(Path::new("nota.docx"))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported(ext) if ext == "docx"));
    }

    #[test]
    fn test_unreadable_image_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nota.png");
        std::fs::write(&path, b"not a png").unwrap();

        let err = extractor("texto", ImageConfig::default())
            .extract(&path)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt(_)));
    }
}
