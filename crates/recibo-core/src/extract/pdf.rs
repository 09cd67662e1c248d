//! PDF text extraction using lopdf and pdf-extract, with an OCR fallback
//! over embedded page images for scanned receipts.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Document, Object};
use tracing::{debug, trace, warn};

use crate::config::{ImageConfig, PdfConfig};
use crate::error::ExtractionError;
use crate::ocr::OcrEngine;

/// Extract the text of a PDF receipt, returning the text and the page count.
///
/// The embedded text layer is tried first; when it is missing or shorter
/// than `min_text_length`, every embedded image is OCR'd instead. Receipts
/// are short documents, so a page count above `max_pages` is rejected as
/// corrupt before any OCR work starts.
pub fn extract<O: OcrEngine>(
    path: &Path,
    ocr: &O,
    config: &PdfConfig,
    image: &ImageConfig,
) -> Result<(String, usize), ExtractionError> {
    let data = std::fs::read(path).map_err(|e| ExtractionError::Corrupt(e.to_string()))?;

    let mut doc =
        Document::load_mem(&data).map_err(|e| ExtractionError::Corrupt(e.to_string()))?;

    // PDFs encrypted with an empty password still carry a usable text layer.
    let raw = if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(ExtractionError::Corrupt("PDF is encrypted".to_string()));
        }
        debug!("decrypted PDF with empty password");
        let mut decrypted = Vec::new();
        doc.save_to(&mut decrypted)
            .map_err(|e| ExtractionError::Corrupt(e.to_string()))?;
        decrypted
    } else {
        data
    };

    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(ExtractionError::Corrupt("PDF has no pages".to_string()));
    }
    if pages > config.max_pages {
        return Err(ExtractionError::Corrupt(format!(
            "{} pages exceeds the {}-page bound for receipts",
            pages, config.max_pages
        )));
    }

    let text = match pdf_extract::extract_text_from_mem(&raw) {
        Ok(text) => text,
        Err(e) => {
            debug!("text-layer extraction failed, treating as scanned: {}", e);
            String::new()
        }
    };

    if text.trim().len() >= config.min_text_length {
        debug!(pages, chars = text.len(), "using embedded text layer");
        return Ok((text, pages));
    }

    debug!(
        pages,
        chars = text.trim().len(),
        "text layer below minimum, running OCR on embedded images"
    );

    let images = embedded_images(&doc, image.max_pixels);
    let mut ocr_text = String::new();
    for image in &images {
        let page_text = ocr.recognize_image(image)?;
        if !page_text.trim().is_empty() {
            if !ocr_text.is_empty() {
                ocr_text.push_str("\n\n");
            }
            ocr_text.push_str(&page_text);
        }
    }

    if ocr_text.trim().is_empty() {
        return Err(ExtractionError::EmptyContent);
    }

    Ok((ocr_text, pages))
}

/// Collect every decodable image object in the document.
///
/// Scanned receipts embed each page scan as an image XObject; scanning all
/// objects is simpler than walking per-page resources and covers inherited
/// resource dictionaries for free.
fn embedded_images(doc: &Document, max_pixels: u64) -> Vec<DynamicImage> {
    let mut images = Vec::new();

    for (_, object) in doc.objects.iter() {
        if let Some(image) = image_from_object(doc, object, max_pixels) {
            images.push(image);
        }
    }

    debug!("found {} embedded images", images.len());
    images
}

fn image_from_object(doc: &Document, object: &Object, max_pixels: u64) -> Option<DynamicImage> {
    let Object::Stream(stream) = object else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    // Declared dimensions are untrusted input; reject anything outside the
    // raster bound before sizing a single buffer.
    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    trace!("image object: {}x{}", width, height);

    let pixels = u64::from(width) * u64::from(height);
    if pixels == 0 || pixels > max_pixels {
        warn!("skipping embedded image with implausible dimensions {}x{}", width, height);
        return None;
    }

    if let Ok(filter) = dict.get(b"Filter") {
        let filter_name = match filter {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        };

        match filter_name {
            Some(b"DCTDecode") => {
                // JPEG scan data, decodable as-is.
                return image::load_from_memory_with_format(
                    &stream.content,
                    image::ImageFormat::Jpeg,
                )
                .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                warn!("skipping image with unsupported filter");
                return None;
            }
            _ => {}
        }
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        trace!("unsupported bits per component: {}", bits);
        return None;
    }

    raw_to_image(&data, width, height, color_space)
}

fn raw_to_image(data: &[u8], width: u32, height: u32, color_space: &[u8]) -> Option<DynamicImage> {
    let pixels = u64::from(width) * u64::from(height);
    let expected_rgb = usize::try_from(pixels.checked_mul(3)?).ok()?;
    let expected_gray = usize::try_from(pixels).ok()?;
    let rgba_len = usize::try_from(pixels.checked_mul(4)?).ok()?;

    if (color_space == b"DeviceRGB" || color_space == b"RGB") && data.len() >= expected_rgb {
        let mut rgba = Vec::with_capacity(rgba_len);
        for chunk in data[..expected_rgb].chunks(3) {
            rgba.extend_from_slice(chunk);
            rgba.push(255);
        }
        return ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba)
            .map(DynamicImage::ImageRgba8);
    }

    if (color_space == b"DeviceGray" || color_space == b"G") && data.len() >= expected_gray {
        let mut rgba = Vec::with_capacity(rgba_len);
        for &gray in &data[..expected_gray] {
            rgba.extend_from_slice(&[gray, gray, gray, 255]);
        }
        return ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba)
            .map(DynamicImage::ImageRgba8);
    }

    trace!(
        "undecodable raw image: data_len={}, expected_rgb={}, expected_gray={}",
        data.len(),
        expected_rgb,
        expected_gray
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, dictionary};

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn recognize_file(&self, _path: &Path) -> Result<String, ExtractionError> {
            Err(ExtractionError::Ocr("no OCR in this test".to_string()))
        }

        fn recognize_image(&self, _image: &DynamicImage) -> Result<String, ExtractionError> {
            Err(ExtractionError::Ocr("no OCR in this test".to_string()))
        }
    }

    /// Build a minimal single-font PDF with one text page per entry.
    fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut data = Vec::new();
        build_doc(page_texts).save_to(&mut data).unwrap();
        data
    }

    fn build_doc(page_texts: &[&str]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn write_pdf(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_text_layer_extracted_without_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "nota.pdf", &build_pdf(&["conta de luz vencimento"]));

        let (text, pages) =
            extract(&path, &NoOcr, &PdfConfig::default(), &ImageConfig::default()).unwrap();
        assert_eq!(pages, 1);
        assert!(text.to_lowercase().contains("conta de luz"));
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "nota.pdf", b"definitely not a pdf");

        let err = extract(&path, &NoOcr, &PdfConfig::default(), &ImageConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt(_)));
    }

    #[test]
    fn test_page_bound_enforced() {
        let texts = vec!["pagina com bastante texto para o extrator"; 25];
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "livro.pdf", &build_pdf(&texts));

        let err = extract(&path, &NoOcr, &PdfConfig { max_pages: 20, min_text_length: 20 }, &ImageConfig::default())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Corrupt(_)));
    }

    #[test]
    fn test_textless_pdf_without_images_is_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "vazio.pdf", &build_pdf(&[""]));

        let err = extract(&path, &NoOcr, &PdfConfig::default(), &ImageConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyContent));
    }

    #[test]
    fn test_huge_declared_image_dimensions_skipped() {
        let mut doc = build_doc(&[""]);
        doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1_000_000,
                "Height" => 1_000_000,
                "BitsPerComponent" => 8,
                "ColorSpace" => "DeviceRGB",
            },
            vec![0u8; 16],
        ));
        let mut data = Vec::new();
        doc.save_to(&mut data).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "gigante.pdf", &data);

        // The declared size is rejected before any buffer is sized, so the
        // document ends up with no usable images at all.
        let err = extract(&path, &NoOcr, &PdfConfig::default(), &ImageConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyContent));
    }
}
