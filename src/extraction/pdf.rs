//! PDF text and image extraction backed by `lopdf`.

use super::{DocumentFormat, Extraction, ExtractionDiagnostic, ExtractionError};
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, xobject::PdfImage};
use std::io::Read;

/// Images must be strictly larger than this in both dimensions to be kept.
pub const MIN_IMAGE_DIMENSION: u32 = 50;

/// Bytes allowed beyond four components per declared pixel when inflating an image stream.
const INFLATE_SLACK: u64 = 64 * 1024;

pub(super) fn extract_pdf(bytes: &[u8]) -> Result<Extraction, ExtractionError> {
    let document = Document::load_mem(bytes).map_err(|error| {
        tracing::error!(error = %error, "Failed to open PDF document");
        ExtractionError::DocumentOpen {
            format: DocumentFormat::Pdf,
            reason: error.to_string(),
        }
    })?;

    let pages = document.get_pages();
    tracing::info!(pages = pages.len(), "Processing PDF");

    let mut extraction = Extraction::default();
    for (page_number, page_id) in pages {
        match document.extract_text(&[page_number]) {
            Ok(page_text) => {
                extraction.text.push_str(&page_text);
                extraction.text.push('\n');
            }
            Err(error) => skip_page(&mut extraction, page_number, error.to_string()),
        }

        let page_images = match document.get_page_images(page_id) {
            Ok(images) => images,
            Err(error) => {
                skip_page(&mut extraction, page_number, error.to_string());
                continue;
            }
        };

        for (index, pdf_image) in page_images.iter().enumerate() {
            if !declared_size_qualifies(pdf_image) {
                tracing::debug!(
                    page = page_number,
                    width = pdf_image.width,
                    height = pdf_image.height,
                    "Skipping small image"
                );
                continue;
            }
            match decode_pdf_image(pdf_image) {
                Ok(image) if qualifies(&image) => extraction.images.push(image),
                Ok(_) => {}
                Err(reason) => {
                    tracing::warn!(page = page_number, image = index + 1, %reason, "Failed to extract image");
                    extraction.diagnostics.push(ExtractionDiagnostic {
                        page: page_number,
                        image: Some(index),
                        reason,
                    });
                }
            }
        }
    }

    tracing::info!(
        characters = extraction.char_count(),
        images = extraction.images.len(),
        "Extracted text and images from PDF"
    );
    Ok(extraction)
}

fn skip_page(extraction: &mut Extraction, page: u32, reason: String) {
    tracing::warn!(page, %reason, "Failed to process page");
    extraction.diagnostics.push(ExtractionDiagnostic {
        page,
        image: None,
        reason,
    });
}

fn declared_size_qualifies(pdf_image: &PdfImage<'_>) -> bool {
    let min = i64::from(MIN_IMAGE_DIMENSION);
    pdf_image.width > min && pdf_image.height > min
}

fn qualifies(image: &DynamicImage) -> bool {
    image.width() > MIN_IMAGE_DIMENSION && image.height() > MIN_IMAGE_DIMENSION
}

fn decode_pdf_image(pdf_image: &PdfImage<'_>) -> Result<DynamicImage, String> {
    let filters: &[String] = pdf_image.filters.as_deref().unwrap_or(&[]);
    let mut data = pdf_image.content.to_vec();

    for filter in filters {
        match filter.as_str() {
            "FlateDecode" => {
                if uses_predictor(pdf_image.origin_dict) {
                    return Err("FlateDecode predictors are not supported".to_string());
                }
                data = inflate(&data, inflate_limit(pdf_image)?)?;
            }
            "DCTDecode" => {
                return image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
                    .map_err(|error| format!("JPEG decoding failed: {error}"));
            }
            other => return Err(format!("Unsupported image filter: {other}")),
        }
    }

    decode_raw_pixels(pdf_image, data)
}

/// Upper bound on the inflated size of an image stream, derived from its declared dimensions.
fn inflate_limit(pdf_image: &PdfImage<'_>) -> Result<u64, String> {
    let width = u64::try_from(pdf_image.width).map_err(|_| "Invalid image width".to_string())?;
    let height =
        u64::try_from(pdf_image.height).map_err(|_| "Invalid image height".to_string())?;
    width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(4))
        .and_then(|bytes| bytes.checked_add(INFLATE_SLACK))
        .ok_or_else(|| "Declared image dimensions overflow".to_string())
}

fn inflate(data: &[u8], limit: u64) -> Result<Vec<u8>, String> {
    let mut decompressed = Vec::new();
    ZlibDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut decompressed)
        .map_err(|error| format!("Decompression failed: {error}"))?;
    if decompressed.len() as u64 > limit {
        return Err(format!("Decompressed image stream exceeds {limit} bytes"));
    }
    Ok(decompressed)
}

fn uses_predictor(dict: &Dictionary) -> bool {
    dict.get(b"DecodeParms")
        .and_then(|params| params.as_dict())
        .and_then(|params| params.get(b"Predictor"))
        .and_then(|predictor| predictor.as_i64())
        .is_ok_and(|predictor| predictor > 1)
}

fn decode_raw_pixels(pdf_image: &PdfImage<'_>, data: Vec<u8>) -> Result<DynamicImage, String> {
    let bits = pdf_image.bits_per_component.unwrap_or(8);
    if bits != 8 {
        return Err(format!("Unsupported bits per component: {bits}"));
    }
    let width = u32::try_from(pdf_image.width).map_err(|_| "Invalid image width".to_string())?;
    let height =
        u32::try_from(pdf_image.height).map_err(|_| "Invalid image height".to_string())?;
    let color_space = pdf_image.color_space.as_deref().unwrap_or("DeviceRGB");

    let image = match color_space {
        "DeviceRGB" | "RGB" | "CalRGB" => {
            RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        "DeviceGray" | "Gray" | "CalGray" => {
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        "DeviceCMYK" | "CMYK" => {
            RgbImage::from_raw(width, height, cmyk_to_rgb(&data)).map(DynamicImage::ImageRgb8)
        }
        other => return Err(format!("Unsupported color space: {other}")),
    };

    image.ok_or_else(|| "Pixel data shorter than declared dimensions".to_string())
}

#[allow(clippy::many_single_char_names)]
fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((cmyk.len() / 4) * 3);
    for chunk in cmyk.chunks_exact(4) {
        let c = f32::from(chunk[0]) / 255.0;
        let m = f32::from(chunk[1]) / 255.0;
        let y = f32::from(chunk[2]) / 255.0;
        let k = f32::from(chunk[3]) / 255.0;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            rgb.push((255.0 * (1.0 - c) * (1.0 - k)) as u8);
            rgb.push((255.0 * (1.0 - m) * (1.0 - k)) as u8);
            rgb.push((255.0 * (1.0 - y) * (1.0 - k)) as u8);
        }
    }
    rgb
}
