//! Text and image extraction from uploaded documents.
//!
//! Dispatch is strictly by the lowercase extension of the uploaded filename. PDF pages and
//! embedded images are processed one at a time; an unreadable page or image is recorded as an
//! [`ExtractionDiagnostic`] and skipped instead of failing the whole document.

mod docx;
mod pdf;

use image::DynamicImage;
use thiserror::Error;

pub use pdf::MIN_IMAGE_DIMENSION;

/// Errors that abort extraction of a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Filename extension is not one of `pdf`, `docx`, `txt`.
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    /// The document could not be opened or decoded at all.
    #[error("Failed to open {format} document: {reason}")]
    DocumentOpen {
        /// Format the bytes were parsed as.
        format: DocumentFormat,
        /// Parser error message.
        reason: String,
    },
    /// Neither text nor images could be extracted.
    #[error("Document is empty or content could not be extracted.")]
    EmptyDocument,
}

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// UTF-8 plain text.
    Txt,
}

impl DocumentFormat {
    /// Resolve the format from the filename's final extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractionError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or(filename)
            .to_lowercase();
        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" => Ok(Self::Txt),
            _ => Err(ExtractionError::UnsupportedFormat(extension)),
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
            Self::Txt => "text",
        };
        f.write_str(name)
    }
}

/// A page or image that was skipped during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionDiagnostic {
    /// 1-based page number.
    pub page: u32,
    /// Position of the image on the page, when the failure concerned an image.
    pub image: Option<usize>,
    /// Human-readable failure reason.
    pub reason: String,
}

impl std::fmt::Display for ExtractionDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.image {
            Some(index) => write!(f, "page {} image {}: {}", self.page, index + 1, self.reason),
            None => write!(f, "page {}: {}", self.page, self.reason),
        }
    }
}

/// Output of a successful extraction.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Plain text in document order.
    pub text: String,
    /// Decoded images that passed the size filter.
    pub images: Vec<DynamicImage>,
    /// Pages and images that were skipped.
    pub diagnostics: Vec<ExtractionDiagnostic>,
}

impl Extraction {
    /// Whether the extraction produced any non-whitespace text.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Length of the extracted text in characters, the unit chunk sizes are measured in.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Extract text and images from raw document bytes, dispatching on the filename extension.
///
/// Fails with [`ExtractionError::EmptyDocument`] when the trimmed text and the image list are
/// both empty.
pub fn extract(bytes: &[u8], filename: &str) -> Result<Extraction, ExtractionError> {
    let format = DocumentFormat::from_filename(filename)?;
    tracing::debug!(filename, %format, bytes = bytes.len(), "Extracting document");

    let extraction = match format {
        DocumentFormat::Pdf => pdf::extract_pdf(bytes)?,
        DocumentFormat::Docx => Extraction {
            text: docx::extract_docx_text(bytes)?,
            ..Default::default()
        },
        DocumentFormat::Txt => Extraction {
            text: decode_text(bytes)?,
            ..Default::default()
        },
    };

    if !extraction.has_text() && extraction.images.is_empty() {
        return Err(ExtractionError::EmptyDocument);
    }

    tracing::info!(
        filename,
        characters = extraction.char_count(),
        images = extraction.images.len(),
        skipped = extraction.diagnostics.len(),
        "Extracted document content"
    );
    Ok(extraction)
}

fn decode_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    String::from_utf8(bytes.to_vec()).map_err(|error| ExtractionError::DocumentOpen {
        format: DocumentFormat::Txt,
        reason: error.to_string(),
    })
}
