//! DOCX paragraph extraction backed by `docx-rs`.

use super::{DocumentFormat, ExtractionError};
use docx_rs::{DocumentChild, Paragraph, ParagraphChild, Run, RunChild};

/// Read every body paragraph in document order and join them with newlines.
///
/// Empty paragraphs are kept so blank lines survive; tables and embedded media are ignored.
pub(super) fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(|error| {
        tracing::error!(error = %error, "Failed to read DOCX");
        ExtractionError::DocumentOpen {
            format: DocumentFormat::Docx,
            reason: error.to_string(),
        }
    })?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
            _ => None,
        })
        .collect();

    tracing::debug!(paragraphs = paragraphs.len(), "Read DOCX paragraphs");
    Ok(paragraphs.join("\n"))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        match child {
            ParagraphChild::Run(run) => push_run_text(&mut text, run),
            ParagraphChild::Hyperlink(link) => {
                for child in &link.children {
                    if let ParagraphChild::Run(run) = child {
                        push_run_text(&mut text, run);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn push_run_text(text: &mut String, run: &Run) {
    for child in &run.children {
        match child {
            RunChild::Text(t) => text.push_str(&t.text),
            RunChild::Tab(_) => text.push('\t'),
            RunChild::Break(_) => text.push('\n'),
            _ => {}
        }
    }
}
