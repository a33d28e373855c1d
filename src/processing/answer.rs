//! Answer orchestrator: retrieval, prompt assembly, and the generation call.
//!
//! Chat never surfaces an error. Store and model failures become
//! [`Unanswerable::Failed`], an empty model reply becomes [`Unanswerable::EmptyResponse`], and
//! both render as fixed fallback text through [`Answer::into_text`].

use crate::generation::{GenerationClient, PromptPart};
use crate::images::ImageCache;
use crate::store::VectorStore;
use image::DynamicImage;
use std::time::Instant;

/// Chunks retrieved per question.
pub const TOP_K: usize = 5;
/// Longest text context sent to the model, in characters, before the truncation marker.
pub const MAX_CONTEXT_CHARS: usize = 4000;
/// Placed between retrieved chunks.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
/// Appended when the context was cut.
pub const TRUNCATION_MARKER: &str = "...";

const NO_CONTEXT: &str = "No relevant text was found in the document.";
const EMPTY_RESPONSE_FALLBACK: &str =
    "I'm sorry, I couldn't generate a response. Please try rephrasing your question.";
const ERROR_FALLBACK: &str =
    "I encountered an error while generating the response. Please try again.";

/// Why no model answer is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unanswerable {
    /// The model replied without text.
    EmptyResponse,
    /// Retrieval or generation failed with the given reason.
    Failed(String),
}

/// Outcome of answering a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Text produced by the model.
    Answered(String),
    /// A fallback reply is returned instead.
    Unanswerable(Unanswerable),
}

impl Answer {
    /// Whether the reply is a canned fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Unanswerable(_))
    }

    /// Text shown to the user.
    pub fn into_text(self) -> String {
        match self {
            Self::Answered(text) => text,
            Self::Unanswerable(Unanswerable::EmptyResponse) => EMPTY_RESPONSE_FALLBACK.to_string(),
            Self::Unanswerable(Unanswerable::Failed(_)) => ERROR_FALLBACK.to_string(),
        }
    }
}

/// Join retrieved chunks and cap the result at [`MAX_CONTEXT_CHARS`] characters.
pub fn build_context(documents: &[String]) -> String {
    let joined = documents.join(CONTEXT_SEPARATOR);
    match joined.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &joined[..cut]),
        None => joined,
    }
}

/// Assemble the multi-part prompt for `query`.
pub fn build_prompt(query: &str, context: &str, images: &[DynamicImage]) -> Vec<PromptPart> {
    let mut parts = vec![
        PromptPart::Text(format!("Question: {query}\n\n")),
        PromptPart::text("Please answer the following question based ONLY on the provided context."),
        PromptPart::text(
            "If the information is not available in the text or images, clearly state that you cannot find the answer in the document.\n",
        ),
        PromptPart::text("--- TEXT CONTEXT ---"),
        PromptPart::text(if context.is_empty() { NO_CONTEXT } else { context }),
        PromptPart::text("--- END TEXT CONTEXT ---\n"),
    ];

    if !images.is_empty() {
        parts.push(PromptPart::Text(format!(
            "\nAdditionally, {} images from the document are provided for context:",
            images.len()
        )));
        parts.extend(images.iter().cloned().map(PromptPart::Image));
    }

    parts.push(PromptPart::text(
        "\nProvide a clear, concise answer based on the available context.",
    ));
    parts
}

/// Borrowed collaborators for answering one question.
pub struct Answering<'a> {
    /// Source of text context.
    pub store: &'a dyn VectorStore,
    /// Source of image context.
    pub images: &'a ImageCache,
    /// Model producing the reply.
    pub generator: &'a dyn GenerationClient,
}

impl Answering<'_> {
    /// Answer `query` from the contents of `collection`.
    pub async fn run(&self, query: &str, collection: &str) -> Answer {
        let started = Instant::now();
        let preview: String = query.chars().take(100).collect();
        tracing::info!(collection, query = %preview, "Generating multi-modal response");

        let answer = match self.try_answer(query, collection).await {
            Ok(Some(text)) => Answer::Answered(text),
            Ok(None) => Answer::Unanswerable(Unanswerable::EmptyResponse),
            Err(reason) => {
                tracing::error!(collection, error = %reason, "Error generating response");
                Answer::Unanswerable(Unanswerable::Failed(reason))
            }
        };

        tracing::info!(
            collection,
            elapsed_ms = started.elapsed().as_millis() as u64,
            fallback = answer.is_fallback(),
            "Response generated"
        );
        answer
    }

    async fn try_answer(&self, query: &str, collection: &str) -> Result<Option<String>, String> {
        let handle = self
            .store
            .get_or_create(collection)
            .await
            .map_err(|error| error.to_string())?;
        let results = self
            .store
            .query(&handle, vec![query.to_string()], TOP_K)
            .await
            .map_err(|error| error.to_string())?;

        let documents: Vec<String> = results
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|hit| hit.document)
            .collect();
        let context = build_context(&documents);

        let images = self.images.get(collection);
        if !images.is_empty() {
            tracing::info!(collection, images = images.len(), "Attaching images to the prompt");
        }

        self.generator
            .generate(build_prompt(query, &context, &images))
            .await
            .map_err(|error| error.to_string())
    }
}
