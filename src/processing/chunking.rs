//! Recursive character chunking.
//!
//! Text is split on the most structural separator that occurs in it (paragraph break, line
//! break, sentence end, space) and falls back to single characters. Pieces are then merged
//! greedily into chunks of at most `chunk_size` characters, carrying up to `chunk_overlap`
//! characters of trailing pieces into the next chunk. Separators stay attached to the start of
//! the piece that follows them, and each chunk is trimmed of surrounding whitespace.
//!
//! Lengths are measured in Unicode scalar values, never bytes. The splitter is a pure function
//! of its input and settings, so repeated calls return identical sequences.

use super::types::ChunkingError;
use std::sync::Arc;

type LengthFn = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Separators tried in order, from most to least structural. The empty separator splits into
/// individual characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Splits text into bounded, overlapping chunks.
#[derive(Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
    length: LengthFn,
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("separators", &self.separators)
            .finish()
    }
}

impl TextChunker {
    /// Build a chunker using the default separator list and character counting.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if chunk_overlap > chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: chunk_overlap,
                chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            length: char_length(),
        })
    }

    /// Maximum chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared between consecutive chunks where the text allows it.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks.
    ///
    /// Returns an empty vector when the input is empty or all whitespace.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = select_separator(text, separators);
        let splits = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for piece in splits {
            if self.len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, retaining a tail of up to `chunk_overlap` characters.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let piece_len = self.len(piece);
            if total + piece_len > self.chunk_size && !current.is_empty() {
                if total > self.chunk_size {
                    tracing::warn!(
                        length = total,
                        chunk_size = self.chunk_size,
                        "Created a chunk longer than the configured size"
                    );
                }
                if let Some(chunk) = join_trimmed(&current) {
                    chunks.push(chunk);
                }
                while total > self.chunk_overlap
                    || (total + piece_len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(front) => total -= self.len(front),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += piece_len;
        }

        if let Some(chunk) = join_trimmed(&current) {
            chunks.push(chunk);
        }
        chunks
    }

    fn len(&self, text: &str) -> usize {
        self.length.as_ref()(text)
    }
}

fn char_length() -> LengthFn {
    Arc::new(|segment: &str| segment.chars().count())
}

/// Pick the first separator present in `text`; the empty separator always matches.
fn select_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (index, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator.as_str(), &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[index + 1..]);
        }
    }
    match separators.last() {
        Some(last) => (last.as_str(), &[]),
        None => ("", &[]),
    }
}

/// Split `text` at each occurrence of `separator`, attaching the separator to the following
/// piece. Empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, c)| &text[start..start + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        pieces.push(&text[start..index]);
        start = index;
    }
    pieces.push(&text[start..]);
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn join_trimmed(pieces: &std::collections::VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
