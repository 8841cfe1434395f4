//! Embedding input preparation.

use notegraph_core::defaults::EMBED_MAX_CHARS;

/// Text embedded for a note: title and content, newlines flattened, capped at
/// `max_chars` characters.
pub fn embedding_text(title: &str, content: &str, max_chars: usize) -> String {
    format!("{}\n\n{}", title, content)
        .chars()
        .take(max_chars)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// [`embedding_text`] with the default character cap.
pub fn note_embedding_text(title: &str, content: &str) -> String {
    embedding_text(title, content, EMBED_MAX_CHARS)
}
