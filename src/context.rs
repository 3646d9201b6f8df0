//! Context assembly: retrieved chunks → one prompt-ready block of text.

use crate::models::RetrievedChunk;

/// Separator placed between chunk texts.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Join chunk texts in ranked order, separated by a blank line.
pub fn assemble(chunks: &[RetrievedChunk]) -> String {
    assemble_within(chunks, 0)
}

/// Like [`assemble`], but keeps the result within `max_chars` characters.
///
/// Whole chunks are kept in ranked order while they fit. If even the best
/// chunk is too long it is cut at a character boundary. `0` means no limit.
pub fn assemble_within(chunks: &[RetrievedChunk], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for (i, hit) in chunks.iter().enumerate() {
        let text = hit.chunk.text.as_str();
        let sep = if i == 0 { 0 } else { CHUNK_SEPARATOR.len() };
        let len = text.chars().count();

        if max_chars > 0 && used + sep + len > max_chars {
            if i == 0 {
                out.extend(text.chars().take(max_chars));
            }
            break;
        }

        if i > 0 {
            out.push_str(CHUNK_SEPARATOR);
        }
        out.push_str(text);
        used += sep + len;
    }

    out
}
