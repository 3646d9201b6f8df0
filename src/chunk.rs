//! Recursive, overlap-aware text chunker.
//!
//! Splits extracted page text into [`Chunk`]s of at most `chunk_size`
//! characters, with up to `chunk_overlap` characters repeated between
//! neighbors. Splitting prefers the largest structural boundary present:
//! paragraphs (`\n\n`), then lines (`\n`), then words (` `), and only then
//! a hard cut between characters. Separators stay attached to the start of
//! the piece that follows them; chunk edges are whitespace-trimmed.
//!
//! Pages are chunked independently, so no chunk straddles a page break.
//! Positions are contiguous across the whole document, and each chunk gets
//! the deterministic id `"{source}_{position}"` plus a SHA-256 hash of its
//! text.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Boundaries tried in order; `""` means "between any two characters".
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Character-counting recursive splitter.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty pieces of at most `chunk_size` chars.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            out.extend(self.merge(&fitting));
        }
        out
    }

    /// Greedily pack pieces into chunks, carrying trailing pieces worth at
    /// most `chunk_overlap` chars into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

/// Chunk a single block of text.
pub fn chunk_text(source: &str, text: &str, splitter: &TextSplitter) -> Vec<Chunk> {
    chunk_pages(source, &[text], splitter)
}

/// Chunk a document given as ordered page texts.
///
/// Returns an empty vector when no page has any non-whitespace text.
pub fn chunk_pages<S: AsRef<str>>(source: &str, pages: &[S], splitter: &TextSplitter) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut position: i64 = 0;

    for (page_idx, page) in pages.iter().enumerate() {
        for text in splitter.split_text(page.as_ref()) {
            chunks.push(make_chunk(source, position, page_idx as i64 + 1, &text));
            position += 1;
        }
    }

    chunks
}

/// Deterministic record id for a chunk position.
pub fn chunk_id(source: &str, position: i64) -> String {
    format!("{}_{}", source, position)
}

fn make_chunk(source: &str, position: i64, page: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(source, position),
        source: source.to_string(),
        position,
        page,
        text: text.to_string(),
        hash,
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split at every occurrence of `separator`, keeping it at the start of the
/// following piece. An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract_text(len: usize) -> String {
        let mut text = String::new();
        let mut clause = 1;
        while text.len() < len {
            text.push_str(&format!(
                "Clause {} provides that the tenant shall pay rent on day {} of each month. ",
                clause,
                clause % 28 + 1
            ));
            clause += 1;
        }
        text.truncate(len);
        text
    }

    /// Some suffix of `a` (at most `max` chars) is a prefix of `b`.
    fn overlaps(a: &str, b: &str, max: usize) -> bool {
        (1..=max.min(b.len())).any(|n| b.is_char_boundary(n) && a.ends_with(&b[..n]))
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("a.pdf", "", &TextSplitter::default()).is_empty());
        assert!(chunk_text("a.pdf", "  \n\n \n", &TextSplitter::default()).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("a.pdf", "Hello, world!", &TextSplitter::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].id, "a.pdf_0");
        assert_eq!(chunks[0].page, 1);
    }

    #[test]
    fn test_contract_scenario() {
        let text = contract_text(3000);
        assert_eq!(text.chars().count(), 3000);

        let chunks = chunk_text("contract.pdf", &text, &TextSplitter::default());
        assert!(
            (3..=4).contains(&chunks.len()),
            "expected 3-4 chunks, got {}",
            chunks.len()
        );
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000);
            assert_eq!(c.source, "contract.pdf");
        }
        for pair in chunks.windows(2) {
            assert!(
                overlaps(&pair[0].text, &pair[1].text, 200),
                "no overlap between {:?} and {:?}",
                pair[0].id,
                pair[1].id
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let p1 = "a".repeat(600);
        let p2 = "b".repeat(600);
        let text = format!("{}\n\n{}", p1, p2);
        let chunks = chunk_text("doc.pdf", &text, &TextSplitter::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, p1);
        assert_eq!(chunks[1].text, p2);
    }

    #[test]
    fn test_prefers_lines_over_words() {
        let line = "word ".repeat(100);
        let text = format!("{}\n{}\n{}", line.trim(), line.trim(), line.trim());
        let chunks = chunk_text("doc.pdf", &text, &TextSplitter::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.lines().count(), 2);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text: String = (0..2500).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let chunks = chunk_text("blob.pdf", &text, &TextSplitter::default());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, text[..1000]);
        assert_eq!(chunks[1].text, text[800..1800]);
        assert_eq!(chunks[2].text, text[1600..]);
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "é".repeat(1500);
        let chunks = chunk_text("accents.pdf", &text, &TextSplitter::default());
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_pages_never_merged() {
        let pages = vec!["First page.".to_string(), String::new(), "Third page.".to_string()];
        let chunks = chunk_pages("deed.pdf", &pages, &TextSplitter::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 3);
        assert_eq!(chunks[1].position, 1);
        assert_eq!(chunks[1].id, "deed.pdf_1");
    }

    #[test]
    fn test_positions_contiguous() {
        let pages: Vec<String> = (0..4).map(|_| contract_text(2200)).collect();
        let chunks = chunk_pages("lease.pdf", &pages, &TextSplitter::default());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = contract_text(5000);
        let c1 = chunk_text("doc1", &text, &TextSplitter::default());
        let c2 = chunk_text("doc1", &text, &TextSplitter::default());
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_overlap_clamped() {
        let splitter = TextSplitter::new(10, 50);
        assert_eq!(splitter.chunk_overlap(), 9);
    }
}
