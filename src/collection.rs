//! Collection identifiers.
//!
//! Every indexed document lives in its own collection, named by a sanitized
//! form of the document's file name. The mapping is a pure function: the
//! same file name always resolves to the same collection, so a re-uploaded
//! file finds the content indexed earlier.
//!
//! Distinct file names that normalize identically (`Lease 1.pdf` and
//! `lease-1.pdf`) share a collection.

use std::path::Path;

/// Maximum identifier length, in characters.
pub const MAX_COLLECTION_ID_LEN: usize = 63;

/// Substitute for characters outside `[a-z0-9._-]`.
const SUBSTITUTE: char = '-';

/// Identifier used when nothing survives sanitization.
const FALLBACK_ID: &str = "document";

/// Derive the collection identifier for a document file name.
///
/// Takes the final path component, strips its extension, lowercases it,
/// replaces each character outside `[a-z0-9._-]` with `-`, trims leading
/// and trailing `-`, and caps the result at 63 characters.
pub fn derive_collection_id(file_name: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    let replaced: String = stem
        .to_lowercase()
        .chars()
        .map(|c| if is_allowed(c) { c } else { SUBSTITUTE })
        .collect();

    let trimmed: String = replaced
        .trim_matches(SUBSTITUTE)
        .chars()
        .take(MAX_COLLECTION_ID_LEN)
        .collect();

    if trimmed.is_empty() {
        FALLBACK_ID.to_string()
    } else {
        trimmed
    }
}

/// File name component of a path, as used for the `source` metadata.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
}
