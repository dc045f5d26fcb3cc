use sha2::{Digest, Sha256};

/// Lower-case, trim and collapse whitespace runs to a single space.
pub fn normalize(raw_text: &str) -> String {
    raw_text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Digest of the normalized text with all whitespace removed.
///
/// OCR frequently re-flows the same content with different spacing, so
/// whitespace never contributes to identity.
pub fn fingerprint(raw_text: &str) -> String {
    let compact: String = raw_text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    hex::encode(Sha256::digest(compact.as_bytes()))
}
