//! URL normalization and content-derived keys.
//!
//! Every lookup in the service goes through the same three steps: strip the
//! query string and fragment, drop the scheme so `http://` and `https://`
//! variants compare equal, then hash the result into a fixed-width key.

use sha2::{Digest, Sha256};
use url::Url;

const SCHEME_PREFIXES: [&str; 3] = ["https://", "http://", "//"];

/// Strip query string and fragment. Returns `None` for input that cannot be a URL.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control())
    {
        return None;
    }

    let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
    let stripped = &trimmed[..end];
    if stripped.is_empty() {
        return None;
    }

    if stripped.contains("://") && Url::parse(stripped).is_err() {
        return None;
    }

    Some(stripped.to_string())
}

/// The scheme-less form used for prefix comparison and key derivation.
pub fn comparable(normalized: &str) -> &str {
    SCHEME_PREFIXES
        .iter()
        .find_map(|scheme| normalized.strip_prefix(scheme))
        .unwrap_or(normalized)
}

/// Normalize a cache root: query stripped, exactly one trailing slash.
pub fn normalize_root(raw: &str) -> Option<String> {
    let normalized = normalize(raw)?;
    let mut root = normalized.trim_end_matches('/').to_string();
    root.push('/');
    Some(root)
}

/// Fixed-width lowercase hex SHA-256 of `value`.
pub fn derive_key(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Index key for a cache root. Trailing slash and scheme do not affect it.
pub fn root_key(root_url: &str) -> Option<String> {
    let root = normalize_root(root_url)?;
    Some(derive_key(comparable(&root)))
}

/// Identity key for an asset entry, derived from its normalized URL.
pub fn entry_key(normalized_url: &str) -> String {
    derive_key(comparable(normalized_url))
}

/// Path of `url` below `root_url`, or `None` when the root does not cover it.
pub fn relative_to<'a>(root_url: &str, url: &'a str) -> Option<&'a str> {
    comparable(url).strip_prefix(comparable(root_url))
}
