//! Content-derived snippet identifiers.

use std::{fmt, path::Path};

use base64::{Engine, engine::general_purpose::URL_SAFE};
use sha1::{Digest, Sha1};

/// Number of base64 characters of the digest kept as the identifier.
pub const SNIPPET_ID_LEN: usize = 10;

/// Largest snippet body accepted for saving.
pub const MAX_SNIPPET_BYTES: usize = 64 * 1024;

/// Short identifier of a saved snippet.
///
/// Derived from the first ten characters of the URL-safe base64 encoding of
/// the SHA-1 digest of the snippet bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnippetId(String);

impl SnippetId {
    pub fn derive(content: &[u8]) -> Self {
        let digest = Sha1::digest(content);
        let mut encoded = URL_SAFE.encode(digest);
        encoded.truncate(SNIPPET_ID_LEN);
        Self(encoded)
    }

    /// Resolve an identifier from a request path by keeping its final segment.
    ///
    /// Only path traversal is defended against; other characters pass through
    /// and simply fail to match a stored file.
    pub fn from_request_path(raw: &str) -> Option<Self> {
        let name = Path::new(raw).file_name()?.to_str()?;
        if name.is_empty() {
            return None;
        }
        Some(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
