//! Collaborator traits consumed by the exchange core
//!
//! Identity and binary storage live outside the core. These traits are the
//! seams the core calls through; the crate ships in-memory implementations
//! ([`crate::core::UserDirectory`], [`crate::core::InMemoryObjectStore`]) and
//! any persistent backend plugs in the same way.

use crate::types::{ExchangeError, Principal};

/// MIME types accepted for transfer proofs
pub const ALLOWED_PROOF_MIME_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "application/pdf"];

/// Resolves request credentials to principals
pub trait AuthenticationService: Send + Sync {
    /// Resolve `credential` to the principal it was issued for
    ///
    /// # Errors
    ///
    /// * `ExchangeError::Unauthenticated` - unknown or revoked credential
    /// * `ExchangeError::ExternalService` - identity backend unreachable
    fn authenticate(&self, credential: &str) -> Result<Principal, ExchangeError>;
}

/// Stores binary proof content and returns a retrievable URL
pub trait ObjectStore: Send + Sync {
    /// Store `content` under `key`
    ///
    /// Implementations reject MIME types outside
    /// [`ALLOWED_PROOF_MIME_TYPES`] with `ExchangeError::Validation` and report
    /// backend failures as `ExchangeError::ExternalService`.
    fn put(&self, key: &str, content: &[u8], mime_type: &str) -> Result<String, ExchangeError>;
}

/// Whether `mime_type` is on the proof allow-list
pub fn is_allowed_proof_mime(mime_type: &str) -> bool {
    ALLOWED_PROOF_MIME_TYPES.contains(&mime_type)
}

/// File extension stored alongside a proof of the given MIME type
pub fn proof_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// Infer a proof MIME type from a file name's extension
pub fn mime_from_filename(filename: &str) -> Option<&'static str> {
    let extension = filename.rsplit_once('.')?.1.to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}
