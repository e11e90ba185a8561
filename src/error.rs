//! Typed error taxonomy shared by the query, search, and handler layers.
//!
//! The variants map one-to-one onto the failure classes callers are expected
//! to distinguish:
//!
//! - [`Error::InvalidArgument`] — caller-fixable; bad tool arguments or
//!   malformed query parameters. Never retried automatically.
//! - [`Error::NotFound`] — an asset or enrichment document is absent.
//!   Composite responses degrade per field instead of surfacing this.
//! - [`Error::SearchTimeout`] — the index exceeded the caller's deadline.
//!   Propagated distinctly so callers can decide whether to retry.
//! - [`Error::ValidationTimeout`] — the generative model exceeded its
//!   deadline. Internal to the validator; collapsed to a `false` verdict at
//!   its public boundary.
//! - [`Error::UpstreamUnavailable`] — index or model backend unreachable.
//! - [`Error::Serialization`] — malformed JSON or unexpected response shape.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("search timed out: {0}")]
    SearchTimeout(String),

    #[error("validation timed out: {0}")]
    ValidationTimeout(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for an [`Error::InvalidArgument`] naming a tool and the
    /// offending key, the form handler validation reports everywhere.
    pub fn missing_arg(tool: &str, key: &str) -> Self {
        Error::InvalidArgument(format!("{tool}: missing required argument '{key}'"))
    }
}
