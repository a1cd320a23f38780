//! Error taxonomy for the DEFLATE codec core (spec §7).

use std::fmt;

/// Status codes exposed across the C-ABI-facing registry boundary (§6).
///
/// Every `update`/`finish` call maps its result onto one of these; `OK` is
/// the only status that permits the caller to invoke the codec again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    ErrInvalidArg,
    ErrCorrupt,
    ErrLimit,
    ErrMemory,
    ErrUnsupported,
    ErrInternal,
    ErrIo,
}

/// The library's own error type. `Corrupt` and `Limit` carry the detail
/// string described in spec §4.4 ("Error detail").
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeflateError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("{0}")]
    Corrupt(String),

    #[error("{0}")]
    Limit(String),

    #[error("allocation failed: requested {requested} bytes, budget {budget} bytes")]
    Memory { requested: usize, budget: usize },

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

impl DeflateError {
    pub fn status(&self) -> Status {
        match self {
            DeflateError::InvalidArgument(_) => Status::ErrInvalidArg,
            DeflateError::Corrupt(_) => Status::ErrCorrupt,
            DeflateError::Limit(_) => Status::ErrLimit,
            DeflateError::Memory { .. } => Status::ErrMemory,
            DeflateError::Unsupported(_) => Status::ErrUnsupported,
            DeflateError::Internal(_) => Status::ErrInternal,
        }
    }
}

impl From<&DeflateError> for Status {
    fn from(e: &DeflateError) -> Status {
        e.status()
    }
}

pub type DeflateResult<T> = Result<T, DeflateError>;

/// Formats the canonical `corrupt deflate stream at stage '...' (output: N
/// bytes)` style messages spec §4.4 requires verbatim.
pub fn corrupt_at(stage: &str, output_bytes: u64) -> DeflateError {
    DeflateError::Corrupt(format!(
        "corrupt deflate stream at stage '{stage}' (output: {output_bytes} bytes)"
    ))
}

pub fn incomplete_stream(stage: &str) -> DeflateError {
    DeflateError::Corrupt(format!(
        "incomplete deflate stream (stage '{stage}', expected final block)"
    ))
}

pub fn limit_at(stage: &str, output_bytes: u64, limit: u64) -> DeflateError {
    DeflateError::Limit(format!(
        "limit exceeded at stage '{stage}' (output: {output_bytes}/{limit} bytes)"
    ))
}

/// The decoder's sticky error-detail slot (§4.4): populated exactly once per
/// failure, at the origin, and cleared only by `reset`.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetail(Option<String>);

impl ErrorDetail {
    pub fn set(&mut self, detail: impl Into<String>) {
        if self.0.is_none() {
            self.0 = Some(detail.into());
        }
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_deref().unwrap_or(""))
    }
}
