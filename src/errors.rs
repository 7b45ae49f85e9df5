//! Error taxonomy for the bitmap engine
//!
//! Error codes:
//! - AERO_BITMAP_FORMAT (FATAL): corrupt word encoding, bad page, broken chain
//! - AERO_BITMAP_SEQUENCE (FATAL): TID presented out of order during build
//! - AERO_BITMAP_RESOURCE (ERROR): page or log unavailable, retryable by caller
//! - AERO_BITMAP_INVALID_ARGUMENT (ERROR): malformed key, predicate or TID
//! - AERO_BITMAP_CONFIG (ERROR): rejected configuration
//!
//! A miss in the LOV store is not an error; it is the signal to create an entry.
//! Nothing in the engine retries automatically.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::page::PageId;
use crate::tid::Tid;

/// Severity levels for bitmap errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The current operation fails, the index stays usable
    Error,
    /// The containing build or scan must abort
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Where a failure happened: vector key, TID and page, whichever are known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub key: Option<String>,
    pub tid: Option<Tid>,
    pub page: Option<PageId>,
}

impl ErrorContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn page(page: PageId) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    pub fn tid(tid: Tid) -> Self {
        Self {
            tid: Some(tid),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_tid(mut self, tid: Tid) -> Self {
        self.tid = Some(tid);
        self
    }

    pub fn with_page(mut self, page: PageId) -> Self {
        self.page = Some(page);
        self
    }

    fn is_empty(&self) -> bool {
        self.key.is_none() && self.tid.is_none() && self.page.is_none()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::new();
        if let Some(ref key) = self.key {
            parts.push(format!("key: {}", key));
        }
        if let Some(tid) = self.tid {
            parts.push(format!("tid: {}", tid));
        }
        if let Some(page) = self.page {
            parts.push(format!("page: {}", page));
        }
        write!(f, " ({})", parts.join(", "))
    }
}

/// Bitmap engine error
#[derive(Debug, Error)]
pub enum BitmapError {
    #[error("[FATAL] AERO_BITMAP_FORMAT: {message}{context}")]
    Format {
        message: String,
        context: ErrorContext,
    },

    #[error("[FATAL] AERO_BITMAP_SEQUENCE: {message}{context}")]
    Sequence {
        message: String,
        context: ErrorContext,
    },

    #[error("[ERROR] AERO_BITMAP_RESOURCE: {message}{context}")]
    Resource {
        message: String,
        context: ErrorContext,
        #[source]
        source: Option<io::Error>,
    },

    #[error("[ERROR] AERO_BITMAP_INVALID_ARGUMENT: {message}{context}")]
    InvalidArgument {
        message: String,
        context: ErrorContext,
    },

    #[error("[ERROR] AERO_BITMAP_CONFIG: {0}")]
    Config(String),
}

impl BitmapError {
    pub fn format(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Format {
            message: message.into(),
            context,
        }
    }

    pub fn sequence(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Sequence {
            message: message.into(),
            context,
        }
    }

    pub fn resource(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Resource {
            message: message.into(),
            context,
            source: None,
        }
    }

    /// Resource error caused by an I/O failure
    pub fn io(message: impl Into<String>, context: ErrorContext, source: io::Error) -> Self {
        Self::Resource {
            message: message.into(),
            context,
            source: Some(source),
        }
    }

    pub fn invalid_argument(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            context,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Resource error for a poisoned lock around `what`
    pub fn lock_poisoned(what: &str) -> Self {
        Self::resource(format!("{} lock poisoned", what), ErrorContext::none())
    }

    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Format { .. } => "AERO_BITMAP_FORMAT",
            Self::Sequence { .. } => "AERO_BITMAP_SEQUENCE",
            Self::Resource { .. } => "AERO_BITMAP_RESOURCE",
            Self::InvalidArgument { .. } => "AERO_BITMAP_INVALID_ARGUMENT",
            Self::Config(_) => "AERO_BITMAP_CONFIG",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Format { .. } | Self::Sequence { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns whether the containing build or scan must abort
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Only resource failures may be retried, and only by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Format { context, .. }
            | Self::Sequence { context, .. }
            | Self::Resource { context, .. }
            | Self::InvalidArgument { context, .. } => Some(context),
            Self::Config(_) => None,
        }
    }

    /// Attaches a vector key to the context if none is recorded yet.
    pub fn for_key(mut self, key: &str) -> Self {
        match &mut self {
            Self::Format { context, .. }
            | Self::Sequence { context, .. }
            | Self::Resource { context, .. }
            | Self::InvalidArgument { context, .. } => {
                if context.key.is_none() {
                    context.key = Some(key.to_string());
                }
            }
            Self::Config(_) => {}
        }
        self
    }
}

/// Result type for bitmap operations
pub type BitmapResult<T> = Result<T, BitmapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_severity() {
        let format = BitmapError::format("bad fill", ErrorContext::none());
        assert_eq!(format.code(), "AERO_BITMAP_FORMAT");
        assert!(format.is_fatal());
        assert!(!format.is_retryable());

        let seq = BitmapError::sequence("tid 3 after 7", ErrorContext::tid(3));
        assert_eq!(seq.code(), "AERO_BITMAP_SEQUENCE");
        assert!(seq.is_fatal());

        let res = BitmapError::resource("page missing", ErrorContext::page(9));
        assert_eq!(res.severity(), Severity::Error);
        assert!(res.is_retryable());
    }

    #[test]
    fn test_display_carries_context() {
        let err = BitmapError::format(
            "forward pointer to missing page",
            ErrorContext::page(42).with_key("X").with_tid(5000),
        );
        let display = err.to_string();
        assert!(display.contains("AERO_BITMAP_FORMAT"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("page: 42"));
        assert!(display.contains("key: X"));
        assert!(display.contains("tid: 5000"));
    }

    #[test]
    fn test_for_key_does_not_override() {
        let err = BitmapError::format("x", ErrorContext::none().with_key("A")).for_key("B");
        assert_eq!(err.context().unwrap().key.as_deref(), Some("A"));

        let err = BitmapError::format("x", ErrorContext::none()).for_key("B");
        assert_eq!(err.context().unwrap().key.as_deref(), Some("B"));
    }

    #[test]
    fn test_io_source_preserved() {
        use std::error::Error;
        let err = BitmapError::io(
            "write failed",
            ErrorContext::page(1),
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert!(err.source().is_some());
    }
}
