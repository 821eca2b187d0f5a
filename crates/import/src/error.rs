use std::fmt;

/// Run-fatal errors. Everything else (resolution, provisioning, write and
/// verification failures) is caught at row/entity granularity and folded
/// into the [`ImportReport`](crate::report::ImportReport) instead.
#[derive(Debug)]
pub enum ImportError {
    /// Malformed or empty input. Aborts before any write.
    Parse(String),
    /// TOML parse / validation error in the engine configuration.
    Config(String),
    /// A directory snapshot read failed even after retries; no phase can
    /// resolve against a store it cannot read.
    Snapshot(StoreError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Snapshot(e) => write!(f, "directory snapshot failed: {e}"),
        }
    }
}

impl std::error::Error for ImportError {}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Error returned by a collaborator (directory or link store) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Request timed out.
    Timeout,
    /// Rate limited (HTTP 429 equivalent).
    RateLimited,
    /// Service unavailable (HTTP 503 equivalent).
    Unavailable,
    /// Connection reset / network failure.
    Connection,
    /// Duplicate-key or concurrent-write conflict.
    Conflict,
    /// The store rejected the payload.
    Invalid,
    /// Referenced entity does not exist.
    NotFound,
    /// Anything else.
    Other,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Transient errors are worth retrying; everything else fails the
    /// single operation immediately without aborting the batch.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Timeout
                | StoreErrorKind::RateLimited
                | StoreErrorKind::Unavailable
                | StoreErrorKind::Connection
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::RateLimited => "rate limited",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Connection => "connection failure",
            StoreErrorKind::Conflict => "conflict",
            StoreErrorKind::Invalid => "invalid request",
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::Other => "store error",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        for kind in [
            StoreErrorKind::Timeout,
            StoreErrorKind::RateLimited,
            StoreErrorKind::Unavailable,
            StoreErrorKind::Connection,
        ] {
            assert!(StoreError::new(kind, "x").is_transient(), "{kind:?}");
        }
        for kind in [
            StoreErrorKind::Conflict,
            StoreErrorKind::Invalid,
            StoreErrorKind::NotFound,
            StoreErrorKind::Other,
        ] {
            assert!(!StoreError::new(kind, "x").is_transient(), "{kind:?}");
        }
    }

    #[test]
    fn display_carries_context() {
        let e = StoreError::new(StoreErrorKind::RateLimited, "slow down");
        assert_eq!(e.to_string(), "rate limited: slow down");
    }
}
