//! # Error Handling
//!
//! Error types for Rankwarden Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── I/O Errors (retryable)                                            │
//! │  │   ├── StoreUnavailable      - Invite event store unreachable        │
//! │  │   ├── PlatformUnavailable   - Membership/platform client failed     │
//! │  │   └── Timeout               - An I/O step exceeded its deadline     │
//! │  │                                                                      │
//! │  ├── User Input Errors (rendered verbatim, not retryable)              │
//! │  │   ├── CommandNotFound       - No command matches the typed name     │
//! │  │   └── AmbiguousCommand      - Several commands match                │
//! │  │                                                                      │
//! │  ├── Configuration Errors                                              │
//! │  │   ├── Misconfiguration      - e.g. duplicate rank thresholds        │
//! │  │   ├── InvalidRank           - Rejected rank definition              │
//! │  │   └── InvalidEvent          - Rejected invite event                 │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── Internal              - Should not happen                     │
//! │      └── SerializationError    - JSON encode/decode failure            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! I/O failures propagate to the caller untouched. Reconciliation of one
//! member failing never affects another member: every engine call is scoped
//! to a single (community, user) key.

use thiserror::Error;

/// Result type alias for Rankwarden Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Rankwarden Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // I/O Errors (100-199)
    // ========================================================================

    /// The invite event store could not be reached or failed mid-query
    #[error("Invite store unavailable: {0}")]
    StoreUnavailable(String),

    /// The chat platform (membership client) could not be reached
    #[error("Platform unavailable: {0}")]
    PlatformUnavailable(String),

    /// An I/O step exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ========================================================================
    // User Input Errors (200-299)
    // ========================================================================

    /// No registered command matches the typed name
    #[error("No command found matching `{0}`.")]
    CommandNotFound(String),

    /// More than one command matches and none is an exact-length match
    #[error("Multiple commands match `{typed}`: {}", format_candidates(.candidates))]
    AmbiguousCommand {
        /// What the user typed
        typed: String,
        /// Every matching command name, in registry order
        candidates: Vec<String>,
    },

    /// A command was given arguments it cannot use
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    // ========================================================================
    // Configuration Errors (300-399)
    // ========================================================================

    /// Community configuration violates an invariant (e.g. duplicate thresholds)
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// A rank definition was rejected
    #[error("Invalid rank: {0}")]
    InvalidRank(String),

    /// An invite event was rejected
    #[error("Invalid invite event: {0}")]
    InvalidEvent(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn format_candidates(candidates: &[String]) -> String {
    candidates
        .iter()
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Get the numeric error code
    ///
    /// - 100-199: I/O
    /// - 200-299: User input
    /// - 300-399: Configuration
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::StoreUnavailable(_) => 100,
            Error::PlatformUnavailable(_) => 101,
            Error::Timeout(_) => 102,

            Error::CommandNotFound(_) => 200,
            Error::AmbiguousCommand { .. } => 201,
            Error::InvalidArguments(_) => 202,

            Error::Misconfiguration(_) => 300,
            Error::InvalidRank(_) => 301,
            Error::InvalidEvent(_) => 302,

            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Check if this error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::PlatformUnavailable(_) | Error::Timeout(_)
        )
    }

    /// Check if this error comes from user input and should be shown to
    /// the user as-is instead of being logged as a system error
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::CommandNotFound(_)
                | Error::AmbiguousCommand { .. }
                | Error::InvalidArguments(_)
                | Error::InvalidRank(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Blocking task failed: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::StoreUnavailable("db".into()).code(), 100);
        assert_eq!(Error::PlatformUnavailable("api".into()).code(), 101);
        assert_eq!(Error::CommandNotFound("xyz".into()).code(), 200);
        assert_eq!(Error::Misconfiguration("dup".into()).code(), 300);
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::StoreUnavailable("down".into()).is_recoverable());
        assert!(Error::PlatformUnavailable("down".into()).is_recoverable());
        assert!(Error::Timeout("store read".into()).is_recoverable());
        assert!(!Error::CommandNotFound("xyz".into()).is_recoverable());
        assert!(!Error::Misconfiguration("dup".into()).is_recoverable());
    }

    #[test]
    fn test_user_input_errors() {
        let err = Error::AmbiguousCommand {
            typed: "inv".into(),
            candidates: vec!["invites".into(), "invitecodes".into()],
        };
        assert!(err.requires_user_action());
        assert!(!Error::Timeout("x".into()).requires_user_action());
    }

    #[test]
    fn test_ambiguous_message_lists_candidates() {
        let err = Error::AmbiguousCommand {
            typed: "inv".into(),
            candidates: vec!["invites".into(), "invitecodes".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("`invites`"));
        assert!(msg.contains("`invitecodes`"));
    }

    #[test]
    fn test_sqlite_error_maps_to_store_unavailable() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(err.is_recoverable());
    }
}
