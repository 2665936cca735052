//! Error types shared across the runtime.
//!
//! Most variants carry enough context to be turned directly into an
//! `ERROR` `cmd_result` detail string by the dispatcher, without the
//! caller having to re-derive it.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TenError>;

#[derive(Debug, Error)]
pub enum TenError {
    /// API misuse by the caller (bad argument, wrong call order).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The graph declaration itself is inconsistent (dangling node
    /// reference, duplicate name, conflicting addon on redeclaration, ...).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A message or manifest payload did not parse as the JSON shape it
    /// was expected to have.
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// A path-table entry expired before its result arrived.
    #[error("path timeout: {0}")]
    Timeout(String),

    /// Target extension, addon, or group could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Registered-addon lookup failed after the addon-loader fallback chain
    /// was exhausted. Distinct from `NotFound`, which is a dispatch-time
    /// routing miss rather than a registry miss.
    #[error("addon '{0}' not registered in store '{1}'")]
    AddonNotFound(String, &'static str),

    /// A `check_integrity` call observed the calling thread did not match
    /// the object's recorded owner. Only raised in debug builds; see
    /// `thread_check`.
    #[error("thread integrity violation: {0}")]
    ThreadIntegrity(String),

    /// Anything else.
    #[error("{0}")]
    Generic(String),
}

impl TenError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_graph(msg: impl Into<String>) -> Self {
        Self::InvalidGraph(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// The detail string the dispatcher should attach to a synthesised
    /// `ERROR` `cmd_result` for this error.
    pub fn as_cmd_result_detail(&self) -> String {
        self.to_string()
    }
}

impl From<serde_json::Error> for TenError {
    fn from(e: serde_json::Error) -> Self {
        TenError::InvalidJson(e.to_string())
    }
}
