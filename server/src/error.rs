use tracing::{debug, error, warn};

pub type Result<T, E = DbaError> = std::result::Result<T, E>;

/// Coarse classification used to decide how loudly an error should be
/// logged and whether the MCP response should carry the raw message or a
/// redacted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller's fault: bad SQL, disallowed statement, unknown object.
    Caller,
    /// Server/environment problem: connection refused, extension missing.
    Environment,
    /// Bug or invariant violation inside this process.
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum DbaError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("sql syntax error: {0}")]
    SqlSyntax(String),

    #[error("statement not allowed in {access_mode} mode: {statement_kind}")]
    StatementNotAllowed {
        access_mode: String,
        statement_kind: String,
    },

    #[error("unsupported option {option} for this server version")]
    UnsupportedOption { option: String },

    #[error("unsupported syntax for restricted mode: {0}")]
    UnsupportedSyntaxForRestrictedMode(String),

    #[error("query timed out after {0:?}")]
    QueryTimeout(std::time::Duration),

    #[error("extension unavailable: {extension} ({reason})")]
    ExtensionUnavailable { extension: String, reason: String },

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error")]
    Database(#[from] tokio_postgres::Error),

    #[error("database pool error")]
    Pool(#[from] deadpool_postgres::PoolError),
}

impl DbaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbaError::SqlSyntax(_)
            | DbaError::StatementNotAllowed { .. }
            | DbaError::UnsupportedSyntaxForRestrictedMode(_)
            | DbaError::ObjectNotFound(_) => ErrorKind::Caller,
            DbaError::Configuration(_)
            | DbaError::Connection(_)
            | DbaError::UnsupportedOption { .. }
            | DbaError::QueryTimeout(_)
            | DbaError::ExtensionUnavailable { .. }
            | DbaError::Pool(_) => ErrorKind::Environment,
            DbaError::Internal(_) | DbaError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Logs this error at the severity appropriate to its kind, then
    /// returns it unchanged so it can still be propagated with `?`.
    pub fn log(self) -> Self {
        match self.kind() {
            ErrorKind::Caller => debug!(error = %self, "rejected caller input"),
            ErrorKind::Environment => warn!(error = %self, "environment error"),
            ErrorKind::Internal => error!(error = %self, "internal error"),
        }
        self
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn object_not_found(what: impl Into<String>) -> Self {
        Self::ObjectNotFound(what.into())
    }
}
