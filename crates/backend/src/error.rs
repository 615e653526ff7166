use thiserror::Error;

/// Shared taxonomy for login-handshake failures.
///
/// Both session-string backends translate their client library's error
/// conditions into these variants; the conversation layer decides recovery
/// per variant and never sees backend-specific error types.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The API ID / API hash pair was rejected.
    #[error("invalid API credentials")]
    InvalidCredentials,

    /// The phone number was rejected; the user can try another.
    #[error("invalid phone number")]
    InvalidPhone,

    /// The account lives on another data center.
    #[error("account migrated to data center {0}")]
    Migrated(i32),

    /// The platform told us to back off for this many seconds.
    #[error("rate limited for {0}s")]
    RateLimited(u64),

    /// Wrong login code; the user can re-enter it.
    #[error("invalid login code")]
    InvalidCode,

    /// The login code is no longer valid; the flow must restart.
    #[error("login code expired")]
    CodeExpired,

    /// The two-factor password was rejected.
    #[error("two-factor authentication failed")]
    AuthFailed,

    /// Anything the taxonomy does not cover. The message is for server-side
    /// logs only and must be sanitised before logging.
    #[error("{0}")]
    Unexpected(String),
}

impl BackendError {
    pub fn unexpected(source: impl std::fmt::Display) -> Self {
        Self::Unexpected(source.to_string())
    }
}
