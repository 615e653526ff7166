//! Session-string backends for the sesh bot.
//!
//! One login-handshake interface, two implementations: the Telethon and
//! Pyrogram flavours both drive the same MTProto client and differ in the
//! session-string format they export. The conversation layer works purely in
//! terms of [`AuthBackend`]/[`LoginFlow`] and the [`BackendError`] taxonomy.

pub mod error;
pub mod mtproto;
pub mod pyrogram;
pub mod session_string;
pub mod telethon;

use async_trait::async_trait;

pub use {
    error::BackendError, pyrogram::PyrogramBackend, session_string::SessionParts,
    telethon::TelethonBackend,
};

/// Which session-string flavour a flow produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Telethon,
    Pyrogram,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Telethon => write!(f, "Telethon"),
            Self::Pyrogram => write!(f, "Pyrogram"),
        }
    }
}

/// Result of submitting a login code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOutcome {
    /// Fully signed in; the session can be exported.
    SignedIn,
    /// The account has two-factor authentication; a password is required.
    PasswordRequired,
}

/// An exported string session. Treated as an opaque credential blob: it is
/// handed to the user once and only ever logged as a masked preview.
pub struct SessionString {
    kind: BackendKind,
    value: String,
}

impl SessionString {
    pub fn new(kind: BackendKind, value: String) -> Self {
        Self { kind, value }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// The full credential. Callers must only send this to its owner.
    pub fn reveal(&self) -> &str {
        &self.value
    }

    /// Masked preview, safe for logs.
    pub fn preview(&self) -> String {
        sesh_common::mask::preview(&self.value, 12)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl std::fmt::Debug for SessionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionString")
            .field("kind", &self.kind)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// One active authorization on the account, as listed for the revocation
/// menu. A transient snapshot; the `handle` is only valid for the turn that
/// produced it.
#[derive(Debug, Clone)]
pub struct AuthorizationEntry {
    pub handle: i64,
    pub device: String,
    pub platform: String,
    pub current: bool,
}

impl AuthorizationEntry {
    /// Short label for menu buttons and listings.
    pub fn label(&self) -> String {
        let mut label = format!("{} · {}", self.device, self.platform);
        if self.current {
            label.push_str(" (current)");
        }
        label
    }
}

/// Entry point of a backend: opens a connection and requests a login code.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Connect with the given credentials and send a login code to `phone`.
    ///
    /// On success the returned flow owns the live connection and the
    /// handshake nonce. On failure the connection is torn down internally;
    /// no live handle escapes.
    async fn begin(
        &self,
        api_id: i32,
        api_hash: &str,
        phone: &str,
    ) -> Result<Box<dyn LoginFlow>, BackendError>;
}

/// A live login handshake. Must be [`LoginFlow::release`]d on every exit
/// path; the conversation layer owns exactly one per flow.
#[async_trait]
pub trait LoginFlow: Send {
    fn kind(&self) -> BackendKind;

    /// Submit the login code the user received.
    async fn submit_code(&mut self, code: &str) -> Result<CodeOutcome, BackendError>;

    /// Submit the two-factor password after [`CodeOutcome::PasswordRequired`].
    async fn submit_password(&mut self, password: &str) -> Result<(), BackendError>;

    /// Export the authorized session in this backend's string format.
    fn export_session(&self) -> Result<SessionString, BackendError>;

    /// List active authorizations on the signed-in account.
    async fn list_authorizations(&self) -> Result<Vec<AuthorizationEntry>, BackendError>;

    /// Revoke one authorization by its listing handle.
    async fn revoke_authorization(&self, handle: i64) -> Result<(), BackendError>;

    /// Tear down the connection. Consumes the flow so it can run only once.
    async fn release(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_string_debug_is_redacted() {
        let s = SessionString::new(BackendKind::Telethon, "super-secret-session".into());
        let rendered = format!("{s:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("super-secret-session"));
    }

    #[test]
    fn session_string_preview_is_truncated() {
        let s = SessionString::new(BackendKind::Pyrogram, "a".repeat(100));
        assert!(s.preview().len() < 20);
        assert!(!s.is_empty());
    }

    #[test]
    fn authorization_label_marks_current() {
        let auth = AuthorizationEntry {
            handle: 1,
            device: "Pixel 8".into(),
            platform: "Android".into(),
            current: true,
        };
        assert_eq!(auth.label(), "Pixel 8 · Android (current)");
    }
}
