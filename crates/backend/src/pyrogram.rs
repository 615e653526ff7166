//! Pyrogram-flavoured session backend.
//!
//! Same handshake as the Telethon flavour, but the authorized session is
//! exported in Pyrogram's v3 string format (which additionally embeds the
//! api id and account id).

use async_trait::async_trait;

use crate::{
    AuthBackend, AuthorizationEntry, BackendError, BackendKind, CodeOutcome, LoginFlow,
    SessionString,
    mtproto::{DeviceProfile, GrammersLogin},
    session_string,
};

const DEVICE: DeviceProfile = DeviceProfile {
    device_model: "sesh (Pyrogram)",
    system_version: "1.0",
    app_version: env!("CARGO_PKG_VERSION"),
};

#[derive(Debug, Default)]
pub struct PyrogramBackend;

impl PyrogramBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthBackend for PyrogramBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Pyrogram
    }

    async fn begin(
        &self,
        api_id: i32,
        api_hash: &str,
        phone: &str,
    ) -> Result<Box<dyn LoginFlow>, BackendError> {
        let login = GrammersLogin::begin(api_id, api_hash, phone, DEVICE).await?;
        Ok(Box::new(PyrogramFlow { login }))
    }
}

struct PyrogramFlow {
    login: GrammersLogin,
}

#[async_trait]
impl LoginFlow for PyrogramFlow {
    fn kind(&self) -> BackendKind {
        BackendKind::Pyrogram
    }

    async fn submit_code(&mut self, code: &str) -> Result<CodeOutcome, BackendError> {
        self.login.submit_code(code).await
    }

    async fn submit_password(&mut self, password: &str) -> Result<(), BackendError> {
        self.login.submit_password(password).await
    }

    fn export_session(&self) -> Result<SessionString, BackendError> {
        let parts = self.login.session_parts()?;
        let encoded = session_string::encode_pyrogram(&parts)?;
        Ok(SessionString::new(BackendKind::Pyrogram, encoded))
    }

    async fn list_authorizations(&self) -> Result<Vec<AuthorizationEntry>, BackendError> {
        self.login.list_authorizations().await
    }

    async fn revoke_authorization(&self, handle: i64) -> Result<(), BackendError> {
        self.login.revoke_authorization(handle).await
    }

    async fn release(self: Box<Self>) {
        self.login.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind() {
        assert_eq!(PyrogramBackend::new().kind(), BackendKind::Pyrogram);
    }

    #[test]
    fn device_profile_names_the_flavour() {
        assert!(DEVICE.device_model.contains("Pyrogram"));
    }
}
