//! Shared MTProto plumbing for both session-string backends.
//!
//! All grammers-specific surface lives here: connecting, translating the
//! client library's error conditions into [`BackendError`], driving the
//! sign-in handshake, and snapshotting the authorized session for the pure
//! encoders in [`crate::session_string`].

use {
    grammers_client::{
        Client, Config, InitParams, InvocationError, SignInError, client::auth::AuthorizationError,
        types,
    },
    grammers_session::Session,
    grammers_tl_types as tl,
    tracing::{debug, warn},
};

use crate::{AuthorizationEntry, BackendError, CodeOutcome, session_string::SessionParts};

/// Client identity presented during the handshake; differs per backend
/// flavour so authorizations are recognisable in the account's session list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeviceProfile {
    pub device_model: &'static str,
    pub system_version: &'static str,
    pub app_version: &'static str,
}

/// A live, connected login handshake over grammers.
///
/// Owns the client connection plus the handshake nonce (the login token
/// grammers returns when the code is requested). Dropping it closes the
/// transport; [`GrammersLogin::release`] exists so teardown is explicit and
/// observable at the call sites that must guarantee it.
pub(crate) struct GrammersLogin {
    client: Client,
    api_id: i32,
    login_token: Option<types::LoginToken>,
    password_token: Option<types::PasswordToken>,
    user_id: Option<i64>,
}

impl GrammersLogin {
    /// Connect a fresh session and request a login code for `phone`.
    ///
    /// Any failure tears the connection down before returning (the client is
    /// dropped on the error path), so callers never hold a dead handle.
    pub(crate) async fn begin(
        api_id: i32,
        api_hash: &str,
        phone: &str,
        device: DeviceProfile,
    ) -> Result<Self, BackendError> {
        let params = InitParams {
            device_model: device.device_model.to_string(),
            system_version: device.system_version.to_string(),
            app_version: device.app_version.to_string(),
            // Surface every flood wait instead of sleeping through it; the
            // conversation layer reports the wait to the user.
            flood_sleep_threshold: 0,
            ..Default::default()
        };

        let client = Client::connect(Config {
            session: Session::new(),
            api_id,
            api_hash: api_hash.to_string(),
            params,
        })
        .await
        .map_err(BackendError::unexpected)?;

        let login_token = match client.request_login_code(phone).await {
            Ok(token) => token,
            Err(AuthorizationError::Invoke(e)) => return Err(map_invocation(e)),
            Err(e) => return Err(BackendError::unexpected(e)),
        };

        debug!(api_id, "login code requested");
        Ok(Self {
            client,
            api_id,
            login_token: Some(login_token),
            password_token: None,
            user_id: None,
        })
    }

    pub(crate) async fn submit_code(&mut self, code: &str) -> Result<CodeOutcome, BackendError> {
        let token = self
            .login_token
            .as_ref()
            .ok_or_else(|| BackendError::unexpected("no login code pending"))?;

        match self.client.sign_in(token, code).await {
            Ok(user) => {
                self.user_id = Some(user.id());
                Ok(CodeOutcome::SignedIn)
            },
            Err(SignInError::PasswordRequired(password_token)) => {
                self.password_token = Some(password_token);
                Ok(CodeOutcome::PasswordRequired)
            },
            Err(SignInError::InvalidCode) => Err(BackendError::InvalidCode),
            Err(SignInError::SignUpRequired { .. }) => Err(BackendError::unexpected(
                "phone number is not registered on the platform",
            )),
            Err(SignInError::InvalidPassword) => Err(BackendError::AuthFailed),
            Err(SignInError::Other(e)) => Err(map_invocation(e)),
        }
    }

    pub(crate) async fn submit_password(&mut self, password: &str) -> Result<(), BackendError> {
        let token = self
            .password_token
            .take()
            .ok_or_else(|| BackendError::unexpected("no two-factor challenge pending"))?;

        match self.client.check_password(token, password).await {
            Ok(user) => {
                self.user_id = Some(user.id());
                Ok(())
            },
            Err(SignInError::InvalidPassword) => Err(BackendError::AuthFailed),
            Err(SignInError::Other(e)) => Err(map_invocation(e)),
            Err(e) => Err(BackendError::unexpected(e)),
        }
    }

    /// Snapshot the authorized session for the string encoders.
    pub(crate) fn session_parts(&self) -> Result<SessionParts, BackendError> {
        let user_id = self
            .user_id
            .ok_or_else(|| BackendError::unexpected("session is not signed in"))?;

        // After a fresh login exactly one data center carries an auth key.
        let session = self.client.session();
        for dc in session.get_dcs() {
            let Some(auth) = dc.auth else { continue };
            let auth_key: [u8; 256] = auth
                .try_into()
                .map_err(|_| BackendError::unexpected("malformed authorization key"))?;
            let port = u16::try_from(dc.port)
                .map_err(|_| BackendError::unexpected("data center port out of range"))?;
            return Ok(SessionParts {
                dc_id: dc.id,
                ipv4: dc.ipv4.map(|ip| (ip as u32).to_be_bytes()),
                port,
                auth_key,
                user_id,
                api_id: self.api_id,
            });
        }

        Err(BackendError::unexpected(
            "no authorization key recorded in the session",
        ))
    }

    pub(crate) async fn list_authorizations(
        &self,
    ) -> Result<Vec<AuthorizationEntry>, BackendError> {
        let result = self
            .client
            .invoke(&tl::functions::account::GetAuthorizations {})
            .await
            .map_err(map_invocation)?;

        let tl::enums::account::Authorizations::Authorizations(list) = result;
        Ok(list
            .authorizations
            .into_iter()
            .map(|auth| {
                let tl::enums::Authorization::Authorization(a) = auth;
                AuthorizationEntry {
                    handle: a.hash,
                    device: a.device_model,
                    platform: a.platform,
                    current: a.current,
                }
            })
            .collect())
    }

    pub(crate) async fn revoke_authorization(&self, handle: i64) -> Result<(), BackendError> {
        self.client
            .invoke(&tl::functions::account::ResetAuthorization { hash: handle })
            .await
            .map_err(map_invocation)?;
        Ok(())
    }

    /// Tear down the connection. grammers has no separate disconnect call;
    /// dropping the client closes the transport.
    pub(crate) async fn release(self) {
        debug!("mtproto connection released");
        drop(self.client);
    }
}

/// Translate an RPC-level failure into the shared taxonomy.
fn map_invocation(error: InvocationError) -> BackendError {
    match error {
        InvocationError::Rpc(rpc) => {
            let name = rpc.name.as_str();
            if name.starts_with("FLOOD_WAIT") {
                BackendError::RateLimited(u64::from(rpc.value.unwrap_or(0)))
            } else if name.starts_with("PHONE_MIGRATE") || name.starts_with("NETWORK_MIGRATE") {
                BackendError::Migrated(rpc.value.unwrap_or(0) as i32)
            } else {
                match name {
                    "PHONE_NUMBER_INVALID" | "PHONE_NUMBER_BANNED" => BackendError::InvalidPhone,
                    "API_ID_INVALID" | "API_ID_PUBLISHED_FLOOD" => {
                        BackendError::InvalidCredentials
                    },
                    "PHONE_CODE_INVALID" | "PHONE_CODE_EMPTY" => BackendError::InvalidCode,
                    "PHONE_CODE_EXPIRED" => BackendError::CodeExpired,
                    "PASSWORD_HASH_INVALID" => BackendError::AuthFailed,
                    _ => {
                        warn!(code = rpc.code, name, "unmapped RPC error");
                        BackendError::unexpected(rpc)
                    },
                }
            }
        },
        other => BackendError::unexpected(other),
    }
}
