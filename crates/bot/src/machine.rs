//! The conversation state machine.
//!
//! One inbound event advances one user's conversation: look up the state,
//! validate the input or call into the backend, emit the next prompt, move to
//! the next step or terminate. Terminal turns release the backend handle in
//! exactly one place ([`SessionMachine::run_turn`]); non-terminal turns put
//! the conversation back into the session table.

use std::sync::Arc;

use tracing::{error, info, warn};

use {
    sesh_backend::{
        AuthBackend, AuthorizationEntry, BackendError, BackendKind, CodeOutcome, PyrogramBackend,
        TelethonBackend,
    },
    sesh_common::mask,
    sesh_ratelimit::RateLimiter,
};

use crate::{
    state::{Conversation, Flow, SessionTable, Step},
    texts, validate,
};

/// Callback actions understood by the machine. The handler layer passes them
/// through verbatim from inline-keyboard presses.
pub mod actions {
    pub const GENERATE_TELETHON: &str = "start:telethon";
    pub const GENERATE_PYROGRAM: &str = "start:pyrogram";
    pub const REVOKE: &str = "start:revoke";
    pub const HELP: &str = "help";
    pub const CANCEL: &str = "cancel";
    pub const REVOKE_PREFIX: &str = "revoke:";
}

/// Revocation menus list at most this many authorizations.
const MAX_LISTED_AUTHORIZATIONS: usize = 10;

/// Inline-keyboard button labels are kept short.
const MAX_BUTTON_LABEL: usize = 32;

/// One inbound event for one user.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A plain text message.
    Text(&'a str),
    /// An inline-keyboard press carrying its callback action.
    Button(&'a str),
    /// An explicit cancellation (command or button).
    Cancel,
}

/// A labelled choice offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub action: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// A plain menu of labelled choices; the only formatting the core emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    pub rows: Vec<Vec<MenuButton>>,
}

impl Menu {
    /// One button per row.
    pub fn column(buttons: Vec<MenuButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }
}

/// The outbound message produced by one turn.
#[derive(Debug)]
pub struct Reply {
    pub text: String,
    pub menu: Option<Menu>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            menu: None,
        }
    }

    pub fn with_menu(text: impl Into<String>, menu: Menu) -> Self {
        Self {
            text: text.into(),
            menu: Some(menu),
        }
    }
}

/// Chooses the backend implementation for a flow. Swapped for a scripted
/// double in tests.
pub trait BackendSelector: Send + Sync {
    fn select(&self, kind: BackendKind) -> Arc<dyn AuthBackend>;
}

/// Production selector over the two real backends.
#[derive(Default)]
pub struct DefaultBackends {
    telethon: Arc<TelethonBackend>,
    pyrogram: Arc<PyrogramBackend>,
}

impl DefaultBackends {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendSelector for DefaultBackends {
    fn select(&self, kind: BackendKind) -> Arc<dyn AuthBackend> {
        match kind {
            BackendKind::Telethon => Arc::clone(&self.telethon) as Arc<dyn AuthBackend>,
            BackendKind::Pyrogram => Arc::clone(&self.pyrogram) as Arc<dyn AuthBackend>,
        }
    }
}

/// Input routed into a live conversation turn.
enum TurnInput<'a> {
    Text(&'a str),
    RevokeSelection(i64),
}

pub struct SessionMachine {
    table: SessionTable,
    limiter: RateLimiter,
    backends: Arc<dyn BackendSelector>,
}

impl SessionMachine {
    pub fn new(limiter: RateLimiter, backends: Arc<dyn BackendSelector>) -> Self {
        Self {
            table: SessionTable::new(),
            limiter,
            backends,
        }
    }

    /// The `/start` greeting with the flow menu. Stateless.
    pub fn main_menu(first_name: Option<&str>) -> Reply {
        Reply::with_menu(
            texts::welcome(first_name),
            Menu::column(vec![
                MenuButton::new("🔧 Generate Telethon session", actions::GENERATE_TELETHON),
                MenuButton::new("🚀 Generate Pyrogram session", actions::GENERATE_PYROGRAM),
                MenuButton::new("🗑 Revoke sessions", actions::REVOKE),
                MenuButton::new("ℹ️ Help", actions::HELP),
            ]),
        )
    }

    pub fn has_active_flow(&self, user_id: i64) -> bool {
        self.table.is_active(user_id)
    }

    /// Advance one user's conversation by one event.
    pub async fn advance(&self, user_id: i64, event: Event<'_>) -> Reply {
        match event {
            Event::Cancel => self.cancel(user_id).await,
            Event::Button(action) => self.on_button(user_id, action).await,
            Event::Text(text) => match self.table.take(user_id) {
                Some(conv) => self.run_turn(user_id, conv, TurnInput::Text(text)).await,
                None => Reply::text(texts::NO_ACTIVE_FLOW),
            },
        }
    }

    async fn cancel(&self, user_id: i64) -> Reply {
        match self.table.take(user_id) {
            Some(mut conv) => {
                release_login(&mut conv).await;
                info!(user = %mask::hashed_id(user_id), "flow cancelled");
                Reply::text(texts::CANCELLED)
            },
            None => Reply::text(texts::NOTHING_TO_CANCEL),
        }
    }

    async fn on_button(&self, user_id: i64, action: &str) -> Reply {
        match action {
            actions::GENERATE_TELETHON => {
                self.enter(user_id, Flow::Generate, BackendKind::Telethon).await
            },
            actions::GENERATE_PYROGRAM => {
                self.enter(user_id, Flow::Generate, BackendKind::Pyrogram).await
            },
            // Revocation authenticates over the Telethon flavour; the session
            // is discarded after sign-in, so the flavour is irrelevant to the
            // user.
            actions::REVOKE => self.enter(user_id, Flow::Revoke, BackendKind::Telethon).await,
            actions::HELP => Reply::text(texts::HELP),
            actions::CANCEL => self.cancel(user_id).await,
            other => match parse_revoke_action(other) {
                Some(handle) => match self.table.take(user_id) {
                    Some(conv) => {
                        self.run_turn(user_id, conv, TurnInput::RevokeSelection(handle)).await
                    },
                    None => Reply::text(texts::STALE_MENU),
                },
                None => Reply::text(texts::STALE_MENU),
            },
        }
    }

    /// Flow entry: rate-limit gate, then a fresh conversation.
    ///
    /// A denied entry terminates immediately without allocating a context or
    /// a backend handle. An entry while another flow is in flight supersedes
    /// it; the superseded handle is released first.
    async fn enter(&self, user_id: i64, flow: Flow, backend: BackendKind) -> Reply {
        if let Some(mut stale) = self.table.take(user_id) {
            release_login(&mut stale).await;
        }

        if !self.limiter.attempt(user_id).await {
            warn!(user = %mask::hashed_id(user_id), "flow entry rate limited");
            return Reply::text(texts::rate_limited(
                self.limiter.ceiling(),
                self.limiter.window_secs(),
            ));
        }

        info!(user = %mask::hashed_id(user_id), ?flow, %backend, "flow started");
        self.table.restore(user_id, Conversation::new(flow, backend));
        Reply::text(texts::enter_prompt(flow, backend))
    }

    /// Drive one turn of a taken conversation.
    ///
    /// This is the single place that releases the backend handle on terminal
    /// turns, and the single place that restores non-terminal conversations.
    async fn run_turn(&self, user_id: i64, mut conv: Conversation, input: TurnInput<'_>) -> Reply {
        let (done, reply) = self.step_turn(user_id, &mut conv, input).await;
        if done {
            release_login(&mut conv).await;
        } else {
            self.table.restore(user_id, conv);
        }
        reply
    }

    async fn step_turn(
        &self,
        user_id: i64,
        conv: &mut Conversation,
        input: TurnInput<'_>,
    ) -> (bool, Reply) {
        match (conv.step, input) {
            (Step::AwaitingApiId, TurnInput::Text(text)) => match validate::api_id(text) {
                Ok(api_id) => {
                    conv.api_id = Some(api_id);
                    conv.step = Step::AwaitingApiHash;
                    (false, Reply::text(texts::PROMPT_API_HASH))
                },
                Err(e) => {
                    conv.error_count += 1;
                    (false, Reply::text(texts::retry(&e, texts::RETRY_API_ID)))
                },
            },
            (Step::AwaitingApiHash, TurnInput::Text(text)) => match validate::api_hash(text) {
                Ok(api_hash) => {
                    conv.api_hash = Some(api_hash);
                    conv.step = Step::AwaitingPhone;
                    (false, Reply::text(texts::PROMPT_PHONE))
                },
                Err(e) => {
                    conv.error_count += 1;
                    (false, Reply::text(texts::retry(&e, texts::RETRY_API_HASH)))
                },
            },
            (Step::AwaitingPhone, TurnInput::Text(text)) => match validate::phone_number(text) {
                Ok(phone) => self.begin_login(user_id, conv, phone).await,
                Err(e) => {
                    conv.error_count += 1;
                    (false, Reply::text(texts::retry(&e, texts::RETRY_PHONE)))
                },
            },
            (Step::AwaitingOtp, TurnInput::Text(text)) => match validate::otp(text) {
                Ok(code) => self.submit_code(user_id, conv, &code).await,
                Err(e) => {
                    conv.error_count += 1;
                    (false, Reply::text(texts::retry(&e, texts::RETRY_OTP)))
                },
            },
            (Step::AwaitingTwoFactor, TurnInput::Text(password)) => {
                self.submit_password(user_id, conv, password).await
            },
            (Step::AwaitingRevokeSelection, TurnInput::RevokeSelection(handle)) => {
                self.revoke(user_id, conv, handle).await
            },
            (Step::AwaitingRevokeSelection, TurnInput::Text(_)) => {
                (false, Reply::text(texts::USE_THE_BUTTONS))
            },
            (_, TurnInput::RevokeSelection(_)) => (false, Reply::text(texts::STALE_MENU)),
        }
    }

    async fn begin_login(
        &self,
        user_id: i64,
        conv: &mut Conversation,
        phone: String,
    ) -> (bool, Reply) {
        let (Some(api_id), Some(api_hash)) = (conv.api_id, conv.api_hash.clone()) else {
            error!(user = %mask::hashed_id(user_id), "phone step reached without credentials");
            return (true, Reply::text(texts::GENERIC_FAILURE));
        };
        conv.phone = Some(phone.clone());

        let backend = self.backends.select(conv.backend);
        match backend.begin(api_id, &api_hash, &phone).await {
            Ok(login) => {
                conv.login = Some(login);
                conv.step = Step::AwaitingOtp;
                (false, Reply::text(texts::code_sent(&phone)))
            },
            Err(BackendError::InvalidPhone) => {
                conv.error_count += 1;
                (false, Reply::text(texts::retry(&texts::INVALID_PHONE, texts::RETRY_PHONE)))
            },
            Err(BackendError::InvalidCredentials) => {
                (true, Reply::text(texts::INVALID_CREDENTIALS))
            },
            Err(BackendError::Migrated(dc)) => (true, Reply::text(texts::migrated(dc))),
            Err(BackendError::RateLimited(secs)) => {
                (true, Reply::text(texts::backend_rate_limited(secs)))
            },
            Err(e) => (true, self.unexpected(user_id, "request code", e)),
        }
    }

    async fn submit_code(
        &self,
        user_id: i64,
        conv: &mut Conversation,
        code: &str,
    ) -> (bool, Reply) {
        let Some(login) = conv.login.as_mut() else {
            return (true, Reply::text(texts::SESSION_LOST));
        };
        match login.submit_code(code).await {
            Ok(CodeOutcome::SignedIn) => self.after_sign_in(user_id, conv).await,
            Ok(CodeOutcome::PasswordRequired) => {
                conv.step = Step::AwaitingTwoFactor;
                (false, Reply::text(texts::PROMPT_TWO_FACTOR))
            },
            Err(BackendError::InvalidCode) => {
                conv.error_count += 1;
                (false, Reply::text(texts::INVALID_CODE))
            },
            Err(BackendError::CodeExpired) => (true, Reply::text(texts::CODE_EXPIRED)),
            Err(e) => (true, self.unexpected(user_id, "sign in", e)),
        }
    }

    async fn submit_password(
        &self,
        user_id: i64,
        conv: &mut Conversation,
        password: &str,
    ) -> (bool, Reply) {
        let Some(login) = conv.login.as_mut() else {
            return (true, Reply::text(texts::SESSION_LOST));
        };
        match login.submit_password(password).await {
            Ok(()) => self.after_sign_in(user_id, conv).await,
            Err(BackendError::AuthFailed) => (true, Reply::text(texts::AUTH_FAILED)),
            Err(e) => (true, self.unexpected(user_id, "check password", e)),
        }
    }

    /// Signed in: export the session, or branch into the revocation menu.
    async fn after_sign_in(&self, user_id: i64, conv: &mut Conversation) -> (bool, Reply) {
        let Some(login) = conv.login.as_ref() else {
            return (true, Reply::text(texts::SESSION_LOST));
        };

        match conv.flow {
            Flow::Generate => match login.export_session() {
                Ok(session) => {
                    info!(
                        user = %mask::hashed_id(user_id),
                        backend = %session.kind(),
                        session = %session.preview(),
                        "string session generated"
                    );
                    (true, Reply::text(texts::session_ready(&session)))
                },
                Err(e) => (true, self.unexpected(user_id, "export session", e)),
            },
            Flow::Revoke => match login.list_authorizations().await {
                Ok(entries) => {
                    let truncated = entries.len().saturating_sub(MAX_LISTED_AUTHORIZATIONS);
                    let shown = &entries[..entries.len().min(MAX_LISTED_AUTHORIZATIONS)];
                    let menu = revoke_menu(shown);
                    if menu.rows.len() <= 1 {
                        // Only the cancel row: nothing is selectable.
                        return (true, Reply::text(texts::NO_OTHER_SESSIONS));
                    }
                    conv.step = Step::AwaitingRevokeSelection;
                    (
                        false,
                        Reply::with_menu(texts::authorization_list(shown, truncated), menu),
                    )
                },
                Err(e) => (true, self.unexpected(user_id, "list authorizations", e)),
            },
        }
    }

    /// Revocation is always a terminal action: report the outcome either way.
    async fn revoke(&self, user_id: i64, conv: &mut Conversation, handle: i64) -> (bool, Reply) {
        let Some(login) = conv.login.as_ref() else {
            return (true, Reply::text(texts::SESSION_LOST));
        };
        match login.revoke_authorization(handle).await {
            Ok(()) => {
                info!(user = %mask::hashed_id(user_id), "authorization revoked");
                (true, Reply::text(texts::REVOKED))
            },
            Err(e) => {
                warn!(
                    user = %mask::hashed_id(user_id),
                    error = %mask::sanitize(&e.to_string()),
                    "revocation failed"
                );
                (true, Reply::text(texts::REVOKE_FAILED))
            },
        }
    }

    /// Unmapped failure: full detail (sanitised) goes to the log, a generic
    /// message goes to the user.
    fn unexpected(&self, user_id: i64, stage: &str, error: BackendError) -> Reply {
        error!(
            user = %mask::hashed_id(user_id),
            stage,
            error = %mask::sanitize(&error.to_string()),
            "unexpected backend failure"
        );
        Reply::text(texts::GENERIC_FAILURE)
    }
}

async fn release_login(conv: &mut Conversation) {
    if let Some(login) = conv.login.take() {
        login.release().await;
    }
}

fn parse_revoke_action(action: &str) -> Option<i64> {
    action
        .strip_prefix(actions::REVOKE_PREFIX)
        .and_then(|handle| handle.parse().ok())
}

/// Selection menu for the revocation step: one button per non-current
/// authorization, plus cancel.
fn revoke_menu(entries: &[AuthorizationEntry]) -> Menu {
    let mut buttons: Vec<MenuButton> = entries
        .iter()
        .filter(|entry| !entry.current)
        .map(|entry| {
            MenuButton::new(
                truncate_label(&entry.label()),
                format!("{}{}", actions::REVOKE_PREFIX, entry.handle),
            )
        })
        .collect();
    buttons.push(MenuButton::new("❌ Cancel", actions::CANCEL));
    Menu::column(buttons)
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() <= MAX_BUTTON_LABEL {
        label.to_string()
    } else {
        let head: String = label.chars().take(MAX_BUTTON_LABEL - 1).collect();
        format!("{head}…")
    }
}
