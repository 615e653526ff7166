//! Per-user conversation state.
//!
//! A [`Conversation`] exists only while a flow is in progress: it is created
//! on flow entry and removed from the [`SessionTable`] on every terminal
//! transition, so "idle" is simply absence. During a turn the conversation is
//! taken out of the table (the table mutex is never held across an await) and
//! restored only when the turn ends in a non-terminal state.

use std::{collections::HashMap, sync::Mutex};

use sesh_backend::{BackendKind, LoginFlow};

/// Which flow the user selected from the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Generate a string session.
    Generate,
    /// Authenticate, then revoke a selected authorization.
    Revoke,
}

/// The step a conversation is waiting on. Generation and revocation share
/// these labels; the flow discriminant decides what happens after sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AwaitingApiId,
    AwaitingApiHash,
    AwaitingPhone,
    AwaitingOtp,
    AwaitingTwoFactor,
    AwaitingRevokeSelection,
}

/// Mutable per-user scratch space for one flow.
///
/// Owns the live backend handle once the phone step succeeds. Whoever drives
/// a conversation to a terminal state must release that handle; the state
/// machine centralises this in its turn loop.
pub struct Conversation {
    pub flow: Flow,
    pub backend: BackendKind,
    pub step: Step,
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub phone: Option<String>,
    pub login: Option<Box<dyn LoginFlow>>,
    /// Recoverable failures so far (validation and re-promptable backend
    /// errors). Diagnostic only.
    pub error_count: u32,
}

impl Conversation {
    pub fn new(flow: Flow, backend: BackendKind) -> Self {
        Self {
            flow,
            backend,
            step: Step::AwaitingApiId,
            api_id: None,
            api_hash: None,
            phone: None,
            login: None,
            error_count: 0,
        }
    }
}

/// All in-flight conversations, keyed by user id.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<i64, Conversation>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Conversation>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove and return the user's conversation for the duration of a turn.
    pub fn take(&self, user_id: i64) -> Option<Conversation> {
        self.lock().remove(&user_id)
    }

    /// Put a conversation (back) into the table.
    pub fn restore(&self, user_id: i64, conversation: Conversation) {
        self.lock().insert(user_id, conversation);
    }

    pub fn is_active(&self, user_id: i64) -> bool {
        self.lock().contains_key(&user_id)
    }
}
