//! User-facing message texts.
//!
//! Plain text only; the handler layer attaches inline keyboards where a
//! message offers choices.

use {
    sesh_backend::{AuthorizationEntry, BackendKind, SessionString},
    sesh_common::{format, phone},
};

use crate::state::Flow;

pub fn welcome(first_name: Option<&str>) -> String {
    let name = first_name.unwrap_or("there");
    format!(
        "🤖 Hi {name}!\n\n\
         I generate Telegram string sessions and can revoke active sessions \
         on your account.\n\nPick an option:"
    )
}

pub const HELP: &str = "📖 Help\n\n\
String sessions let a userbot or script sign in without repeating the login \
handshake. Pick the flavour your tooling expects (Telethon or Pyrogram).\n\n\
Security notes:\n\
• Never share a string session; it grants full account access\n\
• Keep your API credentials private\n\
• Revoke sessions you no longer use\n\n\
You need an API ID and API hash from https://my.telegram.org.\n\n\
Commands: /start menu · /cancel abort · /ping latency check";

pub fn rate_limited(ceiling: u32, window_secs: u64) -> String {
    format!(
        "⚠️ Rate limit exceeded. At most {ceiling} attempts per {} are allowed.\n\
         Please try again later.",
        format::duration(window_secs)
    )
}

pub fn enter_prompt(flow: Flow, backend: BackendKind) -> String {
    match flow {
        Flow::Generate => format!(
            "🔧 {backend} session generator\n\nPlease enter your API ID:"
        ),
        Flow::Revoke => "🗑 Session revocation\n\n\
             To revoke sessions you sign in first. This logs out the devices \
             you pick.\n\nPlease enter your API ID:"
            .to_string(),
    }
}

pub const PROMPT_API_HASH: &str = "✅ API ID saved.\n\nNow enter your API hash:";

pub const PROMPT_PHONE: &str = "✅ API hash saved.\n\n\
Enter your phone number with country code, e.g. +12025550123:";

pub fn retry(reason: &impl std::fmt::Display, prompt: &str) -> String {
    format!("❌ {reason}\n\n{prompt}")
}

pub const RETRY_API_ID: &str = "Please enter a valid API ID:";
pub const RETRY_API_HASH: &str = "Please enter a valid API hash:";
pub const RETRY_PHONE: &str = "Please enter a valid phone number:";
pub const RETRY_OTP: &str = "Please enter the 5-digit code:";

pub fn code_sent(phone_number: &str) -> String {
    let region = phone::country_hint(phone_number)
        .map(|c| format!(" ({c})"))
        .unwrap_or_default();
    format!(
        "📱 A login code was sent to {phone_number}{region}.\n\n\
         Enter the 5-digit code:"
    )
}

pub const PROMPT_TWO_FACTOR: &str =
    "🔐 Two-factor authentication is enabled on this account.\n\nEnter your password:";

pub const INVALID_CODE: &str = "❌ That code is not correct. Enter the 5-digit code again:";

pub const CODE_EXPIRED: &str = "⏰ The login code expired. Please start over with /start.";

pub const INVALID_CREDENTIALS: &str =
    "❌ Invalid API credentials. Please start over with /start.";

pub const INVALID_PHONE: &str = "That phone number was rejected by Telegram";

pub fn migrated(dc: i32) -> String {
    format!("📡 Your account lives on data center {dc}. Please start over with /start.")
}

pub fn backend_rate_limited(secs: u64) -> String {
    format!(
        "⏳ Telegram is rate limiting this number. Try again in {}.",
        format::duration(secs)
    )
}

pub const AUTH_FAILED: &str =
    "❌ Wrong password or authentication failed. Please start over with /start.";

pub const GENERIC_FAILURE: &str =
    "❌ An unexpected error occurred. Please try again later.";

pub const SESSION_LOST: &str =
    "❌ This flow is no longer active. Please start over with /start.";

pub fn session_ready(session: &SessionString) -> String {
    format!(
        "✅ {} session generated.\n\n{}\n\n\
         ⚠️ Security warning:\n\
         • Keep this string private; it grants full account access\n\
         • Anyone with it can act as you\n\
         • Use /start → Revoke sessions if it ever leaks",
        session.kind(),
        session.reveal()
    )
}

pub const NO_ACTIVE_FLOW: &str = "Nothing is in progress. Use /start to begin.";

pub const UNKNOWN_COMMAND: &str = "Unknown command. Use /start to see the menu.";

pub const CANCELLED: &str = "❌ Operation cancelled. Use /start to begin again.";

pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel. Use /start to begin.";

pub const STALE_MENU: &str = "That menu is no longer active.";

pub const USE_THE_BUTTONS: &str = "Please pick a session with the buttons, or cancel.";

pub const NO_OTHER_SESSIONS: &str =
    "📱 No other active sessions on this account; nothing to revoke.";

pub fn authorization_list(entries: &[AuthorizationEntry], truncated: usize) -> String {
    let mut text = String::from("🔐 Active sessions:\n\n");
    for (i, entry) in entries.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, entry.label()));
    }
    if truncated > 0 {
        text.push_str(&format!("…and {truncated} more not shown\n"));
    }
    text.push_str("\nPick a session to revoke. The current session cannot be revoked.");
    text
}

pub const REVOKED: &str = "✅ Session revoked. The device has been logged out.";

pub const REVOKE_FAILED: &str =
    "❌ Could not revoke that session. Please try again from /start.";
