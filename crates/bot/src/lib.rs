//! Conversational core of the sesh bot.
//!
//! Maps inbound Telegram updates onto a per-user finite-state machine that
//! walks users through the login handshake, validates every input, gates flow
//! entry through the rate limiter, and guarantees the backend handle is
//! released on every exit path.

pub mod bot;
pub mod handlers;
pub mod machine;
pub mod state;
pub mod texts;
pub mod validate;

pub use machine::{
    BackendSelector, DefaultBackends, Event, Menu, MenuButton, Reply, SessionMachine,
};
