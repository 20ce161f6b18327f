//! Telegram bot surface: update handlers bridging teloxide to the engine.

pub mod handlers;
pub mod watch;
