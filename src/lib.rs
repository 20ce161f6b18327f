//! Hashtag-triggered cross-posting relay for Telegram groups.
//!
//! Messages tagged with configured hashtags in a source group are forwarded
//! (or reconstructed and re-sent) into one or more destination channels.
//! Edits to the source message propagate to the relayed copies; relayed
//! copies can optionally carry like-vote keyboards and seeded comments.

/// Telegram bot surface (update handlers)
pub mod bot;
/// Comment seeding on relayed copies
pub mod comments;
/// Configuration management
pub mod config;
/// Like ballots and vote keyboards
pub mod likes;
/// Platform-independent inbound message model
pub mod message;
/// Persistent domain records
pub mod models;
/// Chat-platform boundary (typed errors + client abstraction)
pub mod platform;
/// Tag-routing and message-relay engine
pub mod relay;
/// Entity-annotated text to Telegram HTML
pub mod render;
/// Storage layer (R2/S3)
pub mod storage;
