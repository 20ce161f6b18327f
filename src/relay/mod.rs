//! Tag-routing and message-relay engine.
//!
//! The engine owns the whole pipeline for one inbound event: extract tags
//! and the untagged remainder, resolve destination channels, relay to each
//! (forward or reconstruct-and-resend), record the copy in the ledger, and
//! replay edits against recorded copies with fallback recovery.
//!
//! All collaborators are injected: the chat platform, the store, the
//! comment seeder, and the like counter are trait objects so tests can
//! substitute recording mocks.

pub mod extract;
pub mod router;

mod edit;
mod send;

pub use extract::{extract, untagged_text, EffectiveSource, Extracted};
pub use router::route;

use crate::comments::CommentSeeder;
use crate::likes::LikeCounter;
use crate::message::InboundMessage;
use crate::models::{Channel, Group, RelayRecord};
use crate::platform::{PlatformError, RelayPlatform};
use crate::storage::StorageError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Engine-level failure: either the store or the platform gave up. Handlers
/// log these and abort the event; nothing is retried.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// The persistent records the engine consumes: group configuration,
/// channel metadata, and the append-only relay ledger.
#[async_trait]
pub trait RelayStore: Send + Sync {
    async fn group(&self, chat_id: i64) -> Result<Option<Group>, StorageError>;
    async fn channel(&self, chat_id: i64) -> Result<Option<Channel>, StorageError>;
    /// Append-only insert; no uniqueness is enforced.
    async fn record_relay(&self, record: &RelayRecord) -> Result<(), StorageError>;
    /// All records for one source message, oldest first; empty when none.
    async fn relays_for(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Vec<RelayRecord>, StorageError>;
}

#[async_trait]
impl RelayStore for crate::storage::R2Storage {
    async fn group(&self, chat_id: i64) -> Result<Option<Group>, StorageError> {
        self.get_group(chat_id).await
    }

    async fn channel(&self, chat_id: i64) -> Result<Option<Channel>, StorageError> {
        self.get_channel(chat_id).await
    }

    async fn record_relay(&self, record: &RelayRecord) -> Result<(), StorageError> {
        self.append_relay(record).await
    }

    async fn relays_for(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Vec<RelayRecord>, StorageError> {
        self.get_relays(chat_id, message_id).await
    }
}

/// The relay engine. One instance serves every chat; it holds no per-event
/// state, so concurrent events interleave freely (the ledger being
/// append-only is what makes that tolerable).
pub struct RelayEngine {
    platform: Arc<dyn RelayPlatform>,
    store: Arc<dyn RelayStore>,
    comments: Arc<dyn CommentSeeder>,
    likes: Arc<dyn LikeCounter>,
}

impl RelayEngine {
    #[must_use]
    pub fn new(
        platform: Arc<dyn RelayPlatform>,
        store: Arc<dyn RelayStore>,
        comments: Arc<dyn CommentSeeder>,
        likes: Arc<dyn LikeCounter>,
    ) -> Self {
        Self {
            platform,
            store,
            comments,
            likes,
        }
    }

    /// Handle one new tagged message: extract, route, relay to each resolved
    /// channel in order, and record every copy.
    ///
    /// Destination channels are processed sequentially; a failure on one
    /// aborts the remaining channels for this event, while copies already
    /// recorded stand.
    ///
    /// # Errors
    ///
    /// Returns the first store or platform failure.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<(), RelayError> {
        let Some(extracted) = extract(msg) else {
            return Ok(());
        };
        if extracted.tags.is_empty() {
            return Ok(());
        }
        let Some(group) = self.store.group(msg.chat_id).await? else {
            return Ok(());
        };
        let channels = route(&extracted.tags, &group.tags);
        for channel_id in channels {
            let copy_id = self.relay_one(&group, msg, channel_id, &extracted).await?;
            self.store
                .record_relay(&RelayRecord::new(
                    msg.chat_id,
                    extracted.message.message_id,
                    channel_id,
                    copy_id,
                ))
                .await?;
        }
        Ok(())
    }
}
