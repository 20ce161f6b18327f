//! Like voting on relayed copies.
//!
//! Every re-sent copy with `settings.likes` enabled carries a 👍/👎 row.
//! Votes land in a per-copy ballot; voting the same way twice retracts the
//! vote, voting the other way switches it.

use crate::platform::{Button, ButtonAction};
use crate::storage::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Callback payload for an upvote.
pub const LIKE_CALLBACK: &str = "+";
/// Callback payload for a downvote.
pub const DISLIKE_CALLBACK: &str = "-";

/// Per-copy vote tallies, consumed when an edit refreshes the keyboard.
#[async_trait]
pub trait LikeCounter: Send + Sync {
    /// (plus, minus) counts for the relayed copy living in `chat_id`.
    async fn count_likes(&self, chat_id: i64, message_id: i32)
        -> Result<(u32, u32), StorageError>;
}

#[async_trait]
impl LikeCounter for crate::storage::R2Storage {
    async fn count_likes(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<(u32, u32), StorageError> {
        Ok(self.get_ballot(chat_id, message_id).await?.tally())
    }
}

/// All votes cast on one relayed copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LikeBallot {
    /// Voter id -> +1 or -1.
    #[serde(default)]
    pub votes: HashMap<i64, i8>,
}

impl LikeBallot {
    /// Apply one vote: same vote again retracts it, the opposite vote
    /// switches it.
    pub fn cast(&mut self, user_id: i64, vote: i8) {
        match self.votes.get(&user_id) {
            Some(existing) if *existing == vote => {
                self.votes.remove(&user_id);
            }
            _ => {
                self.votes.insert(user_id, vote);
            }
        }
    }

    /// (plus, minus) tallies.
    #[must_use]
    pub fn tally(&self) -> (u32, u32) {
        let plus = self.votes.values().filter(|vote| **vote > 0).count() as u32;
        let minus = self.votes.values().filter(|vote| **vote < 0).count() as u32;
        (plus, minus)
    }
}

/// The 👍/👎 keyboard row for the given tallies.
#[must_use]
pub fn like_row(plus: u32, minus: u32) -> Vec<Button> {
    vec![
        Button {
            text: vote_label("👍", plus),
            action: ButtonAction::Callback(LIKE_CALLBACK.to_string()),
        },
        Button {
            text: vote_label("👎", minus),
            action: ButtonAction::Callback(DISLIKE_CALLBACK.to_string()),
        },
    ]
}

/// Button label: bare emoji at zero, "emoji count" otherwise.
#[must_use]
pub fn vote_label(emoji: &str, count: u32) -> String {
    if count == 0 {
        emoji.to_string()
    } else {
        format!("{emoji} {count}")
    }
}
