//! Comment seeding on relayed copies.
//!
//! When a group enables `settings.comments`, photo and plain-text re-sends
//! are preceded by a seeded comment carrying the rendered caption, so the
//! discussion thread opens with the source text. Channel admins are
//! notified through zero-width mentions appended to the seed.

use crate::platform::PlatformError;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

/// Posts the threaded seed comment before the main send.
#[async_trait]
pub trait CommentSeeder: Send + Sync {
    async fn create_comment(
        &self,
        channel_id: i64,
        caption_html: &str,
        admins: &[i64],
    ) -> Result<(), PlatformError>;
}

/// Live implementation posting the seed into the destination channel.
pub struct ChannelComments {
    bot: Bot,
}

impl ChannelComments {
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl CommentSeeder for ChannelComments {
    async fn create_comment(
        &self,
        channel_id: i64,
        caption_html: &str,
        admins: &[i64],
    ) -> Result<(), PlatformError> {
        let mut body = caption_html.to_owned();
        if !admins.is_empty() {
            body.push_str("\n\n");
            for admin in admins {
                // Zero-width mention: notifies without cluttering the text.
                body.push_str(&format!("<a href=\"tg://user?id={admin}\">\u{2060}</a>"));
            }
        }
        self.bot
            .send_message(ChatId(channel_id), body)
            .parse_mode(ParseMode::Html)
            .disable_notification(true)
            .await?;
        Ok(())
    }
}
