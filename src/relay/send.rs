//! Message relay: forward or reconstruct-and-resend one message into one
//! destination channel.

use super::{Extracted, RelayEngine, RelayError};
use crate::likes;
use crate::message::{InboundMessage, MediaKind};
use crate::models::Group;
use crate::platform::{Button, ButtonAction, Keyboard, PlatformError, SendOptions};
use crate::render;

impl RelayEngine {
    /// Relay one effective message into one destination channel and return
    /// the new copy's message id.
    ///
    /// Forward mode (the default) forwards natively; no rendering, no
    /// keyboard, no comment. Resend mode reconstructs the message with an
    /// HTML caption and per-group keyboard, seeding a comment first for
    /// photo and plain-text sends when enabled. Platform failures propagate
    /// to the caller; nothing is retried here.
    pub(crate) async fn relay_one(
        &self,
        group: &Group,
        event: &InboundMessage,
        channel_id: i64,
        extracted: &Extracted<'_>,
    ) -> Result<i32, RelayError> {
        if group.settings.forwards {
            let copy_id = self
                .platform
                .forward_message(channel_id, event.chat_id, extracted.message.message_id)
                .await?;
            return Ok(copy_id);
        }

        let admins = self
            .store
            .channel(channel_id)
            .await?
            .map(|channel| channel.admins)
            .unwrap_or_default();
        let caption = render::to_html(&extracted.text, &extracted.entities);
        let opts = SendOptions {
            caption_html: caption.clone(),
            keyboard: reply_keyboard(group, event, extracted.message.message_id, 0, 0),
        };

        let copy_id = match &extracted.message.media {
            MediaKind::Audio { file_id } => {
                self.platform.send_audio(channel_id, file_id, &opts).await?
            }
            MediaKind::Document { file_id } => {
                self.platform
                    .send_document(channel_id, file_id, &opts)
                    .await?
            }
            MediaKind::Photo { sizes } => {
                if group.settings.comments {
                    self.comments
                        .create_comment(channel_id, &caption, &admins)
                        .await?;
                }
                // Highest resolution variant is last.
                let file_id = sizes.last().ok_or_else(|| {
                    PlatformError::Other("photo message without size variants".into())
                })?;
                self.platform.send_photo(channel_id, file_id, &opts).await?
            }
            MediaKind::Video { file_id } => {
                self.platform.send_video(channel_id, file_id, &opts).await?
            }
            MediaKind::Text => {
                if group.settings.comments {
                    self.comments
                        .create_comment(channel_id, &caption, &admins)
                        .await?;
                }
                self.platform.send_text(channel_id, &opts).await?
            }
        };
        Ok(copy_id)
    }
}

/// Build the inline keyboard for a re-sent copy: a like-vote row when
/// enabled, and a "Go to message" link row pointing back at the source.
pub(crate) fn reply_keyboard(
    group: &Group,
    event: &InboundMessage,
    message_id: i32,
    plus: u32,
    minus: u32,
) -> Option<Keyboard> {
    let mut rows = Vec::new();
    if group.settings.likes {
        rows.push(likes::like_row(plus, minus));
    }
    if group.settings.link {
        let slug = event
            .chat_username
            .clone()
            .unwrap_or_else(|| format!("c/{}", private_link_slug(event.chat_id)));
        rows.push(vec![Button {
            text: "Go to message".to_string(),
            action: ButtonAction::Url(format!("https://t.me/{slug}/{message_id}")),
        }]);
    }
    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

/// Deep-link slug for chats without a username: the chat id with the
/// supergroup `-100` prefix stripped.
fn private_link_slug(chat_id: i64) -> String {
    let raw = chat_id.to_string();
    raw.strip_prefix("-100").map_or(raw.clone(), str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MediaKind;

    fn group_with(link: bool, likes: bool) -> Group {
        let mut group = Group::new(-1009876543);
        group.settings.forwards = false;
        group.settings.link = link;
        group.settings.likes = likes;
        group
    }

    fn event(chat_username: Option<&str>) -> InboundMessage {
        InboundMessage {
            chat_id: -1009876543,
            chat_username: chat_username.map(ToOwned::to_owned),
            message_id: 12,
            text: String::new(),
            entities: vec![],
            media: MediaKind::Text,
            forwarded: false,
            reply_to: None,
        }
    }

    #[test]
    fn test_no_keyboard_when_nothing_enabled() {
        assert!(reply_keyboard(&group_with(false, false), &event(None), 12, 0, 0).is_none());
    }

    #[test]
    fn test_link_row_uses_username() {
        let keyboard =
            reply_keyboard(&group_with(true, false), &event(Some("mygroup")), 12, 0, 0)
                .expect("keyboard");
        assert_eq!(keyboard.len(), 1);
        assert_eq!(
            keyboard[0][0].action,
            ButtonAction::Url("https://t.me/mygroup/12".to_string())
        );
    }

    #[test]
    fn test_link_row_falls_back_to_deep_link() {
        let keyboard =
            reply_keyboard(&group_with(true, false), &event(None), 12, 0, 0).expect("keyboard");
        assert_eq!(
            keyboard[0][0].action,
            ButtonAction::Url("https://t.me/c/9876543/12".to_string())
        );
    }

    #[test]
    fn test_like_row_comes_before_link_row() {
        let keyboard =
            reply_keyboard(&group_with(true, true), &event(Some("g")), 12, 2, 1).expect("keyboard");
        assert_eq!(keyboard.len(), 2);
        assert_eq!(keyboard[0][0].text, "👍 2");
        assert_eq!(keyboard[0][1].text, "👎 1");
    }
}
