//! Tag binding: the `/watch` command, its channel-picker callbacks, and
//! channel registration from channel posts.
//!
//! `/watch #tag ...` in a group replies with a picker listing every channel
//! the invoking admin administers. Pressing a channel binds the prompt's
//! hashtags to it; the prompt carries the tags as text so the bind callback
//! re-reads them from the prompt's own hashtag entities.

use crate::message::utf16_slice;
use crate::models::Channel;
use crate::storage::R2Storage;
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage, MessageEntity,
    MessageEntityKind,
};
use tracing::{debug, warn};

/// Parsed picker callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCallback {
    /// Bind the prompt's hashtags to this channel.
    Bind { from: i64, group: i64, channel: i64 },
    /// Dismiss the picker.
    Done { from: i64 },
}

/// Parse `"{from}:{group}:{channel}"` or `"{from}:done"` callback data.
/// Anything else (including like votes) is `None`.
#[must_use]
pub fn parse_callback(data: &str) -> Option<WatchCallback> {
    let mut parts = data.splitn(3, ':');
    let from = parts.next()?.parse().ok()?;
    let second = parts.next()?;
    if second == "done" {
        return Some(WatchCallback::Done { from });
    }
    let group = second.parse().ok()?;
    let channel = parts.next()?.parse().ok()?;
    Some(WatchCallback::Bind {
        from,
        group,
        channel,
    })
}

/// Lowercase hashtags from a message's entity annotations, `#` stripped.
#[must_use]
pub fn message_tags(text: &str, entities: &[MessageEntity]) -> Vec<String> {
    entities
        .iter()
        .filter(|entity| matches!(entity.kind, MessageEntityKind::Hashtag))
        .map(|entity| {
            utf16_slice(text, entity.offset + 1, entity.offset + entity.length).to_lowercase()
        })
        .collect()
}

/// One row per channel, callback-addressed to the invoking admin, plus a
/// dismiss row.
#[must_use]
pub fn picker_keyboard(user_id: i64, group_id: i64, channels: &[Channel]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = channels
        .iter()
        .map(|channel| {
            vec![InlineKeyboardButton::callback(
                channel.title.clone(),
                format!("{user_id}:{group_id}:{}", channel.chat_id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "Done 👍",
        format!("{user_id}:done"),
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Handle `/watch`: show the channel picker for the command's hashtags.
///
/// # Errors
///
/// Returns an error if the channel listing or the reply fails.
pub async fn handle_watch_command(bot: Bot, msg: Message, storage: Arc<R2Storage>) -> Result<()> {
    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0.cast_signed();
    if !is_group_admin(&bot, msg.chat.id, user_id).await {
        return Ok(());
    }

    let text = msg.text().unwrap_or_default();
    let tags = message_tags(text, msg.entities().unwrap_or(&[]));
    if tags.is_empty() {
        bot.send_message(msg.chat.id, "Add the hashtags to bind after /watch.")
            .await?;
        return Ok(());
    }

    let channels: Vec<Channel> = storage
        .list_channels()
        .await?
        .into_iter()
        .filter(|channel| channel.admins.contains(&user_id))
        .collect();
    if channels.is_empty() {
        bot.send_message(msg.chat.id, "You need to add a channel first.")
            .await?;
        return Ok(());
    }

    // The prompt repeats the tags as text so the bind callback can re-read
    // them from this message's own hashtag entities.
    let tag_list = tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(", ");
    bot.send_message(
        msg.chat.id,
        format!("Choose a channel for the following tags:\n{tag_list}"),
    )
    .reply_markup(picker_keyboard(user_id, msg.chat.id.0, &channels))
    .await?;
    Ok(())
}

/// Handle a picker press: bind the prompt's tags, or dismiss the picker.
///
/// # Errors
///
/// Returns an error if a binding write fails.
pub async fn handle_watch_callback(
    bot: Bot,
    q: CallbackQuery,
    storage: Arc<R2Storage>,
) -> Result<()> {
    let Some(action) = q.data.as_deref().and_then(parse_callback) else {
        return Ok(());
    };
    let presser = q.from.id.0.cast_signed();

    match action {
        WatchCallback::Done { from } => {
            if from != presser {
                let _ = bot.answer_callback_query(q.id.clone()).text("😒").await;
                return Ok(());
            }
            let _ = bot.answer_callback_query(q.id.clone()).text("👍").await;
            if let Some(MaybeInaccessibleMessage::Regular(message)) = q.message.as_ref() {
                let _ = bot.delete_message(message.chat.id, message.id).await;
            }
        }
        WatchCallback::Bind {
            from,
            group,
            channel,
        } => {
            if from != presser {
                let _ = bot.answer_callback_query(q.id.clone()).text("😒").await;
                return Ok(());
            }
            let Some(MaybeInaccessibleMessage::Regular(message)) = q.message.as_ref() else {
                let _ = bot.answer_callback_query(q.id.clone()).await;
                return Ok(());
            };
            let tags = message_tags(
                message.text().unwrap_or_default(),
                message.entities().unwrap_or(&[]),
            );
            for tag in &tags {
                storage.bind_tag(group, tag, channel).await?;
            }
            let _ = bot.answer_callback_query(q.id.clone()).text("👍").await;
        }
    }
    Ok(())
}

/// Keep the destination channel record current: on any channel post, upsert
/// the channel's title and admin list (the admins authorize `/watch`
/// bindings to it).
///
/// # Errors
///
/// Returns an error if the record write fails.
pub async fn handle_channel_post(bot: Bot, msg: Message, storage: Arc<R2Storage>) -> Result<()> {
    if !msg.chat.is_channel() {
        return Ok(());
    }
    let admins: Vec<i64> = match bot.get_chat_administrators(msg.chat.id).await {
        Ok(members) => members
            .iter()
            .filter(|member| !member.user.is_bot)
            .map(|member| member.user.id.0.cast_signed())
            .collect(),
        Err(err) => {
            // Without admin visibility the existing record stays as-is.
            debug!(chat_id = msg.chat.id.0, error = %err, "channel admin lookup failed");
            return Ok(());
        }
    };

    let channel = Channel {
        chat_id: msg.chat.id.0,
        title: msg.chat.title().unwrap_or_default().to_owned(),
        admins,
    };
    let unchanged = storage
        .get_channel(channel.chat_id)
        .await?
        .is_some_and(|current| current.title == channel.title && current.admins == channel.admins);
    if !unchanged {
        storage.save_channel(&channel).await?;
    }
    Ok(())
}

async fn is_group_admin(bot: &Bot, chat: ChatId, user_id: i64) -> bool {
    match bot.get_chat_administrators(chat).await {
        Ok(members) => members
            .iter()
            .any(|member| member.user.id.0.cast_signed() == user_id),
        Err(err) => {
            warn!(chat_id = chat.0, error = %err, "group admin lookup failed");
            false
        }
    }
}
