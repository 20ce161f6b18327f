//! Update handlers: group messages, edited messages, and like callbacks.

use crate::likes::{vote_label, DISLIKE_CALLBACK, LIKE_CALLBACK};
use crate::platform::inbound_from_telegram;
use crate::relay::RelayEngine;
use crate::storage::R2Storage;
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage, MessageEntityKind,
};
use teloxide::utils::command::BotCommands;
use tracing::debug;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "Bind this message's hashtags to a channel.")]
    Watch,
}

/// True when the message (or its caption) carries at least one hashtag
/// entity. Used as the dispatcher filter for the relay branch.
#[must_use]
pub fn has_hashtag(msg: &Message) -> bool {
    msg.entities()
        .or_else(|| msg.caption_entities())
        .is_some_and(|entities| {
            entities
                .iter()
                .any(|entity| matches!(entity.kind, MessageEntityKind::Hashtag))
        })
}

/// Relay a freshly posted tagged message.
///
/// # Errors
///
/// Returns an error when the engine aborts the event.
pub async fn handle_group_message(msg: Message, engine: Arc<RelayEngine>) -> Result<()> {
    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return Ok(());
    }
    let inbound = inbound_from_telegram(&msg);
    engine.handle_message(&inbound).await?;
    Ok(())
}

/// Propagate an edit to previously relayed copies.
///
/// # Errors
///
/// Returns an error when the engine aborts the event.
pub async fn handle_edited_message(msg: Message, engine: Arc<RelayEngine>) -> Result<()> {
    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return Ok(());
    }
    let inbound = inbound_from_telegram(&msg);
    engine.handle_edit(&inbound).await?;
    Ok(())
}

/// Handle a `+`/`-` vote on a relayed copy: toggle the voter's ballot entry
/// and refresh the like row in place, keeping any other keyboard rows.
///
/// # Errors
///
/// Returns an error if the ballot cannot be loaded or saved, or the
/// keyboard refresh fails.
pub async fn handle_like_callback(
    bot: Bot,
    q: CallbackQuery,
    storage: Arc<R2Storage>,
) -> Result<()> {
    let vote = match q.data.as_deref() {
        Some(LIKE_CALLBACK) => 1i8,
        Some(DISLIKE_CALLBACK) => -1i8,
        _ => return Ok(()),
    };

    let Some(MaybeInaccessibleMessage::Regular(message)) = q.message.as_ref() else {
        // Copy too old to be addressed; acknowledge and move on.
        let _ = bot.answer_callback_query(q.id.clone()).await;
        return Ok(());
    };

    let chat_id = message.chat.id.0;
    let message_id = message.id.0;
    let voter = q.from.id.0.cast_signed();

    let mut ballot = storage.get_ballot(chat_id, message_id).await?;
    ballot.cast(voter, vote);
    let (plus, minus) = ballot.tally();
    storage.save_ballot(chat_id, message_id, &ballot).await?;

    let mut rows: Vec<Vec<InlineKeyboardButton>> = vec![vec![
        InlineKeyboardButton::callback(vote_label("👍", plus), LIKE_CALLBACK),
        InlineKeyboardButton::callback(vote_label("👎", minus), DISLIKE_CALLBACK),
    ]];
    if let Some(markup) = message.reply_markup() {
        rows.extend(markup.inline_keyboard.iter().skip(1).cloned());
    }

    if let Err(err) = bot
        .edit_message_reply_markup(message.chat.id, message.id)
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await
    {
        // Racing voters can produce an unmodified-markup edit; not worth
        // surfacing.
        debug!(chat_id, message_id, error = %err, "like keyboard refresh skipped");
    }

    let _ = bot
        .answer_callback_query(q.id.clone())
        .text(format!("👍 {plus} · 👎 {minus}"))
        .await;

    Ok(())
}
