//! Chat-platform boundary: typed error kinds and the client abstraction.
//!
//! The relay engine talks to the platform through [`RelayPlatform`] so the
//! edit-fallback decision is a type check on [`PlatformError::NotFound`]
//! rather than a comparison against error description strings, and so tests
//! can substitute a recording mock for the live API.

use crate::message::{Entity, EntityKind, InboundMessage, MediaKind};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageEntity,
    MessageEntityKind, MessageId, ParseMode,
};
use thiserror::Error;
use url::Url;

/// Platform failure kinds the relay distinguishes.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The edit/forward/delete target no longer exists. Triggers the
    /// fallback re-relay in the edit path.
    #[error("target message not found")]
    NotFound,
    /// The bot lacks rights in the destination chat.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The recipient blocked the bot or cannot be messaged.
    #[error("recipient unavailable: {0}")]
    Blocked(String),
    #[error("platform error: {0}")]
    Other(String),
}

impl From<teloxide::RequestError> for PlatformError {
    fn from(err: teloxide::RequestError) -> Self {
        use teloxide::ApiError;
        match &err {
            teloxide::RequestError::Api(api) => match api {
                ApiError::MessageToEditNotFound
                | ApiError::MessageToForwardNotFound
                | ApiError::MessageToDeleteNotFound
                | ApiError::MessageIdInvalid => Self::NotFound,
                ApiError::NotEnoughRightsToPostMessages => {
                    Self::PermissionDenied(api.to_string())
                }
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::BotKickedFromChannel
                | ApiError::CantInitiateConversation
                | ApiError::UserDeactivated => Self::Blocked(api.to_string()),
                _ => Self::Other(err.to_string()),
            },
            _ => Self::Other(err.to_string()),
        }
    }
}

/// One inline-keyboard button, platform-independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub action: ButtonAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

/// Rows of inline-keyboard buttons attached to a re-sent copy.
pub type Keyboard = Vec<Vec<Button>>;

/// Rendered caption/body plus optional keyboard for a send or edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// HTML body for text sends, HTML caption for media sends.
    pub caption_html: String,
    pub keyboard: Option<Keyboard>,
}

/// The subset of the chat platform the relay engine consumes.
///
/// Send and forward operations return the message id of the new copy inside
/// the destination chat.
#[async_trait]
pub trait RelayPlatform: Send + Sync {
    async fn forward_message(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<i32, PlatformError>;

    async fn send_text(&self, chat: i64, opts: &SendOptions) -> Result<i32, PlatformError>;

    async fn send_audio(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError>;

    async fn send_document(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError>;

    async fn send_photo(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError>;

    async fn send_video(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError>;

    async fn edit_message_text(
        &self,
        chat: i64,
        message_id: i32,
        opts: &SendOptions,
    ) -> Result<(), PlatformError>;

    async fn edit_message_caption(
        &self,
        chat: i64,
        message_id: i32,
        opts: &SendOptions,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, chat: i64, message_id: i32) -> Result<(), PlatformError>;
}

/// Live Telegram implementation over a [`teloxide::Bot`].
pub struct TelegramRelay {
    bot: Bot,
}

impl TelegramRelay {
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl RelayPlatform for TelegramRelay {
    async fn forward_message(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<i32, PlatformError> {
        let sent = self
            .bot
            .forward_message(ChatId(to_chat), ChatId(from_chat), MessageId(message_id))
            .await?;
        Ok(sent.id.0)
    }

    async fn send_text(&self, chat: i64, opts: &SendOptions) -> Result<i32, PlatformError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat), opts.caption_html.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &opts.keyboard {
            req = req.reply_markup(to_inline_markup(keyboard));
        }
        Ok(req.await?.id.0)
    }

    async fn send_audio(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        let mut req = self
            .bot
            .send_audio(ChatId(chat), input_file(file_id))
            .caption(opts.caption_html.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &opts.keyboard {
            req = req.reply_markup(to_inline_markup(keyboard));
        }
        Ok(req.await?.id.0)
    }

    async fn send_document(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        let mut req = self
            .bot
            .send_document(ChatId(chat), input_file(file_id))
            .caption(opts.caption_html.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &opts.keyboard {
            req = req.reply_markup(to_inline_markup(keyboard));
        }
        Ok(req.await?.id.0)
    }

    async fn send_photo(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        let mut req = self
            .bot
            .send_photo(ChatId(chat), input_file(file_id))
            .caption(opts.caption_html.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &opts.keyboard {
            req = req.reply_markup(to_inline_markup(keyboard));
        }
        Ok(req.await?.id.0)
    }

    async fn send_video(
        &self,
        chat: i64,
        file_id: &str,
        opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        let mut req = self
            .bot
            .send_video(ChatId(chat), input_file(file_id))
            .caption(opts.caption_html.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &opts.keyboard {
            req = req.reply_markup(to_inline_markup(keyboard));
        }
        Ok(req.await?.id.0)
    }

    async fn edit_message_text(
        &self,
        chat: i64,
        message_id: i32,
        opts: &SendOptions,
    ) -> Result<(), PlatformError> {
        let mut req = self
            .bot
            .edit_message_text(
                ChatId(chat),
                MessageId(message_id),
                opts.caption_html.clone(),
            )
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &opts.keyboard {
            req = req.reply_markup(to_inline_markup(keyboard));
        }
        req.await?;
        Ok(())
    }

    async fn edit_message_caption(
        &self,
        chat: i64,
        message_id: i32,
        opts: &SendOptions,
    ) -> Result<(), PlatformError> {
        let mut req = self
            .bot
            .edit_message_caption(ChatId(chat), MessageId(message_id))
            .caption(opts.caption_html.clone())
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = &opts.keyboard {
            req = req.reply_markup(to_inline_markup(keyboard));
        }
        req.await?;
        Ok(())
    }

    async fn delete_message(&self, chat: i64, message_id: i32) -> Result<(), PlatformError> {
        self.bot
            .delete_message(ChatId(chat), MessageId(message_id))
            .await?;
        Ok(())
    }
}

fn input_file(file_id: &str) -> InputFile {
    InputFile::file_id(FileId(file_id.to_owned()))
}

/// Convert the platform-independent keyboard into teloxide markup. Buttons
/// with malformed URLs are dropped rather than failing the whole send.
#[must_use]
pub fn to_inline_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    let rows = keyboard.iter().map(|row| {
        row.iter()
            .filter_map(|button| match &button.action {
                ButtonAction::Url(url) => Url::parse(url)
                    .ok()
                    .map(|url| InlineKeyboardButton::url(button.text.clone(), url)),
                ButtonAction::Callback(data) => Some(InlineKeyboardButton::callback(
                    button.text.clone(),
                    data.clone(),
                )),
            })
            .collect::<Vec<_>>()
    });
    InlineKeyboardMarkup::new(rows)
}

/// Reduce a teloxide message to the platform-independent inbound model.
#[must_use]
pub fn inbound_from_telegram(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat_id: msg.chat.id.0,
        chat_username: msg.chat.username().map(ToOwned::to_owned),
        message_id: msg.id.0,
        text: msg
            .text()
            .or_else(|| msg.caption())
            .unwrap_or_default()
            .to_owned(),
        entities: msg
            .entities()
            .or_else(|| msg.caption_entities())
            .map(|entities| entities.iter().map(convert_entity).collect())
            .unwrap_or_default(),
        media: convert_media(msg),
        forwarded: msg.forward_origin().is_some(),
        reply_to: msg
            .reply_to_message()
            .map(|reply| Box::new(inbound_from_telegram(reply))),
    }
}

fn convert_entity(entity: &MessageEntity) -> Entity {
    let kind = match &entity.kind {
        MessageEntityKind::Hashtag => EntityKind::Hashtag,
        MessageEntityKind::Bold => EntityKind::Bold,
        MessageEntityKind::Italic => EntityKind::Italic,
        MessageEntityKind::Underline => EntityKind::Underline,
        MessageEntityKind::Strikethrough => EntityKind::Strikethrough,
        MessageEntityKind::Spoiler => EntityKind::Spoiler,
        MessageEntityKind::Code => EntityKind::Code,
        MessageEntityKind::Pre { language } => EntityKind::Pre {
            language: language.clone(),
        },
        MessageEntityKind::TextLink { url } => EntityKind::TextLink {
            url: url.to_string(),
        },
        _ => EntityKind::Other,
    };
    Entity::new(kind, entity.offset, entity.length)
}

fn convert_media(msg: &Message) -> MediaKind {
    if let Some(audio) = msg.audio() {
        return MediaKind::Audio {
            file_id: audio.file.id.0.clone(),
        };
    }
    if let Some(document) = msg.document() {
        return MediaKind::Document {
            file_id: document.file.id.0.clone(),
        };
    }
    if let Some(photos) = msg.photo() {
        return MediaKind::Photo {
            sizes: photos.iter().map(|size| size.file.id.0.clone()).collect(),
        };
    }
    if let Some(video) = msg.video() {
        return MediaKind::Video {
            file_id: video.file.id.0.clone(),
        };
    }
    MediaKind::Text
}
