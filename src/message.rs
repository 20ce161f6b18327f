//! Platform-independent model of an inbound chat message.
//!
//! The relay engine never touches `teloxide` types directly; update handlers
//! convert incoming updates into [`InboundMessage`] at the platform boundary.
//! Entity offsets and lengths are expressed in UTF-16 code units, matching
//! the Telegram Bot API convention.

/// One inbound message (or edited message), reduced to the fields the relay
/// engine cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Chat the message was posted in.
    pub chat_id: i64,
    /// Public username of that chat, when it has one.
    pub chat_username: Option<String>,
    /// Message identifier within the chat.
    pub message_id: i32,
    /// Text for plain messages, caption for media; empty when absent.
    pub text: String,
    /// Formatting/entity annotations on `text`.
    pub entities: Vec<Entity>,
    /// Attached media, if any.
    pub media: MediaKind,
    /// True when the message is itself a forward. Forwards are never
    /// re-tagged.
    pub forwarded: bool,
    /// The message this one replies to, when present.
    pub reply_to: Option<Box<InboundMessage>>,
}

impl InboundMessage {
    /// True when the message carries no media (edits target the text, not a
    /// caption).
    #[must_use]
    pub fn is_plain_text(&self) -> bool {
        matches!(self.media, MediaKind::Text)
    }
}

/// A single formatting annotation with UTF-16 span.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    /// Offset of the span start, in UTF-16 code units.
    pub offset: usize,
    /// Span length, in UTF-16 code units.
    pub length: usize,
}

impl Entity {
    #[must_use]
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }
}

/// Entity kinds the relay distinguishes. Anything else is carried as
/// [`EntityKind::Other`] and rendered as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Hashtag,
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    TextLink { url: String },
    Other,
}

/// Media attached to a message, by file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    /// No media; `text` is the message body.
    Text,
    Audio {
        file_id: String,
    },
    Document {
        file_id: String,
    },
    /// Photo size variants, ordered smallest to largest.
    Photo {
        sizes: Vec<String>,
    },
    Video {
        file_id: String,
    },
}

/// Slice a string by UTF-16 code-unit offsets. Out-of-range offsets are
/// clamped rather than panicking.
#[must_use]
pub fn utf16_slice(text: &str, start: usize, end: usize) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = end.min(units.len());
    let start = start.min(end);
    String::from_utf16_lossy(&units[start..end])
}

/// Remove the UTF-16 span `[start, end)` from a string.
#[must_use]
pub fn utf16_remove(text: &str, start: usize, end: usize) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = end.min(units.len());
    let start = start.min(end);
    let mut kept = Vec::with_capacity(units.len() - (end - start));
    kept.extend_from_slice(&units[..start]);
    kept.extend_from_slice(&units[end..]);
    String::from_utf16_lossy(&kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_slice_ascii() {
        assert_eq!(utf16_slice("#Foo hello", 1, 4), "Foo");
    }

    #[test]
    fn test_utf16_slice_surrogate_pairs() {
        // Each emoji is two UTF-16 code units.
        let text = "🔥🔥abc";
        assert_eq!(utf16_slice(text, 4, 7), "abc");
        assert_eq!(utf16_slice(text, 0, 2), "🔥");
    }

    #[test]
    fn test_utf16_slice_clamps_out_of_range() {
        assert_eq!(utf16_slice("ab", 1, 99), "b");
        assert_eq!(utf16_slice("ab", 99, 100), "");
    }

    #[test]
    fn test_utf16_remove() {
        assert_eq!(utf16_remove("#Foo hello", 0, 4), " hello");
        assert_eq!(utf16_remove("a🔥b", 1, 3), "ab");
    }
}
