//! Tag extraction: hashtags, the untagged remainder, and the effective
//! source message.

use crate::message::{utf16_remove, utf16_slice, Entity, EntityKind, InboundMessage};

/// Which message the relay actually operates on.
///
/// A message consisting solely of hashtags that replies to something relays
/// the reply target instead of its own (empty) remainder; the decision is
/// explicit so tests can observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveSource {
    Original,
    ReplyTarget,
}

/// Extraction result: the effective message with its own text and entities
/// (hashtags still embedded, for downstream rendering), plus the lowercase
/// tag list taken from the triggering message.
#[derive(Debug, Clone)]
pub struct Extracted<'a> {
    pub source: EffectiveSource,
    pub message: &'a InboundMessage,
    pub text: String,
    pub entities: Vec<Entity>,
    pub tags: Vec<String>,
}

/// Extract hashtags and resolve the effective message.
///
/// Returns `None` for forwards: forwarded messages are never re-tagged.
/// An empty `tags` list means there is nothing to relay; the edit path
/// checks that separately from "no ledger records".
#[must_use]
pub fn extract(msg: &InboundMessage) -> Option<Extracted<'_>> {
    if msg.forwarded {
        return None;
    }

    let tags: Vec<String> = msg
        .entities
        .iter()
        .filter(|entity| entity.kind == EntityKind::Hashtag)
        .map(|entity| {
            utf16_slice(&msg.text, entity.offset + 1, entity.offset + entity.length)
                .to_lowercase()
        })
        .collect();

    let remainder = untagged_text(&msg.text, &msg.entities);

    let (source, message) = match &msg.reply_to {
        Some(reply) if remainder.is_empty() => (EffectiveSource::ReplyTarget, reply.as_ref()),
        _ => (EffectiveSource::Original, msg),
    };

    Some(Extracted {
        source,
        message,
        text: message.text.clone(),
        entities: message.entities.clone(),
        tags,
    })
}

/// The message text with every hashtag span removed and whitespace trimmed.
///
/// Spans are removed highest offset first so earlier removals do not shift
/// the offsets of later ones.
#[must_use]
pub fn untagged_text(text: &str, entities: &[Entity]) -> String {
    let mut spans: Vec<(usize, usize)> = entities
        .iter()
        .filter(|entity| entity.kind == EntityKind::Hashtag)
        .map(|entity| (entity.offset, entity.offset + entity.length))
        .collect();
    spans.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = text.to_owned();
    for (start, end) in spans {
        out = utf16_remove(&out, start, end);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MediaKind;

    fn plain_message(message_id: i32, text: &str, entities: Vec<Entity>) -> InboundMessage {
        InboundMessage {
            chat_id: -1001234,
            chat_username: None,
            message_id,
            text: text.to_string(),
            entities,
            media: MediaKind::Text,
            forwarded: false,
            reply_to: None,
        }
    }

    fn hashtag(offset: usize, length: usize) -> Entity {
        Entity::new(EntityKind::Hashtag, offset, length)
    }

    #[test]
    fn test_tags_lowercased_and_remainder_trimmed() {
        let msg = plain_message(1, "#Foo hello #Bar", vec![hashtag(0, 4), hashtag(11, 4)]);
        let extracted = extract(&msg).expect("not a forward");
        assert_eq!(extracted.tags, vec!["foo", "bar"]);
        assert_eq!(untagged_text(&msg.text, &msg.entities), "hello");
        assert_eq!(extracted.source, EffectiveSource::Original);
        // The effective text keeps the hashtags for downstream rendering.
        assert_eq!(extracted.text, "#Foo hello #Bar");
    }

    #[test]
    fn test_forwarded_message_is_ignored() {
        let mut msg = plain_message(1, "#foo", vec![hashtag(0, 4)]);
        msg.forwarded = true;
        assert!(extract(&msg).is_none());
    }

    #[test]
    fn test_bare_tag_reply_substitutes_reply_target() {
        let parent = plain_message(42, "hello world", vec![]);
        let mut msg = plain_message(50, "#foo", vec![hashtag(0, 4)]);
        msg.reply_to = Some(Box::new(parent));

        let extracted = extract(&msg).expect("not a forward");
        assert_eq!(extracted.source, EffectiveSource::ReplyTarget);
        assert_eq!(extracted.message.message_id, 42);
        assert_eq!(extracted.text, "hello world");
        assert_eq!(extracted.tags, vec!["foo"]);
    }

    #[test]
    fn test_bare_tags_without_reply_keep_original() {
        let msg = plain_message(7, "#foo #bar", vec![hashtag(0, 4), hashtag(5, 4)]);
        let extracted = extract(&msg).expect("not a forward");
        assert_eq!(extracted.source, EffectiveSource::Original);
        assert_eq!(extracted.message.message_id, 7);
    }

    #[test]
    fn test_tagged_reply_with_remainder_keeps_original() {
        let parent = plain_message(42, "parent", vec![]);
        let mut msg = plain_message(50, "#foo look at this", vec![hashtag(0, 4)]);
        msg.reply_to = Some(Box::new(parent));

        let extracted = extract(&msg).expect("not a forward");
        assert_eq!(extracted.source, EffectiveSource::Original);
        assert_eq!(extracted.message.message_id, 50);
    }

    #[test]
    fn test_no_hashtags_yields_empty_tag_list() {
        let msg = plain_message(1, "just text", vec![]);
        let extracted = extract(&msg).expect("not a forward");
        assert!(extracted.tags.is_empty());
    }

    #[test]
    fn test_untagged_text_with_utf16_offsets() {
        // "🔥 #foo done": emoji is two UTF-16 units, hashtag at offset 3.
        let text = "🔥 #foo done";
        let entities = vec![hashtag(3, 4)];
        assert_eq!(untagged_text(text, &entities), "🔥  done");
    }
}
