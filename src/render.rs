//! Projection of entity-annotated text into Telegram-flavored HTML.
//!
//! Re-sent copies lose the original entity annotations, so the source
//! formatting is baked into an HTML body instead and sent with
//! `parse_mode=HTML`. Hashtags and other non-formatting entities pass
//! through as (escaped) plain text.

use crate::message::{Entity, EntityKind};

/// Render `text` with its entity annotations as Telegram HTML.
///
/// Entities may nest (Telegram guarantees well-formed nesting); overlapping
/// entities that are not properly nested are dropped rather than producing
/// broken markup.
#[must_use]
pub fn to_html(text: &str, entities: &[Entity]) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut formatting: Vec<&Entity> = entities
        .iter()
        .filter(|entity| is_formatting(&entity.kind))
        .collect();
    formatting.sort_by(|a, b| a.offset.cmp(&b.offset).then(b.length.cmp(&a.length)));
    render_range(&units, 0, units.len(), &formatting)
}

fn is_formatting(kind: &EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Bold
            | EntityKind::Italic
            | EntityKind::Underline
            | EntityKind::Strikethrough
            | EntityKind::Spoiler
            | EntityKind::Code
            | EntityKind::Pre { .. }
            | EntityKind::TextLink { .. }
    )
}

fn render_range(units: &[u16], start: usize, end: usize, entities: &[&Entity]) -> String {
    let mut out = String::new();
    let mut pos = start;
    let mut i = 0;
    while i < entities.len() {
        let entity = entities[i];
        if entity.offset >= end {
            break;
        }
        if entity.offset < pos {
            // Overlaps an already-rendered span; skip it.
            i += 1;
            continue;
        }
        out.push_str(&escaped(units, pos, entity.offset));
        let inner_end = (entity.offset + entity.length).min(end);
        // Entities sorted by offset: everything starting inside this span is
        // a child (or an overlap the recursive call will skip).
        let mut j = i + 1;
        while j < entities.len() && entities[j].offset < inner_end {
            j += 1;
        }
        let inner = render_range(units, entity.offset, inner_end, &entities[i + 1..j]);
        push_wrapped(&mut out, &entity.kind, &inner);
        pos = inner_end;
        i = j;
    }
    out.push_str(&escaped(units, pos, end));
    out
}

fn escaped(units: &[u16], start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    let raw = String::from_utf16_lossy(&units[start..end]);
    html_escape::encode_text(&raw).into_owned()
}

fn push_wrapped(out: &mut String, kind: &EntityKind, inner: &str) {
    match kind {
        EntityKind::Bold => {
            out.push_str("<b>");
            out.push_str(inner);
            out.push_str("</b>");
        }
        EntityKind::Italic => {
            out.push_str("<i>");
            out.push_str(inner);
            out.push_str("</i>");
        }
        EntityKind::Underline => {
            out.push_str("<u>");
            out.push_str(inner);
            out.push_str("</u>");
        }
        EntityKind::Strikethrough => {
            out.push_str("<s>");
            out.push_str(inner);
            out.push_str("</s>");
        }
        EntityKind::Spoiler => {
            out.push_str("<tg-spoiler>");
            out.push_str(inner);
            out.push_str("</tg-spoiler>");
        }
        EntityKind::Code => {
            out.push_str("<code>");
            out.push_str(inner);
            out.push_str("</code>");
        }
        EntityKind::Pre { language } => match language {
            Some(lang) => {
                let lang = html_escape::encode_double_quoted_attribute(lang);
                out.push_str(&format!(
                    "<pre><code class=\"language-{lang}\">{inner}</code></pre>"
                ));
            }
            None => {
                out.push_str("<pre>");
                out.push_str(inner);
                out.push_str("</pre>");
            }
        },
        EntityKind::TextLink { url } => {
            let url = html_escape::encode_double_quoted_attribute(url);
            out.push_str(&format!("<a href=\"{url}\">{inner}</a>"));
        }
        // Non-formatting kinds are filtered out before rendering.
        EntityKind::Hashtag | EntityKind::Other => out.push_str(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Entity;

    #[test]
    fn test_plain_text_is_escaped() {
        assert_eq!(to_html("1 < 2 & 3 > 1", &[]), "1 &lt; 2 &amp; 3 &gt; 1");
    }

    #[test]
    fn test_bold_and_italic() {
        // "bold and italic"
        let entities = vec![
            Entity::new(EntityKind::Bold, 0, 4),
            Entity::new(EntityKind::Italic, 9, 6),
        ];
        assert_eq!(
            to_html("bold and italic", &entities),
            "<b>bold</b> and <i>italic</i>"
        );
    }

    #[test]
    fn test_nested_entities() {
        // Whole span bold, inner word also italic.
        let entities = vec![
            Entity::new(EntityKind::Bold, 0, 9),
            Entity::new(EntityKind::Italic, 5, 4),
        ];
        assert_eq!(to_html("very bold", &entities), "<b>very <i>bold</i></b>");
    }

    #[test]
    fn test_hashtags_stay_plain() {
        let entities = vec![Entity::new(EntityKind::Hashtag, 0, 4)];
        assert_eq!(to_html("#foo bar", &entities), "#foo bar");
    }

    #[test]
    fn test_text_link() {
        let entities = vec![Entity::new(
            EntityKind::TextLink {
                url: "https://example.com/?a=1&b=2".to_string(),
            },
            0,
            4,
        )];
        assert_eq!(
            to_html("here", &entities),
            "<a href=\"https://example.com/?a=1&amp;b=2\">here</a>"
        );
    }

    #[test]
    fn test_pre_with_language() {
        let entities = vec![Entity::new(
            EntityKind::Pre {
                language: Some("rust".to_string()),
            },
            0,
            9,
        )];
        assert_eq!(
            to_html("let x = 1", &entities),
            "<pre><code class=\"language-rust\">let x = 1</code></pre>"
        );
    }

    #[test]
    fn test_offsets_are_utf16_units() {
        // The emoji occupies two UTF-16 units, so "bold" starts at offset 3.
        let entities = vec![Entity::new(EntityKind::Bold, 3, 4)];
        assert_eq!(to_html("🔥 bold", &entities), "🔥 <b>bold</b>");
    }
}
