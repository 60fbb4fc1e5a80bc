//! Inline formatting-tag conversion for outgoing messages.
//!
//! The composer hands the ledger raw text with doubled-character markers;
//! this strips the markers and produces entity annotations over the cleaned
//! text. Unterminated markers format nothing (the marker characters are
//! still consumed).

use shared::entities::MessageEntity;

const KIND_BOLD: usize = 0;
const KIND_ITALIC: usize = 1;
const KIND_STRIKE: usize = 2;
const KIND_SPOILER: usize = 3;

/// `**bold**`, `__italic__`, `~~strike~~`, `||spoiler||`.
pub fn parse(input: &str) -> (String, Vec<MessageEntity>) {
    let chars: Vec<char> = input.chars().collect();
    let mut text = String::with_capacity(input.len());
    let mut text_len: i32 = 0;
    let mut open: [Option<i32>; 4] = [None; 4];
    let mut entities = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        let kind = if i + 1 < chars.len() && chars[i] == chars[i + 1] {
            match chars[i] {
                '*' => Some(KIND_BOLD),
                '_' => Some(KIND_ITALIC),
                '~' => Some(KIND_STRIKE),
                '|' => Some(KIND_SPOILER),
                _ => None,
            }
        } else {
            None
        };

        if let Some(kind) = kind {
            match open[kind].take() {
                Some(start) if text_len > start => {
                    entities.push(make_entity(kind, start, text_len - start));
                }
                // Empty span: both markers consumed, nothing annotated.
                Some(_) => {}
                None => open[kind] = Some(text_len),
            }
            i += 2;
            continue;
        }

        text.push(chars[i]);
        text_len += 1;
        i += 1;
    }

    entities.sort_by_key(|entity| entity.span());
    (text, entities)
}

fn make_entity(kind: usize, offset: i32, length: i32) -> MessageEntity {
    match kind {
        KIND_BOLD => MessageEntity::Bold { offset, length },
        KIND_ITALIC => MessageEntity::Italic { offset, length },
        KIND_STRIKE => MessageEntity::Strike { offset, length },
        _ => MessageEntity::Spoiler { offset, length },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let (text, entities) = parse("hello world");
        assert_eq!(text, "hello world");
        assert!(entities.is_empty());
    }

    #[test]
    fn bold_marker_produces_entity_over_clean_text() {
        let (text, entities) = parse("say **hi** now");
        assert_eq!(text, "say hi now");
        assert_eq!(
            entities,
            vec![MessageEntity::Bold {
                offset: 4,
                length: 2
            }]
        );
    }

    #[test]
    fn mixed_markers_sort_by_offset() {
        let (text, entities) = parse("||secret|| and **loud**");
        assert_eq!(text, "secret and loud");
        assert_eq!(
            entities,
            vec![
                MessageEntity::Spoiler {
                    offset: 0,
                    length: 6
                },
                MessageEntity::Bold {
                    offset: 11,
                    length: 4
                },
            ]
        );
    }

    #[test]
    fn unterminated_marker_formats_nothing() {
        let (text, entities) = parse("oops **bold");
        assert_eq!(text, "oops bold");
        assert!(entities.is_empty());
    }

    #[test]
    fn empty_span_is_dropped() {
        let (text, entities) = parse("a ~~~~ b");
        assert_eq!(text, "a  b");
        assert!(entities.is_empty());
    }
}
