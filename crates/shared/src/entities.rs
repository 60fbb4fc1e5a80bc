use serde::{Deserialize, Serialize};

/// Inline formatting annotation over a text span.
///
/// `Mention` and `Code` exist only in the app's rich-text model; the group
/// call envelope has no representation for them and drops them on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageEntity {
    Bold { offset: i32, length: i32 },
    Italic { offset: i32, length: i32 },
    Underline { offset: i32, length: i32 },
    Strike { offset: i32, length: i32 },
    Spoiler { offset: i32, length: i32 },
    CustomEmoji { offset: i32, length: i32, document_id: i64 },
    Mention { offset: i32, length: i32 },
    Code { offset: i32, length: i32 },
}

impl MessageEntity {
    pub fn span(&self) -> (i32, i32) {
        match *self {
            Self::Bold { offset, length }
            | Self::Italic { offset, length }
            | Self::Underline { offset, length }
            | Self::Strike { offset, length }
            | Self::Spoiler { offset, length }
            | Self::CustomEmoji { offset, length, .. }
            | Self::Mention { offset, length }
            | Self::Code { offset, length } => (offset, length),
        }
    }
}
