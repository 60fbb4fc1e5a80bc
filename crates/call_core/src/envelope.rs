//! Keyed envelope codec for group-call side-channel messages.
//!
//! The wire form is a self-describing JSON document with `_` discriminator
//! tags rather than a fixed binary layout, so new entity kinds can ship
//! without breaking older decoders. Encoding is lossy-but-safe: entity kinds
//! with no wire representation are dropped. Decoding is strict at the
//! envelope level and per-entity lenient: a bad entity is skipped, a bad
//! envelope drops the whole message.

use serde_json::{json, Map, Value};
use shared::entities::MessageEntity;
use tracing::debug;

pub const ENVELOPE_TAG: &str = "groupCallMessage";
pub const TEXT_TAG: &str = "textWithEntities";

/// Highest envelope layer this decoder understands. Documents declaring a
/// higher `min_layer` are rejected whole.
pub const SUPPORTED_LAYER: i64 = 1;

const TAG_BOLD: &str = "messageEntityBold";
const TAG_ITALIC: &str = "messageEntityItalic";
const TAG_UNDERLINE: &str = "messageEntityUnderline";
const TAG_STRIKE: &str = "messageEntityStrike";
const TAG_SPOILER: &str = "messageEntitySpoiler";
const TAG_CUSTOM_EMOJI: &str = "messageEntityCustomEmoji";

/// A message as it crosses the encrypt/decrypt boundary: a caller-supplied
/// random nonce for transport-level de-duplication plus the payload.
///
/// `random_id` of zero is the sentinel for "absent" and never valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    pub random_id: u64,
    pub text: String,
    pub entities: Vec<MessageEntity>,
}

pub fn encode(message: &PreparedMessage) -> Vec<u8> {
    let entities: Vec<Value> = message.entities.iter().filter_map(encode_entity).collect();
    let document = json!({
        "_": ENVELOPE_TAG,
        "random_id": message.random_id.to_string(),
        "message": {
            "_": TEXT_TAG,
            "text": message.text,
            "entities": entities,
        },
    });
    serde_json::to_vec(&document).unwrap_or_default()
}

pub fn decode(bytes: &[u8]) -> Option<PreparedMessage> {
    let document: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "envelope is not a valid document");
            return None;
        }
    };
    let root = document.as_object()?;
    if tag_of(root)? != ENVELOPE_TAG {
        debug!("envelope discriminator mismatch");
        return None;
    }
    if let Some(min_layer) = root.get("min_layer") {
        let min_layer = parse_i64(min_layer)?;
        if min_layer > SUPPORTED_LAYER {
            debug!(min_layer, "envelope requires a newer layer");
            return None;
        }
    }

    let random_id = parse_u64(root.get("random_id")?)?;
    if random_id == 0 {
        debug!("envelope carries a zero nonce");
        return None;
    }

    let message = root.get("message")?.as_object()?;
    if tag_of(message)? != TEXT_TAG {
        debug!("message discriminator mismatch");
        return None;
    }
    let text = message.get("text")?.as_str()?.to_string();
    let raw_entities = message.get("entities")?.as_array()?;

    let text_len = text.chars().count() as i64;
    let entities = raw_entities
        .iter()
        .filter_map(|value| decode_entity(value, text_len))
        .collect();

    Some(PreparedMessage {
        random_id,
        text,
        entities,
    })
}

fn encode_entity(entity: &MessageEntity) -> Option<Value> {
    let (offset, length) = entity.span();
    let tag = match entity {
        MessageEntity::Bold { .. } => TAG_BOLD,
        MessageEntity::Italic { .. } => TAG_ITALIC,
        MessageEntity::Underline { .. } => TAG_UNDERLINE,
        MessageEntity::Strike { .. } => TAG_STRIKE,
        MessageEntity::Spoiler { .. } => TAG_SPOILER,
        MessageEntity::CustomEmoji { .. } => TAG_CUSTOM_EMOJI,
        // No wire representation; dropped from the output.
        MessageEntity::Mention { .. } | MessageEntity::Code { .. } => return None,
    };
    let mut object = Map::new();
    object.insert("_".to_string(), Value::from(tag));
    object.insert("offset".to_string(), Value::from(offset));
    object.insert("length".to_string(), Value::from(length));
    if let MessageEntity::CustomEmoji { document_id, .. } = entity {
        // Emitted as a string: 64-bit ids do not survive a float round-trip.
        object.insert("document_id".to_string(), Value::from(document_id.to_string()));
    }
    Some(Value::Object(object))
}

fn decode_entity(value: &Value, text_len: i64) -> Option<MessageEntity> {
    let object = value.as_object()?;
    let tag = tag_of(object)?;
    let offset = parse_i64(object.get("offset")?)?;
    let length = parse_i64(object.get("length")?)?;
    if offset < 0 || length <= 0 || offset.checked_add(length)? > text_len {
        debug!(offset, length, text_len, "entity span out of bounds; skipping");
        return None;
    }
    let offset = i32::try_from(offset).ok()?;
    let length = i32::try_from(length).ok()?;

    Some(match tag {
        TAG_BOLD => MessageEntity::Bold { offset, length },
        TAG_ITALIC => MessageEntity::Italic { offset, length },
        TAG_UNDERLINE => MessageEntity::Underline { offset, length },
        TAG_STRIKE => MessageEntity::Strike { offset, length },
        TAG_SPOILER => MessageEntity::Spoiler { offset, length },
        TAG_CUSTOM_EMOJI => {
            let document_id = parse_i64(object.get("document_id")?)?;
            if document_id <= 0 {
                debug!(document_id, "custom emoji without a valid document id");
                return None;
            }
            MessageEntity::CustomEmoji {
                offset,
                length,
                document_id,
            }
        }
        other => {
            debug!(tag = other, "unsupported entity kind; skipping");
            return None;
        }
    })
}

fn tag_of(object: &Map<String, Value>) -> Option<&str> {
    object.get("_")?.as_str()
}

/// Accepts either a native number or a numeric string; 64-bit values may be
/// stringified by encoders that cannot represent them exactly.
fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/envelope_tests.rs"]
mod tests;
