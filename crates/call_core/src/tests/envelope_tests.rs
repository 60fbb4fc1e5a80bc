use serde_json::json;
use shared::entities::MessageEntity;

use super::*;

fn sample() -> PreparedMessage {
    PreparedMessage {
        random_id: 0x00ab_cdef_1234_5678,
        text: "bold beat 🎵".to_string(),
        entities: vec![
            MessageEntity::Bold {
                offset: 0,
                length: 4,
            },
            MessageEntity::Spoiler {
                offset: 5,
                length: 4,
            },
            MessageEntity::CustomEmoji {
                offset: 10,
                length: 1,
                document_id: 7_777_777_777_777,
            },
        ],
    }
}

#[test]
fn round_trip_preserves_nonce_text_and_entities() {
    let message = sample();
    let decoded = decode(&encode(&message)).expect("decodes");
    assert_eq!(decoded, message);
}

#[test]
fn mention_and_code_entities_have_no_wire_form() {
    let mut message = sample();
    message.entities.push(MessageEntity::Mention {
        offset: 0,
        length: 4,
    });
    message.entities.push(MessageEntity::Code {
        offset: 5,
        length: 4,
    });
    let decoded = decode(&encode(&message)).expect("decodes");
    assert_eq!(decoded.entities, sample().entities);
}

#[test]
fn zero_or_missing_nonce_rejects_the_envelope() {
    let zero = json!({
        "_": ENVELOPE_TAG,
        "random_id": "0",
        "message": { "_": TEXT_TAG, "text": "hi", "entities": [] },
    });
    assert_eq!(decode(zero.to_string().as_bytes()), None);

    let missing = json!({
        "_": ENVELOPE_TAG,
        "message": { "_": TEXT_TAG, "text": "hi", "entities": [] },
    });
    assert_eq!(decode(missing.to_string().as_bytes()), None);
}

#[test]
fn nonce_accepted_as_native_number_or_numeric_string() {
    for random_id in [json!(42), json!("42")] {
        let document = json!({
            "_": ENVELOPE_TAG,
            "random_id": random_id,
            "message": { "_": TEXT_TAG, "text": "hi", "entities": [] },
        });
        let decoded = decode(document.to_string().as_bytes()).expect("decodes");
        assert_eq!(decoded.random_id, 42);
    }
}

#[test]
fn out_of_bounds_entities_are_skipped_not_fatal() {
    let document = json!({
        "_": ENVELOPE_TAG,
        "random_id": "9",
        "message": {
            "_": TEXT_TAG,
            "text": "short",
            "entities": [
                { "_": "messageEntityBold", "offset": -1, "length": 2 },
                { "_": "messageEntityBold", "offset": 0, "length": 0 },
                { "_": "messageEntityBold", "offset": 3, "length": 40 },
                { "_": "messageEntityItalic", "offset": 1, "length": 3 },
            ],
        },
    });
    let decoded = decode(document.to_string().as_bytes()).expect("decodes");
    assert_eq!(
        decoded.entities,
        vec![MessageEntity::Italic {
            offset: 1,
            length: 3
        }]
    );
}

#[test]
fn unknown_entity_kinds_are_skipped() {
    let document = json!({
        "_": ENVELOPE_TAG,
        "random_id": "9",
        "message": {
            "_": TEXT_TAG,
            "text": "short",
            "entities": [
                { "_": "messageEntityHologram", "offset": 0, "length": 5 },
                { "_": "messageEntityBold", "offset": 0, "length": 5 },
            ],
        },
    });
    let decoded = decode(document.to_string().as_bytes()).expect("decodes");
    assert_eq!(
        decoded.entities,
        vec![MessageEntity::Bold {
            offset: 0,
            length: 5
        }]
    );
}

#[test]
fn custom_emoji_without_document_id_is_skipped() {
    let document = json!({
        "_": ENVELOPE_TAG,
        "random_id": "9",
        "message": {
            "_": TEXT_TAG,
            "text": "e",
            "entities": [
                { "_": "messageEntityCustomEmoji", "offset": 0, "length": 1 },
                { "_": "messageEntityCustomEmoji", "offset": 0, "length": 1, "document_id": 0 },
            ],
        },
    });
    let decoded = decode(document.to_string().as_bytes()).expect("decodes");
    assert!(decoded.entities.is_empty());
}

#[test]
fn newer_min_layer_rejects_the_envelope() {
    let document = json!({
        "_": ENVELOPE_TAG,
        "min_layer": SUPPORTED_LAYER + 1,
        "random_id": "9",
        "message": { "_": TEXT_TAG, "text": "hi", "entities": [] },
    });
    assert_eq!(decode(document.to_string().as_bytes()), None);
}

#[test]
fn foreign_discriminators_reject_the_envelope() {
    let wrong_root = json!({
        "_": "phoneCallMessage",
        "random_id": "9",
        "message": { "_": TEXT_TAG, "text": "hi", "entities": [] },
    });
    assert_eq!(decode(wrong_root.to_string().as_bytes()), None);

    let wrong_message = json!({
        "_": ENVELOPE_TAG,
        "random_id": "9",
        "message": { "_": "plainText", "text": "hi", "entities": [] },
    });
    assert_eq!(decode(wrong_message.to_string().as_bytes()), None);
    assert_eq!(decode(b"not json"), None);
}

#[test]
fn entity_bounds_use_character_counts() {
    // 4 characters, 10 utf-8 bytes.
    let document = json!({
        "_": ENVELOPE_TAG,
        "random_id": "9",
        "message": {
            "_": TEXT_TAG,
            "text": "🎵🎵ab",
            "entities": [
                { "_": "messageEntityBold", "offset": 0, "length": 4 },
            ],
        },
    });
    let decoded = decode(document.to_string().as_bytes()).expect("decodes");
    assert_eq!(decoded.entities.len(), 1);
}
