//! Word-aligned little-endian payload encoding for the call side-channel.
//!
//! Decrypted group-call payloads are composed of 32-bit words: fixed-width
//! integers plus length-prefixed byte strings padded to a 4-byte boundary.
//! Every frame starts with a constructor tag so a reader can reject payloads
//! it does not understand.

use thiserror::Error;

use crate::entities::MessageEntity;

pub const TEXT_PAYLOAD_TAG: u32 = 0x6f1c_93d5;

const ENTITY_BOLD: u32 = 0x01;
const ENTITY_ITALIC: u32 = 0x02;
const ENTITY_UNDERLINE: u32 = 0x03;
const ENTITY_STRIKE: u32 = 0x04;
const ENTITY_SPOILER: u32 = 0x05;
const ENTITY_CUSTOM_EMOJI: u32 = 0x06;
const ENTITY_MENTION: u32 = 0x07;
const ENTITY_CODE: u32 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    #[error("unexpected constructor id: {id:#010x}")]
    UnexpectedConstructor { id: u32 },
    #[error("payload string is not valid utf-8")]
    BadUtf8,
}

pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Length-prefixed byte string, zero-padded so the total written length
    /// is a multiple of 4. Short strings use a 1-byte header, longer ones a
    /// 0xfe marker followed by a 3-byte little-endian length.
    pub fn write_bytes(&mut self, data: &[u8]) {
        let len = data.len();
        let header_len = if len <= 253 {
            self.buf.push(len as u8);
            1
        } else {
            self.buf.push(0xfe);
            self.buf.push((len & 0xff) as u8);
            self.buf.push(((len >> 8) & 0xff) as u8);
            self.buf.push(((len >> 16) & 0xff) as u8);
            4
        };
        self.buf.extend_from_slice(data);
        let padding = (4 - (header_len + len) % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(padding));
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        debug_assert_eq!(self.buf.len() % 4, 0);
        self.buf
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_byte(&mut self) -> Result<u8, WireError> {
        let byte = self
            .buf
            .get(self.pos)
            .copied()
            .ok_or(WireError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_exact(&mut self, out: &mut [u8]) -> Result<(), WireError> {
        let end = self.pos + out.len();
        if end > self.buf.len() {
            return Err(WireError::UnexpectedEof);
        }
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(i64::from_le_bytes(b))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let first = self.read_byte()?;
        let (len, header_len) = if first != 0xfe {
            (first as usize, 1)
        } else {
            let a = self.read_byte()? as usize;
            let b = self.read_byte()? as usize;
            let c = self.read_byte()? as usize;
            (a | (b << 8) | (c << 16), 4)
        };

        let mut data = vec![0u8; len];
        self.read_exact(&mut data)?;

        let padding = (4 - (header_len + len) % 4) % 4;
        for _ in 0..padding {
            self.read_byte()?;
        }
        Ok(data)
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| WireError::BadUtf8)
    }
}

/// The decrypted side-channel frame: a text plus its formatting entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPayload {
    pub text: String,
    pub entities: Vec<MessageEntity>,
}

impl TextPayload {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        writer.write_u32(TEXT_PAYLOAD_TAG);
        writer.write_string(&self.text);
        writer.write_i32(self.entities.len() as i32);
        for entity in &self.entities {
            write_entity(&mut writer, entity);
        }
        writer.finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = WireReader::new(bytes);
        let tag = reader.read_u32()?;
        if tag != TEXT_PAYLOAD_TAG {
            return Err(WireError::UnexpectedConstructor { id: tag });
        }
        let text = reader.read_string()?;
        let count = reader.read_i32()?;
        if count < 0 {
            return Err(WireError::UnexpectedEof);
        }
        let mut entities = Vec::with_capacity(count.min(128) as usize);
        for _ in 0..count {
            entities.push(read_entity(&mut reader)?);
        }
        Ok(Self { text, entities })
    }
}

fn write_entity(writer: &mut WireWriter, entity: &MessageEntity) {
    let (offset, length) = entity.span();
    let tag = match entity {
        MessageEntity::Bold { .. } => ENTITY_BOLD,
        MessageEntity::Italic { .. } => ENTITY_ITALIC,
        MessageEntity::Underline { .. } => ENTITY_UNDERLINE,
        MessageEntity::Strike { .. } => ENTITY_STRIKE,
        MessageEntity::Spoiler { .. } => ENTITY_SPOILER,
        MessageEntity::CustomEmoji { .. } => ENTITY_CUSTOM_EMOJI,
        MessageEntity::Mention { .. } => ENTITY_MENTION,
        MessageEntity::Code { .. } => ENTITY_CODE,
    };
    writer.write_u32(tag);
    writer.write_i32(offset);
    writer.write_i32(length);
    if let MessageEntity::CustomEmoji { document_id, .. } = entity {
        writer.write_i64(*document_id);
    }
}

fn read_entity(reader: &mut WireReader<'_>) -> Result<MessageEntity, WireError> {
    let tag = reader.read_u32()?;
    let offset = reader.read_i32()?;
    let length = reader.read_i32()?;
    Ok(match tag {
        ENTITY_BOLD => MessageEntity::Bold { offset, length },
        ENTITY_ITALIC => MessageEntity::Italic { offset, length },
        ENTITY_UNDERLINE => MessageEntity::Underline { offset, length },
        ENTITY_STRIKE => MessageEntity::Strike { offset, length },
        ENTITY_SPOILER => MessageEntity::Spoiler { offset, length },
        ENTITY_CUSTOM_EMOJI => MessageEntity::CustomEmoji {
            offset,
            length,
            document_id: reader.read_i64()?,
        },
        ENTITY_MENTION => MessageEntity::Mention { offset, length },
        ENTITY_CODE => MessageEntity::Code { offset, length },
        id => return Err(WireError::UnexpectedConstructor { id }),
    })
}

#[cfg(test)]
#[path = "tests/wire_tests.rs"]
mod tests;
