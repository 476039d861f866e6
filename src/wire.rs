//! Wire-format primitives: tags, varints, zigzag and fixed-width little-endian values.

use crate::error::DecodeError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Longest legal varint encoding of a 64-bit value.
pub const MAX_VARINT_BYTES: usize = 10;

/// Largest field number the tag format can carry.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Record kinds. Group start/end (3/4) are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_u8(v: u8) -> Option<WireType> {
        match v {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// Raw payload of one record, before any type interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Len(Vec<u8>),
}

impl WireValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Varint(_) => WireType::Varint,
            WireValue::Fixed64(_) => WireType::Fixed64,
            WireValue::Fixed32(_) => WireType::Fixed32,
            WireValue::Len(_) => WireType::LengthDelimited,
        }
    }
}

pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Bounds-checked reader over one message body.
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader {
            cursor: Cursor::new(data),
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining_len(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining_len() == 0
    }

    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let start = self.position();
        let mut result: u64 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self
                .cursor
                .read_u8()
                .map_err(|_| DecodeError::UnexpectedEof { offset: start, context })?;
            let bits = (byte & 0x7f) as u64;
            if i == MAX_VARINT_BYTES - 1 && bits > 1 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
            result |= bits << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(DecodeError::VarintTooLong { offset: start })
    }

    /// Read a record key: field number and wire type.
    pub fn read_tag(&mut self) -> Result<(u32, WireType), DecodeError> {
        let offset = self.position();
        let key = self.read_varint("field tag")?;
        let wire_type = (key & 0x7) as u8;
        let field_num = key >> 3;
        if field_num == 0 || field_num > MAX_FIELD_NUMBER as u64 {
            return Err(DecodeError::InvalidFieldNumber { field_num, offset });
        }
        let wire = WireType::from_u8(wire_type)
            .ok_or(DecodeError::UnsupportedWireType { wire_type, offset })?;
        Ok((field_num as u32, wire))
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let offset = self.position();
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| DecodeError::UnexpectedEof { offset, context: "fixed32 value" })
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let offset = self.position();
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| DecodeError::UnexpectedEof { offset, context: "fixed64 value" })
    }

    /// Read a length prefix and borrow that many bytes.
    pub fn read_len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let offset = self.position();
        let len = self.read_varint("length prefix")?;
        let remaining = self.remaining_len();
        if len > remaining as u64 {
            return Err(DecodeError::LengthOverrun { offset, len, remaining });
        }
        let start = self.position();
        let end = start + len as usize;
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position(end as u64);
        Ok(&data[start..end])
    }

    pub fn read_value(&mut self, wire: WireType) -> Result<WireValue, DecodeError> {
        Ok(match wire {
            WireType::Varint => WireValue::Varint(self.read_varint("varint value")?),
            WireType::Fixed64 => WireValue::Fixed64(self.read_fixed64()?),
            WireType::Fixed32 => WireValue::Fixed32(self.read_fixed32()?),
            WireType::LengthDelimited => WireValue::Len(self.read_len_delimited()?.to_vec()),
        })
    }
}

pub fn write_varint(w: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        w.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    w.push(v as u8);
}

pub fn write_tag(w: &mut Vec<u8>, field_num: u32, wire: WireType) {
    write_varint(w, ((field_num as u64) << 3) | wire as u64);
}

pub fn write_len_delimited(w: &mut Vec<u8>, payload: &[u8]) {
    write_varint(w, payload.len() as u64);
    w.extend_from_slice(payload);
}

/// Write one complete record.
pub fn write_record(w: &mut Vec<u8>, field_num: u32, value: &WireValue) {
    write_tag(w, field_num, value.wire_type());
    match value {
        WireValue::Varint(v) => write_varint(w, *v),
        // Writing into a Vec cannot fail.
        WireValue::Fixed64(v) => {
            let _ = w.write_u64::<LittleEndian>(*v);
        }
        WireValue::Fixed32(v) => {
            let _ = w.write_u32::<LittleEndian>(*v);
        }
        WireValue::Len(payload) => write_len_delimited(w, payload),
    }
}
