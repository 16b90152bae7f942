use crate::error::WireError;
use crate::varint::{decode_varint, decode_zigzag, encode_varint, encode_zigzag};

/// A decoded protobuf field value.
///
/// The wire type determines how the payload was read:
///
/// ```text
/// ┌──────┬──────────────────┬─────────────────────────────┐
/// │ Wire │ Variant          │ Payload                     │
/// ├──────┼──────────────────┼─────────────────────────────┤
/// │ 0    │ Varint(u64)      │ single varint               │
/// │ 1    │ Fixed64(u64)     │ 8 bytes little-endian       │
/// │ 2    │ Bytes(&[u8])     │ varint length + raw bytes   │
/// │ 5    │ Fixed32(u32)     │ 4 bytes little-endian       │
/// └──────┴──────────────────┴─────────────────────────────┘
/// ```
///
/// Wire types 3 and 4 (groups) do not occur in the OSMPBF schema family
/// and are rejected outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// A raw field before message-specific interpretation.
///
/// The caller matches on `number` to decide which struct field to
/// populate; unknown field numbers are skipped simply by ignoring the
/// yielded field — the reader has already consumed the payload.
#[derive(Clone, Copy, Debug)]
pub struct RawField<'a> {
    pub number: u32,
    pub value: FieldValue<'a>,
}

/// Cursor-based field reader for one protobuf message body.
///
/// Wraps a byte slice and yields fields one at a time until the buffer
/// is exhausted. Message decoders loop over `next_field`, match on the
/// field number, and fall through for anything unknown:
///
/// ```text
///   let mut reader = FieldReader::new(body);
///   while let Some(field) = reader.next_field()? {
///       match field.number {
///           1 => { /* handle field 1 */ }
///           _ => { /* skipped */ }
///       }
///   }
/// ```
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read the next field from the message body.
    ///
    /// Returns `Ok(None)` when the buffer is exhausted.
    ///
    /// # Errors
    ///
    /// [`WireError::UnexpectedEof`] on a truncated key or payload,
    /// [`WireError::UnknownWireType`] for group or reserved wire types.
    pub fn next_field(&mut self) -> Result<Option<RawField<'a>>, WireError> {
        let remaining = &self.buf[self.pos..];
        if remaining.is_empty() {
            return Ok(None);
        }

        let (key, key_len) = decode_varint(remaining).map_err(|e| self.rebase(e))?;
        self.pos += key_len;

        let number = (key >> 3) as u32;
        let wire_type = (key & 0x07) as u8;
        let payload = &self.buf[self.pos..];

        let value = match wire_type {
            0 => {
                let (v, n) = decode_varint(payload).map_err(|e| self.rebase(e))?;
                self.pos += n;
                FieldValue::Varint(v)
            }
            1 => {
                let bytes: [u8; 8] = payload
                    .get(..8)
                    .and_then(|s| s.try_into().ok())
                    .ok_or(WireError::UnexpectedEof { offset: self.pos })?;
                self.pos += 8;
                FieldValue::Fixed64(u64::from_le_bytes(bytes))
            }
            2 => {
                let (len, n) = decode_varint(payload).map_err(|e| self.rebase(e))?;
                let end = usize::try_from(len)
                    .ok()
                    .and_then(|len| n.checked_add(len))
                    .ok_or(WireError::UnexpectedEof { offset: self.pos })?;
                let data = payload
                    .get(n..end)
                    .ok_or(WireError::UnexpectedEof { offset: self.pos })?;
                self.pos += end;
                FieldValue::Bytes(data)
            }
            5 => {
                let bytes: [u8; 4] = payload
                    .get(..4)
                    .and_then(|s| s.try_into().ok())
                    .ok_or(WireError::UnexpectedEof { offset: self.pos })?;
                self.pos += 4;
                FieldValue::Fixed32(u32::from_le_bytes(bytes))
            }
            other => {
                return Err(WireError::UnknownWireType {
                    field: number,
                    value: other,
                })
            }
        };

        Ok(Some(RawField { number, value }))
    }

    /// Offsets from `decode_varint` are relative to the slice it saw.
    fn rebase(&self, err: WireError) -> WireError {
        match err {
            WireError::UnexpectedEof { offset } => WireError::UnexpectedEof {
                offset: self.pos + offset,
            },
            other => other,
        }
    }
}

impl<'a> RawField<'a> {
    /// The raw varint payload (wire type 0).
    pub fn varint(&self) -> Result<u64, WireError> {
        match self.value {
            FieldValue::Varint(v) => Ok(v),
            _ => Err(WireError::WrongType { field: self.number }),
        }
    }

    /// int64: a plain varint reinterpreted as two's complement.
    pub fn int64(&self) -> Result<i64, WireError> {
        Ok(self.varint()? as i64)
    }

    /// int32: negative values occupy the full 10-byte varint and truncate.
    pub fn int32(&self) -> Result<i32, WireError> {
        Ok(self.varint()? as i64 as i32)
    }

    /// uint32.
    pub fn uint32(&self) -> Result<u32, WireError> {
        Ok(self.varint()? as u32)
    }

    /// sint64: zigzag-decoded varint.
    pub fn sint64(&self) -> Result<i64, WireError> {
        Ok(decode_zigzag(self.varint()?))
    }

    /// bool.
    pub fn bool(&self) -> Result<bool, WireError> {
        Ok(self.varint()? != 0)
    }

    /// The raw bytes payload (wire type 2).
    pub fn bytes(&self) -> Result<&'a [u8], WireError> {
        match self.value {
            FieldValue::Bytes(b) => Ok(b),
            _ => Err(WireError::WrongType { field: self.number }),
        }
    }

    /// A UTF-8 string payload.
    pub fn string(&self) -> Result<String, WireError> {
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8 { field: self.number })
    }

    /// Append a `repeated sint64 [packed]` field.
    ///
    /// Protobuf allows repeated scalars to arrive packed (one
    /// length-delimited run) or unpacked (one varint per occurrence);
    /// conforming decoders accept both, so all the packed helpers do.
    pub fn packed_sint64_into(&self, out: &mut Vec<i64>) -> Result<(), WireError> {
        self.packed_into(out, decode_zigzag)
    }

    /// Append a `repeated int64 [packed]` field.
    pub fn packed_int64_into(&self, out: &mut Vec<i64>) -> Result<(), WireError> {
        self.packed_into(out, |v| v as i64)
    }

    /// Append a `repeated int32 [packed]` field.
    pub fn packed_int32_into(&self, out: &mut Vec<i32>) -> Result<(), WireError> {
        self.packed_into(out, |v| v as i64 as i32)
    }

    /// Append a `repeated sint32 [packed]` field.
    pub fn packed_sint32_into(&self, out: &mut Vec<i32>) -> Result<(), WireError> {
        self.packed_into(out, |v| decode_zigzag(v) as i32)
    }

    /// Append a `repeated uint32 [packed]` field.
    pub fn packed_uint32_into(&self, out: &mut Vec<u32>) -> Result<(), WireError> {
        self.packed_into(out, |v| v as u32)
    }

    /// Append a `repeated bool [packed]` field.
    pub fn packed_bool_into(&self, out: &mut Vec<bool>) -> Result<(), WireError> {
        self.packed_into(out, |v| v != 0)
    }

    fn packed_into<T>(&self, out: &mut Vec<T>, map: impl Fn(u64) -> T) -> Result<(), WireError> {
        match self.value {
            FieldValue::Varint(v) => {
                out.push(map(v));
                Ok(())
            }
            FieldValue::Bytes(mut data) => {
                while !data.is_empty() {
                    let (v, n) = decode_varint(data)?;
                    out.push(map(v));
                    data = &data[n..];
                }
                Ok(())
            }
            _ => Err(WireError::WrongType { field: self.number }),
        }
    }
}

// ── Encoding helpers ──────────────────────────────────────────────────
//
// Used by the test fixtures to assemble OSMPBF messages byte by byte.
// The decoder never calls these; PBF writing is not a feature of this
// library.

fn push_key(buf: &mut Vec<u8>, number: u32, wire_type: u8) {
    encode_varint(buf, (u64::from(number) << 3) | u64::from(wire_type));
}

/// Encode a varint field (wire type 0).
pub fn encode_varint_field(buf: &mut Vec<u8>, number: u32, value: u64) {
    push_key(buf, number, 0);
    encode_varint(buf, value);
}

/// Encode an int64/int32 field: negative values as full-width varints.
pub fn encode_int64_field(buf: &mut Vec<u8>, number: u32, value: i64) {
    encode_varint_field(buf, number, value as u64);
}

/// Encode a sint64 field (zigzag varint).
pub fn encode_sint64_field(buf: &mut Vec<u8>, number: u32, value: i64) {
    encode_varint_field(buf, number, encode_zigzag(value));
}

/// Encode a length-delimited field (wire type 2).
pub fn encode_bytes_field(buf: &mut Vec<u8>, number: u32, data: &[u8]) {
    push_key(buf, number, 2);
    encode_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Encode a string field.
pub fn encode_string_field(buf: &mut Vec<u8>, number: u32, value: &str) {
    encode_bytes_field(buf, number, value.as_bytes());
}

/// Encode a packed repeated sint64 field.
pub fn encode_packed_sint64(buf: &mut Vec<u8>, number: u32, values: &[i64]) {
    let mut packed = Vec::new();
    for &v in values {
        encode_varint(&mut packed, encode_zigzag(v));
    }
    encode_bytes_field(buf, number, &packed);
}

/// Encode a packed repeated int64 field.
pub fn encode_packed_int64(buf: &mut Vec<u8>, number: u32, values: &[i64]) {
    let mut packed = Vec::new();
    for &v in values {
        encode_varint(&mut packed, v as u64);
    }
    encode_bytes_field(buf, number, &packed);
}

/// Encode a packed repeated int32 field.
pub fn encode_packed_int32(buf: &mut Vec<u8>, number: u32, values: &[i32]) {
    let mut packed = Vec::new();
    for &v in values {
        encode_varint(&mut packed, i64::from(v) as u64);
    }
    encode_bytes_field(buf, number, &packed);
}

/// Encode a packed repeated sint32 field.
pub fn encode_packed_sint32(buf: &mut Vec<u8>, number: u32, values: &[i32]) {
    let mut packed = Vec::new();
    for &v in values {
        encode_varint(&mut packed, encode_zigzag(i64::from(v)));
    }
    encode_bytes_field(buf, number, &packed);
}

/// Encode a packed repeated uint32 field.
pub fn encode_packed_uint32(buf: &mut Vec<u8>, number: u32, values: &[u32]) {
    let mut packed = Vec::new();
    for &v in values {
        encode_varint(&mut packed, u64::from(v));
    }
    encode_bytes_field(buf, number, &packed);
}

/// Encode a packed repeated bool field.
pub fn encode_packed_bool(buf: &mut Vec<u8>, number: u32, values: &[bool]) {
    let mut packed = Vec::new();
    for &v in values {
        encode_varint(&mut packed, u64::from(v));
    }
    encode_bytes_field(buf, number, &packed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_returns_none() {
        let mut reader = FieldReader::new(&[]);
        assert!(reader.next_field().unwrap().is_none());
    }

    #[test]
    fn reads_varint_field() {
        let mut buf = Vec::new();
        encode_varint_field(&mut buf, 1, 42);

        let mut reader = FieldReader::new(&buf);
        let field = reader.next_field().unwrap().unwrap();
        assert_eq!(field.number, 1);
        assert_eq!(field.varint().unwrap(), 42);
        assert!(reader.next_field().unwrap().is_none());
    }

    #[test]
    fn reads_bytes_field() {
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 2, b"hello");

        let mut reader = FieldReader::new(&buf);
        let field = reader.next_field().unwrap().unwrap();
        assert_eq!(field.number, 2);
        assert_eq!(field.bytes().unwrap(), b"hello");
    }

    #[test]
    fn reads_fixed_width_fields() {
        let mut buf = Vec::new();
        push_key(&mut buf, 3, 1);
        buf.extend_from_slice(&0xDEAD_BEEF_u64.to_le_bytes());
        push_key(&mut buf, 4, 5);
        buf.extend_from_slice(&7_u32.to_le_bytes());

        let mut reader = FieldReader::new(&buf);
        let f3 = reader.next_field().unwrap().unwrap();
        assert_eq!(f3.value, FieldValue::Fixed64(0xDEAD_BEEF));
        let f4 = reader.next_field().unwrap().unwrap();
        assert_eq!(f4.value, FieldValue::Fixed32(7));
        assert!(reader.next_field().unwrap().is_none());
    }

    #[test]
    fn skips_unknown_fields_by_ignoring_them() {
        let mut buf = Vec::new();
        encode_varint_field(&mut buf, 99, 1);
        encode_bytes_field(&mut buf, 100, &[0xAB; 32]);
        encode_varint_field(&mut buf, 1, 7);

        let mut reader = FieldReader::new(&buf);
        let mut known = None;
        while let Some(field) = reader.next_field().unwrap() {
            if field.number == 1 {
                known = Some(field.varint().unwrap());
            }
        }
        assert_eq!(known, Some(7));
    }

    #[test]
    fn group_wire_type_rejected() {
        let mut buf = Vec::new();
        push_key(&mut buf, 1, 3);

        let mut reader = FieldReader::new(&buf);
        assert!(matches!(
            reader.next_field(),
            Err(WireError::UnknownWireType { field: 1, value: 3 })
        ));
    }

    #[test]
    fn truncated_payload_rejected() {
        let mut buf = Vec::new();
        push_key(&mut buf, 2, 2);
        encode_varint(&mut buf, 100); // claims 100 bytes, provides none

        let mut reader = FieldReader::new(&buf);
        assert!(matches!(
            reader.next_field(),
            Err(WireError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn negative_int32_roundtrip() {
        let mut buf = Vec::new();
        encode_int64_field(&mut buf, 4, -1);

        let mut reader = FieldReader::new(&buf);
        let field = reader.next_field().unwrap().unwrap();
        assert_eq!(field.int32().unwrap(), -1);
    }

    #[test]
    fn packed_sint64_roundtrip() {
        let mut buf = Vec::new();
        encode_packed_sint64(&mut buf, 8, &[10, -3, 5]);

        let mut reader = FieldReader::new(&buf);
        let field = reader.next_field().unwrap().unwrap();
        let mut out = Vec::new();
        field.packed_sint64_into(&mut out).unwrap();
        assert_eq!(out, vec![10, -3, 5]);
    }

    #[test]
    fn packed_accepts_unpacked_encoding() {
        // Three unpacked occurrences of a repeated sint64 field
        let mut buf = Vec::new();
        encode_sint64_field(&mut buf, 8, 10);
        encode_sint64_field(&mut buf, 8, -3);
        encode_sint64_field(&mut buf, 8, 5);

        let mut reader = FieldReader::new(&buf);
        let mut out = Vec::new();
        while let Some(field) = reader.next_field().unwrap() {
            field.packed_sint64_into(&mut out).unwrap();
        }
        assert_eq!(out, vec![10, -3, 5]);
    }

    #[test]
    fn wrong_type_accessor_rejected() {
        let mut buf = Vec::new();
        encode_varint_field(&mut buf, 1, 42);

        let mut reader = FieldReader::new(&buf);
        let field = reader.next_field().unwrap().unwrap();
        assert!(matches!(
            field.bytes(),
            Err(WireError::WrongType { field: 1 })
        ));
    }

    #[test]
    fn invalid_utf8_string_rejected() {
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 1, &[0xFF, 0xFE]);

        let mut reader = FieldReader::new(&buf);
        let field = reader.next_field().unwrap().unwrap();
        assert!(matches!(
            field.string(),
            Err(WireError::InvalidUtf8 { field: 1 })
        ));
    }
}
