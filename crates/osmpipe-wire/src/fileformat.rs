//! The outer envelope messages of a PBF file: `BlobHeader` and `Blob`.
//!
//! A PBF file is a flat concatenation of frames:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ header_len   (u32, big-endian)                   │
//! │ BlobHeader   [header_len bytes]                  │
//! │ Blob         [BlobHeader.datasize bytes]         │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The length prefix itself is read by the frame reader; this module
//! decodes the two protobuf messages.

use crate::error::WireError;
use crate::field::FieldReader;

/// `BlobHeader` — names the payload type and its size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobHeader {
    /// "OSMHeader" for the first frame, "OSMData" after that.
    pub type_: String,
    /// Opaque index data some writers emit; carried but unused.
    pub indexdata: Option<Vec<u8>>,
    /// Length in bytes of the Blob message that follows.
    pub datasize: i32,
}

impl BlobHeader {
    /// Decode a `BlobHeader` message. Unknown fields are skipped.
    ///
    /// # Errors
    ///
    /// [`WireError::MissingField`] when `type` or `datasize` is absent.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut type_ = None;
        let mut indexdata = None;
        let mut datasize = None;

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => type_ = Some(field.string()?),
                2 => indexdata = Some(field.bytes()?.to_vec()),
                3 => datasize = Some(field.int32()?),
                _ => {}
            }
        }

        Ok(Self {
            type_: type_.ok_or(WireError::MissingField {
                message: "BlobHeader",
                field: "type",
            })?,
            indexdata,
            datasize: datasize.ok_or(WireError::MissingField {
                message: "BlobHeader",
                field: "datasize",
            })?,
        })
    }
}

/// `Blob` — one optionally compressed payload.
///
/// Exactly one of the payload fields should be set. The decompressor
/// dispatches on which one is present; `lzma_data` is recognized only to
/// be rejected, so its bytes are not retained.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blob {
    pub raw: Option<Vec<u8>>,
    /// Size of the payload after decompression. Required alongside
    /// `zlib_data`.
    pub raw_size: Option<i32>,
    pub zlib_data: Option<Vec<u8>>,
    /// Presence only — LZMA is unsupported.
    pub has_lzma_data: bool,
}

impl Blob {
    /// Decode a `Blob` message. Unknown fields are skipped.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut blob = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => blob.raw = Some(field.bytes()?.to_vec()),
                2 => blob.raw_size = Some(field.int32()?),
                3 => blob.zlib_data = Some(field.bytes()?.to_vec()),
                4 => {
                    field.bytes()?;
                    blob.has_lzma_data = true;
                }
                _ => {}
            }
        }

        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{encode_bytes_field, encode_int64_field, encode_string_field};

    #[test]
    fn blob_header_roundtrip() {
        let mut buf = Vec::new();
        encode_string_field(&mut buf, 1, "OSMData");
        encode_int64_field(&mut buf, 3, 1234);

        let header = BlobHeader::decode(&buf).unwrap();
        assert_eq!(header.type_, "OSMData");
        assert_eq!(header.datasize, 1234);
        assert!(header.indexdata.is_none());
    }

    #[test]
    fn blob_header_missing_type() {
        let mut buf = Vec::new();
        encode_int64_field(&mut buf, 3, 10);

        assert!(matches!(
            BlobHeader::decode(&buf),
            Err(WireError::MissingField {
                message: "BlobHeader",
                field: "type",
            })
        ));
    }

    #[test]
    fn blob_header_missing_datasize() {
        let mut buf = Vec::new();
        encode_string_field(&mut buf, 1, "OSMHeader");

        assert!(matches!(
            BlobHeader::decode(&buf),
            Err(WireError::MissingField {
                message: "BlobHeader",
                field: "datasize",
            })
        ));
    }

    #[test]
    fn blob_raw_payload() {
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 1, b"payload");

        let blob = Blob::decode(&buf).unwrap();
        assert_eq!(blob.raw.as_deref(), Some(&b"payload"[..]));
        assert!(blob.zlib_data.is_none());
        assert!(!blob.has_lzma_data);
    }

    #[test]
    fn blob_zlib_payload_with_raw_size() {
        let mut buf = Vec::new();
        encode_int64_field(&mut buf, 2, 100);
        encode_bytes_field(&mut buf, 3, &[1, 2, 3]);

        let blob = Blob::decode(&buf).unwrap();
        assert_eq!(blob.raw_size, Some(100));
        assert_eq!(blob.zlib_data.as_deref(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn blob_lzma_recorded_as_presence_only() {
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 4, &[9, 9, 9]);

        let blob = Blob::decode(&buf).unwrap();
        assert!(blob.has_lzma_data);
        assert!(blob.raw.is_none());
    }

    #[test]
    fn blob_empty_message() {
        let blob = Blob::decode(&[]).unwrap();
        assert_eq!(blob, Blob::default());
    }
}
