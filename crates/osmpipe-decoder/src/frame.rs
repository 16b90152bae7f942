//! Blob framing: the `[length][BlobHeader][Blob]` envelope.

use osmpipe_wire::fileformat::BlobHeader;
use tracing::trace;

use crate::byte_stream::ByteStream;
use crate::error::DecodeError;

/// Cap on the size of a serialized `BlobHeader` (2¹⁵ bytes).
pub const MAX_BLOB_HEADER_SIZE: u32 = 32 * 1024;

/// Cap on a blob payload, applied to the compressed bytes on the wire
/// and again to the declared uncompressed size (2²⁵ bytes).
pub const MAX_UNCOMPRESSED_BLOB_SIZE: i64 = 32 * 1024 * 1024;

/// The two blob types a PBF stream may carry, in the order it must
/// carry them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobType {
    /// "OSMHeader" — the first frame, exactly once.
    Header,
    /// "OSMData" — every frame after the first.
    Data,
}

impl BlobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "OSMHeader",
            Self::Data => "OSMData",
        }
    }
}

/// One frame's raw `Blob` message bytes plus its position in the
/// stream. The index is what the pipeline orders results by.
#[derive(Debug)]
pub struct RawFrame {
    pub index: u64,
    pub data: Vec<u8>,
}

/// Sequential frame reader over a [`ByteStream`].
///
/// Each call reads one complete frame: the big-endian length prefix,
/// the `BlobHeader`, and the raw `Blob` bytes, validating the size caps
/// and the expected blob type along the way. Any violation is fatal for
/// the stream — there is no resynchronization in PBF.
pub struct FrameReader {
    stream: ByteStream,
    next_index: u64,
}

impl FrameReader {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            next_index: 0,
        }
    }

    /// Read the next frame, or `None` on clean EOF at a frame boundary.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::BlobHeaderTooLarge`] / [`DecodeError::BlobTooLarge`]
    ///   on cap violations;
    /// - [`DecodeError::UnexpectedBlobType`] when the frame's type does
    ///   not match `expected`;
    /// - [`DecodeError::UnexpectedEof`] on a truncated frame.
    pub fn next_frame(&mut self, expected: BlobType) -> Result<Option<RawFrame>, DecodeError> {
        let mut len_buf = [0u8; 4];
        if !self.stream.read_exact(&mut len_buf)? {
            return Ok(None);
        }

        let header_len = u32::from_be_bytes(len_buf);
        if header_len > MAX_BLOB_HEADER_SIZE {
            return Err(DecodeError::BlobHeaderTooLarge { size: header_len });
        }

        let mut header_buf = vec![0u8; header_len as usize];
        if !self.stream.read_exact(&mut header_buf)? {
            return Err(DecodeError::UnexpectedEof);
        }
        let header = BlobHeader::decode(&header_buf)?;

        if header.type_ != expected.as_str() {
            return Err(DecodeError::UnexpectedBlobType {
                expected: expected.as_str(),
                actual: header.type_,
            });
        }

        let datasize = i64::from(header.datasize);
        if datasize < 0 || datasize > MAX_UNCOMPRESSED_BLOB_SIZE {
            return Err(DecodeError::BlobTooLarge { size: datasize });
        }

        let mut data = vec![0u8; datasize as usize];
        if !self.stream.read_exact(&mut data)? && datasize > 0 {
            return Err(DecodeError::UnexpectedEof);
        }

        let index = self.next_index;
        self.next_index += 1;
        trace!(index, datasize, "frame read");

        Ok(Some(RawFrame { index, data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmpipe_wire::field::{encode_int64_field, encode_string_field};

    fn frame_bytes(type_: &str, blob: &[u8]) -> Vec<u8> {
        let mut header = Vec::new();
        encode_string_field(&mut header, 1, type_);
        encode_int64_field(&mut header, 3, blob.len() as i64);

        let mut out = Vec::new();
        out.extend_from_slice(&(header.len() as u32).to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(blob);
        out
    }

    fn reader(bytes: Vec<u8>) -> FrameReader {
        FrameReader::new(ByteStream::from_read(std::io::Cursor::new(bytes)))
    }

    #[test]
    fn reads_frames_with_increasing_indices() {
        let mut bytes = frame_bytes("OSMData", b"one");
        bytes.extend_from_slice(&frame_bytes("OSMData", b"two!"));

        let mut frames = reader(bytes);
        let first = frames.next_frame(BlobType::Data).unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.data, b"one");
        let second = frames.next_frame(BlobType::Data).unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.data, b"two!");
        assert!(frames.next_frame(BlobType::Data).unwrap().is_none());
    }

    #[test]
    fn empty_stream_yields_none() {
        let mut frames = reader(Vec::new());
        assert!(frames.next_frame(BlobType::Header).unwrap().is_none());
    }

    #[test]
    fn type_mismatch_rejected() {
        let bytes = frame_bytes("OSMData", b"x");
        let mut frames = reader(bytes);
        let err = frames.next_frame(BlobType::Header).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnexpectedBlobType {
                expected: "OSMHeader",
                ..
            }
        ));
    }

    #[test]
    fn oversize_header_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(MAX_BLOB_HEADER_SIZE + 1).to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);

        let mut frames = reader(bytes);
        assert!(matches!(
            frames.next_frame(BlobType::Header),
            Err(DecodeError::BlobHeaderTooLarge { .. })
        ));
    }

    #[test]
    fn oversize_datasize_rejected() {
        let mut header = Vec::new();
        encode_string_field(&mut header, 1, "OSMData");
        encode_int64_field(&mut header, 3, MAX_UNCOMPRESSED_BLOB_SIZE + 1);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(header.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&header);

        let mut frames = reader(bytes);
        assert!(matches!(
            frames.next_frame(BlobType::Data),
            Err(DecodeError::BlobTooLarge { .. })
        ));
    }

    #[test]
    fn truncated_blob_rejected() {
        let mut bytes = frame_bytes("OSMData", b"full payload");
        bytes.truncate(bytes.len() - 4);

        let mut frames = reader(bytes);
        assert!(matches!(
            frames.next_frame(BlobType::Data),
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn truncated_length_prefix_rejected() {
        let mut frames = reader(vec![0, 0]);
        assert!(matches!(
            frames.next_frame(BlobType::Data),
            Err(DecodeError::UnexpectedEof)
        ));
    }
}
