//! Blob payload extraction: raw pass-through or zlib inflation.

use std::io::Read;

use flate2::read::ZlibDecoder;
use osmpipe_wire::fileformat::Blob;

use crate::error::DecodeError;
use crate::frame::MAX_UNCOMPRESSED_BLOB_SIZE;

/// Decode a raw `Blob` message and produce its uncompressed payload.
///
/// Dispatch follows the payload field that is present: `raw` passes
/// through, `zlib_data` inflates to exactly `raw_size` bytes, LZMA is
/// rejected, and a blob with no payload at all is an error.
///
/// # Errors
///
/// - [`DecodeError::UnsupportedCompression`] for LZMA payloads;
/// - [`DecodeError::MissingRawSize`] for zlib without `raw_size`;
/// - [`DecodeError::BlobTooLarge`] when `raw_size` (or a raw payload)
///   exceeds the 32 MiB cap;
/// - [`DecodeError::Inflate`] / [`DecodeError::RawSizeMismatch`] when
///   inflation fails or yields the wrong byte count;
/// - [`DecodeError::EmptyBlob`] when no payload field is set.
pub fn decode_blob_payload(frame_data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let blob = Blob::decode(frame_data)?;

    if let Some(raw) = blob.raw {
        if raw.len() as i64 > MAX_UNCOMPRESSED_BLOB_SIZE {
            return Err(DecodeError::BlobTooLarge {
                size: raw.len() as i64,
            });
        }
        return Ok(raw);
    }

    if let Some(zlib_data) = blob.zlib_data {
        let raw_size = blob.raw_size.ok_or(DecodeError::MissingRawSize)?;
        if i64::from(raw_size) < 0 || i64::from(raw_size) > MAX_UNCOMPRESSED_BLOB_SIZE {
            return Err(DecodeError::BlobTooLarge {
                size: i64::from(raw_size),
            });
        }
        let raw_size = raw_size as usize;

        let mut out = Vec::with_capacity(raw_size);
        let mut decoder = ZlibDecoder::new(zlib_data.as_slice());
        // One byte past the declared size is enough to detect oversize
        // output without inflating a bomb to completion.
        decoder
            .by_ref()
            .take(raw_size as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| DecodeError::Inflate(e.to_string()))?;

        if out.len() != raw_size {
            return Err(DecodeError::RawSizeMismatch {
                expected: raw_size,
                actual: out.len(),
            });
        }
        return Ok(out);
    }

    if blob.has_lzma_data {
        return Err(DecodeError::UnsupportedCompression);
    }

    Err(DecodeError::EmptyBlob)
}
