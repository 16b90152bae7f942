/// Errors raised while decoding wire-level bytes.
///
/// These cover the raw protobuf layer only: varints, field keys, and the
/// hand-decoded OSMPBF messages built on top of them. Anything semantic
/// (string-table bounds, delta overflow, group dispatch) lives in the
/// decoder crate's error type, which wraps this one.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The input ended before the current varint, field, or payload was
    /// complete. `offset` is the position within the buffer being parsed
    /// at the time of failure.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// More than 10 bytes were consumed without finding a terminating
    /// varint byte.
    #[error("varint exceeds 10 bytes")]
    VarintTooLong,

    /// A field key carried a wire type this format never uses
    /// (groups, or the reserved values 6 and 7).
    #[error("unsupported wire type {value} in field {field}")]
    UnknownWireType { field: u32, value: u8 },

    /// A known field was encoded with the wrong wire type, e.g. a
    /// length-delimited payload where a varint was expected.
    #[error("field {field} has mismatched wire type")]
    WrongType { field: u32 },

    /// A required field of a message was absent.
    #[error("missing required field {field} in {message}")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    /// A string field contained bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in field {field}")]
    InvalidUtf8 { field: u32 },
}
