use osmpipe_wire::WireError;

/// Errors raised anywhere between the raw byte stream and the output
/// arena.
///
/// The variants group into the layers a blob passes through:
///
/// ```text
///   DecodeError
///   ├── framing        ← EofBeforeHeader, UnexpectedEof,
///   │                     BlobHeaderTooLarge, BlobTooLarge,
///   │                     UnexpectedBlobType
///   ├── decompression  ← Inflate, RawSizeMismatch, MissingRawSize,
///   │                     UnsupportedCompression, EmptyBlob
///   ├── protobuf       ← Wire (from osmpipe-wire)
///   ├── semantic       ← StringIndex, DenseMisaligned,
///   │                     UnknownMemberType, UnknownGroup,
///   │                     UnsupportedFeature, NumericOverflow
///   └── plumbing       ← Io, WorkerLost, NotOpened
/// ```
///
/// Every variant is fatal for the stream: PBF decode failures imply a
/// corrupt input and nothing is retried. Buffers already decoded before
/// the failure remain deliverable; cancellation is not an error at all.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before the first frame — a PBF file must open
    /// with an OSMHeader blob.
    #[error("EOF before OSMHeader")]
    EofBeforeHeader,

    /// The input ended inside a frame.
    #[error("unexpected EOF inside a blob frame")]
    UnexpectedEof,

    /// The 4-byte length prefix announced a BlobHeader above the
    /// 32 KiB cap.
    #[error("blob header of {size} bytes exceeds the 32 KiB limit")]
    BlobHeaderTooLarge { size: u32 },

    /// A blob's payload size (compressed or declared uncompressed)
    /// exceeds the 32 MiB cap, or is negative.
    #[error("blob of {size} bytes exceeds the 32 MiB limit")]
    BlobTooLarge { size: i64 },

    /// A frame carried the wrong blob type — OSMHeader must come
    /// first and exactly once, OSMData everywhere after.
    #[error("expected {expected} blob, found {actual:?}")]
    UnexpectedBlobType {
        expected: &'static str,
        actual: String,
    },

    /// zlib inflation failed.
    #[error("zlib inflation failed: {0}")]
    Inflate(String),

    /// Inflation produced a different byte count than `raw_size`
    /// declared.
    #[error("decompressed to {actual} bytes, expected {expected}")]
    RawSizeMismatch { expected: usize, actual: usize },

    /// A zlib blob without the mandatory `raw_size` field.
    #[error("compressed blob is missing raw_size")]
    MissingRawSize,

    /// The blob uses LZMA, which this reader rejects.
    #[error("unsupported compression")]
    UnsupportedCompression,

    /// The blob has no payload field at all.
    #[error("blob contains no data")]
    EmptyBlob,

    /// A malformed protobuf message.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A key, value, user or role index pointed outside the block's
    /// string table, or the entry was not UTF-8.
    #[error("string table index {index} out of range (table has {len} entries)")]
    StringIndex { index: i64, len: usize },

    /// Dense-node parallel arrays disagree about the node count, or the
    /// keys_vals stream does not carry one 0 sentinel per node.
    #[error("dense nodes misaligned: {0}")]
    DenseMisaligned(&'static str),

    /// Parallel arrays of a plain entity (tag keys/values, relation
    /// member columns) have differing lengths.
    #[error("parallel arrays disagree: {0}")]
    ParallelArrays(&'static str),

    /// A relation member type outside {node, way, relation}.
    #[error("unknown relation member type {value}")]
    UnknownMemberType { value: i32 },

    /// A primitive group carrying none of the four entity kinds.
    #[error("group of unknown type")]
    UnknownGroup,

    /// The header demands a feature this reader does not implement.
    #[error("required feature not supported: {feature}")]
    UnsupportedFeature { feature: String },

    /// A delta accumulator or coordinate computation overflowed i64.
    #[error("integer overflow while decoding")]
    NumericOverflow,

    /// An I/O failure in the underlying byte source.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A worker died without resolving its result slot.
    #[error("decoder worker terminated unexpectedly")]
    WorkerLost,

    /// `read()` was called before `open()`.
    #[error("reader is not open")]
    NotOpened,
}
