//! A pipelined decoder for the OpenStreetMap PBF format.
//!
//! The decoder overlaps I/O, zlib decompression and protobuf parsing
//! across threads while delivering output strictly in input order:
//!
//! ```text
//!   byte source → frame reader ──(blob, index)──▶ worker pool
//!                                                     │
//!                     ordered slot queue ◀────────────┘
//!                            │
//!                            ▼
//!            consumer: read() → Arena, in input order
//! ```
//!
//! Entry point: [`PbfReader`]. `open()` ingests the OSMHeader and
//! returns file metadata; `read()` blocks for the next arena of decoded
//! entities; an empty arena means EOF.

#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::missing_errors_doc
)]

pub mod block;
pub mod byte_stream;
pub mod decompress;
pub mod error;
pub mod frame;
pub mod header;
pub mod pipeline;
pub mod reader;

pub use error::DecodeError;
pub use frame::{BlobType, FrameReader, MAX_BLOB_HEADER_SIZE, MAX_UNCOMPRESSED_BLOB_SIZE};
pub use pipeline::{Concurrency, ThreadPool};
pub use reader::{PbfReader, PbfReaderBuilder, ReadTypes};
