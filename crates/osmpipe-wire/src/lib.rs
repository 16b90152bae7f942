//! Wire-level decoding for the OpenStreetMap PBF format.
//!
//! This crate owns the raw byte layer: LEB128 varints, zigzag mapping,
//! a cursor-based protobuf field reader, and hand-decoded structs for
//! the OSMPBF message family (`BlobHeader`/`Blob` envelopes plus the
//! `HeaderBlock`/`PrimitiveBlock` payloads). It has no opinion about
//! threading, compression, or entity semantics — that lives in
//! `osmpipe-decoder`.

#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

pub mod error;
pub mod field;
pub mod fileformat;
pub mod osmformat;
pub mod varint;

pub use error::WireError;
