//! The data model of the osmpipe decoder: fixed-precision locations,
//! the entity output arena with its builders and borrowed views, and
//! the file-header metadata record.
//!
//! Nothing in this crate touches the wire or spawns threads; it is the
//! vocabulary shared between the decoder and its consumers.

#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

pub mod arena;
pub mod entity;
pub mod file_header;
pub mod location;

pub use arena::{Arena, NodeBuilder, RelationBuilder, WayBuilder, DEFAULT_ARENA_CAPACITY};
pub use entity::{Entity, Member, MemberType, Node, Relation, Way};
pub use file_header::FileHeader;
pub use location::{BoundingBox, InvalidLocation, Location};
