//! The output arena: one blob's worth of decoded entities in a single
//! contiguous, append-only byte region.
//!
//! Entities are variable-length records laid out back-to-back, each
//! padded so the next record starts on an 8-byte boundary:
//!
//! ```text
//! ┌────────┬──────┬─────────────────────────────────────────────┐
//! │ Offset │ Size │ Field                                       │
//! ├────────┼──────┼─────────────────────────────────────────────┤
//! │ 0      │ 4    │ record_len (unpadded, little-endian u32)    │
//! │ 4      │ 1    │ type_tag (1 node, 2 way, 3 relation)        │
//! │ 5      │ 3    │ reserved                                    │
//! │ 8      │ 8    │ id (i64)                                    │
//! │ 16     │ 8    │ timestamp (i64, seconds)                    │
//! │ 24     │ 4    │ version_visible (bit 31 = deleted)          │
//! │ 28     │ 4    │ uid (u32)                                   │
//! │ 32     │ 4    │ changeset (i32)                             │
//! │ 36     │ 8    │ nodes only: lon (i32), lat (i32)            │
//! └────────┴──────┴─────────────────────────────────────────────┘
//! ```
//!
//! After the fixed prefix come nested length-prefixed sections, always
//! in the same order: the user string, the tag list, then (ways) the
//! ref list or (relations) the member list.
//!
//! A record becomes visible to iteration only once its builder commits;
//! dropping a builder without committing rolls the arena back to the
//! last committed record, so a failed decode never leaks half an entity.

use crate::entity::{Entity, MemberType};
use crate::location::Location;

/// Default initial capacity of a block arena (10 MB — a typical blob's
/// entities fit without reallocation).
pub const DEFAULT_ARENA_CAPACITY: usize = 10 * 1000 * 1000;

pub(crate) const TAG_NODE: u8 = 1;
pub(crate) const TAG_WAY: u8 = 2;
pub(crate) const TAG_RELATION: u8 = 3;

/// Byte offsets within the fixed record prefix.
pub(crate) mod offset {
    pub const RECORD_LEN: usize = 0;
    pub const TYPE_TAG: usize = 4;
    pub const ID: usize = 8;
    pub const TIMESTAMP: usize = 16;
    pub const VERSION_VISIBLE: usize = 24;
    pub const UID: usize = 28;
    pub const CHANGESET: usize = 32;
    pub const NODE_LON: usize = 36;
    pub const NODE_LAT: usize = 40;
    pub const NODE_FIXED_END: usize = 44;
    pub const FIXED_END: usize = 36;
}

/// Bit 31 of `version_visible` marks a deleted entity.
pub(crate) const DELETED_BIT: u32 = 1 << 31;

#[inline]
fn align_up(n: usize) -> usize {
    (n + 7) & !7
}

/// An append-only buffer of decoded entities, consumed as a stream.
///
/// One arena holds the output of one PBF blob. Ownership transfers
/// whole — worker to queue to consumer — and iteration yields entities
/// in exactly the order they were appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena {
    buf: Vec<u8>,
    committed: usize,
}

impl Arena {
    /// A new arena with the default 10 MB capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }

    /// A new arena with an explicit initial capacity (tests use small
    /// ones; capacity grows geometrically either way).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            committed: 0,
        }
    }

    /// An arena containing no entities — the EOF signal.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_capacity(0)
    }

    /// True when no committed entities are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    /// Total committed bytes.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed
    }

    /// Iterate committed entities in append order.
    #[must_use]
    pub fn iter(&self) -> Entities<'_> {
        Entities {
            buf: &self.buf[..self.committed],
            pos: 0,
        }
    }

    // ── byte plumbing used by the builders ───────────────────────────

    fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u32_at(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn write_i32_at(&mut self, at: usize, v: i32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn write_i64_at(&mut self, at: usize, v: i64) {
        self.buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn push_str(&mut self, s: &str) {
        self.push_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a Arena {
    type Item = Entity<'a>;
    type IntoIter = Entities<'a>;

    fn into_iter(self) -> Entities<'a> {
        self.iter()
    }
}

/// Iterator over the committed records of an [`Arena`].
pub struct Entities<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Entities<'a> {
    type Item = Entity<'a>;

    fn next(&mut self) -> Option<Entity<'a>> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let len_bytes: [u8; 4] = self.buf[self.pos..self.pos + 4]
            .try_into()
            .expect("record header present in committed region");
        let len = u32::from_le_bytes(len_bytes) as usize;
        let record = &self.buf[self.pos..self.pos + len];
        self.pos = align_up(self.pos + len);
        Some(Entity::from_record(record))
    }
}

/// Shared machinery for the three entity builders.
///
/// The fixed prefix is written (zeroed) on construction and scalar
/// setters patch it in place; the variable sections are append-only and
/// ordered user → tags → tail, with missing sections materialized as
/// empty on the first later write (or at commit). Nothing ever moves a
/// previously written byte.
struct RecordBuilder<'a> {
    arena: &'a mut Arena,
    start: usize,
    user_written: bool,
    tags_count_at: Option<usize>,
    tags_count: u32,
    tail_count_at: Option<usize>,
    tail_count: u32,
    committed: bool,
}

impl<'a> RecordBuilder<'a> {
    fn new(arena: &'a mut Arena, type_tag: u8) -> Self {
        debug_assert_eq!(arena.buf.len(), arena.committed, "one builder at a time");
        let start = arena.buf.len();

        arena.push_u32(0); // record_len, patched at commit
        arena.buf.push(type_tag);
        arena.buf.extend_from_slice(&[0; 3]);
        arena.push_i64(0); // id
        arena.push_i64(0); // timestamp
        arena.push_u32(0); // version_visible
        arena.push_u32(0); // uid
        arena.push_i32(0); // changeset
        if type_tag == TAG_NODE {
            let undefined = Location::undefined();
            arena.push_i32(undefined.lon());
            arena.push_i32(undefined.lat());
        }

        Self {
            arena,
            start,
            user_written: false,
            tags_count_at: None,
            tags_count: 0,
            tail_count_at: None,
            tail_count: 0,
            committed: false,
        }
    }

    fn set_id(&mut self, id: i64) {
        let at = self.start + offset::ID;
        self.arena.write_i64_at(at, id);
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        let at = self.start + offset::TIMESTAMP;
        self.arena.write_i64_at(at, timestamp);
    }

    fn set_version_visible(&mut self, version: u32, visible: bool) {
        let packed = (version & !DELETED_BIT) | if visible { 0 } else { DELETED_BIT };
        let at = self.start + offset::VERSION_VISIBLE;
        self.arena.write_u32_at(at, packed);
    }

    fn set_uid(&mut self, uid: u32) {
        let at = self.start + offset::UID;
        self.arena.write_u32_at(at, uid);
    }

    fn set_changeset(&mut self, changeset: i32) {
        let at = self.start + offset::CHANGESET;
        self.arena.write_i32_at(at, changeset);
    }

    fn set_location(&mut self, location: Location) {
        self.arena
            .write_i32_at(self.start + offset::NODE_LON, location.lon());
        self.arena
            .write_i32_at(self.start + offset::NODE_LAT, location.lat());
    }

    fn set_user(&mut self, user: &str) {
        debug_assert!(!self.user_written, "user written twice");
        debug_assert!(self.tags_count_at.is_none(), "user must precede tags");
        self.arena.push_str(user);
        self.user_written = true;
    }

    fn add_tag(&mut self, key: &str, value: &str) {
        debug_assert!(self.tail_count_at.is_none(), "tags must precede refs/members");
        self.ensure_user();
        if self.tags_count_at.is_none() {
            self.tags_count_at = Some(self.arena.buf.len());
            self.arena.push_u32(0);
        }
        self.arena.push_str(key);
        self.arena.push_str(value);
        self.tags_count += 1;
    }

    /// Open the trailing list section (refs or members), closing the
    /// earlier sections if they were never written.
    fn begin_tail(&mut self) {
        if self.tail_count_at.is_none() {
            self.ensure_user();
            self.ensure_tags();
            self.tail_count_at = Some(self.arena.buf.len());
            self.arena.push_u32(0);
        }
    }

    fn ensure_user(&mut self) {
        if !self.user_written {
            self.arena.push_str("");
            self.user_written = true;
        }
    }

    fn ensure_tags(&mut self) {
        if self.tags_count_at.is_none() {
            self.tags_count_at = Some(self.arena.buf.len());
            self.arena.push_u32(0);
        }
    }

    fn commit(mut self, with_tail: bool) {
        self.ensure_user();
        self.ensure_tags();
        if with_tail {
            self.begin_tail();
        }

        if let Some(at) = self.tags_count_at {
            let count = self.tags_count;
            self.arena.write_u32_at(at, count);
        }
        if let Some(at) = self.tail_count_at {
            let count = self.tail_count;
            self.arena.write_u32_at(at, count);
        }

        let len = (self.arena.buf.len() - self.start) as u32;
        self.arena.write_u32_at(self.start + offset::RECORD_LEN, len);

        let padded = align_up(self.arena.buf.len());
        self.arena.buf.resize(padded, 0);
        self.arena.committed = self.arena.buf.len();
        self.committed = true;
    }
}

impl Drop for RecordBuilder<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let committed = self.arena.committed;
            self.arena.buf.truncate(committed);
        }
    }
}

/// Builds one node record.
pub struct NodeBuilder<'a> {
    inner: RecordBuilder<'a>,
}

impl<'a> NodeBuilder<'a> {
    #[must_use]
    pub fn new(arena: &'a mut Arena) -> Self {
        Self {
            inner: RecordBuilder::new(arena, TAG_NODE),
        }
    }

    pub fn id(&mut self, id: i64) -> &mut Self {
        self.inner.set_id(id);
        self
    }

    pub fn version(&mut self, version: u32, visible: bool) -> &mut Self {
        self.inner.set_version_visible(version, visible);
        self
    }

    pub fn timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.inner.set_timestamp(timestamp);
        self
    }

    pub fn uid(&mut self, uid: u32) -> &mut Self {
        self.inner.set_uid(uid);
        self
    }

    pub fn changeset(&mut self, changeset: i32) -> &mut Self {
        self.inner.set_changeset(changeset);
        self
    }

    pub fn location(&mut self, location: Location) -> &mut Self {
        self.inner.set_location(location);
        self
    }

    /// Must precede any `tag` call; defaults to "" otherwise.
    pub fn user(&mut self, user: &str) -> &mut Self {
        self.inner.set_user(user);
        self
    }

    pub fn tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.inner.add_tag(key, value);
        self
    }

    /// Publish the record.
    pub fn commit(self) {
        self.inner.commit(false);
    }
}

/// Builds one way record.
pub struct WayBuilder<'a> {
    inner: RecordBuilder<'a>,
}

impl<'a> WayBuilder<'a> {
    #[must_use]
    pub fn new(arena: &'a mut Arena) -> Self {
        Self {
            inner: RecordBuilder::new(arena, TAG_WAY),
        }
    }

    pub fn id(&mut self, id: i64) -> &mut Self {
        self.inner.set_id(id);
        self
    }

    pub fn version(&mut self, version: u32, visible: bool) -> &mut Self {
        self.inner.set_version_visible(version, visible);
        self
    }

    pub fn timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.inner.set_timestamp(timestamp);
        self
    }

    pub fn uid(&mut self, uid: u32) -> &mut Self {
        self.inner.set_uid(uid);
        self
    }

    pub fn changeset(&mut self, changeset: i32) -> &mut Self {
        self.inner.set_changeset(changeset);
        self
    }

    pub fn user(&mut self, user: &str) -> &mut Self {
        self.inner.set_user(user);
        self
    }

    pub fn tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.inner.add_tag(key, value);
        self
    }

    /// Append one resolved node reference. Tags must come first.
    pub fn node_ref(&mut self, ref_id: i64) -> &mut Self {
        self.inner.begin_tail();
        self.inner.arena.push_i64(ref_id);
        self.inner.tail_count += 1;
        self
    }

    pub fn commit(self) {
        self.inner.commit(true);
    }
}

/// Builds one relation record.
pub struct RelationBuilder<'a> {
    inner: RecordBuilder<'a>,
}

impl<'a> RelationBuilder<'a> {
    #[must_use]
    pub fn new(arena: &'a mut Arena) -> Self {
        Self {
            inner: RecordBuilder::new(arena, TAG_RELATION),
        }
    }

    pub fn id(&mut self, id: i64) -> &mut Self {
        self.inner.set_id(id);
        self
    }

    pub fn version(&mut self, version: u32, visible: bool) -> &mut Self {
        self.inner.set_version_visible(version, visible);
        self
    }

    pub fn timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.inner.set_timestamp(timestamp);
        self
    }

    pub fn uid(&mut self, uid: u32) -> &mut Self {
        self.inner.set_uid(uid);
        self
    }

    pub fn changeset(&mut self, changeset: i32) -> &mut Self {
        self.inner.set_changeset(changeset);
        self
    }

    pub fn user(&mut self, user: &str) -> &mut Self {
        self.inner.set_user(user);
        self
    }

    pub fn tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.inner.add_tag(key, value);
        self
    }

    /// Append one member. Tags must come first.
    pub fn member(&mut self, member_type: MemberType, ref_id: i64, role: &str) -> &mut Self {
        self.inner.begin_tail();
        self.inner.arena.buf.push(member_type as u8);
        self.inner.arena.push_i64(ref_id);
        self.inner.arena.push_str(role);
        self.inner.tail_count += 1;
        self
    }

    pub fn commit(self) {
        self.inner.commit(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    #[test]
    fn empty_arena() {
        let arena = Arena::empty();
        assert!(arena.is_empty());
        assert_eq!(arena.iter().count(), 0);
    }

    #[test]
    fn node_roundtrip() {
        let mut arena = Arena::with_capacity(256);
        let mut b = NodeBuilder::new(&mut arena);
        b.id(17)
            .version(3, true)
            .timestamp(1_700_000_000)
            .uid(42)
            .changeset(99)
            .location(Location::new(200, 100))
            .user("alice")
            .tag("amenity", "bench")
            .tag("amenity", "bench"); // duplicates are legal
        b.commit();

        let entities: Vec<_> = arena.iter().collect();
        assert_eq!(entities.len(), 1);
        let Entity::Node(node) = &entities[0] else {
            panic!("expected node");
        };
        assert_eq!(node.id(), 17);
        assert_eq!(node.version(), 3);
        assert!(node.visible());
        assert_eq!(node.timestamp(), 1_700_000_000);
        assert_eq!(node.uid(), 42);
        assert_eq!(node.changeset(), 99);
        assert_eq!(node.location(), Location::new(200, 100));
        assert_eq!(node.user(), "alice");
        let tags: Vec<_> = node.tags().collect();
        assert_eq!(tags, vec![("amenity", "bench"), ("amenity", "bench")]);
    }

    #[test]
    fn node_defaults() {
        let mut arena = Arena::with_capacity(64);
        let mut b = NodeBuilder::new(&mut arena);
        b.id(1).version(0, true);
        b.commit();

        let entities: Vec<_> = arena.iter().collect();
        let Entity::Node(node) = &entities[0] else {
            panic!("expected node");
        };
        assert_eq!(node.user(), "");
        assert_eq!(node.tags().count(), 0);
        assert!(!node.location().is_defined());
    }

    #[test]
    fn way_roundtrip() {
        let mut arena = Arena::with_capacity(256);
        let mut b = WayBuilder::new(&mut arena);
        b.id(10).version(1, true).user("bob").tag("highway", "path");
        b.node_ref(10).node_ref(7).node_ref(12);
        b.commit();

        let entities: Vec<_> = arena.iter().collect();
        let Entity::Way(way) = &entities[0] else {
            panic!("expected way");
        };
        assert_eq!(way.id(), 10);
        let refs: Vec<_> = way.refs().collect();
        assert_eq!(refs, vec![10, 7, 12]);
        let tags: Vec<_> = way.tags().collect();
        assert_eq!(tags, vec![("highway", "path")]);
    }

    #[test]
    fn relation_roundtrip() {
        let mut arena = Arena::with_capacity(256);
        let mut b = RelationBuilder::new(&mut arena);
        b.id(5).version(2, false).user("");
        b.member(MemberType::Node, 5, "outer")
            .member(MemberType::Way, 15, "inner")
            .member(MemberType::Relation, 12, "outer");
        b.commit();

        let entities: Vec<_> = arena.iter().collect();
        let Entity::Relation(rel) = &entities[0] else {
            panic!("expected relation");
        };
        assert!(!rel.visible());
        let members: Vec<_> = rel.members().collect();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].member_type, MemberType::Node);
        assert_eq!(members[0].ref_id, 5);
        assert_eq!(members[0].role, "outer");
        assert_eq!(members[1].member_type, MemberType::Way);
        assert_eq!(members[1].ref_id, 15);
        assert_eq!(members[2].member_type, MemberType::Relation);
    }

    #[test]
    fn records_are_aligned() {
        let mut arena = Arena::with_capacity(512);
        for i in 0..5 {
            let mut b = NodeBuilder::new(&mut arena);
            b.id(i).version(1, true).user("x");
            b.commit();
        }
        assert_eq!(arena.committed_len() % 8, 0);
        assert_eq!(arena.iter().count(), 5);
    }

    #[test]
    fn uncommitted_builder_rolls_back() {
        let mut arena = Arena::with_capacity(256);
        {
            let mut b = NodeBuilder::new(&mut arena);
            b.id(1).version(1, true).tag("k", "v");
            // dropped without commit
        }
        assert!(arena.is_empty());

        let mut b = NodeBuilder::new(&mut arena);
        b.id(2).version(1, true);
        b.commit();
        assert_eq!(arena.iter().count(), 1);
    }

    #[test]
    fn append_order_preserved() {
        let mut arena = Arena::with_capacity(512);
        let mut b = NodeBuilder::new(&mut arena);
        b.id(1).version(1, true);
        b.commit();
        let mut b = WayBuilder::new(&mut arena);
        b.id(2).version(1, true);
        b.commit();
        let mut b = RelationBuilder::new(&mut arena);
        b.id(3).version(1, true);
        b.commit();

        let ids: Vec<i64> = arena
            .iter()
            .map(|e| match e {
                Entity::Node(n) => n.id(),
                Entity::Way(w) => w.id(),
                Entity::Relation(r) => r.id(),
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
