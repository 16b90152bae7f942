//! The primitive-block parser: turns one uncompressed `PrimitiveBlock`
//! into an arena of decoded entities.
//!
//! This is the arithmetic core of the decoder — string-table
//! resolution, granularity/offset coordinate scaling, date scaling, and
//! the dense-node delta chains all live here.

use osmpipe_types::arena::{Arena, NodeBuilder, RelationBuilder, WayBuilder};
use osmpipe_types::entity::MemberType;
use osmpipe_types::location::Location;
use osmpipe_wire::osmformat::{
    DenseNodes, GroupKind, Info, Node as OsmNode, PrimitiveBlock, PrimitiveGroup, Relation,
    StringTable, Way, LONLAT_RESOLUTION,
};
use tracing::warn;

use crate::error::DecodeError;
use crate::reader::ReadTypes;

/// Wire nanodegrees per coordinate-precision unit: 10⁹ / 10⁷ = 100.
const RESOLUTION_DIVISOR: i64 = LONLAT_RESOLUTION / Location::COORDINATE_PRECISION;

/// Parse one primitive block into a fresh arena.
///
/// Groups whose entity kind is excluded by `read_types` are classified
/// and skipped without decoding their entity messages. Any error
/// discards the arena — a block is emitted whole or not at all.
pub fn parse_primitive_block(data: &[u8], read_types: ReadTypes) -> Result<Arena, DecodeError> {
    let block = PrimitiveBlock::decode(data)?;

    let date_factor = i64::from(block.date_granularity) / 1000;
    if block.date_granularity < 1000 {
        // Sub-millisecond granularity divides to zero and all
        // timestamps collapse; keep the behavior, flag the file.
        warn!(
            date_granularity = block.date_granularity,
            "date granularity below 1000ms, timestamps degrade"
        );
    }

    let parser = PrimitiveBlockParser {
        strings: &block.stringtable,
        granularity: i64::from(block.granularity),
        lat_offset: block.lat_offset,
        lon_offset: block.lon_offset,
        date_factor,
    };

    let mut arena = Arena::new();

    for raw_group in &block.primitivegroup {
        match PrimitiveGroup::classify(raw_group)? {
            GroupKind::Dense => {
                if read_types.nodes() {
                    let group = PrimitiveGroup::decode(raw_group)?;
                    let dense = group.dense.as_ref().ok_or(DecodeError::UnknownGroup)?;
                    parser.parse_dense_nodes(dense, &mut arena)?;
                }
            }
            GroupKind::Ways => {
                if read_types.ways() {
                    let group = PrimitiveGroup::decode(raw_group)?;
                    parser.parse_ways(&group.ways, &mut arena)?;
                }
            }
            GroupKind::Relations => {
                if read_types.relations() {
                    let group = PrimitiveGroup::decode(raw_group)?;
                    parser.parse_relations(&group.relations, &mut arena)?;
                }
            }
            GroupKind::Nodes => {
                if read_types.nodes() {
                    let group = PrimitiveGroup::decode(raw_group)?;
                    parser.parse_plain_nodes(&group.nodes, &mut arena)?;
                }
            }
            GroupKind::Empty => return Err(DecodeError::UnknownGroup),
        }
    }

    Ok(arena)
}

/// Decoded metadata common to every entity kind.
struct EntityInfo<'a> {
    version: u32,
    visible: bool,
    timestamp: i64,
    changeset: i32,
    uid: u32,
    user: &'a str,
}

struct PrimitiveBlockParser<'a> {
    strings: &'a StringTable,
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
    date_factor: i64,
}

impl<'a> PrimitiveBlockParser<'a> {
    /// Resolve a string-table index, validating bounds and UTF-8.
    fn str_at(&self, index: i64) -> Result<&'a str, DecodeError> {
        let out_of_range = || DecodeError::StringIndex {
            index,
            len: self.strings.len(),
        };
        let entry = usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.s.get(i))
            .ok_or_else(out_of_range)?;
        std::str::from_utf8(entry).map_err(|_| out_of_range())
    }

    /// Apply granularity and offset, scaling nanodegrees down to
    /// coordinate precision. Exact i64 arithmetic; overflow is fatal.
    fn location(&self, raw_lon: i64, raw_lat: i64) -> Result<Location, DecodeError> {
        let scale = |raw: i64, offset: i64| -> Result<i32, DecodeError> {
            let nano = raw
                .checked_mul(self.granularity)
                .and_then(|v| v.checked_add(offset))
                .ok_or(DecodeError::NumericOverflow)?;
            i32::try_from(nano / RESOLUTION_DIVISOR).map_err(|_| DecodeError::NumericOverflow)
        };
        Ok(Location::new(
            scale(raw_lon, self.lon_offset)?,
            scale(raw_lat, self.lat_offset)?,
        ))
    }

    /// Raw timestamp units → seconds.
    fn scale_date(&self, raw: i64) -> Result<i64, DecodeError> {
        raw.checked_mul(self.date_factor)
            .ok_or(DecodeError::NumericOverflow)
    }

    /// Interpret an optional `Info` message.
    ///
    /// No `Info` means no metadata at all: version 0, anonymous, empty
    /// user, visible. A present `Info` without a `visible` field is
    /// visible too — the data simply carries no deletion information.
    fn entity_info(&self, info: Option<&Info>) -> Result<EntityInfo<'a>, DecodeError> {
        let Some(info) = info else {
            return Ok(EntityInfo {
                version: 0,
                visible: true,
                timestamp: 0,
                changeset: 0,
                uid: 0,
                user: "",
            });
        };

        Ok(EntityInfo {
            version: info.version.max(0) as u32,
            visible: info.visible.unwrap_or(true),
            timestamp: self.scale_date(info.timestamp)?,
            changeset: info.changeset as i32,
            uid: normalize_uid(i64::from(info.uid)),
            user: self.str_at(i64::from(info.user_sid))?,
        })
    }

    fn parse_plain_nodes(&self, nodes: &[OsmNode], arena: &mut Arena) -> Result<(), DecodeError> {
        for node in nodes {
            let info = self.entity_info(node.info.as_ref())?;

            let mut builder = NodeBuilder::new(arena);
            builder
                .id(node.id)
                .version(info.version, info.visible)
                .timestamp(info.timestamp)
                .uid(info.uid)
                .changeset(info.changeset)
                .user(info.user);
            if info.visible {
                builder.location(self.location(node.lon, node.lat)?);
            }
            self.resolve_tags(&node.keys, &node.vals, |k, v| {
                builder.tag(k, v);
            })?;
            builder.commit();
        }
        Ok(())
    }

    fn parse_dense_nodes(&self, dense: &DenseNodes, arena: &mut Arena) -> Result<(), DecodeError> {
        let count = dense.id.len();
        if dense.lat.len() != count || dense.lon.len() != count {
            return Err(DecodeError::DenseMisaligned("lat/lon length"));
        }
        if let Some(info) = &dense.denseinfo {
            if info.version.len() != count
                || info.timestamp.len() != count
                || info.changeset.len() != count
                || info.uid.len() != count
                || info.user_sid.len() != count
            {
                return Err(DecodeError::DenseMisaligned("denseinfo length"));
            }
            if !info.visible.is_empty() && info.visible.len() != count {
                return Err(DecodeError::DenseMisaligned("visible length"));
            }
        }

        let mut id: i64 = 0;
        let mut lat: i64 = 0;
        let mut lon: i64 = 0;
        let mut uid: i64 = 0;
        let mut user_sid: i64 = 0;
        let mut changeset: i64 = 0;
        let mut timestamp: i64 = 0;
        let mut kv_pos: usize = 0;

        let add = |acc: i64, delta: i64| -> Result<i64, DecodeError> {
            acc.checked_add(delta).ok_or(DecodeError::NumericOverflow)
        };

        for i in 0..count {
            id = add(id, dense.id[i])?;
            lat = add(lat, dense.lat[i])?;
            lon = add(lon, dense.lon[i])?;

            let info = if let Some(dense_info) = &dense.denseinfo {
                changeset = add(changeset, dense_info.changeset[i])?;
                timestamp = add(timestamp, dense_info.timestamp[i])?;
                uid = add(uid, i64::from(dense_info.uid[i]))?;
                user_sid = add(user_sid, i64::from(dense_info.user_sid[i]))?;

                let visible = if dense_info.visible.is_empty() {
                    true
                } else {
                    dense_info.visible[i]
                };

                EntityInfo {
                    // version is the one absolute column
                    version: dense_info.version[i].max(0) as u32,
                    visible,
                    timestamp: self.scale_date(timestamp)?,
                    changeset: changeset as i32,
                    uid: normalize_uid(uid),
                    user: self.str_at(user_sid)?,
                }
            } else {
                EntityInfo {
                    version: 0,
                    visible: true,
                    timestamp: 0,
                    changeset: 0,
                    uid: 0,
                    user: "",
                }
            };

            let mut builder = NodeBuilder::new(arena);
            builder
                .id(id)
                .version(info.version, info.visible)
                .timestamp(info.timestamp)
                .uid(info.uid)
                .changeset(info.changeset)
                .user(info.user);
            if info.visible {
                builder.location(self.location(lon, lat)?);
            }

            if !dense.keys_vals.is_empty() {
                kv_pos = self.add_dense_tags(dense, kv_pos, &mut builder)?;
            }

            builder.commit();
        }

        if !dense.keys_vals.is_empty() && kv_pos != dense.keys_vals.len() {
            return Err(DecodeError::DenseMisaligned("keys_vals trailing data"));
        }

        Ok(())
    }

    /// Consume one node's run of the shared `keys_vals` stream: (k, v)
    /// index pairs up to the 0 sentinel. Returns the cursor position
    /// after the sentinel.
    fn add_dense_tags(
        &self,
        dense: &DenseNodes,
        mut pos: usize,
        builder: &mut NodeBuilder<'_>,
    ) -> Result<usize, DecodeError> {
        loop {
            let Some(&key_index) = dense.keys_vals.get(pos) else {
                return Err(DecodeError::DenseMisaligned("keys_vals ran out of sentinels"));
            };
            pos += 1;
            if key_index == 0 {
                return Ok(pos);
            }

            let Some(&value_index) = dense.keys_vals.get(pos) else {
                return Err(DecodeError::DenseMisaligned("keys_vals key without value"));
            };
            pos += 1;

            builder.tag(
                self.str_at(i64::from(key_index))?,
                self.str_at(i64::from(value_index))?,
            );
        }
    }

    fn parse_ways(&self, ways: &[Way], arena: &mut Arena) -> Result<(), DecodeError> {
        for way in ways {
            let info = self.entity_info(way.info.as_ref())?;

            let mut builder = WayBuilder::new(arena);
            builder
                .id(way.id)
                .version(info.version, info.visible)
                .timestamp(info.timestamp)
                .uid(info.uid)
                .changeset(info.changeset)
                .user(info.user);
            self.resolve_tags(&way.keys, &way.vals, |k, v| {
                builder.tag(k, v);
            })?;

            let mut ref_id: i64 = 0;
            for &delta in &way.refs {
                ref_id = ref_id
                    .checked_add(delta)
                    .ok_or(DecodeError::NumericOverflow)?;
                builder.node_ref(ref_id);
            }

            builder.commit();
        }
        Ok(())
    }

    fn parse_relations(
        &self,
        relations: &[Relation],
        arena: &mut Arena,
    ) -> Result<(), DecodeError> {
        for relation in relations {
            if relation.memids.len() != relation.types.len()
                || relation.roles_sid.len() != relation.types.len()
            {
                return Err(DecodeError::ParallelArrays("relation members"));
            }

            let info = self.entity_info(relation.info.as_ref())?;

            let mut builder = RelationBuilder::new(arena);
            builder
                .id(relation.id)
                .version(info.version, info.visible)
                .timestamp(info.timestamp)
                .uid(info.uid)
                .changeset(info.changeset)
                .user(info.user);
            self.resolve_tags(&relation.keys, &relation.vals, |k, v| {
                builder.tag(k, v);
            })?;

            let mut member_id: i64 = 0;
            for i in 0..relation.types.len() {
                member_id = member_id
                    .checked_add(relation.memids[i])
                    .ok_or(DecodeError::NumericOverflow)?;
                let member_type = MemberType::from_wire(relation.types[i]).ok_or(
                    DecodeError::UnknownMemberType {
                        value: relation.types[i],
                    },
                )?;
                builder.member(
                    member_type,
                    member_id,
                    self.str_at(i64::from(relation.roles_sid[i]))?,
                );
            }

            builder.commit();
        }
        Ok(())
    }

    /// Resolve parallel key/value index arrays into tags.
    fn resolve_tags(
        &self,
        keys: &[u32],
        vals: &[u32],
        mut add: impl FnMut(&str, &str),
    ) -> Result<(), DecodeError> {
        if keys.len() != vals.len() {
            return Err(DecodeError::ParallelArrays("keys/vals"));
        }
        for (&k, &v) in keys.iter().zip(vals) {
            add(self.str_at(i64::from(k))?, self.str_at(i64::from(v))?);
        }
        Ok(())
    }
}

/// uid is signed on the wire; anything negative means anonymous.
fn normalize_uid(uid: i64) -> u32 {
    if uid < 0 {
        0
    } else {
        uid as u32
    }
}
