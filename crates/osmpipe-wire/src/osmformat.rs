//! The inner OSMPBF block messages: `HeaderBlock` for the first frame,
//! `PrimitiveBlock` and its entity messages for every frame after it.
//!
//! All decoders tolerate unknown fields. Scalar encodings follow the
//! OSMPBF schema: entity coordinates and delta streams are sint64
//! (zigzag), string-table indices are uint32, plain counters are int32.

use crate::error::WireError;
use crate::field::FieldReader;

/// `HeaderBlock` — metadata carried by the OSMHeader frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    pub bbox: Option<HeaderBBox>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub writingprogram: Option<String>,
    pub source: Option<String>,
    /// Seconds since the epoch of the last replication run.
    pub osmosis_replication_timestamp: Option<i64>,
    pub osmosis_replication_sequence_number: Option<i64>,
    pub osmosis_replication_base_url: Option<String>,
}

impl HeaderBlock {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut block = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => block.bbox = Some(HeaderBBox::decode(field.bytes()?)?),
                4 => block.required_features.push(field.string()?),
                5 => block.optional_features.push(field.string()?),
                16 => block.writingprogram = Some(field.string()?),
                17 => block.source = Some(field.string()?),
                32 => block.osmosis_replication_timestamp = Some(field.int64()?),
                33 => block.osmosis_replication_sequence_number = Some(field.int64()?),
                34 => block.osmosis_replication_base_url = Some(field.string()?),
                _ => {}
            }
        }

        Ok(block)
    }
}

/// `HeaderBBox` — declared bounding box in nanodegrees (sint64).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderBBox {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

impl HeaderBBox {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut left = None;
        let mut right = None;
        let mut top = None;
        let mut bottom = None;

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => left = Some(field.sint64()?),
                2 => right = Some(field.sint64()?),
                3 => top = Some(field.sint64()?),
                4 => bottom = Some(field.sint64()?),
                _ => {}
            }
        }

        let missing = |field| WireError::MissingField {
            message: "HeaderBBox",
            field,
        };
        Ok(Self {
            left: left.ok_or(missing("left"))?,
            right: right.ok_or(missing("right"))?,
            top: top.ok_or(missing("top"))?,
            bottom: bottom.ok_or(missing("bottom"))?,
        })
    }
}

/// `StringTable` — the per-block string pool.
///
/// Index 0 is reserved as the empty string by convention; keys, values,
/// user names, and roles all reference this table by index. Entries are
/// kept as raw bytes — UTF-8 validation happens at resolution time so an
/// unreferenced broken entry cannot fail a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringTable {
    pub s: Vec<Vec<u8>>,
}

impl StringTable {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut table = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            if field.number == 1 {
                table.s.push(field.bytes()?.to_vec());
            }
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }
}

/// `PrimitiveBlock` — one batch of entities sharing a string table and
/// one set of scaling constants.
///
/// Groups are kept as raw message bytes: the block parser classifies
/// each group first and fully decodes it only when its entity kind is
/// requested, so a ways-only read never materializes node messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimitiveBlock {
    pub stringtable: StringTable,
    /// Raw `PrimitiveGroup` message bytes, in block order.
    pub primitivegroup: Vec<Vec<u8>>,
    /// Nanodegrees per coordinate unit.
    pub granularity: i32,
    /// Offsets in nanodegrees.
    pub lat_offset: i64,
    pub lon_offset: i64,
    /// Milliseconds per timestamp unit.
    pub date_granularity: i32,
}

impl Default for PrimitiveBlock {
    fn default() -> Self {
        Self {
            stringtable: StringTable::default(),
            primitivegroup: Vec::new(),
            granularity: 100,
            lat_offset: 0,
            lon_offset: 0,
            date_granularity: 1000,
        }
    }
}

impl PrimitiveBlock {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut block = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => block.stringtable = StringTable::decode(field.bytes()?)?,
                2 => block.primitivegroup.push(field.bytes()?.to_vec()),
                17 => block.granularity = field.int32()?,
                18 => block.date_granularity = field.int32()?,
                19 => block.lat_offset = field.int64()?,
                20 => block.lon_offset = field.int64()?,
                _ => {}
            }
        }

        Ok(block)
    }
}

/// The entity kind a `PrimitiveGroup` carries.
///
/// Groups are homogeneous; the precedence below mirrors the dispatch
/// order of the block parser (dense wins over ways wins over relations
/// wins over plain nodes). A group with none of the four — including one
/// carrying only changesets — classifies as `Empty`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKind {
    Dense,
    Ways,
    Relations,
    Nodes,
    Empty,
}

/// `PrimitiveGroup` — a homogeneous run of entities within a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrimitiveGroup {
    pub nodes: Vec<Node>,
    pub dense: Option<DenseNodes>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
}

impl PrimitiveGroup {
    /// Determine the group's kind by scanning field numbers only.
    ///
    /// Payloads are skipped, not decoded, so classifying a group that
    /// the read mask excludes costs one cursor pass.
    pub fn classify(buf: &[u8]) -> Result<GroupKind, WireError> {
        let mut has_nodes = false;
        let mut has_dense = false;
        let mut has_ways = false;
        let mut has_relations = false;

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => has_nodes = true,
                2 => has_dense = true,
                3 => has_ways = true,
                4 => has_relations = true,
                _ => {}
            }
        }

        Ok(if has_dense {
            GroupKind::Dense
        } else if has_ways {
            GroupKind::Ways
        } else if has_relations {
            GroupKind::Relations
        } else if has_nodes {
            GroupKind::Nodes
        } else {
            GroupKind::Empty
        })
    }

    /// Fully decode a group. Changesets (field 5) are skipped — no
    /// dispatch path consumes them.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut group = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => group.nodes.push(Node::decode(field.bytes()?)?),
                2 => group.dense = Some(DenseNodes::decode(field.bytes()?)?),
                3 => group.ways.push(Way::decode(field.bytes()?)?),
                4 => group.relations.push(Relation::decode(field.bytes()?)?),
                _ => {}
            }
        }

        Ok(group)
    }
}

/// `Info` — optional metadata attached to a plain entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Info {
    pub version: i32,
    /// Raw units of `date_granularity`; scaled by the block parser.
    pub timestamp: i64,
    pub changeset: i64,
    /// Signed on the wire; negative means anonymous.
    pub uid: i32,
    /// String-table index of the user name.
    pub user_sid: u32,
    /// Absent means "no deletion information", i.e. visible.
    pub visible: Option<bool>,
}

impl Info {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut info = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => info.version = field.int32()?,
                2 => info.timestamp = field.int64()?,
                3 => info.changeset = field.int64()?,
                4 => info.uid = field.int32()?,
                5 => info.user_sid = field.uint32()?,
                6 => info.visible = Some(field.bool()?),
                _ => {}
            }
        }

        Ok(info)
    }
}

/// `Node` — one plain (non-dense) node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: i64,
    pub keys: Vec<u32>,
    pub vals: Vec<u32>,
    pub info: Option<Info>,
    /// Raw coordinate units (scaled by granularity/offset downstream).
    pub lat: i64,
    pub lon: i64,
}

impl Node {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut id = None;
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        let mut info = None;
        let mut lat = None;
        let mut lon = None;

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => id = Some(field.sint64()?),
                2 => field.packed_uint32_into(&mut keys)?,
                3 => field.packed_uint32_into(&mut vals)?,
                4 => info = Some(Info::decode(field.bytes()?)?),
                8 => lat = Some(field.sint64()?),
                9 => lon = Some(field.sint64()?),
                _ => {}
            }
        }

        let missing = |field| WireError::MissingField {
            message: "Node",
            field,
        };
        Ok(Self {
            id: id.ok_or(missing("id"))?,
            keys,
            vals,
            info,
            lat: lat.ok_or(missing("lat"))?,
            lon: lon.ok_or(missing("lon"))?,
        })
    }
}

/// `DenseNodes` — the columnar node representation.
///
/// `id`, `lat`, and `lon` are parallel delta streams; `keys_vals` is one
/// shared tag stream with a 0 sentinel terminating each node's run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DenseNodes {
    pub id: Vec<i64>,
    pub denseinfo: Option<DenseInfo>,
    pub lat: Vec<i64>,
    pub lon: Vec<i64>,
    pub keys_vals: Vec<i32>,
}

impl DenseNodes {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut dense = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => field.packed_sint64_into(&mut dense.id)?,
                5 => dense.denseinfo = Some(DenseInfo::decode(field.bytes()?)?),
                8 => field.packed_sint64_into(&mut dense.lat)?,
                9 => field.packed_sint64_into(&mut dense.lon)?,
                10 => field.packed_int32_into(&mut dense.keys_vals)?,
                _ => {}
            }
        }

        Ok(dense)
    }
}

/// `DenseInfo` — columnar metadata parallel to `DenseNodes`.
///
/// Everything is delta-coded except `version`, which is absolute.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DenseInfo {
    pub version: Vec<i32>,
    pub timestamp: Vec<i64>,
    pub changeset: Vec<i64>,
    pub uid: Vec<i32>,
    pub user_sid: Vec<i32>,
    pub visible: Vec<bool>,
}

impl DenseInfo {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut info = Self::default();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => field.packed_int32_into(&mut info.version)?,
                2 => field.packed_sint64_into(&mut info.timestamp)?,
                3 => field.packed_sint64_into(&mut info.changeset)?,
                4 => field.packed_sint32_into(&mut info.uid)?,
                5 => field.packed_sint32_into(&mut info.user_sid)?,
                6 => field.packed_bool_into(&mut info.visible)?,
                _ => {}
            }
        }

        Ok(info)
    }
}

/// `Way` — one way with a delta-coded node reference stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Way {
    pub id: i64,
    pub keys: Vec<u32>,
    pub vals: Vec<u32>,
    pub info: Option<Info>,
    pub refs: Vec<i64>,
}

impl Way {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut id = None;
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        let mut info = None;
        let mut refs = Vec::new();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => id = Some(field.int64()?),
                2 => field.packed_uint32_into(&mut keys)?,
                3 => field.packed_uint32_into(&mut vals)?,
                4 => info = Some(Info::decode(field.bytes()?)?),
                8 => field.packed_sint64_into(&mut refs)?,
                _ => {}
            }
        }

        Ok(Self {
            id: id.ok_or(WireError::MissingField {
                message: "Way",
                field: "id",
            })?,
            keys,
            vals,
            info,
            refs,
        })
    }
}

/// `Relation` — one relation with parallel member arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub id: i64,
    pub keys: Vec<u32>,
    pub vals: Vec<u32>,
    pub info: Option<Info>,
    /// String-table indices of member roles.
    pub roles_sid: Vec<i32>,
    /// Delta-coded member ids.
    pub memids: Vec<i64>,
    /// Member types: 0 = node, 1 = way, 2 = relation.
    pub types: Vec<i32>,
}

impl Relation {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut id = None;
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        let mut info = None;
        let mut roles_sid = Vec::new();
        let mut memids = Vec::new();
        let mut types = Vec::new();

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => id = Some(field.int64()?),
                2 => field.packed_uint32_into(&mut keys)?,
                3 => field.packed_uint32_into(&mut vals)?,
                4 => info = Some(Info::decode(field.bytes()?)?),
                8 => field.packed_int32_into(&mut roles_sid)?,
                9 => field.packed_sint64_into(&mut memids)?,
                10 => field.packed_int32_into(&mut types)?,
                _ => {}
            }
        }

        Ok(Self {
            id: id.ok_or(WireError::MissingField {
                message: "Relation",
                field: "id",
            })?,
            keys,
            vals,
            info,
            roles_sid,
            memids,
            types,
        })
    }
}

/// Nanodegrees per whole degree — the wire-level coordinate resolution.
pub const LONLAT_RESOLUTION: i64 = 1_000_000_000;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{
        encode_bytes_field, encode_int64_field, encode_packed_int32, encode_packed_sint64,
        encode_packed_uint32, encode_sint64_field, encode_string_field, encode_varint_field,
    };

    fn encode_bbox(left: i64, right: i64, top: i64, bottom: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_sint64_field(&mut buf, 1, left);
        encode_sint64_field(&mut buf, 2, right);
        encode_sint64_field(&mut buf, 3, top);
        encode_sint64_field(&mut buf, 4, bottom);
        buf
    }

    #[test]
    fn header_block_roundtrip() {
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 1, &encode_bbox(-1_000_000_000, 1_000_000_000, 500, -500));
        encode_string_field(&mut buf, 4, "OsmSchema-V0.6");
        encode_string_field(&mut buf, 4, "DenseNodes");
        encode_string_field(&mut buf, 5, "Sort.Type_then_ID");
        encode_string_field(&mut buf, 16, "osmpipe-test");
        encode_int64_field(&mut buf, 32, 1_700_000_000);

        let block = HeaderBlock::decode(&buf).unwrap();
        assert_eq!(
            block.bbox,
            Some(HeaderBBox {
                left: -1_000_000_000,
                right: 1_000_000_000,
                top: 500,
                bottom: -500,
            })
        );
        assert_eq!(block.required_features, vec!["OsmSchema-V0.6", "DenseNodes"]);
        assert_eq!(block.optional_features, vec!["Sort.Type_then_ID"]);
        assert_eq!(block.writingprogram.as_deref(), Some("osmpipe-test"));
        assert_eq!(block.osmosis_replication_timestamp, Some(1_700_000_000));
    }

    #[test]
    fn bbox_missing_side_rejected() {
        let mut buf = Vec::new();
        encode_sint64_field(&mut buf, 1, 0);
        encode_sint64_field(&mut buf, 2, 0);
        encode_sint64_field(&mut buf, 3, 0);

        assert!(matches!(
            HeaderBBox::decode(&buf),
            Err(WireError::MissingField {
                message: "HeaderBBox",
                field: "bottom",
            })
        ));
    }

    #[test]
    fn primitive_block_defaults() {
        let block = PrimitiveBlock::decode(&[]).unwrap();
        assert_eq!(block.granularity, 100);
        assert_eq!(block.date_granularity, 1000);
        assert_eq!(block.lat_offset, 0);
        assert_eq!(block.lon_offset, 0);
    }

    #[test]
    fn string_table_preserves_order() {
        let mut st = Vec::new();
        encode_bytes_field(&mut st, 1, b"");
        encode_bytes_field(&mut st, 1, b"highway");
        encode_bytes_field(&mut st, 1, b"primary");

        let table = StringTable::decode(&st).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.s[1], b"highway");
        assert_eq!(table.s[2], b"primary");
    }

    #[test]
    fn classify_precedence() {
        // A (malformed but classifiable) group with both ways and nodes:
        // dense > ways > relations > nodes.
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 1, &[]);
        encode_bytes_field(&mut buf, 3, &[]);
        assert_eq!(PrimitiveGroup::classify(&buf).unwrap(), GroupKind::Ways);

        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 2, &[]);
        encode_bytes_field(&mut buf, 3, &[]);
        assert_eq!(PrimitiveGroup::classify(&buf).unwrap(), GroupKind::Dense);
    }

    #[test]
    fn classify_changesets_only_is_empty() {
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 5, &[]);
        assert_eq!(PrimitiveGroup::classify(&buf).unwrap(), GroupKind::Empty);
    }

    #[test]
    fn node_roundtrip() {
        let mut buf = Vec::new();
        encode_sint64_field(&mut buf, 1, -42);
        encode_packed_uint32(&mut buf, 2, &[1, 3]);
        encode_packed_uint32(&mut buf, 3, &[2, 4]);
        encode_sint64_field(&mut buf, 8, 515_000_000);
        encode_sint64_field(&mut buf, 9, -1_800_000);

        let node = Node::decode(&buf).unwrap();
        assert_eq!(node.id, -42);
        assert_eq!(node.keys, vec![1, 3]);
        assert_eq!(node.vals, vec![2, 4]);
        assert_eq!(node.lat, 515_000_000);
        assert_eq!(node.lon, -1_800_000);
        assert!(node.info.is_none());
    }

    #[test]
    fn node_missing_coordinate_rejected() {
        let mut buf = Vec::new();
        encode_sint64_field(&mut buf, 1, 1);
        encode_sint64_field(&mut buf, 8, 10);

        assert!(matches!(
            Node::decode(&buf),
            Err(WireError::MissingField {
                message: "Node",
                field: "lon",
            })
        ));
    }

    #[test]
    fn dense_nodes_roundtrip() {
        let mut buf = Vec::new();
        encode_packed_sint64(&mut buf, 1, &[1, 1, 1]);
        encode_packed_sint64(&mut buf, 8, &[100, 0, -50]);
        encode_packed_sint64(&mut buf, 9, &[200, 0, 0]);
        encode_packed_int32(&mut buf, 10, &[1, 2, 0, 0, 0]);

        let dense = DenseNodes::decode(&buf).unwrap();
        assert_eq!(dense.id, vec![1, 1, 1]);
        assert_eq!(dense.lat, vec![100, 0, -50]);
        assert_eq!(dense.lon, vec![200, 0, 0]);
        assert_eq!(dense.keys_vals, vec![1, 2, 0, 0, 0]);
    }

    #[test]
    fn info_visible_absent_vs_false() {
        let mut buf = Vec::new();
        encode_varint_field(&mut buf, 1, 3);
        let info = Info::decode(&buf).unwrap();
        assert_eq!(info.version, 3);
        assert_eq!(info.visible, None);

        let mut buf = Vec::new();
        encode_varint_field(&mut buf, 6, 0);
        let info = Info::decode(&buf).unwrap();
        assert_eq!(info.visible, Some(false));
    }

    #[test]
    fn way_roundtrip() {
        let mut buf = Vec::new();
        encode_int64_field(&mut buf, 1, 77);
        encode_packed_sint64(&mut buf, 8, &[10, -3, 5]);

        let way = Way::decode(&buf).unwrap();
        assert_eq!(way.id, 77);
        assert_eq!(way.refs, vec![10, -3, 5]);
    }

    #[test]
    fn relation_roundtrip() {
        let mut buf = Vec::new();
        encode_int64_field(&mut buf, 1, 9);
        encode_packed_int32(&mut buf, 8, &[2, 3, 2]);
        encode_packed_sint64(&mut buf, 9, &[5, 10, -3]);
        encode_packed_int32(&mut buf, 10, &[0, 1, 2]);

        let rel = Relation::decode(&buf).unwrap();
        assert_eq!(rel.id, 9);
        assert_eq!(rel.roles_sid, vec![2, 3, 2]);
        assert_eq!(rel.memids, vec![5, 10, -3]);
        assert_eq!(rel.types, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_fields_skipped_everywhere() {
        let mut buf = Vec::new();
        encode_int64_field(&mut buf, 1, 5);
        encode_bytes_field(&mut buf, 200, &[0xFF; 64]);
        encode_varint_field(&mut buf, 201, 12);

        let way = Way::decode(&buf).unwrap();
        assert_eq!(way.id, 5);
    }
}
