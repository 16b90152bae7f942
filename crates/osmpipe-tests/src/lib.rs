//! Fixture builders for the integration tests: assemble complete PBF
//! byte streams from scratch, driving the same wire encode helpers the
//! unit tests use plus flate2 for the zlib payloads.
//!
//! Everything here is test support — the library itself does not write
//! PBF.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use osmpipe_wire::field::{
    encode_bytes_field, encode_int64_field, encode_packed_bool, encode_packed_int32,
    encode_packed_sint32, encode_packed_sint64, encode_packed_uint32, encode_sint64_field,
    encode_string_field, encode_varint_field,
};

/// How a fixture blob carries its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Zlib,
}

/// zlib-compress `data` at the default level.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory finish")
}

/// Encode a `Blob` message around `payload`.
pub fn blob_message(payload: &[u8], encoding: Encoding) -> Vec<u8> {
    let mut blob = Vec::new();
    match encoding {
        Encoding::Raw => encode_bytes_field(&mut blob, 1, payload),
        Encoding::Zlib => {
            encode_int64_field(&mut blob, 2, payload.len() as i64);
            encode_bytes_field(&mut blob, 3, &deflate(payload));
        }
    }
    blob
}

/// Frame a blob message: `[len][BlobHeader][Blob]`.
pub fn frame(blob_type: &str, blob: &[u8]) -> Vec<u8> {
    frame_with_indexdata(blob_type, blob, None)
}

/// Frame with optional `indexdata` padding in the BlobHeader (used to
/// steer the header to an exact size).
pub fn frame_with_indexdata(blob_type: &str, blob: &[u8], indexdata: Option<&[u8]>) -> Vec<u8> {
    let mut header = Vec::new();
    encode_string_field(&mut header, 1, blob_type);
    if let Some(data) = indexdata {
        encode_bytes_field(&mut header, 2, data);
    }
    encode_int64_field(&mut header, 3, blob.len() as i64);

    let mut out = Vec::new();
    out.extend_from_slice(&(header.len() as u32).to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(blob);
    out
}

/// Builds a complete PBF byte stream, frame by frame.
#[derive(Default)]
pub struct StreamBuilder {
    bytes: Vec<u8>,
}

impl StreamBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an OSMHeader frame.
    #[must_use]
    pub fn header(mut self, fixture: &HeaderFixture) -> Self {
        let blob = blob_message(&fixture.encode(), Encoding::Zlib);
        self.bytes.extend_from_slice(&frame("OSMHeader", &blob));
        self
    }

    /// Append an OSMData frame from a block fixture.
    #[must_use]
    pub fn data(self, fixture: &BlockFixture) -> Self {
        self.data_with_encoding(fixture, Encoding::Zlib)
    }

    #[must_use]
    pub fn data_with_encoding(mut self, fixture: &BlockFixture, encoding: Encoding) -> Self {
        let blob = blob_message(&fixture.encode(), encoding);
        self.bytes.extend_from_slice(&frame("OSMData", &blob));
        self
    }

    /// Append a pre-built frame verbatim.
    #[must_use]
    pub fn raw_frame(mut self, frame_bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(frame_bytes);
        self
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encodes a `HeaderBlock` message.
#[derive(Default)]
pub struct HeaderFixture {
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub writingprogram: Option<String>,
    /// (left, right, top, bottom) in nanodegrees.
    pub bbox: Option<(i64, i64, i64, i64)>,
    pub replication_timestamp: Option<i64>,
    pub replication_sequence_number: Option<i64>,
}

impl HeaderFixture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn writingprogram(mut self, name: &str) -> Self {
        self.writingprogram = Some(name.to_owned());
        self
    }

    #[must_use]
    pub fn required(mut self, feature: &str) -> Self {
        self.required_features.push(feature.to_owned());
        self
    }

    #[must_use]
    pub fn optional(mut self, feature: &str) -> Self {
        self.optional_features.push(feature.to_owned());
        self
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some((left, right, top, bottom)) = self.bbox {
            let mut bbox = Vec::new();
            encode_sint64_field(&mut bbox, 1, left);
            encode_sint64_field(&mut bbox, 2, right);
            encode_sint64_field(&mut bbox, 3, top);
            encode_sint64_field(&mut bbox, 4, bottom);
            encode_bytes_field(&mut buf, 1, &bbox);
        }
        for feature in &self.required_features {
            encode_string_field(&mut buf, 4, feature);
        }
        for feature in &self.optional_features {
            encode_string_field(&mut buf, 5, feature);
        }
        if let Some(program) = &self.writingprogram {
            encode_string_field(&mut buf, 16, program);
        }
        if let Some(ts) = self.replication_timestamp {
            encode_int64_field(&mut buf, 32, ts);
        }
        if let Some(seq) = self.replication_sequence_number {
            encode_int64_field(&mut buf, 33, seq);
        }
        buf
    }
}

/// Dense-node metadata columns (deltas except `version`).
#[derive(Default, Clone)]
pub struct DenseInfoFixture {
    pub version: Vec<i32>,
    pub timestamp: Vec<i64>,
    pub changeset: Vec<i64>,
    pub uid: Vec<i32>,
    pub user_sid: Vec<i32>,
    pub visible: Vec<bool>,
}

/// Encodes a `PrimitiveBlock` message with one group per entity call.
pub struct BlockFixture {
    strings: Vec<Vec<u8>>,
    groups: Vec<Vec<u8>>,
    pub granularity: Option<i32>,
    pub date_granularity: Option<i32>,
    pub lat_offset: Option<i64>,
    pub lon_offset: Option<i64>,
    /// Appended after all known fields, for unknown-field tests.
    pub trailing_unknown: Option<Vec<u8>>,
}

impl BlockFixture {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strings: vec![Vec::new()], // index 0: the empty string
            groups: Vec::new(),
            granularity: None,
            date_granularity: None,
            lat_offset: None,
            lon_offset: None,
            trailing_unknown: None,
        }
    }

    #[must_use]
    pub fn granularity(mut self, v: i32) -> Self {
        self.granularity = Some(v);
        self
    }

    /// Intern a string, returning its table index.
    pub fn intern(&mut self, s: &str) -> u32 {
        let bytes = s.as_bytes();
        if let Some(i) = self.strings.iter().position(|e| e == bytes) {
            return i as u32;
        }
        self.strings.push(bytes.to_vec());
        (self.strings.len() - 1) as u32
    }

    /// One dense-node group from raw delta arrays. `tags` lists (key,
    /// value) pairs per node; the keys_vals stream with its sentinels
    /// is derived from it.
    pub fn dense_nodes(
        &mut self,
        id_deltas: &[i64],
        lat_deltas: &[i64],
        lon_deltas: &[i64],
        tags: &[&[(&str, &str)]],
        info: Option<&DenseInfoFixture>,
    ) -> &mut Self {
        let mut keys_vals = Vec::new();
        if tags.iter().any(|t| !t.is_empty()) {
            for node_tags in tags {
                for &(k, v) in *node_tags {
                    keys_vals.push(self.intern(k) as i32);
                    keys_vals.push(self.intern(v) as i32);
                }
                keys_vals.push(0);
            }
        }

        let mut dense = Vec::new();
        encode_packed_sint64(&mut dense, 1, id_deltas);
        if let Some(info) = info {
            let mut buf = Vec::new();
            encode_packed_int32(&mut buf, 1, &info.version);
            encode_packed_sint64(&mut buf, 2, &info.timestamp);
            encode_packed_sint64(&mut buf, 3, &info.changeset);
            encode_packed_sint32(&mut buf, 4, &info.uid);
            encode_packed_sint32(&mut buf, 5, &info.user_sid);
            if !info.visible.is_empty() {
                encode_packed_bool(&mut buf, 6, &info.visible);
            }
            encode_bytes_field(&mut dense, 5, &buf);
        }
        encode_packed_sint64(&mut dense, 8, lat_deltas);
        encode_packed_sint64(&mut dense, 9, lon_deltas);
        if !keys_vals.is_empty() {
            encode_packed_int32(&mut dense, 10, &keys_vals);
        }

        let mut group = Vec::new();
        encode_bytes_field(&mut group, 2, &dense);
        self.groups.push(group);
        self
    }

    /// One plain-node group holding a single node.
    pub fn plain_node(
        &mut self,
        id: i64,
        lat: i64,
        lon: i64,
        tags: &[(&str, &str)],
    ) -> &mut Self {
        let (keys, vals) = self.intern_tags(tags);

        let mut node = Vec::new();
        encode_sint64_field(&mut node, 1, id);
        if !keys.is_empty() {
            encode_packed_uint32(&mut node, 2, &keys);
            encode_packed_uint32(&mut node, 3, &vals);
        }
        encode_sint64_field(&mut node, 8, lat);
        encode_sint64_field(&mut node, 9, lon);

        let mut group = Vec::new();
        encode_bytes_field(&mut group, 1, &node);
        self.groups.push(group);
        self
    }

    /// One way group holding a single way with delta-coded refs.
    pub fn way(&mut self, id: i64, ref_deltas: &[i64], tags: &[(&str, &str)]) -> &mut Self {
        let (keys, vals) = self.intern_tags(tags);

        let mut way = Vec::new();
        encode_int64_field(&mut way, 1, id);
        if !keys.is_empty() {
            encode_packed_uint32(&mut way, 2, &keys);
            encode_packed_uint32(&mut way, 3, &vals);
        }
        encode_packed_sint64(&mut way, 8, ref_deltas);

        let mut group = Vec::new();
        encode_bytes_field(&mut group, 3, &way);
        self.groups.push(group);
        self
    }

    /// One relation group holding a single relation.
    /// `members` lists (type, memid delta, role) triples.
    pub fn relation(&mut self, id: i64, members: &[(i32, i64, &str)]) -> &mut Self {
        let roles: Vec<i32> = members
            .iter()
            .map(|&(_, _, r)| self.intern(r) as i32)
            .collect();
        let memids: Vec<i64> = members.iter().map(|&(_, d, _)| d).collect();
        let types: Vec<i32> = members.iter().map(|&(t, _, _)| t).collect();

        let mut relation = Vec::new();
        encode_int64_field(&mut relation, 1, id);
        encode_packed_int32(&mut relation, 8, &roles);
        encode_packed_sint64(&mut relation, 9, &memids);
        encode_packed_int32(&mut relation, 10, &types);

        let mut group = Vec::new();
        encode_bytes_field(&mut group, 4, &relation);
        self.groups.push(group);
        self
    }

    fn intern_tags(&mut self, tags: &[(&str, &str)]) -> (Vec<u32>, Vec<u32>) {
        let keys = tags.iter().map(|&(k, _)| self.intern(k)).collect();
        let vals = tags.iter().map(|&(_, v)| self.intern(v)).collect();
        (keys, vals)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut st = Vec::new();
        for s in &self.strings {
            encode_bytes_field(&mut st, 1, s);
        }

        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 1, &st);
        for group in &self.groups {
            encode_bytes_field(&mut buf, 2, group);
        }
        if let Some(v) = self.granularity {
            encode_varint_field(&mut buf, 17, v as u64);
        }
        if let Some(v) = self.date_granularity {
            encode_varint_field(&mut buf, 18, v as u64);
        }
        if let Some(v) = self.lat_offset {
            encode_int64_field(&mut buf, 19, v);
        }
        if let Some(v) = self.lon_offset {
            encode_int64_field(&mut buf, 20, v);
        }
        if let Some(unknown) = &self.trailing_unknown {
            buf.extend_from_slice(unknown);
        }
        buf
    }
}

impl Default for BlockFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A minimal valid header frame most tests start with.
#[must_use]
pub fn simple_header() -> HeaderFixture {
    HeaderFixture::new()
        .required("OsmSchema-V0.6")
        .required("DenseNodes")
        .writingprogram("osmpipe-fixture")
}
