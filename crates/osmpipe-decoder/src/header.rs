//! OSMHeader ingestion: the first blob's `HeaderBlock` becomes a
//! [`FileHeader`] metadata record.

use chrono::DateTime;
use osmpipe_types::file_header::FileHeader;
use osmpipe_types::location::{BoundingBox, Location};
use osmpipe_wire::osmformat::{HeaderBlock, LONLAT_RESOLUTION};

use crate::error::DecodeError;

// Required features this reader understands.
const FEATURE_SCHEMA_V06: &str = "OsmSchema-V0.6";
const FEATURE_DENSE_NODES: &str = "DenseNodes";
const FEATURE_HISTORICAL: &str = "HistoricalInformation";

/// Optional feature names seen in the wild. Optional features never
/// affect decoding; the constants exist so consumers can test for them
/// by name.
pub mod optional_features {
    pub const HAS_METADATA: &str = "Has_Metadata";
    pub const SORT_TYPE_THEN_ID: &str = "Sort.Type_then_ID";
    pub const SORT_GEOGRAPHIC: &str = "Sort.Geographic";
    pub const LOCATIONS_ON_WAYS: &str = "LocationsOnWays";
}

/// Interpret a decoded `HeaderBlock`.
///
/// # Errors
///
/// [`DecodeError::UnsupportedFeature`] when the file requires a feature
/// this reader does not implement. Unknown *optional* features are
/// ignored.
pub fn ingest_header(block: &HeaderBlock) -> Result<FileHeader, DecodeError> {
    let mut header = FileHeader::default();

    for feature in &block.required_features {
        match feature.as_str() {
            FEATURE_SCHEMA_V06 => {}
            FEATURE_DENSE_NODES => header.dense_nodes = true,
            FEATURE_HISTORICAL => header.multiple_object_versions = true,
            other => {
                return Err(DecodeError::UnsupportedFeature {
                    feature: other.to_owned(),
                })
            }
        }
    }

    header.generator = block.writingprogram.clone();
    header.source = block.source.clone();

    if let Some(bbox) = &block.bbox {
        let convert = LONLAT_RESOLUTION / Location::COORDINATE_PRECISION;
        let mut converted = BoundingBox::new();
        converted.extend(Location::new(
            (bbox.left / convert) as i32,
            (bbox.bottom / convert) as i32,
        ));
        converted.extend(Location::new(
            (bbox.right / convert) as i32,
            (bbox.top / convert) as i32,
        ));
        header.bbox = Some(converted);
    }

    if let Some(ts) = block.osmosis_replication_timestamp {
        let rendered = DateTime::from_timestamp(ts, 0)
            .ok_or(DecodeError::NumericOverflow)?
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        header.replication_timestamp = Some(rendered);
    }
    header.replication_sequence_number = block.osmosis_replication_sequence_number;
    header.replication_base_url = block.osmosis_replication_base_url.clone();

    Ok(header)
}
