use crate::location::BoundingBox;

/// Metadata decoded from a PBF file's OSMHeader blob.
///
/// Populated once by header ingestion and handed to the caller before
/// any entity data flows. String-valued replication fields keep the
/// upstream osmosis naming.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileHeader {
    /// The program that wrote the file (`writingprogram`).
    pub generator: Option<String>,

    /// Declared bounding box, converted to coordinate precision.
    pub bbox: Option<BoundingBox>,

    /// The file declares the "DenseNodes" required feature.
    pub dense_nodes: bool,

    /// The file declares "HistoricalInformation": entities may appear
    /// in multiple versions, including deleted ones.
    pub multiple_object_versions: bool,

    /// Last replication run, ISO-8601 ("2023-11-14T21:13:20Z").
    pub replication_timestamp: Option<String>,

    pub replication_sequence_number: Option<i64>,

    pub replication_base_url: Option<String>,

    /// Free-form source note from the header block.
    pub source: Option<String>,
}
