//! The public reader API: open a PBF stream, pull decoded arenas in
//! input order, close.

use std::io::Read;
use std::sync::Arc;

use osmpipe_types::arena::Arena;
use osmpipe_types::file_header::FileHeader;
use osmpipe_wire::osmformat::HeaderBlock;

use crate::byte_stream::{ByteStream, ChunkSource};
use crate::decompress::decode_blob_payload;
use crate::error::DecodeError;
use crate::frame::{BlobType, FrameReader};
use crate::header::ingest_header;
use crate::pipeline::{self, Concurrency, Pipeline, ThreadPool};

/// Bitmask of entity kinds to decode.
///
/// Groups of excluded kinds are skipped without per-entity decode work.
///
/// Bit layout:
///   bit 0 = nodes
///   bit 1 = ways
///   bit 2 = relations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadTypes(u8);

impl ReadTypes {
    pub const NODES: Self = Self(0b001);
    pub const WAYS: Self = Self(0b010);
    pub const RELATIONS: Self = Self(0b100);
    pub const ALL: Self = Self(0b111);

    /// No entity kinds at all — `open()` then skips starting the
    /// pipeline and every `read()` reports EOF.
    #[must_use]
    pub fn nothing() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn is_nothing(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn nodes(self) -> bool {
        self.contains(Self::NODES)
    }

    #[must_use]
    pub fn ways(self) -> bool {
        self.contains(Self::WAYS)
    }

    #[must_use]
    pub fn relations(self) -> bool {
        self.contains(Self::RELATIONS)
    }
}

/// Configures and constructs a [`PbfReader`].
pub struct PbfReaderBuilder {
    stream: ByteStream,
    read_types: ReadTypes,
    concurrency: Option<Concurrency>,
}

impl PbfReaderBuilder {
    /// Select which entity kinds to decode (default: all).
    #[must_use]
    pub fn read_types(mut self, read_types: ReadTypes) -> Self {
        self.read_types = read_types;
        self
    }

    /// Decode on the reader thread instead of a pool.
    #[must_use]
    pub fn single_threaded(mut self) -> Self {
        self.concurrency = Some(Concurrency::SingleThreaded);
        self
    }

    /// Decode on a caller-owned pool, shareable between readers.
    #[must_use]
    pub fn thread_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.concurrency = Some(Concurrency::Pool(pool));
        self
    }

    #[must_use]
    pub fn build(self) -> PbfReader {
        PbfReader {
            frames: Some(FrameReader::new(self.stream)),
            read_types: self.read_types,
            concurrency: self.concurrency,
            pipeline: None,
            opened: false,
        }
    }
}

/// A pipelined PBF reader.
///
/// Call [`open`](Self::open) once to consume the OSMHeader and start
/// the pipeline, then [`read`](Self::read) until it yields an empty
/// arena. Arenas arrive in exact input order regardless of how many
/// workers decode them.
///
/// ```no_run
/// use osmpipe_decoder::reader::{PbfReader, ReadTypes};
///
/// # fn run() -> Result<(), osmpipe_decoder::DecodeError> {
/// let file = std::fs::File::open("planet.osm.pbf")?;
/// let mut reader = PbfReader::from_read(file).build();
/// let header = reader.open()?;
/// loop {
///     let arena = reader.read()?;
///     if arena.is_empty() {
///         break;
///     }
///     for entity in &arena {
///         // dispatch on entity ...
///     }
/// }
/// reader.close();
/// # Ok(())
/// # }
/// ```
pub struct PbfReader {
    frames: Option<FrameReader>,
    read_types: ReadTypes,
    concurrency: Option<Concurrency>,
    pipeline: Option<Pipeline>,
    opened: bool,
}

impl PbfReader {
    /// Read from any blocking [`Read`] source.
    #[must_use]
    pub fn from_read<R: Read + Send + 'static>(read: R) -> PbfReaderBuilder {
        Self::from_stream(ByteStream::from_read(read))
    }

    /// Read from an explicit chunk source (e.g. a channel fed by a
    /// network thread).
    #[must_use]
    pub fn from_chunks(source: Box<dyn ChunkSource>) -> PbfReaderBuilder {
        Self::from_stream(ByteStream::new(source))
    }

    fn from_stream(stream: ByteStream) -> PbfReaderBuilder {
        PbfReaderBuilder {
            stream,
            read_types: ReadTypes::ALL,
            concurrency: None,
        }
    }

    /// Consume the OSMHeader frame and start the reader thread (when
    /// any entity kind is requested).
    ///
    /// # Errors
    ///
    /// [`DecodeError::EofBeforeHeader`] on empty input; framing,
    /// decompression and header-ingestion errors otherwise.
    pub fn open(&mut self) -> Result<FileHeader, DecodeError> {
        let mut frames = self.frames.take().ok_or(DecodeError::NotOpened)?;

        let frame = frames
            .next_frame(BlobType::Header)?
            .ok_or(DecodeError::EofBeforeHeader)?;
        let payload = decode_blob_payload(&frame.data)?;
        let header = ingest_header(&HeaderBlock::decode(&payload)?)?;

        if !self.read_types.is_nothing() {
            let concurrency = match self.concurrency.take() {
                Some(c) => c,
                None => Concurrency::Pool(Arc::new(ThreadPool::with_default_size()?)),
            };
            self.pipeline = Some(pipeline::spawn(frames, self.read_types, concurrency)?);
        }

        self.opened = true;
        Ok(header)
    }

    /// Block until the next arena is ready, in input order.
    ///
    /// Returns an empty arena once the stream is exhausted (and on
    /// every call after that, or after `close()` has drained the
    /// queue).
    ///
    /// # Errors
    ///
    /// Any framing or decode error captured by the pipeline, surfaced
    /// in order; [`DecodeError::NotOpened`] before `open()`.
    pub fn read(&mut self) -> Result<Arena, DecodeError> {
        if !self.opened {
            return Err(DecodeError::NotOpened);
        }
        let Some(pipeline) = &self.pipeline else {
            return Ok(Arena::empty());
        };

        match pipeline.results.recv() {
            Ok(slot) => slot.recv().unwrap_or(Err(DecodeError::WorkerLost)),
            // Reader exited and everything queued was consumed: EOF.
            Err(_) => Ok(Arena::empty()),
        }
    }

    /// Signal cancellation and join the reader thread. Arenas already
    /// queued remain readable; `read()` reports EOF after them.
    pub fn close(&mut self) {
        if let Some(pipeline) = &mut self.pipeline {
            pipeline.shut_down();
        }
    }
}

impl Drop for PbfReader {
    fn drop(&mut self) {
        self.close();
    }
}
