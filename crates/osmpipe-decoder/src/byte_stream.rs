//! Adapts an external chunked byte source to the blocking
//! "read exactly N bytes" interface the frame reader wants.

use std::io::Read;

use crossbeam_channel::Receiver;

use crate::error::DecodeError;

/// Default chunk size when pulling from a `Read` source.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A source of byte chunks. An empty chunk signals clean EOF; after
/// that the source is not polled again.
pub trait ChunkSource: Send {
    /// Produce the next chunk. `Ok(vec![])` means end of input.
    fn next_chunk(&mut self) -> std::io::Result<Vec<u8>>;
}

/// Chunked view over any blocking [`Read`] (file, socket, stdin).
pub struct ReadChunkSource<R> {
    inner: R,
}

impl<R> ReadChunkSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read + Send> ChunkSource for ReadChunkSource<R> {
    fn next_chunk(&mut self) -> std::io::Result<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let n = self.inner.read(&mut chunk)?;
        chunk.truncate(n);
        Ok(chunk)
    }
}

/// Chunks delivered by another thread through a bounded channel.
///
/// The feeding side signals EOF by sending an empty chunk or dropping
/// its sender.
pub struct ChannelChunkSource {
    rx: Receiver<Vec<u8>>,
}

impl ChannelChunkSource {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }
}

impl ChunkSource for ChannelChunkSource {
    fn next_chunk(&mut self) -> std::io::Result<Vec<u8>> {
        // A disconnected channel is a clean EOF, same as an empty chunk.
        Ok(self.rx.recv().unwrap_or_default())
    }
}

/// Blocking exact-read adapter with a residual buffer.
///
/// `read_exact` pulls chunks until the destination is filled, keeping
/// any surplus for the next call. EOF landing precisely on a request
/// boundary is reported as `Ok(false)`; EOF mid-request is an error,
/// because a PBF stream can only end between frames.
pub struct ByteStream {
    source: Box<dyn ChunkSource>,
    residual: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl ByteStream {
    pub fn new(source: Box<dyn ChunkSource>) -> Self {
        Self {
            source,
            residual: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    pub fn from_read<R: Read + Send + 'static>(read: R) -> Self {
        Self::new(Box::new(ReadChunkSource::new(read)))
    }

    pub fn from_channel(rx: Receiver<Vec<u8>>) -> Self {
        Self::new(Box::new(ChannelChunkSource::new(rx)))
    }

    /// Fill `dst` completely.
    ///
    /// Returns `Ok(true)` when filled, `Ok(false)` on clean EOF with
    /// zero bytes pending.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnexpectedEof`] when the source ends after some
    /// but not all requested bytes; [`DecodeError::Io`] on source
    /// failure.
    pub fn read_exact(&mut self, dst: &mut [u8]) -> Result<bool, DecodeError> {
        let mut filled = 0;

        while filled < dst.len() {
            let available = self.residual.len() - self.pos;
            if available > 0 {
                let take = available.min(dst.len() - filled);
                dst[filled..filled + take]
                    .copy_from_slice(&self.residual[self.pos..self.pos + take]);
                self.pos += take;
                filled += take;
                continue;
            }

            if self.eof {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(DecodeError::UnexpectedEof);
            }

            let chunk = self.source.next_chunk()?;
            if chunk.is_empty() {
                self.eof = true;
            } else {
                self.residual = chunk;
                self.pos = 0;
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out the configured chunks one by one, then EOF.
    struct ScriptedSource {
        chunks: Vec<Vec<u8>>,
    }

    impl ChunkSource for ScriptedSource {
        fn next_chunk(&mut self) -> std::io::Result<Vec<u8>> {
            if self.chunks.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(self.chunks.remove(0))
            }
        }
    }

    fn scripted(chunks: Vec<Vec<u8>>) -> ByteStream {
        ByteStream::new(Box::new(ScriptedSource { chunks }))
    }

    #[test]
    fn reads_across_chunk_boundaries() {
        let mut stream = scripted(vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
        let mut buf = [0u8; 5];
        assert!(stream.read_exact(&mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3, 4, 5]);

        let mut buf = [0u8; 1];
        assert!(stream.read_exact(&mut buf).unwrap());
        assert_eq!(buf, [6]);
    }

    #[test]
    fn clean_eof_at_boundary() {
        let mut stream = scripted(vec![vec![1, 2]]);
        let mut buf = [0u8; 2];
        assert!(stream.read_exact(&mut buf).unwrap());
        assert!(!stream.read_exact(&mut buf).unwrap());
        // repeated reads keep reporting EOF
        assert!(!stream.read_exact(&mut buf).unwrap());
    }

    #[test]
    fn eof_mid_request_is_an_error() {
        let mut stream = scripted(vec![vec![1, 2, 3]]);
        let mut buf = [0u8; 4];
        assert!(matches!(
            stream.read_exact(&mut buf),
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn empty_request_always_succeeds() {
        let mut stream = scripted(vec![]);
        assert!(stream.read_exact(&mut []).unwrap());
    }

    #[test]
    fn from_read_source() {
        let mut stream = ByteStream::from_read(Cursor::new(vec![9u8; 100_000]));
        let mut buf = vec![0u8; 100_000];
        assert!(stream.read_exact(&mut buf).unwrap());
        assert_eq!(buf, vec![9u8; 100_000]);
        assert!(!stream.read_exact(&mut [0u8; 1]).unwrap());
    }

    #[test]
    fn from_channel_source() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(vec![1, 2, 3]).unwrap();
        drop(tx);

        let mut stream = ByteStream::from_channel(rx);
        let mut buf = [0u8; 3];
        assert!(stream.read_exact(&mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3]);
        assert!(!stream.read_exact(&mut buf).unwrap());
    }
}
