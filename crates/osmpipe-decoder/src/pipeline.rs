//! The threaded blob pipeline.
//!
//! One reader thread frames blobs off the byte stream and dispatches
//! each to a worker pool; an ordered queue of single-use result slots
//! preserves input order no matter which worker finishes first:
//!
//! ```text
//!   reader thread ──frames──▶ worker pool (N threads)
//!        │                        │ resolves
//!        ▼ pushes, in order       ▼
//!   ordered slot queue ──────▶ consumer pops slots in order,
//!   (bounded, cap 20)          blocks on each slot's result
//! ```
//!
//! Backpressure is the original polling scheme: the reader try-sends
//! into the bounded queues and, when full, sleeps 10 ms and re-checks
//! the shared `done` flag. A blocking send would be tidier but could
//! deadlock a cancellation against a full queue; the poll loop cannot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use osmpipe_types::arena::Arena;
use tracing::debug;

use crate::block::parse_primitive_block;
use crate::decompress::decode_blob_payload;
use crate::error::DecodeError;
use crate::frame::{BlobType, FrameReader, RawFrame};
use crate::reader::ReadTypes;

/// Bound on dispatched-but-unfinished decode tasks.
pub const MAX_WORK_QUEUE: usize = 10;

/// Bound on decoded-but-unconsumed result slots.
pub const MAX_BUFFER_QUEUE: usize = 20;

/// How long the reader sleeps when a queue is full.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(10);

/// One blob's pending result: the receiving half of a single-use
/// channel, resolved by whichever thread decodes the blob.
pub type ResultSlot = Receiver<Result<Arena, DecodeError>>;

type Task = Box<dyn FnOnce() + Send>;

/// An explicitly constructed pool of decode workers.
///
/// The pool is plain data handed to the reader by the caller — nothing
/// process-global. Share one across several readers via `Arc`, or let
/// each reader build its own. Dropping the pool closes the task channel
/// and joins the workers.
pub struct ThreadPool {
    tx: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `threads` workers (at least one).
    ///
    /// # Errors
    ///
    /// Propagates the OS error if a worker thread cannot be spawned.
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let (tx, rx) = bounded::<Task>(MAX_WORK_QUEUE);

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("osmpipe-worker-{i}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        task();
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            workers,
        })
    }

    /// A pool sized to the machine.
    pub fn with_default_size() -> std::io::Result<Self> {
        let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::new(threads)
    }

    fn try_submit(&self, task: Task) -> Result<(), TrySendError<Task>> {
        self.tx
            .as_ref()
            .expect("task channel open until drop")
            .try_send(task)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// How decode work is scheduled.
pub enum Concurrency {
    /// Decode on the reader thread itself; the slot queue still
    /// mediates delivery.
    SingleThreaded,
    /// Decode on the given pool.
    Pool(Arc<ThreadPool>),
}

/// Handle to a running pipeline, owned by the consumer side.
pub struct Pipeline {
    pub results: Receiver<ResultSlot>,
    done: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Signal cancellation and join the reader thread. Queued results
    /// stay available on `results`.
    pub fn shut_down(&mut self) {
        self.done.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// Spawn the reader thread over an already-opened frame reader (the
/// OSMHeader frame must have been consumed).
///
/// # Errors
///
/// Propagates the OS error if the reader thread cannot be spawned.
pub fn spawn(
    frames: FrameReader,
    read_types: ReadTypes,
    concurrency: Concurrency,
) -> std::io::Result<Pipeline> {
    let (results_tx, results_rx) = bounded::<ResultSlot>(MAX_BUFFER_QUEUE);
    let done = Arc::new(AtomicBool::new(false));

    let reader_done = Arc::clone(&done);
    let reader = std::thread::Builder::new()
        .name("osmpipe-pbf-read".to_owned())
        .spawn(move || run_reader(frames, read_types, &concurrency, &results_tx, &reader_done))?;

    Ok(Pipeline {
        results: results_rx,
        done,
        reader: Some(reader),
    })
}

/// Decode one data blob end to end. Runs on a worker (or inline).
fn decode_data_blob(frame: &RawFrame, read_types: ReadTypes) -> Result<Arena, DecodeError> {
    let payload = decode_blob_payload(&frame.data)?;
    parse_primitive_block(&payload, read_types)
}

fn run_reader(
    mut frames: FrameReader,
    read_types: ReadTypes,
    concurrency: &Concurrency,
    results_tx: &Sender<ResultSlot>,
    done: &AtomicBool,
) {
    loop {
        if done.load(Ordering::Relaxed) {
            debug!("reader cancelled");
            return;
        }

        match frames.next_frame(BlobType::Data) {
            Ok(Some(frame)) => {
                // Dispatch first, enqueue the slot second: a slot that
                // reaches the consumer always has (or will get) a
                // resolution, and one dropped during cancellation was
                // never visible.
                let (slot_tx, slot_rx) = bounded(1);

                match concurrency {
                    Concurrency::SingleThreaded => {
                        let _ = slot_tx.send(decode_data_blob(&frame, read_types));
                    }
                    Concurrency::Pool(pool) => {
                        let task: Task = Box::new(move || {
                            let _ = slot_tx.send(decode_data_blob(&frame, read_types));
                        });
                        if !submit_with_backpressure(pool, task, done) {
                            return;
                        }
                    }
                }

                if !send_with_backpressure(results_tx, slot_rx, done) {
                    return;
                }
            }
            Ok(None) => {
                debug!("reader reached EOF");
                return;
            }
            Err(err) => {
                // The error travels the same ordered path as data, so
                // the consumer sees every earlier buffer first. The
                // poll loop keeps cancellation from deadlocking here
                // against a full queue.
                let (slot_tx, slot_rx) = bounded(1);
                let _ = slot_tx.send(Err(err));
                send_with_backpressure(results_tx, slot_rx, done);
                debug!("reader stopped on error");
                return;
            }
        }
    }
}

/// Try-send with the 10 ms poll loop. Returns false when cancelled or
/// when the consumer has gone away.
fn send_with_backpressure(tx: &Sender<ResultSlot>, mut slot: ResultSlot, done: &AtomicBool) -> bool {
    loop {
        match tx.try_send(slot) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                if done.load(Ordering::Relaxed) {
                    return false;
                }
                slot = back;
                std::thread::sleep(BACKPRESSURE_POLL);
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

fn submit_with_backpressure(pool: &ThreadPool, mut task: Task, done: &AtomicBool) -> bool {
    loop {
        match pool.try_submit(task) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                if done.load(Ordering::Relaxed) {
                    return false;
                }
                task = back;
                std::thread::sleep(BACKPRESSURE_POLL);
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_runs_tasks() {
        let pool = ThreadPool::new(2).unwrap();
        let (tx, rx) = bounded(4);
        for i in 0..4 {
            let tx = tx.clone();
            let task: Task = Box::new(move || {
                tx.send(i).unwrap();
            });
            assert!(pool.try_submit(task).is_ok(), "queue unexpectedly full");
        }
        drop(tx);
        let mut got: Vec<i32> = rx.iter().collect();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[test]
    fn pool_drop_joins_workers() {
        let pool = ThreadPool::new(4).unwrap();
        drop(pool); // must not hang
    }

    #[test]
    fn slot_resolved_out_of_order_is_consumed_in_order() {
        // Simulate two workers finishing in reverse order.
        let (slot1_tx, slot1_rx) = bounded(1);
        let (slot2_tx, slot2_rx) = bounded(1);
        let (q_tx, q_rx) = bounded::<ResultSlot>(MAX_BUFFER_QUEUE);
        q_tx.send(slot1_rx).unwrap();
        q_tx.send(slot2_rx).unwrap();

        slot2_tx.send(Ok(Arena::empty())).unwrap();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            slot1_tx.send(Err(DecodeError::EmptyBlob)).unwrap();
        });

        // First pop must deliver slot 1's (late) result first.
        let first = q_rx.recv().unwrap().recv().unwrap();
        assert!(matches!(first, Err(DecodeError::EmptyBlob)));
        let second = q_rx.recv().unwrap().recv().unwrap();
        assert!(second.is_ok());
    }
}
