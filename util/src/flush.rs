//! Asynchronous disk writer
//!
//! The `AsyncWriter` owns a single background thread which performs all
//! blocking file I/O on behalf of real-time producers. Producers hand
//! buffers over through a `WriterHandle`, which only ever pushes onto an
//! unbounded channel and so never waits on the disk.
//!
//! Entries for a given sink are written in the order they were submitted.
//! On shutdown the queue is drained before the thread exits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Identifies one output sink (an open file or an attached stream) owned by
/// the writer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

/// A fault raised by the writer thread against a particular sink.
///
/// Once a sink has faulted all further data for it is discarded until it is
/// closed.
#[derive(Debug, Clone)]
pub struct SinkFault {
    pub id: SinkId,
    pub message: String,
}

/// Counters reported by the writer thread when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub buffers_written: u64,
    pub bytes_written: u64,
    pub buffers_dropped: u64,
    pub sinks_closed: u64,
    pub files_replaced: u64,
}

/// Cloneable producer side of the writer queue.
#[derive(Clone)]
pub struct WriterHandle {
    tx: Sender<FlushEntry>,
    next_id: Arc<AtomicU64>,
}

/// Owner of the writer thread.
///
/// Dropping the writer drains the queue and joins the thread, prefer calling
/// `shutdown` to get the final statistics.
pub struct AsyncWriter {
    handle: WriterHandle,
    fault_rx: Receiver<SinkFault>,
    replaced_rx: Receiver<SinkId>,
    thread: Option<JoinHandle<WriterStats>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A single job on the writer queue.
pub enum FlushEntry {
    /// Create (truncating) a file and bind it to the sink.
    Open { id: SinkId, path: PathBuf },

    /// Bind an already open stream to the sink.
    Attach {
        id: SinkId,
        writer: Box<dyn Write + Send>,
    },

    /// Write the whole buffer to the sink.
    Data { id: SinkId, buf: Vec<u8> },

    /// No more data for this sink, flush and close it.
    Close { id: SinkId },

    /// Atomically replace the contents of a file. Success is reported
    /// through `poll_replaced`, failure as a fault against `id`.
    ReplaceFile {
        id: SinkId,
        path: PathBuf,
        data: Vec<u8>,
    },

    /// Stop the thread once every earlier entry has been processed.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("Could not spawn the writer thread: {0}")]
    SpawnFailed(std::io::Error),

    #[error("The writer thread is no longer running")]
    WriterStopped,

    #[error("The writer thread panicked")]
    WriterPanicked,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WriterHandle {
    fn next_sink(&self) -> SinkId {
        SinkId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, entry: FlushEntry) -> Result<(), FlushError> {
        self.tx.send(entry).map_err(|_| FlushError::WriterStopped)
    }

    /// Request that a file is created at `path`. The file is opened on the
    /// writer thread, any failure is reported as a `SinkFault`.
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> Result<SinkId, FlushError> {
        let id = self.next_sink();
        self.send(FlushEntry::Open {
            id,
            path: path.as_ref().to_path_buf(),
        })?;
        Ok(id)
    }

    /// Hand an already open stream (e.g. stdout) to the writer thread.
    pub fn attach(&self, writer: Box<dyn Write + Send>) -> Result<SinkId, FlushError> {
        let id = self.next_sink();
        self.send(FlushEntry::Attach { id, writer })?;
        Ok(id)
    }

    /// Queue a buffer for writing, ownership passes to the writer thread.
    pub fn enqueue(&self, id: SinkId, buf: Vec<u8>) -> Result<(), FlushError> {
        self.send(FlushEntry::Data { id, buf })
    }

    /// Queue the end of stream marker for the sink.
    pub fn close(&self, id: SinkId) -> Result<(), FlushError> {
        self.send(FlushEntry::Close { id })
    }

    /// Queue an atomic replacement of the file at `path`.
    ///
    /// The returned id identifies the replacement in `poll_replaced` once it
    /// is on disk, or in a `SinkFault` if it fails.
    pub fn replace_file<P: AsRef<Path>>(&self, path: P, data: Vec<u8>) -> Result<SinkId, FlushError> {
        let id = self.next_sink();
        self.send(FlushEntry::ReplaceFile {
            id,
            path: path.as_ref().to_path_buf(),
            data,
        })?;
        Ok(id)
    }
}

impl AsyncWriter {
    /// Start the writer thread.
    pub fn new() -> Result<Self, FlushError> {
        let (tx, rx) = channel();
        let (fault_tx, fault_rx) = channel();
        let (replaced_tx, replaced_rx) = channel();

        let thread = thread::Builder::new()
            .name("async_writer".into())
            .spawn(move || writer_thread(rx, fault_tx, replaced_tx))
            .map_err(FlushError::SpawnFailed)?;

        Ok(Self {
            handle: WriterHandle {
                tx,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            fault_rx,
            replaced_rx,
            thread: Some(thread),
        })
    }

    /// Get a new producer handle.
    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Collect all faults raised since the last call. Never blocks.
    pub fn poll_faults(&self) -> Vec<SinkFault> {
        self.fault_rx.try_iter().collect()
    }

    /// Collect the ids of the file replacements completed since the last
    /// call. Never blocks.
    pub fn poll_replaced(&self) -> Vec<SinkId> {
        self.replaced_rx.try_iter().collect()
    }

    /// Drain the queue, join the writer thread and return its statistics.
    pub fn shutdown(mut self) -> Result<WriterStats, FlushError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<WriterStats, FlushError> {
        let thread = match self.thread.take() {
            Some(t) => t,
            None => return Err(FlushError::WriterStopped),
        };

        info!("Draining writer queue");

        // Ignore send errors, the thread may have already exited in which
        // case join will tell us what happened
        self.handle.tx.send(FlushEntry::Shutdown).ok();

        let stats = thread.join().map_err(|_| FlushError::WriterPanicked)?;

        info!(
            "Writer thread exited: {} buffers ({} bytes) written, {} dropped",
            stats.buffers_written, stats.bytes_written, stats.buffers_dropped
        );

        Ok(stats)
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                warn!("Writer did not stop cleanly: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Replace the contents of `path` so that readers only ever see the old or
/// the new contents.
///
/// The data is written to a sibling temporary file which is synced to disk
/// and then renamed over the target.
pub fn write_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    match std::fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            std::fs::remove_file(&tmp_path).ok();
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn writer_thread(
    rx: Receiver<FlushEntry>,
    fault_tx: Sender<SinkFault>,
    replaced_tx: Sender<SinkId>,
) -> WriterStats {
    let mut sinks: HashMap<SinkId, Box<dyn Write + Send>> = HashMap::new();
    let mut stats = WriterStats::default();

    let fault = |id: SinkId, message: String| {
        warn!("Writer fault on sink {:?}: {}", id, message);
        fault_tx.send(SinkFault { id, message }).ok();
    };

    // A closed channel means every handle has been dropped, which is the
    // same as a shutdown request
    while let Ok(entry) = rx.recv() {
        match entry {
            FlushEntry::Open { id, path } => {
                match OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                {
                    Ok(f) => {
                        debug!("Opened {:?} as sink {:?}", path, id);
                        sinks.insert(id, Box::new(f));
                    }
                    Err(e) => fault(id, format!("Cannot open {:?}: {}", path, e)),
                }
            }
            FlushEntry::Attach { id, writer } => {
                sinks.insert(id, writer);
            }
            FlushEntry::Data { id, buf } => match sinks.get_mut(&id) {
                Some(w) => match w.write_all(&buf) {
                    Ok(()) => {
                        stats.buffers_written += 1;
                        stats.bytes_written += buf.len() as u64;
                    }
                    Err(e) => {
                        stats.buffers_dropped += 1;
                        sinks.remove(&id);
                        fault(id, format!("Write failed: {}", e));
                    }
                },
                None => stats.buffers_dropped += 1,
            },
            FlushEntry::Close { id } => {
                if let Some(mut w) = sinks.remove(&id) {
                    if let Err(e) = w.flush() {
                        fault(id, format!("Flush on close failed: {}", e));
                    }
                    stats.sinks_closed += 1;
                    debug!("Closed sink {:?}", id);
                }
            }
            FlushEntry::ReplaceFile { id, path, data } => match write_atomic(&path, &data) {
                Ok(()) => {
                    stats.files_replaced += 1;
                    debug!("Replaced {:?}", path);
                    replaced_tx.send(id).ok();
                }
                Err(e) => fault(id, format!("Cannot replace {:?}: {}", path, e)),
            },
            FlushEntry::Shutdown => break,
        }
    }

    // Anything still open is flushed and closed on the way out
    for (id, mut w) in sinks.drain() {
        if let Err(e) = w.flush() {
            warn!("Flush of sink {:?} on shutdown failed: {}", id, e);
        }
    }

    stats
}
