//! Struct archiving functionality
//!
//! Rows are serialised to CSV on the calling thread and handed to the
//! `AsyncWriter` for writing, so archiving never touches the disk from the
//! producer's context.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

// Internal imports
use crate::flush::{FlushError, SinkId, WriterHandle};
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    writer: WriterHandle,
    sink: SinkId,
    header_written: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot serialise the record: {0}")]
    SerialiseError(#[from] csv::Error),

    #[error("Cannot extract the serialised record: {0}")]
    BufferError(String),

    #[error("Cannot send the record to the writer: {0}")]
    WriterError(#[from] FlushError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session,
        writer: WriterHandle,
        path: P,
    ) -> Result<Self, ArchiveError> {
        let full_path = session.arch_root.join(path);
        let sink = writer.open_file(full_path)?;

        Ok(Self {
            writer,
            sink,
            header_written: false,
        })
    }

    /// Writer sink the archive file is bound to, for matching faults.
    pub fn sink(&self) -> SinkId {
        self.sink
    }

    /// Serialise a record into the archive.
    ///
    /// The header row is emitted along with the first record.
    pub fn serialise<T: Serialize>(&mut self, record: &T) -> Result<(), ArchiveError> {
        let mut w = WriterBuilder::new()
            .has_headers(!self.header_written)
            .from_writer(Vec::with_capacity(256));

        w.serialize(record)?;

        let buf = w
            .into_inner()
            .map_err(|e| ArchiveError::BufferError(e.to_string()))?;

        self.writer.enqueue(self.sink, buf)?;
        self.header_written = true;

        Ok(())
    }

    /// Close the archive file once all queued records are written.
    pub fn close(self) -> Result<(), ArchiveError> {
        self.writer.close(self.sink)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flush::AsyncWriter;

    #[derive(Serialize)]
    struct Row {
        time_s: f64,
        v_ms: f64,
        mode: &'static str,
    }

    #[test]
    fn test_archive_rows() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::in_dir("test", dir.path()).unwrap();
        let writer = AsyncWriter::new().unwrap();

        let mut arch = Archiver::from_path(&session, writer.handle(), "ctrl.csv").unwrap();
        arch.serialise(&Row { time_s: 0.0, v_ms: 1.5, mode: "Manual" }).unwrap();
        arch.serialise(&Row { time_s: 0.1, v_ms: 1.25, mode: "Autodrive" }).unwrap();
        arch.close().unwrap();

        writer.shutdown().unwrap();

        let text = std::fs::read_to_string(session.arch_root.join("ctrl.csv")).unwrap();
        assert_eq!(
            text,
            "time_s,v_ms,mode\n0.0,1.5,Manual\n0.1,1.25,Autodrive\n"
        );
    }

    #[test]
    fn test_open_failure_faults_sink() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::in_dir("test", dir.path()).unwrap();
        let writer = AsyncWriter::new().unwrap();

        let mut arch =
            Archiver::from_path(&session, writer.handle(), "missing/ctrl.csv").unwrap();
        arch.serialise(&Row { time_s: 0.0, v_ms: 1.5, mode: "Manual" }).unwrap();

        let sink = arch.sink();
        arch.close().unwrap();
        writer.handle().replace_file(dir.path().join("barrier"), vec![]).unwrap();
        while writer.poll_replaced().is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let faults = writer.poll_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].id, sink);
    }
}
