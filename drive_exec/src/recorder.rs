//! # Recorder
//!
//! Records camera frames along with the sensor readings and commands of the
//! cycle they were used in, for offline replay and tuning.
//!
//! ## Record format
//!
//! Each record is a little endian 55 byte header followed by the raw frame:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | total record length in bytes, including this field |
//! | 4 | 4 | timestamp seconds |
//! | 8 | 4 | timestamp microseconds |
//! | 12 | 1 | throttle command, `i8` |
//! | 13 | 1 | steering command, `i8` |
//! | 14 | 12 | accelerometer, `3 x f32` |
//! | 26 | 12 | gyroscope, `3 x f32` |
//! | 38 | 1 | servo position |
//! | 39 | 8 | wheel encoder positions, `4 x u16` |
//! | 47 | 8 | wheel tick periods, `4 x u16` |
//! | 55 | n | frame bytes |
//!
//! Readers must use the length field to find the next record and treat the
//! frame bytes as opaque.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

// Internal
use util::flush::{FlushError, SinkFault, SinkId, WriterHandle};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Length of the fixed part of each record.
pub const HEADER_LEN: usize = 55;

/// Records longer than this are assumed to be corrupt.
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Format of the default recording file name.
pub const DEFAULT_NAME_FORMAT: &str = "cycloid-%Y%m%d-%H%M%S.rec";

/// Target which sends the recording to standard output.
pub const STDOUT_TARGET: &str = "-";

/// Building or handing over a record slower than this is reported.
const SLOW_RECORD_S: f64 = 0.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Fixed part of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecordHeader {
    pub sec: u32,
    pub usec: u32,
    pub throttle: i8,
    pub steering: i8,
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
    pub servo_pos: u8,
    pub wheel_pos: [u16; 4],
    pub wheel_dt: [u16; 4],
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub header: RecordHeader,
    pub frame: Vec<u8>,
}

/// Reads consecutive records from a stream.
pub struct RecordReader<R: Read> {
    inner: R,
    offset: u64,
}

/// Streams records to the `AsyncWriter`.
pub struct Recorder {
    writer: WriterHandle,

    /// Directory file targets are created in
    dir: PathBuf,

    /// Sink of the active recording
    sink: Option<SinkId>,

    /// Name of the active recording
    target: String,

    /// Number of frames skipped between records
    frameskip: u32,

    frame_counter: u32,

    num_records: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record at byte {0} is truncated")]
    Truncated(u64),

    #[error("Record at byte {0} has an invalid length of {1}")]
    BadLength(u64, usize),

    #[error("Cannot read the recording: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Already recording to {0}")]
    AlreadyRecording(String),

    #[error("Cannot hand the recording to the writer: {0}")]
    WriterError(#[from] FlushError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RecordHeader {
    fn encode_into(&self, buf: &mut [u8], total_len: u32) {
        LittleEndian::write_u32(&mut buf[0..4], total_len);
        LittleEndian::write_u32(&mut buf[4..8], self.sec);
        LittleEndian::write_u32(&mut buf[8..12], self.usec);
        buf[12] = self.throttle as u8;
        buf[13] = self.steering as u8;
        LittleEndian::write_f32_into(&self.accel, &mut buf[14..26]);
        LittleEndian::write_f32_into(&self.gyro, &mut buf[26..38]);
        buf[38] = self.servo_pos;
        LittleEndian::write_u16_into(&self.wheel_pos, &mut buf[39..47]);
        LittleEndian::write_u16_into(&self.wheel_dt, &mut buf[47..55]);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut h = RecordHeader {
            sec: LittleEndian::read_u32(&buf[4..8]),
            usec: LittleEndian::read_u32(&buf[8..12]),
            throttle: buf[12] as i8,
            steering: buf[13] as i8,
            servo_pos: buf[38],
            ..Default::default()
        };
        LittleEndian::read_f32_into(&buf[14..26], &mut h.accel);
        LittleEndian::read_f32_into(&buf[26..38], &mut h.gyro);
        LittleEndian::read_u16_into(&buf[39..47], &mut h.wheel_pos);
        LittleEndian::read_u16_into(&buf[47..55], &mut h.wheel_dt);
        h
    }
}

impl LogRecord {
    /// Serialise a header and frame into one record buffer.
    pub fn encode(header: &RecordHeader, frame: &[u8]) -> Vec<u8> {
        let total = HEADER_LEN + frame.len();
        let mut buf = vec![0u8; total];
        header.encode_into(&mut buf[..HEADER_LEN], total as u32);
        buf[HEADER_LEN..].copy_from_slice(frame);
        buf
    }

    /// Parse a single record, which must fill `buf` exactly.
    pub fn decode(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < HEADER_LEN {
            return Err(RecordError::Truncated(0));
        }
        let len = LittleEndian::read_u32(&buf[0..4]) as usize;
        if len < HEADER_LEN || len > MAX_RECORD_LEN {
            return Err(RecordError::BadLength(0, len));
        }
        if len > buf.len() {
            return Err(RecordError::Truncated(0));
        }
        if len < buf.len() {
            return Err(RecordError::BadLength(0, len));
        }

        Ok(Self {
            header: RecordHeader::decode(buf),
            frame: buf[HEADER_LEN..].to_vec(),
        })
    }

    /// Total encoded length of the record.
    pub fn len(&self) -> usize {
        HEADER_LEN + self.frame.len()
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Byte offset of the next record.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next record, `None` at a clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<LogRecord>, RecordError> {
        let mut len_buf = [0u8; 4];

        // Distinguish a clean end of stream from one inside the length field
        let mut got = 0;
        while got < len_buf.len() {
            match self.inner.read(&mut len_buf[got..]) {
                Ok(0) if got == 0 => return Ok(None),
                Ok(0) => return Err(RecordError::Truncated(self.offset)),
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecordError::Io(e)),
            }
        }

        let len = LittleEndian::read_u32(&len_buf) as usize;
        if len < HEADER_LEN || len > MAX_RECORD_LEN {
            return Err(RecordError::BadLength(self.offset, len));
        }

        let mut buf = vec![0u8; len];
        buf[..4].copy_from_slice(&len_buf);
        self.inner.read_exact(&mut buf[4..]).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                RecordError::Truncated(self.offset)
            } else {
                RecordError::Io(e)
            }
        })?;

        self.offset += len as u64;

        Ok(Some(LogRecord {
            header: RecordHeader::decode(&buf),
            frame: buf.split_off(HEADER_LEN),
        }))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<LogRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

impl Recorder {
    /// Create a recorder writing file targets into `dir`.
    pub fn new(writer: WriterHandle, dir: PathBuf) -> Self {
        Self {
            writer,
            dir,
            sink: None,
            target: String::new(),
            frameskip: 0,
            frame_counter: 0,
            num_records: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.sink.is_some()
    }

    /// Number of records emitted in the active or last recording.
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Start recording to `target`, either a file name in the recorder's
    /// directory or `-` for standard output.
    ///
    /// One record is emitted every `frameskip + 1` frames.
    pub fn start(&mut self, target: &str, frameskip: u32) -> Result<(), RecorderError> {
        if self.sink.is_some() {
            return Err(RecorderError::AlreadyRecording(self.target.clone()));
        }

        let sink = if target == STDOUT_TARGET {
            self.writer.attach(Box::new(io::stdout()))?
        } else {
            self.writer.open_file(self.dir.join(target))?
        };

        self.sink = Some(sink);
        self.target = target.to_string();
        self.frameskip = frameskip;
        self.frame_counter = 0;
        self.num_records = 0;

        info!("Started recording to {} (frameskip {})", target, frameskip);
        Ok(())
    }

    /// Stop the active recording, returning false if there wasn't one.
    ///
    /// Records already handed over are still written.
    pub fn stop(&mut self) -> Result<bool, RecorderError> {
        match self.sink.take() {
            Some(sink) => {
                self.writer.close(sink)?;
                info!(
                    "Stopped recording to {} after {} records",
                    self.target, self.num_records
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Called once per frame, emits a record if one is due.
    ///
    /// Returns true if a record was emitted.
    pub fn on_frame(&mut self, header: &RecordHeader, frame: &[u8]) -> Result<bool, RecorderError> {
        let sink = match self.sink {
            Some(s) => s,
            None => return Ok(false),
        };

        self.frame_counter += 1;
        if self.frame_counter <= self.frameskip {
            return Ok(false);
        }
        self.frame_counter = 0;

        let start = Instant::now();
        let buf = LogRecord::encode(header, frame);
        let build_s = start.elapsed().as_secs_f64();
        if build_s > SLOW_RECORD_S {
            warn!("Building a {} byte record took {:.3} s", buf.len(), build_s);
        }

        let start = Instant::now();
        self.writer.enqueue(sink, buf)?;
        let enqueue_s = start.elapsed().as_secs_f64();
        if enqueue_s > SLOW_RECORD_S {
            warn!("Handing a record to the writer took {:.3} s", enqueue_s);
        }

        self.num_records += 1;
        Ok(true)
    }

    /// Handle a fault raised by the writer.
    ///
    /// If it is against the active recording the recording is abandoned and
    /// true is returned.
    pub fn handle_fault(&mut self, fault: &SinkFault) -> bool {
        if self.sink != Some(fault.id) {
            return false;
        }

        warn!("Recording to {} disabled: {}", self.target, fault.message);
        self.sink = None;
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use util::flush::AsyncWriter;

    fn header(n: u32) -> RecordHeader {
        RecordHeader {
            sec: 1_600_000_000 + n,
            usec: 250_000,
            throttle: -127,
            steering: 64,
            accel: [0.1, -0.2, 9.81],
            gyro: [0.0, 0.01, -0.5],
            servo_pos: 130,
            wheel_pos: [1, 2, 65535, 4],
            wheel_dt: [100, 200, 300, 400],
        }
    }

    #[test]
    fn test_layout() {
        let buf = LogRecord::encode(&header(0), &[0xaa, 0xbb]);

        assert_eq!(buf.len(), 57);
        assert_eq!(&buf[0..4], &[57, 0, 0, 0]);
        assert_eq!(buf[12], 0x81);
        assert_eq!(buf[13], 64);
        assert_eq!(&buf[22..26], &9.81f32.to_le_bytes());
        assert_eq!(buf[38], 130);
        assert_eq!(&buf[43..45], &[0xff, 0xff]);
        assert_eq!(&buf[53..55], &[0x90, 0x01]);
        assert_eq!(&buf[55..], &[0xaa, 0xbb]);

        let rec = LogRecord::decode(&buf).unwrap();
        assert_eq!(rec.header, header(0));
        assert_eq!(rec.len(), 57);
    }

    #[test]
    fn test_reader() {
        let mut stream = Vec::new();
        stream.extend(LogRecord::encode(&header(0), &[1, 2, 3]));
        stream.extend(LogRecord::encode(&header(1), &[]));
        stream.extend(LogRecord::encode(&header(2), &[9; 100]));

        let recs: Vec<LogRecord> = RecordReader::new(Cursor::new(&stream))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].frame, vec![1, 2, 3]);
        assert!(recs[1].frame.is_empty());
        assert_eq!(recs[2].header.sec, 1_600_000_002);

        // Truncated final record
        stream.truncate(stream.len() - 1);
        let mut reader = RecordReader::new(Cursor::new(&stream));
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(RecordError::Truncated(113)))));

        // Length shorter than the header
        let bad = [10u8, 0, 0, 0, 0, 0];
        assert!(matches!(
            RecordReader::new(Cursor::new(&bad[..])).next(),
            Some(Err(RecordError::BadLength(0, 10)))
        ));
    }

    #[test]
    fn test_frameskip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AsyncWriter::new().unwrap();
        let mut rec = Recorder::new(writer.handle(), dir.path().to_path_buf());

        // Nothing happens before starting
        assert!(!rec.on_frame(&header(0), &[]).unwrap());

        rec.start("test.rec", 2).unwrap();
        assert!(matches!(
            rec.start("other.rec", 0),
            Err(RecorderError::AlreadyRecording(_))
        ));

        let emitted: Vec<bool> = (0..9)
            .map(|i| rec.on_frame(&header(i), &[i as u8]).unwrap())
            .collect();
        assert_eq!(
            emitted,
            vec![false, false, true, false, false, true, false, false, true]
        );

        assert!(rec.stop().unwrap());
        assert!(!rec.stop().unwrap());
        assert_eq!(rec.num_records(), 3);

        writer.shutdown().unwrap();

        let file = std::fs::File::open(dir.path().join("test.rec")).unwrap();
        let frames: Vec<u8> = RecordReader::new(file)
            .map(|r| r.unwrap().frame[0])
            .collect();
        assert_eq!(frames, vec![2, 5, 8]);
    }

    #[test]
    fn test_fault_disables_recording() {
        let dir = tempfile::tempdir().unwrap();
        let writer = AsyncWriter::new().unwrap();
        let mut rec = Recorder::new(writer.handle(), dir.path().join("missing"));

        rec.start("test.rec", 0).unwrap();
        rec.on_frame(&header(0), &[]).unwrap();

        // The writer has processed the open once a later barrier is done
        let barrier = dir.path().join("barrier");
        writer.handle().replace_file(&barrier, vec![]).unwrap();
        while !barrier.exists() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let faults = writer.poll_faults();
        assert_eq!(faults.len(), 1);
        assert!(rec.handle_fault(&faults[0]));
        assert!(!rec.is_recording());
        assert!(!rec.handle_fault(&faults[0]));

        writer.shutdown().unwrap();
    }
}
