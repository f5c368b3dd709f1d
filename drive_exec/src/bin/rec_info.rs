//! # Recording Summary
//!
//! Prints a JSON summary of a drive recording: record count, duration,
//! frame sizes, command ranges and distance travelled.
//!
//! Usage: `rec_info <recording.rec>`

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{eyre::eyre, eyre::WrapErr, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;

use drive_lib::recorder::{RecordError, RecordHeader, RecordReader};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Default)]
struct Range {
    min: f64,
    max: f64,
    mean: f64,
}

#[derive(Serialize, Default)]
struct Summary {
    path: String,
    num_records: u64,
    duration_s: f64,
    frame_bytes: Range,
    throttle: Range,
    steering: Range,

    /// Front left encoder ticks between the first and last record
    wheel_ticks: u64,

    /// Offset of a trailing partial record, if the recording was cut short
    truncated_at: Option<u64>,
}

/// Running min/max/mean.
#[derive(Default)]
struct Acc {
    n: u64,
    min: f64,
    max: f64,
    sum: f64,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| eyre!("Usage: rec_info <recording.rec>"))?;

    let file = File::open(&path).wrap_err_with(|| format!("Cannot open {:?}", path))?;
    let mut reader = RecordReader::new(BufReader::new(file));

    let mut summary = Summary {
        path: path.clone(),
        ..Default::default()
    };
    let mut frame_bytes = Acc::default();
    let mut throttle = Acc::default();
    let mut steering = Acc::default();
    let mut first: Option<RecordHeader> = None;
    let mut last: Option<RecordHeader> = None;

    loop {
        let record = match reader.read_record() {
            Ok(Some(r)) => r,
            Ok(None) => break,
            Err(RecordError::Truncated(offset)) => {
                summary.truncated_at = Some(offset);
                break;
            }
            Err(e) => return Err(e).wrap_err("Corrupt recording"),
        };

        summary.num_records += 1;
        frame_bytes.push(record.frame.len() as f64);
        throttle.push(record.header.throttle as f64 / 127.0);
        steering.push(record.header.steering as f64 / 127.0);

        if let Some(ref prev) = last {
            summary.wheel_ticks +=
                record.header.wheel_pos[0].wrapping_sub(prev.wheel_pos[0]) as u64;
        }

        if first.is_none() {
            first = Some(record.header);
        }
        last = Some(record.header);
    }

    if let (Some(a), Some(b)) = (first, last) {
        summary.duration_s = seconds(&b) - seconds(&a);
    }
    summary.frame_bytes = frame_bytes.range();
    summary.throttle = throttle.range();
    summary.steering = steering.range();

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn seconds(h: &RecordHeader) -> f64 {
    h.sec as f64 + h.usec as f64 * 1e-6
}

impl Acc {
    fn push(&mut self, v: f64) {
        if self.n == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.n += 1;
        self.sum += v;
    }

    fn range(&self) -> Range {
        if self.n == 0 {
            return Range::default();
        }
        Range {
            min: self.min,
            max: self.max,
            mean: self.sum / self.n as f64,
        }
    }
}
