// src/logger.rs
//
// Rolling binary frame log. Every ingested frame becomes one bincode
// record, appended in arrival order; the file is flushed every
// FLUSH_INTERVAL records and on drop. A reader iterates records back
// for replay and offline analysis.

use crate::error::CaptureError;
use crate::types::{BodyData, Frame, Timecode};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const FLUSH_INTERVAL: usize = 1000;

/// On-disk record layout. Kept separate from `Frame` so the wire format
/// never shifts under an in-memory refactor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub frame_index: i32,
    pub delay: f32,
    pub bodies: Vec<BodyData>,
    pub unidentified: Vec<[f32; 3]>,
    pub timecode: [i32; 5],
    pub received_at_ms: i64,
}

impl LogRecord {
    /// Truncates the unidentified-marker list at `max_unidentified`;
    /// ghost reflections can otherwise bloat the log without bound.
    pub fn from_frame(frame: &Frame, max_unidentified: usize) -> Self {
        let mut unidentified = frame.unidentified.clone();
        unidentified.truncate(max_unidentified);
        Self {
            frame_index: frame.frame_index as i32,
            delay: frame.delay,
            bodies: frame.bodies.clone(),
            unidentified,
            timecode: frame.timecode.as_array(),
            received_at_ms: frame.received_at_ms,
        }
    }

    pub fn into_frame(self) -> Frame {
        Frame {
            frame_index: self.frame_index as i64,
            received_at_ms: self.received_at_ms,
            delay: self.delay,
            bodies: self.bodies,
            unidentified: self.unidentified,
            timecode: Timecode::from_array(self.timecode),
        }
    }
}

pub struct RollingFrameLogger {
    writer: BufWriter<File>,
    path: PathBuf,
    max_unidentified: usize,
    records_since_flush: usize,
}

impl RollingFrameLogger {
    /// Opens a fresh timestamped log file under `output_dir`.
    pub fn create(output_dir: &str, max_unidentified: usize) -> Result<Self, CaptureError> {
        std::fs::create_dir_all(output_dir)?;
        let path = Path::new(output_dir).join(format!(
            "frames_{}.bin",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        ));
        let file = File::create(&path)?;
        info!("Frame log: {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            max_unidentified,
            records_since_flush: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        let record = LogRecord::from_frame(frame, self.max_unidentified);
        bincode::serialize_into(&mut self.writer, &record)?;
        self.records_since_flush += 1;
        if self.records_since_flush >= FLUSH_INTERVAL {
            self.writer.flush()?;
            self.records_since_flush = 0;
        }
        Ok(())
    }
}

impl Drop for RollingFrameLogger {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Frame log flush on shutdown failed: {}", e);
        }
    }
}

/// Iterates the records of a frame log, in the order they were written.
pub struct LogReader {
    reader: BufReader<File>,
}

impl LogReader {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }
}

impl Iterator for LogReader {
    type Item = Result<LogRecord, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        match bincode::deserialize_from(&mut self.reader) {
            Ok(record) => Some(Ok(record)),
            Err(e) => match *e {
                bincode::ErrorKind::Io(ref io)
                    if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    None
                }
                _ => Some(Err(CaptureError::Encode(e))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    fn frame(index: i64, unidentified: usize) -> Frame {
        let mut f = Frame::new(index);
        f.delay = 0.004;
        f.bodies.push(BodyData {
            name: format!("df{}", index),
            markers: vec![[index as f32, 1.0, 2.0]],
        });
        f.unidentified = (0..unidentified)
            .map(|i| [i as f32, 0.0, 0.0] as Vec3)
            .collect();
        f.timecode.seconds = index as i32;
        f
    }

    #[test]
    fn test_log_round_trip_preserves_order_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut logger =
                RollingFrameLogger::create(dir.path().to_str().unwrap(), 20).unwrap();
            path = logger.path().to_path_buf();
            for i in 0..50 {
                logger.append(&frame(i, 3)).unwrap();
            }
            // Drop flushes the tail below the flush interval.
        }

        let records: Vec<LogRecord> = LogReader::open(&path)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 50);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.frame_index, i as i32);
            assert_eq!(record.bodies[0].name, format!("df{}", i));
            assert_eq!(record.unidentified.len(), 3);
            assert_eq!(record.timecode[3], i as i32);
        }

        // And the record maps back onto a frame.
        let f = records[7].clone().into_frame();
        assert_eq!(f.frame_index, 7);
        assert_eq!(f.timecode.seconds, 7);
    }

    #[test]
    fn test_unidentified_markers_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = RollingFrameLogger::create(dir.path().to_str().unwrap(), 5).unwrap();
        let path = logger.path().to_path_buf();
        logger.append(&frame(0, 40)).unwrap();
        drop(logger);

        let record = LogReader::open(&path).unwrap().next().unwrap().unwrap();
        assert_eq!(record.unidentified.len(), 5);
        // The kept markers are the first ones delivered.
        assert_eq!(record.unidentified[4], [4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_log_yields_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RollingFrameLogger::create(dir.path().to_str().unwrap(), 20).unwrap();
        let path = logger.path().to_path_buf();
        drop(logger);
        assert_eq!(LogReader::open(&path).unwrap().count(), 0);
    }
}
