// src/error.rs

use thiserror::Error;

/// Failure taxonomy for the hardware and broadcast layers.
///
/// Faults on the real-time ingestion path are never surfaced through this
/// type; they are converted to log lines so the feed callback can stay
/// non-blocking.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("hardware link: {0}")]
    Hardware(String),

    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("frame log encoding: {0}")]
    Encode(#[from] bincode::Error),

    #[error("broadcast: {0}")]
    Broadcast(String),
}
