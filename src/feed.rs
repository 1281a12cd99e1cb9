// src/feed.rs
//
// The motion-capture feed boundary. The real feed pushes frames into
// `Orchestrator::ingest` from its own callback thread; this module holds
// the control seam for it plus a replay feed for bench runs.

use crate::error::CaptureError;
use crate::logger::LogReader;
use crate::types::Frame;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Control surface of the feed itself, as opposed to the frames it
/// delivers. Re-arming restarts the feed's internal ring recording.
pub trait FeedControl: Send + Sync {
    fn rearm(&self);
}

/// Feed with no controllable recording (replay, bench).
pub struct NullFeedControl;

impl FeedControl for NullFeedControl {
    fn rearm(&self) {}
}

/// Replays a rolling frame log through an ingestion callback at a fixed
/// pace, standing in for the live feed.
pub struct LogReplayFeed {
    path: PathBuf,
    fps: u32,
}

impl LogReplayFeed {
    pub fn new(path: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            path: path.into(),
            fps,
        }
    }

    /// Blocks until the whole log has been delivered.
    pub fn run(&self, mut ingest: impl FnMut(Frame)) -> Result<u64, CaptureError> {
        let reader = LogReader::open(&self.path)?;
        let pace = Duration::from_secs_f64(1.0 / self.fps.max(1) as f64);
        let mut delivered = 0u64;

        info!("Replaying {} at {} fps", self.path.display(), self.fps);
        for record in reader {
            match record {
                Ok(r) => {
                    ingest(r.into_frame());
                    delivered += 1;
                    std::thread::sleep(pace);
                }
                Err(e) => {
                    warn!("Replay stopped on corrupt record: {}", e);
                    break;
                }
            }
        }
        info!("Replay finished: {} frames", delivered);
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::RollingFrameLogger;

    #[test]
    fn test_replay_delivers_logged_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = RollingFrameLogger::create(dir.path().to_str().unwrap(), 20).unwrap();
        let path = logger.path().to_path_buf();
        for i in 0..10 {
            logger.append(&Frame::new(i)).unwrap();
        }
        drop(logger);

        let mut seen = Vec::new();
        let delivered = LogReplayFeed::new(path, 100_000)
            .run(|f| seen.push(f.frame_index))
            .unwrap();
        assert_eq!(delivered, 10);
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_replay_missing_file_is_error() {
        let feed = LogReplayFeed::new("/nonexistent/frames.bin", 100);
        assert!(feed.run(|_| {}).is_err());
    }
}
