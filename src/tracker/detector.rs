// src/tracker/detector.rs
//
// Takeoff/landing state machine driven by the windowed kinematic
// statistics. Runs on the detection consumer thread only; bodies are
// mutated here and nowhere else.

use crate::tracker::body::{windowed_props, TrackedBody};
use crate::types::TrackingConfig;
use tracing::{info, warn};

/// Events emitted by one detection pass, in the order they occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    Takeoff {
        body_id: u32,
        start_frame: i64,
    },
    /// All airborne bodies came to rest (or timed out). Time offsets are
    /// seconds before the frame that completed the landing.
    Landing {
        start_time_ago: f32,
        end_time_ago: f32,
        forced: bool,
    },
    /// A pending save reached its evaluation deadline.
    ResolvePending {
        commit: bool,
    },
}

pub struct TakeoffDetector {
    cfg: TrackingConfig,
    /// Feed frame rate. Frame indices advance at this rate, so the save
    /// window offsets divide by it; the (possibly decimated) analysis
    /// rate only scales velocities.
    fps: u32,
    last_landing_frame: Option<i64>,
}

impl TakeoffDetector {
    pub fn new(cfg: TrackingConfig, fps: u32) -> Self {
        Self {
            cfg,
            fps,
            last_landing_frame: None,
        }
    }

    /// Run one detection pass over the current body set.
    ///
    /// `pending_deadline` is the evaluation frame of an outstanding pending
    /// save, if one exists; reaching it emits a `ResolvePending` event.
    pub fn process(
        &mut self,
        bodies: &mut [TrackedBody],
        frame_index: i64,
        pending_deadline: Option<i64>,
    ) -> Vec<DetectorEvent> {
        let mut events = Vec::new();

        if let Some(deadline) = pending_deadline {
            if frame_index >= deadline {
                events.push(self.resolve_pending(bodies));
            }
        }

        self.detect_takeoffs(bodies, frame_index, &mut events);
        self.detect_landing(bodies, frame_index, &mut events);

        events
    }

    fn cooldown_elapsed(&self, frame_index: i64) -> bool {
        match self.last_landing_frame {
            Some(last) => frame_index - last >= self.cfg.min_takeoff_cooldown,
            None => true,
        }
    }

    fn detect_takeoffs(
        &mut self,
        bodies: &mut [TrackedBody],
        frame_index: i64,
        events: &mut Vec<DetectorEvent>,
    ) {
        for body in bodies.iter_mut() {
            if body.takeoff_start_frame.is_some() {
                continue;
            }
            if body.avg_takeoff_speed <= self.cfg.takeoff_speed_threshold
                || body.avg_takeoff_marker_num <= self.cfg.marker_minimum
            {
                continue;
            }
            if !self.cooldown_elapsed(frame_index) {
                continue;
            }

            // Walk back into the history for the moment the body was last
            // at rest; that window's newest sample is the takeoff start.
            let mut start_frame = body
                .history
                .back()
                .map(|s| s.frame_index)
                .unwrap_or(frame_index);
            for offset in 0..body.history.len() {
                let (speed, _) =
                    windowed_props(&body.history, offset, self.cfg.stationary_detection_window);
                if speed < self.cfg.stationary_speed_threshold {
                    start_frame = body.history[offset].frame_index;
                    break;
                }
            }

            body.takeoff_start_frame = Some(start_frame);
            body.last_takeoff_start_frame = Some(start_frame);
            info!(
                "🛫 Takeoff: body {} ('{}') at frame {}, started frame {} (speed {:.1})",
                body.id, body.name, frame_index, start_frame, body.avg_takeoff_speed
            );
            events.push(DetectorEvent::Takeoff {
                body_id: body.id,
                start_frame,
            });
        }
    }

    fn detect_landing(
        &mut self,
        bodies: &mut [TrackedBody],
        frame_index: i64,
        events: &mut Vec<DetectorEvent>,
    ) {
        let mut airborne = 0usize;
        let mut min_start = i64::MAX;
        let mut forced = false;

        for body in bodies.iter() {
            let Some(start) = body.takeoff_start_frame else {
                continue;
            };
            airborne += 1;
            min_start = min_start.min(start);

            if body.avg_stationary_speed < self.cfg.stationary_speed_threshold {
                continue;
            }
            if frame_index - start > self.cfg.landing_timeout {
                forced = true;
                continue;
            }
            // Still in the air.
            return;
        }

        if airborne == 0 {
            return;
        }

        let takeoff_end_frame = frame_index - self.cfg.stationary_detection_window as i64;
        let start_time_ago = (frame_index - min_start) as f32 / self.fps as f32;
        let end_time_ago = (frame_index - takeoff_end_frame) as f32 / self.fps as f32;

        for body in bodies.iter_mut() {
            body.takeoff_start_frame = None;
        }
        self.last_landing_frame = Some(frame_index);

        if forced {
            warn!(
                "Forced landing at frame {}: airborne past {} frames",
                frame_index, self.cfg.landing_timeout
            );
        } else {
            info!(
                "🛬 Landing at frame {}: flight window {:.3}s..{:.3}s ago",
                frame_index, start_time_ago, end_time_ago
            );
        }
        events.push(DetectorEvent::Landing {
            start_time_ago,
            end_time_ago,
            forced,
        });
    }

    /// Commit the pending save iff any body moved enough vertically during
    /// the evaluation window.
    fn resolve_pending(&self, bodies: &[TrackedBody]) -> DetectorEvent {
        let mut best = 0.0f32;
        for body in bodies {
            best = best.max(body.z_excursion());
        }
        let commit = best > self.cfg.pending_save_min_z_distance;
        info!(
            "Pending save evaluated: max z excursion {:.1} (threshold {:.1}) -> {}",
            best,
            self.cfg.pending_save_min_z_distance,
            if commit { "commit" } else { "discard" }
        );
        DetectorEvent::ResolvePending { commit }
    }
}
