// src/tracker/body.rs
//
// Per-body position history and windowed kinematic statistics.

use crate::types::{TrackingConfig, Vec3};
use std::collections::VecDeque;

/// One sample of a body's trajectory. `velocity` is the vertical (z-axis)
/// speed computed at the time this sample was the newest one; older samples
/// keep the value they were assigned then.
#[derive(Debug, Clone, Copy)]
pub struct PositionSample {
    pub frame_index: i64,
    pub position: Vec3,
    pub velocity: f32,
    pub num_markers: u32,
}

/// A tracked physical object: a name plus a bounded, newest-first history
/// of recent positions. Mutated only by the detection consumer thread.
#[derive(Debug)]
pub struct TrackedBody {
    pub id: u32,
    pub name: String,
    /// Newest-first. Never empty while the body is live.
    pub history: VecDeque<PositionSample>,

    // Windowed running averages, recomputed on every update.
    pub avg_takeoff_speed: f32,
    pub avg_takeoff_marker_num: f32,
    pub avg_stationary_speed: f32,
    pub avg_stationary_marker_num: f32,

    pub takeoff_start_frame: Option<i64>,
    pub last_takeoff_start_frame: Option<i64>,
}

impl TrackedBody {
    pub fn new(id: u32, name: String) -> Self {
        Self {
            id,
            name,
            history: VecDeque::new(),
            avg_takeoff_speed: 0.0,
            avg_takeoff_marker_num: 0.0,
            avg_stationary_speed: 0.0,
            avg_stationary_marker_num: 0.0,
            takeoff_start_frame: None,
            last_takeoff_start_frame: None,
        }
    }

    pub fn newest(&self) -> Option<&PositionSample> {
        self.history.front()
    }

    pub fn push_sample(&mut self, sample: PositionSample) {
        self.history.push_front(sample);
    }

    /// Recompute velocity and windowed averages after a new sample arrived.
    ///
    /// The averages are always fully recomputed: the incremental-update path
    /// of earlier revisions never executed and carried a drift risk, so full
    /// recompute over the (small) detection windows is the chosen behavior.
    pub fn update(&mut self, cfg: &TrackingConfig, fps_analysis: u32) {
        let needed = cfg
            .takeoff_detection_window
            .max(cfg.stationary_detection_window)
            .max(cfg.takeoff_detection_velocity_span);
        if self.history.len() < needed {
            return;
        }

        // Vertical speed from the z delta across the velocity span. The span
        // covers span-1 frame intervals, which is also the scale divisor.
        let span = cfg.takeoff_detection_velocity_span;
        if span >= 2 {
            let z_now = self.history[0].position[2];
            let z_then = self.history[span - 1].position[2];
            self.history[0].velocity =
                (z_now - z_then) * fps_analysis as f32 / (span - 1) as f32;
        }

        let (speed, markers) = windowed_props(&self.history, 0, cfg.takeoff_detection_window);
        self.avg_takeoff_speed = speed;
        self.avg_takeoff_marker_num = markers;

        let (speed, markers) = windowed_props(&self.history, 0, cfg.stationary_detection_window);
        self.avg_stationary_speed = speed;
        self.avg_stationary_marker_num = markers;

        if self.history.len() > cfg.max_body_tracking_history {
            self.history.pop_back();
        }
    }

    /// Total vertical excursion over the retained history, used by the
    /// pending-save evaluation.
    pub fn z_excursion(&self) -> f32 {
        let mut min_z = f32::MAX;
        let mut max_z = f32::MIN;
        for s in &self.history {
            min_z = min_z.min(s.position[2]);
            max_z = max_z.max(s.position[2]);
        }
        if min_z > max_z {
            0.0
        } else {
            max_z - min_z
        }
    }
}

/// Average speed and marker count over a window of samples starting at
/// `offset` (newest-first indexing). Returns zeros until a full window of
/// data has been gathered, to avoid statistical decisions on little data.
pub fn windowed_props(
    history: &VecDeque<PositionSample>,
    offset: usize,
    window_size: usize,
) -> (f32, f32) {
    if history.len() < window_size || offset >= history.len() {
        return (0.0, 0.0);
    }

    let window = window_size.min(history.len() - offset).saturating_sub(1);
    if window == 0 {
        return (0.0, 0.0);
    }

    let mut avg_speed = 0.0f32;
    let mut avg_markers = 0.0f32;
    for j in 0..window {
        let s = &history[offset + j];
        avg_speed += s.velocity / window as f32;
        avg_markers += s.num_markers as f32 / window as f32;
    }
    (avg_speed, avg_markers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;

    fn sample(frame: i64, z: f32) -> PositionSample {
        PositionSample {
            frame_index: frame,
            position: [0.0, 0.0, z],
            velocity: 0.0,
            num_markers: 3,
        }
    }

    #[test]
    fn test_windowed_props_requires_full_window() {
        let mut history = VecDeque::new();
        history.push_front(sample(0, 0.0));
        history.push_front(sample(1, 1.0));
        // Window of 4 with only 2 samples: no statistics yet.
        assert_eq!(windowed_props(&history, 0, 4), (0.0, 0.0));
    }

    #[test]
    fn test_velocity_scales_by_span() {
        let cfg = test_config().tracking;
        let mut body = TrackedBody::new(0, "df".into());
        // Rising 1 unit per frame; span of 2 covers one interval.
        for i in 0..4 {
            body.push_sample(sample(i, i as f32));
        }
        body.update(&cfg, 200);
        // dz = 1.0 over 1 interval at 200 fps -> 200 units/s
        assert!((body.history[0].velocity - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_history_truncated_at_cap() {
        let mut cfg = test_config().tracking;
        cfg.max_body_tracking_history = 8;
        let mut body = TrackedBody::new(0, "df".into());
        for i in 0..32 {
            body.push_sample(sample(i, 0.0));
            body.update(&cfg, 200);
        }
        // One sample trimmed per update once past the cap.
        assert!(body.history.len() <= 9);
    }

    #[test]
    fn test_z_excursion() {
        let mut body = TrackedBody::new(0, "df".into());
        for (i, z) in [5.0f32, 9.0, 2.0, 5.5].iter().enumerate() {
            body.push_sample(sample(i as i64, *z));
        }
        assert!((body.z_excursion() - 7.0).abs() < 1e-6);
    }
}
