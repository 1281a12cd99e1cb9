// src/tracker/mod.rs
//
// Multi-object body tracker: associates incoming marker frames with
// tracked bodies by name and proximity, maintains bounded position
// histories, and evicts bodies that stopped receiving updates.

pub mod body;
pub mod detector;

pub use body::{PositionSample, TrackedBody};
pub use detector::{DetectorEvent, TakeoffDetector};

use crate::types::{dist, marker_is_valid, Frame, TrackingConfig, Vec3};
use tracing::debug;

/// Predicate deciding which body names are tracked.
pub type NameFilter = Box<dyn Fn(&str) -> bool + Send>;

pub struct BodyTracker {
    cfg: TrackingConfig,
    fps_analysis: u32,
    filter: NameFilter,
    bodies: Vec<TrackedBody>,
    next_id: u32,
    last_processed_frame: Option<i64>,
}

impl BodyTracker {
    pub fn new(cfg: TrackingConfig, fps_analysis: u32, filter: NameFilter) -> Self {
        Self {
            cfg,
            fps_analysis,
            filter,
            bodies: Vec::new(),
            next_id: 0,
            last_processed_frame: None,
        }
    }

    /// Tracker with the config-driven substring filter (empty matches all).
    pub fn from_config(cfg: &TrackingConfig, fps_analysis: u32) -> Self {
        let name = cfg.body_name.clone();
        let filter: NameFilter = Box::new(move |n: &str| name.is_empty() || n.contains(&name));
        Self::new(cfg.clone(), fps_analysis, filter)
    }

    pub fn bodies(&self) -> &[TrackedBody] {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut Vec<TrackedBody> {
        &mut self.bodies
    }

    /// Associate one frame of marker data with the tracked-body set, then
    /// run the eviction/update pass. Re-delivery of an already-processed
    /// frame index is a no-op. `retain_stale` suppresses eviction while a
    /// save is pending system-wide.
    pub fn observe(&mut self, frame: &Frame, retain_stale: bool) {
        if self.last_processed_frame == Some(frame.frame_index) {
            return;
        }
        self.last_processed_frame = Some(frame.frame_index);

        for body_data in &frame.bodies {
            if body_data.markers.is_empty() || !(self.filter)(&body_data.name) {
                continue;
            }

            // Representative position: first valid marker in preference order.
            let Some(marker) = body_data.markers.iter().find(|m| marker_is_valid(m)) else {
                continue;
            };

            let body = self.find_or_create(&body_data.name, marker);
            body.push_sample(PositionSample {
                frame_index: frame.frame_index,
                position: *marker,
                velocity: 0.0,
                num_markers: body_data.markers.len() as u32,
            });
        }

        // Evict bodies that haven't been extended for a while, except while
        // airborne or while a pending save still needs their trajectories.
        let gap = self.cfg.max_body_tracking_gap;
        let now = frame.frame_index;
        self.bodies.retain(|b| {
            let stale = b
                .newest()
                .map(|s| now - s.frame_index > gap)
                .unwrap_or(true);
            let keep = !stale || b.takeoff_start_frame.is_some() || retain_stale;
            if !keep {
                debug!("Evicting body {} ('{}'): no updates for {} frames", b.id, b.name, gap);
            }
            keep
        });

        for body in &mut self.bodies {
            body.update(&self.cfg, self.fps_analysis);
        }
    }

    fn find_or_create(&mut self, name: &str, marker: &Vec3) -> &mut TrackedBody {
        let mut closest: Option<usize> = None;
        let mut closest_dist = f32::MAX;

        for (i, body) in self.bodies.iter().enumerate() {
            if body.name != name {
                continue;
            }
            if let Some(s) = body.newest() {
                let d = dist(&s.position, marker);
                if d < closest_dist {
                    closest = Some(i);
                    closest_dist = d;
                }
            }
        }

        match closest {
            Some(i) if closest_dist <= self.cfg.max_body_tracking_dist => &mut self.bodies[i],
            _ => {
                let id = self.next_id;
                self.next_id += 1;
                debug!("New tracked body {} ('{}')", id, name);
                self.bodies.push(TrackedBody::new(id, name.to_string()));
                self.bodies.last_mut().expect("just pushed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;
    use crate::types::{BodyData, Frame, INVALID_MARKER};

    fn frame_with_body(index: i64, name: &str, pos: Vec3) -> Frame {
        let mut f = Frame::new(index);
        f.bodies.push(BodyData {
            name: name.to_string(),
            markers: vec![pos, [pos[0] + 1.0, pos[1], pos[2]], [pos[0], pos[1] + 1.0, pos[2]]],
        });
        f
    }

    fn tracker() -> BodyTracker {
        BodyTracker::from_config(&test_config().tracking, 200)
    }

    #[test]
    fn test_association_extends_nearby_body() {
        let mut t = tracker();
        t.observe(&frame_with_body(0, "df", [0.0, 0.0, 0.0]), false);
        t.observe(&frame_with_body(1, "df", [5.0, 0.0, 0.0]), false);
        assert_eq!(t.bodies().len(), 1);
        assert_eq!(t.bodies()[0].history.len(), 2);
    }

    #[test]
    fn test_association_creates_far_body() {
        let mut t = tracker();
        t.observe(&frame_with_body(0, "df", [0.0, 0.0, 0.0]), false);
        // max_body_tracking_dist is 50 in the test config
        t.observe(&frame_with_body(1, "df", [500.0, 0.0, 0.0]), false);
        assert_eq!(t.bodies().len(), 2);
    }

    #[test]
    fn test_name_mismatch_never_associates() {
        let mut t = tracker();
        t.observe(&frame_with_body(0, "df1", [0.0, 0.0, 0.0]), false);
        t.observe(&frame_with_body(1, "df2", [1.0, 0.0, 0.0]), false);
        assert_eq!(t.bodies().len(), 2);
    }

    #[test]
    fn test_duplicate_frame_is_dropped() {
        let mut t = tracker();
        t.observe(&frame_with_body(7, "df", [0.0, 0.0, 0.0]), false);
        t.observe(&frame_with_body(7, "df", [0.0, 0.0, 0.0]), false);
        assert_eq!(t.bodies()[0].history.len(), 1);
    }

    #[test]
    fn test_invalid_markers_skipped() {
        let mut t = tracker();
        let mut f = Frame::new(0);
        f.bodies.push(BodyData {
            name: "df".into(),
            markers: vec![[INVALID_MARKER, 0.0, 0.0], [2.0, 3.0, 4.0]],
        });
        t.observe(&f, false);
        assert_eq!(t.bodies().len(), 1);
        let p = t.bodies()[0].newest().unwrap().position;
        assert_eq!(p, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_all_invalid_markers_ignored() {
        let mut t = tracker();
        let mut f = Frame::new(0);
        f.bodies.push(BodyData {
            name: "df".into(),
            markers: vec![[INVALID_MARKER, 0.0, 0.0]],
        });
        t.observe(&f, false);
        assert!(t.bodies().is_empty());
    }

    #[test]
    fn test_name_filter_applies() {
        let mut cfg = test_config().tracking;
        cfg.body_name = "YFrame".to_string();
        let mut t = BodyTracker::from_config(&cfg, 200);
        t.observe(&frame_with_body(0, "YFrame3", [0.0, 0.0, 0.0]), false);
        t.observe(&frame_with_body(1, "Wand", [0.0, 0.0, 0.0]), false);
        assert_eq!(t.bodies().len(), 1);
        assert_eq!(t.bodies()[0].name, "YFrame3");
    }

    #[test]
    fn test_stale_body_evicted_after_gap() {
        let mut t = tracker();
        t.observe(&frame_with_body(0, "df", [0.0, 0.0, 0.0]), false);
        // Empty frames advance time past the gap (10 in the test config).
        t.observe(&Frame::new(5), false);
        assert_eq!(t.bodies().len(), 1);
        t.observe(&Frame::new(11), false);
        assert!(t.bodies().is_empty());
    }

    #[test]
    fn test_stale_body_retained_while_save_pending() {
        let mut t = tracker();
        t.observe(&frame_with_body(0, "df", [0.0, 0.0, 0.0]), false);
        t.observe(&Frame::new(50), true);
        assert_eq!(t.bodies().len(), 1);
    }

    #[test]
    fn test_airborne_body_retained_past_gap() {
        let mut t = tracker();
        t.observe(&frame_with_body(0, "df", [0.0, 0.0, 0.0]), false);
        t.bodies_mut()[0].takeoff_start_frame = Some(0);
        t.observe(&Frame::new(50), false);
        assert_eq!(t.bodies().len(), 1);
    }
}
