// src/orchestrator.rs
//
// Wires the whole rig together: the non-blocking ingestion callback, the
// three bounded queues, and the worker threads that drain them. All
// mutable tracking state lives on the detection thread; everything the
// other threads touch is atomic or behind its own short-lived lock.

use crate::broadcast::SaveBroadcaster;
use crate::feed::FeedControl;
use crate::logger::RollingFrameLogger;
use crate::pipeline::{FrameQueue, PipelineMetrics};
use crate::tracker::{BodyTracker, DetectorEvent, TakeoffDetector};
use crate::trigger::TriggerCoordinator;
use crate::types::{marker_is_valid, Config, Frame, Vec3};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Consumers poll their queue at this pace when it runs dry.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub struct Orchestrator {
    cfg: Config,
    detection_queue: Arc<FrameQueue>,
    persistence_queue: Arc<FrameQueue>,
    auxiliary_queue: Arc<FrameQueue>,
    last_ingested: AtomicI64,
    trigger_enabled: AtomicBool,
    coordinator: Arc<TriggerCoordinator>,
    broadcaster: Arc<SaveBroadcaster>,
    feed: Arc<dyn FeedControl>,
    /// Valid marker positions from the most recent auxiliary frame.
    recent_markers: Mutex<Vec<Vec3>>,
    metrics: PipelineMetrics,
}

impl Orchestrator {
    pub fn new(
        cfg: Config,
        coordinator: Arc<TriggerCoordinator>,
        broadcaster: Arc<SaveBroadcaster>,
        feed: Arc<dyn FeedControl>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            detection_queue: Arc::new(FrameQueue::new("detection", cfg.queues.detection_capacity)),
            persistence_queue: Arc::new(FrameQueue::new(
                "persistence",
                cfg.queues.persistence_capacity,
            )),
            auxiliary_queue: Arc::new(FrameQueue::new("auxiliary", cfg.queues.auxiliary_capacity)),
            last_ingested: AtomicI64::new(i64::MIN),
            trigger_enabled: AtomicBool::new(true),
            coordinator,
            broadcaster,
            feed,
            recent_markers: Mutex::new(Vec::new()),
            metrics,
            cfg,
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn set_trigger_enabled(&self, enabled: bool) {
        self.trigger_enabled.store(enabled, Ordering::SeqCst);
        info!("Triggering {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn trigger_enabled(&self) -> bool {
        self.trigger_enabled.load(Ordering::SeqCst)
    }

    /// Feed callback. Must return quickly: one dedup check and three
    /// bounded pushes, nothing that can block on downstream work.
    pub fn ingest(&self, frame: Frame) {
        if self.last_ingested.load(Ordering::SeqCst) == frame.frame_index {
            self.metrics.inc(&self.metrics.duplicate_frames);
            return;
        }
        self.last_ingested.store(frame.frame_index, Ordering::SeqCst);
        self.metrics.inc(&self.metrics.frames_ingested);

        self.detection_queue.push(frame.clone());
        self.auxiliary_queue.push(frame.clone());
        self.persistence_queue.push(frame);
    }

    /// Start the worker threads. They run until process exit; the
    /// returned handles are only joined so the binary can park on them.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            Self::spawn_detection(Arc::clone(&self)),
            Self::spawn_persistence(Arc::clone(&self)),
            Self::spawn_auxiliary(Arc::clone(&self)),
            Self::spawn_status(Arc::clone(&self)),
            Self::spawn_rearm(self),
        ]
    }

    fn spawn_detection(this: Arc<Self>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("detection".into())
            .spawn(move || {
                let mut tracker =
                    BodyTracker::from_config(&this.cfg.tracking, this.cfg.feed.fps_analysis);
                let mut detector =
                    TakeoffDetector::new(this.cfg.tracking.clone(), this.cfg.feed.fps);
                loop {
                    match this.detection_queue.pop() {
                        Some(frame) => this.detection_pass(&mut tracker, &mut detector, &frame),
                        None => thread::sleep(IDLE_SLEEP),
                    }
                }
            })
            .expect("spawning detection thread")
    }

    /// One frame through the tracker and detector, applying the emitted
    /// events to the trigger coordinator.
    fn detection_pass(
        &self,
        tracker: &mut BodyTracker,
        detector: &mut TakeoffDetector,
        frame: &Frame,
    ) {
        let pending_deadline = self.coordinator.pending_deadline();
        tracker.observe(frame, pending_deadline.is_some());
        let events = detector.process(tracker.bodies_mut(), frame.frame_index, pending_deadline);
        self.metrics.inc(&self.metrics.frames_analyzed);

        for event in events {
            match event {
                DetectorEvent::Takeoff { .. } => {
                    self.metrics.inc(&self.metrics.takeoffs_detected);
                }
                DetectorEvent::Landing {
                    start_time_ago,
                    end_time_ago,
                    forced,
                } => {
                    // A timed-out flight lands like any other; the window
                    // offsets are clamped camera-side if the ring buffer
                    // no longer reaches back that far.
                    if forced {
                        self.metrics.inc(&self.metrics.forced_landings);
                    }
                    self.metrics.inc(&self.metrics.landings_detected);
                    if self.trigger_enabled() {
                        self.coordinator
                            .trigger(frame.frame_index, start_time_ago, end_time_ago);
                    } else {
                        info!(
                            "Landing at frame {} ignored: triggering disabled",
                            frame.frame_index
                        );
                    }
                }
                DetectorEvent::ResolvePending { commit } => {
                    self.coordinator.resolve_pending(commit);
                }
            }
        }
    }

    fn spawn_persistence(this: Arc<Self>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("persistence".into())
            .spawn(move || {
                let mut logger = match RollingFrameLogger::create(
                    &this.cfg.logging.output_dir,
                    this.cfg.tracking.max_unidentified_markers,
                ) {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("Frame log disabled: {}", e);
                        return;
                    }
                };
                loop {
                    match this.persistence_queue.pop() {
                        Some(frame) => match logger.append(&frame) {
                            Ok(()) => this.metrics.inc(&this.metrics.frames_logged),
                            Err(e) => warn!("Frame log write failed: {}", e),
                        },
                        None => thread::sleep(IDLE_SLEEP),
                    }
                }
            })
            .expect("spawning persistence thread")
    }

    fn spawn_auxiliary(this: Arc<Self>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("auxiliary".into())
            .spawn(move || loop {
                match this.auxiliary_queue.pop() {
                    Some(frame) => this.cache_markers(&frame),
                    None => thread::sleep(IDLE_SLEEP),
                }
            })
            .expect("spawning auxiliary thread")
    }

    fn cache_markers(&self, frame: &Frame) {
        let mut markers: Vec<Vec3> = frame
            .bodies
            .iter()
            .flat_map(|b| b.markers.iter())
            .chain(frame.unidentified.iter())
            .filter(|m| marker_is_valid(m))
            .copied()
            .collect();
        let mut cache = self.recent_markers.lock().expect("marker cache poisoned");
        std::mem::swap(&mut *cache, &mut markers);
    }

    pub fn recent_markers(&self) -> Vec<Vec3> {
        self.recent_markers
            .lock()
            .expect("marker cache poisoned")
            .clone()
    }

    fn spawn_status(this: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(this.cfg.feed.status_interval_secs.max(1));
        thread::Builder::new()
            .name("status".into())
            .spawn(move || loop {
                thread::sleep(interval);
                let s = this.metrics.summary();
                info!(
                    "Status: {:.1} fps in, queues d={} p={} a={}, markers={}, \
                     takeoffs={} landings={} (forced {}), triggers={} (refused {}), \
                     saves={}+{} dropped frames={}",
                    s.ingest_fps,
                    this.detection_queue.len(),
                    this.persistence_queue.len(),
                    this.auxiliary_queue.len(),
                    this.recent_markers().len(),
                    s.takeoffs_detected,
                    s.landings_detected,
                    s.forced_landings,
                    s.triggers_fired,
                    s.triggers_refused,
                    s.saves_committed,
                    s.saves_discarded,
                    this.detection_queue.dropped()
                        + this.persistence_queue.dropped()
                        + this.auxiliary_queue.dropped(),
                );
                // Clients that dropped out get another chance to register.
                this.broadcaster.probe_clients();
            })
            .expect("spawning status thread")
    }

    fn spawn_rearm(this: Arc<Self>) -> JoinHandle<()> {
        let interval = Duration::from_secs(this.cfg.feed.rearm_interval_secs.max(1));
        thread::Builder::new()
            .name("rearm".into())
            .spawn(move || loop {
                thread::sleep(interval);
                // Never re-arm mid-trigger; the feed recording restart
                // would cut the very capture being saved.
                let _guard = this.coordinator.exclusive();
                info!("Re-arming feed recording");
                this.feed.rearm();
            })
            .expect("spawning rearm thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{SaveBroadcaster, SaveTransport};
    use crate::config::test_support::test_config;
    use crate::feed::NullFeedControl;
    use crate::hardware::{NullCameraArray, NullTrigger};
    use crate::types::BodyData;
    use std::sync::atomic::AtomicU64;

    struct InertTransport;

    impl SaveTransport for InertTransport {
        fn dispatch(&self, _url: String, done: Box<dyn FnOnce(bool) + Send>) {
            done(true);
        }
        fn fetch(&self, _url: String, done: Box<dyn FnOnce(Option<String>) + Send>) {
            done(None);
        }
    }

    fn orchestrator(cfg: Config) -> Arc<Orchestrator> {
        let metrics = PipelineMetrics::new();
        let broadcaster = Arc::new(SaveBroadcaster::new(
            cfg.broadcast.clone(),
            Arc::new(InertTransport),
            Arc::new(NullCameraArray),
            Arc::new(AtomicU64::new(0)),
        ));
        let coordinator = Arc::new(TriggerCoordinator::new(
            &cfg,
            Box::new(NullTrigger),
            Arc::clone(&broadcaster),
            metrics.clone(),
        ));
        Arc::new(Orchestrator::new(
            cfg,
            coordinator,
            broadcaster,
            Arc::new(NullFeedControl),
            metrics,
        ))
    }

    fn climb_frame(index: i64, z: f32) -> Frame {
        let mut f = Frame::new(index);
        f.bodies.push(BodyData {
            name: "df".into(),
            markers: vec![[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]],
        });
        f
    }

    #[test]
    fn test_ingest_fans_out_to_all_queues() {
        let o = orchestrator(test_config());
        o.ingest(Frame::new(1));
        o.ingest(Frame::new(2));
        assert_eq!(o.detection_queue.len(), 2);
        assert_eq!(o.persistence_queue.len(), 2);
        assert_eq!(o.auxiliary_queue.len(), 2);
    }

    #[test]
    fn test_duplicate_frame_ingested_once() {
        let o = orchestrator(test_config());
        o.ingest(Frame::new(5));
        o.ingest(Frame::new(5));
        o.ingest(Frame::new(6));
        assert_eq!(o.detection_queue.len(), 2);
        assert_eq!(
            o.metrics.duplicate_frames.load(Ordering::Relaxed),
            1
        );
        assert_eq!(o.metrics.frames_ingested.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_detection_pass_triggers_on_landing() {
        let cfg = test_config();
        let o = orchestrator(cfg.clone());
        let mut tracker = BodyTracker::from_config(&cfg.tracking, cfg.feed.fps_analysis);
        let mut detector = TakeoffDetector::new(cfg.tracking.clone(), cfg.feed.fps);

        for i in 0..=30 {
            o.detection_pass(&mut tracker, &mut detector, &climb_frame(i, i.min(19) as f32));
        }

        assert_eq!(o.metrics.takeoffs_detected.load(Ordering::Relaxed), 1);
        assert_eq!(o.metrics.landings_detected.load(Ordering::Relaxed), 1);
        assert_eq!(o.metrics.triggers_fired.load(Ordering::Relaxed), 1);
        assert_eq!(o.metrics.saves_committed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_forced_landing_still_fires_trigger() {
        let mut cfg = test_config();
        cfg.tracking.landing_timeout = 5;
        let o = orchestrator(cfg.clone());
        let mut tracker = BodyTracker::from_config(&cfg.tracking, cfg.feed.fps_analysis);
        let mut detector = TakeoffDetector::new(cfg.tracking.clone(), cfg.feed.fps);

        // Climbs the whole time; the flight only ends via the timeout.
        for i in 0..=8 {
            o.detection_pass(&mut tracker, &mut detector, &climb_frame(i, i as f32));
        }

        assert_eq!(o.metrics.forced_landings.load(Ordering::Relaxed), 1);
        assert_eq!(o.metrics.landings_detected.load(Ordering::Relaxed), 1);
        assert_eq!(o.metrics.triggers_fired.load(Ordering::Relaxed), 1);
        assert_eq!(o.metrics.saves_committed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_disabled_trigger_suppresses_capture() {
        let cfg = test_config();
        let o = orchestrator(cfg.clone());
        o.set_trigger_enabled(false);
        let mut tracker = BodyTracker::from_config(&cfg.tracking, cfg.feed.fps_analysis);
        let mut detector = TakeoffDetector::new(cfg.tracking.clone(), cfg.feed.fps);

        for i in 0..=30 {
            o.detection_pass(&mut tracker, &mut detector, &climb_frame(i, i.min(19) as f32));
        }

        assert_eq!(o.metrics.landings_detected.load(Ordering::Relaxed), 1);
        assert_eq!(o.metrics.triggers_fired.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_marker_cache_tracks_latest_frame() {
        let o = orchestrator(test_config());
        o.cache_markers(&climb_frame(0, 1.0));
        assert_eq!(o.recent_markers().len(), 3);
        let mut empty = Frame::new(1);
        empty.unidentified.push([7.0, 8.0, 9.0]);
        o.cache_markers(&empty);
        assert_eq!(o.recent_markers(), vec![[7.0, 8.0, 9.0]]);
    }
}
