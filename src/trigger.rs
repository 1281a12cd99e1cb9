// src/trigger.rs
//
// Single-flight trigger coordination. At most one capture is in flight:
// either the save broadcast has gone out, or a PendingSave token is held
// until its evaluation deadline decides commit or discard.

use crate::broadcast::SaveBroadcaster;
use crate::hardware::TriggerLink;
use crate::pipeline::PipelineMetrics;
use crate::types::Config;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Mutual-exclusion token for a capture awaiting evaluation.
#[derive(Debug, Clone, Copy)]
pub struct PendingSave {
    pub trigger_frame: i64,
    pub deadline_frame: i64,
}

/// Save parameters computed at trigger time, replayed when the pending
/// evaluation resolves.
#[derive(Debug, Clone)]
struct StagedSave {
    prefix: String,
    start_time_ago: f32,
    end_time_ago: f32,
}

#[derive(Default)]
struct CoordinatorState {
    pending: Option<PendingSave>,
    staged: Option<StagedSave>,
}

pub struct TriggerCoordinator {
    enable_pending_save: bool,
    pending_save_num_evaluation_frames: i64,
    known_trigger_delay: f32,
    require_clients_ready: bool,
    output_dir: String,
    link: Mutex<Box<dyn TriggerLink>>,
    broadcaster: Arc<SaveBroadcaster>,
    state: Mutex<CoordinatorState>,
    /// Serializes trigger firing against the periodic feed re-arm.
    exclusive: Mutex<()>,
    metrics: PipelineMetrics,
}

impl TriggerCoordinator {
    pub fn new(
        cfg: &Config,
        link: Box<dyn TriggerLink>,
        broadcaster: Arc<SaveBroadcaster>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            enable_pending_save: cfg.tracking.enable_pending_save,
            pending_save_num_evaluation_frames: cfg.tracking.pending_save_num_evaluation_frames,
            known_trigger_delay: cfg.tracking.known_trigger_delay,
            require_clients_ready: cfg.broadcast.require_clients_ready,
            output_dir: cfg.logging.output_dir.clone(),
            link: Mutex::new(link),
            broadcaster,
            state: Mutex::new(CoordinatorState::default()),
            exclusive: Mutex::new(()),
            metrics,
        }
    }

    /// Hold to keep any trigger from firing, e.g. while the feed's own
    /// recording is being re-armed.
    pub fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.exclusive.lock().expect("trigger exclusive poisoned")
    }

    pub fn pending_deadline(&self) -> Option<i64> {
        self.state
            .lock()
            .expect("trigger state poisoned")
            .pending
            .map(|p| p.deadline_frame)
    }

    /// Fire the capture trigger for a landing observed at `frame_index`.
    /// Returns false, with no side effects, when the preconditions refuse
    /// the shot.
    pub fn trigger(&self, frame_index: i64, start_time_ago: f32, end_time_ago: f32) -> bool {
        let _firing = self.exclusive();

        {
            let state = self.state.lock().expect("trigger state poisoned");
            if let Some(pending) = state.pending {
                warn!(
                    "Trigger refused: save from frame {} still pending evaluation",
                    pending.trigger_frame
                );
                self.metrics.inc(&self.metrics.triggers_refused);
                return false;
            }
        }
        if self.require_clients_ready && self.broadcaster.number_busy() > 0 {
            warn!(
                "Trigger refused: {} save requests still in flight",
                self.broadcaster.number_busy()
            );
            self.metrics.inc(&self.metrics.triggers_refused);
            return false;
        }

        if let Err(e) = self.link.lock().expect("trigger link poisoned").fire() {
            // The cameras can still save their ring buffers, so a dead
            // trigger line downgrades to a warning.
            warn!("Hardware trigger failed: {}", e);
        }
        self.metrics.inc(&self.metrics.triggers_fired);

        let start_time_ago = start_time_ago + self.known_trigger_delay;
        let end_time_ago = end_time_ago + self.known_trigger_delay;
        let prefix = format!(
            "{}/{}",
            self.output_dir,
            chrono::Local::now().format("%Y-%m-%d %H-%M-%S_")
        );

        if self.enable_pending_save {
            let deadline_frame = frame_index + self.pending_save_num_evaluation_frames;
            let mut state = self.state.lock().expect("trigger state poisoned");
            state.pending = Some(PendingSave {
                trigger_frame: frame_index,
                deadline_frame,
            });
            state.staged = Some(StagedSave {
                prefix,
                start_time_ago,
                end_time_ago,
            });
            info!(
                "Capture triggered at frame {}; save pending until frame {}",
                frame_index, deadline_frame
            );
        } else {
            info!(
                "Capture triggered at frame {}; saving '{}' ({:.3}s..{:.3}s ago)",
                frame_index, prefix, start_time_ago, end_time_ago
            );
            self.broadcaster
                .save_to_disk(true, &prefix, start_time_ago, end_time_ago);
            self.metrics.inc(&self.metrics.saves_committed);
        }
        true
    }

    /// Resolve an outstanding pending save. A discard still broadcasts,
    /// so the camera stations free their ring buffers.
    pub fn resolve_pending(&self, commit: bool) {
        let staged = {
            let mut state = self.state.lock().expect("trigger state poisoned");
            state.pending = None;
            state.staged.take()
        };
        let Some(staged) = staged else {
            warn!("Pending-save resolution with nothing pending");
            return;
        };

        self.broadcaster.save_to_disk(
            commit,
            &staged.prefix,
            staged.start_time_ago,
            staged.end_time_ago,
        );
        if commit {
            self.metrics.inc(&self.metrics.saves_committed);
        } else {
            self.metrics.inc(&self.metrics.saves_discarded);
        }
    }
}
