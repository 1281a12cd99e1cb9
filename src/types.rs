// src/types.rs

use serde::{Deserialize, Serialize};

/// Marker coordinate the feed uses to flag a dropped-out marker.
pub const INVALID_MARKER: f32 = 9_999_999.0;

pub type Vec3 = [f32; 3];

pub fn marker_is_valid(m: &Vec3) -> bool {
    m[0] < INVALID_MARKER
}

/// Euclidean distance between two marker positions.
pub fn dist(a: &Vec3, b: &Vec3) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub tracking: TrackingConfig,
    pub queues: QueueConfig,
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Nominal frame rate of the motion-capture feed.
    pub fps: u32,
    /// Frame rate assumed by the kinematic analysis (the feed may deliver
    /// a decimated stream).
    pub fps_analysis: u32,
    /// Interval at which the feed's own recording is re-armed.
    #[serde(default = "default_rearm_secs")]
    pub rearm_interval_secs: u64,
    /// Interval of the queue-depth status report.
    #[serde(default = "default_status_secs")]
    pub status_interval_secs: u64,
}

fn default_rearm_secs() -> u64 {
    600
}

fn default_status_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Only bodies whose name contains this string are tracked; empty
    /// matches everything.
    #[serde(default)]
    pub body_name: String,
    pub takeoff_detection_window: usize,
    pub takeoff_detection_velocity_span: usize,
    pub stationary_detection_window: usize,
    pub takeoff_speed_threshold: f32,
    pub stationary_speed_threshold: f32,
    /// Minimum windowed marker count for a body to qualify as the animal.
    pub marker_minimum: f32,
    pub max_body_tracking_dist: f32,
    pub max_body_tracking_history: usize,
    pub max_body_tracking_gap: i64,
    /// Forced-landing timeout, in frames since takeoff.
    pub landing_timeout: i64,
    /// Global suppression window after a landing, in frames.
    pub min_takeoff_cooldown: i64,
    /// Fixed trigger-to-capture delay added to both time offsets, seconds.
    #[serde(default)]
    pub known_trigger_delay: f32,
    #[serde(default)]
    pub enable_pending_save: bool,
    #[serde(default)]
    pub pending_save_num_evaluation_frames: i64,
    #[serde(default)]
    pub pending_save_min_z_distance: f32,
    /// Unidentified markers beyond this count are truncated before the
    /// frame is written to the rolling log.
    #[serde(default = "default_unidentified_cap")]
    pub max_unidentified_markers: usize,
}

fn default_unidentified_cap() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub detection_capacity: usize,
    pub persistence_capacity: usize,
    pub auxiliary_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// When false (or no clients are listed), saves go through the local
    /// camera subsystem instead of the network.
    #[serde(default)]
    pub use_clients: bool,
    /// Refuse to fire a trigger while any client is still busy saving.
    #[serde(default)]
    pub require_clients_ready: bool,
    #[serde(default)]
    pub clients: Vec<ClientEndpoint>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEndpoint {
    pub ip: String,
    pub port: u16,
}

impl ClientEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Serial device of the TTL trigger interface; unset disables the
    /// hardware link.
    #[serde(default)]
    pub serial_port: Option<String>,
    #[serde(default = "default_trigger_retries")]
    pub trigger_retries: u32,
}

fn default_trigger_retries() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory that receives the rolling frame log and save prefixes.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> String {
    "./data".to_string()
}

// ============================================================================
// FRAME DATA
// ============================================================================

/// SMPTE-style timecode delivered with every feed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timecode {
    pub standard: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub frames: i32,
}

impl Timecode {
    pub fn as_array(&self) -> [i32; 5] {
        [
            self.standard,
            self.hours,
            self.minutes,
            self.seconds,
            self.frames,
        ]
    }

    pub fn from_array(t: [i32; 5]) -> Self {
        Self {
            standard: t[0],
            hours: t[1],
            minutes: t[2],
            seconds: t[3],
            frames: t[4],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyData {
    pub name: String,
    pub markers: Vec<Vec3>,
}

/// One frame of motion-capture data, owned by whichever queue currently
/// holds it. Immutable once ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_index: i64,
    /// Wall-clock arrival time, milliseconds since the epoch.
    pub received_at_ms: i64,
    /// Feed-reported capture-to-delivery delay, seconds.
    pub delay: f32,
    pub bodies: Vec<BodyData>,
    pub unidentified: Vec<Vec3>,
    pub timecode: Timecode,
}

impl Frame {
    pub fn new(frame_index: i64) -> Self {
        Self {
            frame_index,
            received_at_ms: chrono::Utc::now().timestamp_millis(),
            delay: 0.0,
            bodies: Vec::new(),
            unidentified: Vec::new(),
            timecode: Timecode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_marker_detection() {
        assert!(marker_is_valid(&[0.0, 1.0, 2.0]));
        assert!(!marker_is_valid(&[INVALID_MARKER, 0.0, 0.0]));
    }

    #[test]
    fn test_distance() {
        let d = dist(&[0.0, 0.0, 0.0], &[3.0, 4.0, 0.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_timecode_array_round_trip() {
        let tc = Timecode {
            standard: 1,
            hours: 12,
            minutes: 34,
            seconds: 56,
            frames: 7,
        };
        assert_eq!(Timecode::from_array(tc.as_array()), tc);
    }
}
