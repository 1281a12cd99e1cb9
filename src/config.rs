// src/config.rs

use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path))?;
        Ok(config)
    }
}


#[cfg(test)]
mod tests {
    use crate::types::Config;

    #[test]
    fn test_load_minimal_yaml() {
        let yaml = r#"
feed:
  fps: 200
  fps_analysis: 100
tracking:
  takeoff_detection_window: 25
  takeoff_detection_velocity_span: 10
  stationary_detection_window: 50
  takeoff_speed_threshold: 350.0
  stationary_speed_threshold: 60.0
  marker_minimum: 1.5
  max_body_tracking_dist: 60.0
  max_body_tracking_history: 2000
  max_body_tracking_gap: 100
  landing_timeout: 1200
  min_takeoff_cooldown: 400
queues:
  detection_capacity: 32
  persistence_capacity: 100000
  auxiliary_capacity: 32
broadcast:
  use_clients: true
  clients:
    - ip: 10.101.30.51
      port: 8081
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.feed.fps, 200);
        assert_eq!(config.tracking.takeoff_detection_window, 25);
        // Missing optional keys fall back to zero-valued defaults.
        assert!(!config.tracking.enable_pending_save);
        assert_eq!(config.tracking.known_trigger_delay, 0.0);
        assert_eq!(config.tracking.max_unidentified_markers, 20);
        assert_eq!(config.broadcast.clients.len(), 1);
        assert_eq!(
            config.broadcast.clients[0].base_url(),
            "http://10.101.30.51:8081"
        );
        assert_eq!(config.logging.output_dir, "./data");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        assert!(Config::load("/nonexistent/config.yaml").is_err());
    }
}
