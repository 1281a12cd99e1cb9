// src/hardware.rs
//
// Hardware-facing seams: the TTL trigger box on a serial line, and the
// local camera subsystem used when no network clients are configured.
// Both are traits so the orchestrator can run against stand-ins on a
// bench without the rig attached.

use crate::error::CaptureError;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{info, warn};

/// One-shot capture trigger. `fire` blocks until the pulse is
/// acknowledged or retries are exhausted.
pub trait TriggerLink: Send {
    fn fire(&mut self) -> Result<(), CaptureError>;
}

/// No hardware attached; every pulse succeeds immediately.
pub struct NullTrigger;

impl TriggerLink for NullTrigger {
    fn fire(&mut self) -> Result<(), CaptureError> {
        info!("Trigger pulse (no hardware link configured)");
        Ok(())
    }
}

/// Local camera array, used for saves when broadcasting is disabled.
pub trait LocalCameraLink: Send + Sync {
    fn save(&self, prefix: &str, start_time_ago: f32, end_time_ago: f32);
    fn abort_save(&self);
}

/// Stand-in when neither clients nor local cameras exist; saves become
/// log lines so a bench run still shows the decision stream.
pub struct NullCameraArray;

impl LocalCameraLink for NullCameraArray {
    fn save(&self, prefix: &str, start_time_ago: f32, end_time_ago: f32) {
        info!(
            "Local save: prefix '{}', window {:.3}s..{:.3}s ago",
            prefix, start_time_ago, end_time_ago
        );
    }

    fn abort_save(&self) {
        info!("Local save aborted");
    }
}

// ============================================================================
// SERIAL TTL TRIGGER
// ============================================================================

const BAUD_RATE: u32 = 9600;
const HANDSHAKE_BANNER: &str = "TTL Controller";
const ACK_BYTE: u8 = b'!';

/// Microcontroller trigger interface on a serial line. The controller
/// answers the handshake with an identification banner and acknowledges
/// each pulse with `!`.
pub struct SerialTrigger {
    port: Box<dyn serialport::SerialPort>,
    retries: u32,
}

impl SerialTrigger {
    pub fn open(path: &str, retries: u32) -> Result<Self, CaptureError> {
        let mut port = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(500))
            .open()?;

        // The controller resets on connect; give it a moment before the
        // handshake.
        std::thread::sleep(Duration::from_millis(1500));
        port.write_all(b"h\n")?;

        let mut buf = [0u8; 256];
        let mut banner = String::new();
        for _ in 0..retries.max(1) {
            match port.read(&mut buf) {
                Ok(n) if n > 0 => {
                    banner.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if banner.contains(HANDSHAKE_BANNER) {
                        info!("Trigger controller on {}: {}", path, banner.trim());
                        return Ok(Self { port, retries });
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(CaptureError::Io(e)),
            }
        }
        Err(CaptureError::Hardware(format!(
            "no trigger controller handshake on {} (got '{}')",
            path,
            banner.trim()
        )))
    }
}

impl TriggerLink for SerialTrigger {
    fn fire(&mut self) -> Result<(), CaptureError> {
        self.port.write_all(b"t")?;
        self.port.flush()?;

        let mut buf = [0u8; 16];
        for attempt in 0..self.retries.max(1) {
            match self.port.read(&mut buf) {
                Ok(n) if buf[..n].contains(&ACK_BYTE) => {
                    info!("Trigger pulse acknowledged");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    warn!("Trigger ack timeout (attempt {})", attempt + 1);
                }
                Err(e) => return Err(CaptureError::Io(e)),
            }
        }
        Err(CaptureError::Hardware(
            "trigger pulse never acknowledged".to_string(),
        ))
    }
}

/// Build the configured trigger link, falling back to the null link when
/// no serial port is configured.
pub fn trigger_from_config(cfg: &crate::types::HardwareConfig) -> Box<dyn TriggerLink> {
    match &cfg.serial_port {
        Some(path) => match SerialTrigger::open(path, cfg.trigger_retries) {
            Ok(t) => Box::new(t),
            Err(e) => {
                warn!("Trigger hardware unavailable ({}); continuing without", e);
                Box::new(NullTrigger)
            }
        },
        None => Box::new(NullTrigger),
    }
}
