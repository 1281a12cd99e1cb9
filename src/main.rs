// src/main.rs
//
// Motion-triggered capture orchestrator for the flight arena. Ingests
// motion-capture frames, watches for takeoff/landing kinematics, fires
// the hardware trigger, and tells the camera stations to save or drop
// their ring buffers.

mod broadcast;
mod config;
mod error;
mod feed;
mod hardware;
mod logger;
mod orchestrator;
mod pipeline;
mod tracker;
mod trigger;
mod types;

use crate::broadcast::{HttpTransport, SaveBroadcaster};
use crate::feed::{LogReplayFeed, NullFeedControl};
use crate::hardware::{trigger_from_config, NullCameraArray};
use crate::orchestrator::Orchestrator;
use crate::pipeline::PipelineMetrics;
use crate::trigger::TriggerCoordinator;
use crate::types::Config;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Args {
    config_path: String,
    replay: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut config_path = "config.yaml".to_string();
    let mut replay = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--replay" => {
                replay = Some(args.next().context("--replay needs a log file path")?);
            }
            "--help" | "-h" => {
                eprintln!("Usage: flight-trigger [config.yaml] [--replay frames.bin]");
                std::process::exit(0);
            }
            other => config_path = other.to_string(),
        }
    }
    Ok(Args {
        config_path,
        replay,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;
    let cfg = Config::load(&args.config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.logging.level.clone())),
        )
        .init();
    info!("🚀 Capture orchestrator starting (config: {})", args.config_path);

    let metrics = PipelineMetrics::new();
    let transport = HttpTransport::new(
        tokio::runtime::Handle::current(),
        cfg.broadcast.request_timeout_secs,
    )?;
    let broadcaster = Arc::new(SaveBroadcaster::new(
        cfg.broadcast.clone(),
        Arc::new(transport),
        Arc::new(NullCameraArray),
        Arc::clone(&metrics.broadcast_failures),
    ));
    broadcaster.probe_clients();

    let link = trigger_from_config(&cfg.hardware);
    let coordinator = Arc::new(TriggerCoordinator::new(
        &cfg,
        link,
        Arc::clone(&broadcaster),
        metrics.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        cfg.clone(),
        coordinator,
        broadcaster,
        Arc::new(NullFeedControl),
        metrics,
    ));
    let workers = Arc::clone(&orchestrator).spawn();

    match args.replay {
        Some(path) => {
            let feed = LogReplayFeed::new(path, cfg.feed.fps);
            let sink = Arc::clone(&orchestrator);
            let delivered =
                tokio::task::spawn_blocking(move || feed.run(|frame| sink.ingest(frame)))
                    .await??;

            // Let the consumers drain before reporting.
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            let summary = orchestrator.metrics().summary();
            info!(
                "Replay done: {} frames in, {} analyzed, {} takeoffs, {} landings, {} triggers",
                delivered,
                summary.frames_analyzed,
                summary.takeoffs_detected,
                summary.landings_detected,
                summary.triggers_fired
            );
            Ok(())
        }
        None => {
            // Live mode: the feed SDK delivers frames into
            // Orchestrator::ingest from its callback thread. The workers
            // never return, so this parks the main task for good.
            info!("Waiting for feed frames");
            tokio::task::spawn_blocking(move || {
                for worker in workers {
                    let _ = worker.join();
                }
            })
            .await?;
            Ok(())
        }
    }
}
