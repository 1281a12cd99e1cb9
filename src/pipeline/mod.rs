// src/pipeline/mod.rs

pub mod frame_queue;
pub mod metrics;

pub use frame_queue::FrameQueue;
pub use metrics::PipelineMetrics;
