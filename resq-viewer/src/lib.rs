//! # resq-viewer: headless stream monitor
//!
//! Runs on the operator machine. Connects to the robot's perception
//! process through `resq_core::StreamClient` and reports connectivity,
//! detections and analyzer status as log lines.

pub mod config;
pub mod monitor;
