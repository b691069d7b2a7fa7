//! Library crate for tor-scan-rs exposing reusable modules.
pub mod aggregator;
pub mod artifacts;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod scanner;
pub mod targets;
pub mod timestamp;
pub mod transport;
pub mod types;
