//! benchstream - real-time telemetry for generative AI benchmark runs
//!
//! The benchmark engine reports progress through a [`dashboard::Dashboard`].
//! The streaming variant fans events out to any number of browser viewers
//! over WebSocket and answers point-in-time queries over HTTP, without ever
//! blocking the benchmark on network I/O.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod logging;
pub mod metrics;
pub mod server;
