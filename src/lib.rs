//! mediaprobe library
//!
//! HTTP service that downloads a remote media file to a scratch location,
//! inspects it with `ffprobe`, and returns the analyzer's JSON unmodified.
//! The library exposes the probe pipeline, the axum router, configuration
//! loading and the CLI used by the `mediaprobe` binary.

pub mod cli;
pub mod config;
pub mod logging;
pub mod media;
pub mod server;
