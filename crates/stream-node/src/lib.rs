//! Camera wall node: finds cameras, runs one decoder session per camera and
//! hands decoded frames to a display sink.

pub mod commands;
pub mod config;
pub mod metrics;
pub mod sink;
pub mod stream;
pub mod wall;

pub use config::{Cli, StreamNodeConfig};
pub use sink::{DisplaySink, LoggingSink};
pub use wall::{CameraStatus, CameraWall, ShutdownOutcome, MAX_CAMERAS, SHUTDOWN_GRACE};

use anyhow::{Context, Result};
use common::camera_config::{load_cameras, save_cameras};
use common::Camera;
use discovery::{Discovery, DiscoveryConfig};
use std::path::Path;
use tracing::{info, warn};

/// Cameras from the list file when it has any, otherwise from network
/// discovery. Discovered cameras are written back to the file; a failed
/// write is only logged.
pub async fn load_or_discover(path: &Path, discovery: DiscoveryConfig) -> Result<Vec<Camera>> {
    if let Some(cameras) = load_cameras(path) {
        info!(file = %path.display(), count = cameras.len(), "loaded cameras from file");
        return Ok(cameras);
    }

    info!(file = %path.display(), "no usable camera file, discovering cameras");
    let discovery = Discovery::from_config(discovery).context("failed to set up discovery")?;
    let cameras = discovery.discover().await;
    info!(count = cameras.len(), "discovery finished");

    if !cameras.is_empty() {
        match save_cameras(path, &cameras) {
            Ok(()) => info!(file = %path.display(), "camera list saved"),
            Err(e) => warn!(file = %path.display(), error = %e, "failed to save camera list"),
        }
    }
    Ok(cameras)
}
