//! Camera list file.
//!
//! The file holds a `tapo_cameras` list of records with the camera's address,
//! credentials and its two stream paths. It is read at startup and written
//! back after discovery so the next run can skip the network scan.

use crate::camera::{Camera, DEFAULT_RTSP_PORT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

pub const CONFIGURED_CAMERA_NAME: &str = "Tapo Camera";

const FILE_HEADER: &str = "# List of discovered Tapo camera configurations\n";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraListFile {
  #[serde(default)]
  pub tapo_cameras: Vec<CameraEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraEntry {
  pub ip: String,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub password: String,
  #[serde(default)]
  pub rtsp_path: String,
  #[serde(default)]
  pub lq_rtsp_path: String,
  #[serde(default = "default_port", skip_serializing_if = "is_default_port")]
  pub rtsp_port: u16,
  /// Full HQ address, written only when it cannot be rebuilt from the fields
  /// above (query strings or device userinfo in a negotiated URL).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stream_url: Option<String>,
}

fn default_port() -> u16 {
  DEFAULT_RTSP_PORT
}

fn is_default_port(port: &u16) -> bool {
  *port == DEFAULT_RTSP_PORT
}

impl CameraEntry {
  pub fn into_camera(self) -> Option<Camera> {
    let camera = Camera::new(CONFIGURED_CAMERA_NAME, self.ip).ok()?
      .with_port(self.rtsp_port)
      .with_credentials(self.username, self.password)
      .with_paths(&self.rtsp_path, &self.lq_rtsp_path);
    match self.stream_url.filter(|url| !url.trim().is_empty()) {
      Some(url) => Some(camera.with_stream_url(url.trim())),
      None => Some(camera),
    }
  }
}

impl From<&Camera> for CameraEntry {
  fn from(camera: &Camera) -> Self {
    Self {
      ip: camera.ip.clone(),
      username: camera.username.clone(),
      password: camera.password.clone(),
      rtsp_path: camera.hq_path.clone(),
      lq_rtsp_path: camera.lq_path.clone(),
      rtsp_port: camera.rtsp_port,
      stream_url: camera
        .has_custom_stream_url()
        .then(|| camera.stream_url.clone()),
    }
  }
}

/// Parse a camera list document. Entries without an IP are skipped.
pub fn parse_cameras(contents: &str) -> Result<Vec<Camera>> {
  let file: CameraListFile =
    serde_yaml::from_str(contents).context("failed to parse camera list")?;

  let mut cameras = Vec::with_capacity(file.tapo_cameras.len());
  for entry in file.tapo_cameras {
    match entry.into_camera() {
      Some(camera) => cameras.push(camera),
      None => warn!("skipping camera entry without ip"),
    }
  }
  Ok(cameras)
}

/// Load cameras from `path`.
///
/// Returns `None` when the file is missing, unreadable, malformed or empty;
/// the caller then falls back to discovery.
pub fn load_cameras(path: &Path) -> Option<Vec<Camera>> {
  let contents = match std::fs::read_to_string(path) {
    Ok(s) => s,
    Err(e) => {
      debug!(path = %path.display(), error = %e, "camera list not readable");
      return None;
    }
  };

  match parse_cameras(&contents) {
    Ok(cameras) if cameras.is_empty() => None,
    Ok(cameras) => Some(cameras),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "ignoring malformed camera list");
      None
    }
  }
}

pub fn render_cameras(cameras: &[Camera]) -> Result<String> {
  let file = CameraListFile {
    tapo_cameras: cameras.iter().map(CameraEntry::from).collect(),
  };
  let body = serde_yaml::to_string(&file).context("failed to serialize camera list")?;
  Ok(format!("{FILE_HEADER}{body}"))
}

pub fn save_cameras(path: &Path, cameras: &[Camera]) -> Result<()> {
  let contents = render_cameras(cameras)?;
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
  }
  std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
