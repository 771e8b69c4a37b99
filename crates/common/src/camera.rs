use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_RTSP_PORT: u16 = 554;
pub const DEFAULT_STREAM_PATH: &str = "/stream1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CameraError {
  #[error("camera ip must not be empty")]
  EmptyIp,
}

/// Which of the camera's two stream paths is playing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
  #[default]
  Low,
  High,
}

impl Quality {
  pub fn toggled(self) -> Self {
    match self {
      Quality::Low => Quality::High,
      Quality::High => Quality::Low,
    }
  }
}

impl fmt::Display for Quality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Quality::Low => f.write_str("LQ"),
      Quality::High => f.write_str("HQ"),
    }
  }
}

/// Identity and connection record for one camera.
///
/// Built once, either from the camera list file or by discovery, and shared
/// read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Camera {
  pub name: String,
  pub ip: String,
  pub username: String,
  pub password: String,
  pub rtsp_port: u16,
  pub hq_path: String,
  pub lq_path: String,
  /// Full URL of the high-quality stream.
  pub stream_url: String,
}

impl Camera {
  pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Result<Self, CameraError> {
    let ip = ip.into().trim().to_string();
    if ip.is_empty() {
      return Err(CameraError::EmptyIp);
    }

    let mut camera = Self {
      name: name.into(),
      ip,
      username: String::new(),
      password: String::new(),
      rtsp_port: DEFAULT_RTSP_PORT,
      hq_path: DEFAULT_STREAM_PATH.to_string(),
      lq_path: DEFAULT_STREAM_PATH.to_string(),
      stream_url: String::new(),
    };
    camera.stream_url = camera.build_url(&camera.hq_path);
    Ok(camera)
  }

  pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
    self.username = username.into();
    self.password = password.into();
    self.stream_url = self.build_url(&self.hq_path);
    self
  }

  pub fn with_port(mut self, port: u16) -> Self {
    self.rtsp_port = port;
    self.stream_url = self.build_url(&self.hq_path);
    self
  }

  /// Sets both stream paths. A blank HQ path falls back to the default and a
  /// blank LQ path falls back to the HQ path.
  pub fn with_paths(mut self, hq_path: &str, lq_path: &str) -> Self {
    self.hq_path = normalize_path(hq_path).unwrap_or_else(|| DEFAULT_STREAM_PATH.to_string());
    self.lq_path = normalize_path(lq_path).unwrap_or_else(|| self.hq_path.clone());
    self.stream_url = self.build_url(&self.hq_path);
    self
  }

  /// Replaces the HQ stream URL with one negotiated from the device itself.
  pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
    self.stream_url = url.into();
    self
  }

  /// True when the HQ URL differs from the one built from the camera's parts,
  /// as it does for addresses negotiated with the device.
  pub fn has_custom_stream_url(&self) -> bool {
    self.stream_url != self.build_url(&self.hq_path)
  }

  pub fn has_credentials(&self) -> bool {
    !self.username.is_empty() || !self.password.is_empty()
  }

  pub fn path_for(&self, quality: Quality) -> &str {
    match quality {
      Quality::High => &self.hq_path,
      Quality::Low => &self.lq_path,
    }
  }

  pub fn url_for(&self, quality: Quality) -> String {
    match quality {
      Quality::High => self.stream_url.clone(),
      Quality::Low => self.build_url(&self.lq_path),
    }
  }

  fn build_url(&self, path: &str) -> String {
    if self.has_credentials() {
      format!(
        "rtsp://{}:{}@{}:{}{}",
        self.username, self.password, self.ip, self.rtsp_port, path
      )
    } else {
      format!("rtsp://{}:{}{}", self.ip, self.rtsp_port, path)
    }
  }
}

fn normalize_path(path: &str) -> Option<String> {
  let path = path.trim();
  if path.is_empty() {
    None
  } else if path.starts_with('/') {
    Some(path.to_string())
  } else {
    Some(format!("/{path}"))
  }
}
