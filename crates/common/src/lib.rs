pub mod camera;
pub mod camera_config;

pub use camera::{Camera, CameraError, Quality, DEFAULT_RTSP_PORT, DEFAULT_STREAM_PATH};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
