//! Display side: whatever renders frames implements [`DisplaySink`].

use crate::stream::{DecodedFrame, FrameReceiver};
use image::GenericImageView;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub trait DisplaySink: Send + Sync + 'static {
    /// Called for each frame that reaches camera `camera_index` (0-based).
    fn present(&self, camera_index: usize, frame: &DecodedFrame);
}

/// Drain one camera's receiver into the sink until cancelled or the camera's
/// senders are all gone.
pub async fn run_display(
    camera_index: usize,
    mut receiver: FrameReceiver,
    sink: Arc<dyn DisplaySink>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = receiver.recv() => match frame {
                Some(frame) => sink.present(camera_index, &frame),
                None => break,
            },
        }
    }
    debug!(camera = camera_index + 1, "display consumer stopped");
}

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct PanelStats {
    frames: u64,
    window_frames: u64,
    window_start: Instant,
}

impl PanelStats {
    fn new() -> Self {
        Self {
            frames: 0,
            window_frames: 0,
            window_start: Instant::now(),
        }
    }
}

/// Headless sink that counts frames and logs each camera's frame rate.
pub struct LoggingSink {
    panels: Mutex<Vec<PanelStats>>,
    interval: Duration,
}

impl LoggingSink {
    pub fn new(cameras: usize) -> Self {
        Self::with_interval(cameras, REPORT_INTERVAL)
    }

    pub fn with_interval(cameras: usize, interval: Duration) -> Self {
        Self {
            panels: Mutex::new((0..cameras).map(|_| PanelStats::new()).collect()),
            interval,
        }
    }

    /// Frames presented so far for a camera.
    pub fn frames(&self, camera_index: usize) -> u64 {
        self.panels
            .lock()
            .ok()
            .and_then(|panels| panels.get(camera_index).map(|p| p.frames))
            .unwrap_or(0)
    }
}

impl DisplaySink for LoggingSink {
    fn present(&self, camera_index: usize, frame: &DecodedFrame) {
        let Ok(mut panels) = self.panels.lock() else {
            return;
        };
        let Some(panel) = panels.get_mut(camera_index) else {
            return;
        };
        panel.frames += 1;
        panel.window_frames += 1;

        let elapsed = panel.window_start.elapsed();
        if elapsed >= self.interval {
            let fps = panel.window_frames as f64 / elapsed.as_secs_f64();
            let (width, height) = frame.image.dimensions();
            info!(
                camera = camera_index + 1,
                quality = %frame.quality,
                width,
                height,
                fps = format!("{fps:.1}"),
                "displaying"
            );
            panel.window_frames = 0;
            panel.window_start = Instant::now();
        }
    }
}
