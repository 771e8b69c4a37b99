//! The camera wall: up to four supervised cameras sharing one task tracker
//! and one root cancellation scope.

use crate::sink::{run_display, DisplaySink};
use crate::stream::{DecoderCommand, FrameReceiver, SessionSupervisor};
use common::{Camera, Quality};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

pub const MAX_CAMERAS: usize = 4;
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraStatus {
    pub number: usize,
    pub name: String,
    pub ip: String,
    pub quality: Quality,
    pub attached: bool,
}

pub struct CameraWall {
    supervisors: Vec<SessionSupervisor>,
    tracker: TaskTracker,
    root: CancellationToken,
}

impl CameraWall {
    /// Keeps the first [`MAX_CAMERAS`] cameras. The receivers are returned in
    /// the same order as the cameras.
    pub fn new(cameras: Vec<Camera>, command: DecoderCommand) -> (Self, Vec<FrameReceiver>) {
        if cameras.len() > MAX_CAMERAS {
            warn!(found = cameras.len(), kept = MAX_CAMERAS, "too many cameras, extra ones ignored");
        }
        let tracker = TaskTracker::new();
        let root = CancellationToken::new();
        let command = Arc::new(command);

        let (supervisors, receivers) = cameras
            .into_iter()
            .take(MAX_CAMERAS)
            .enumerate()
            .map(|(index, camera)| {
                SessionSupervisor::new(index, Arc::new(camera), Arc::clone(&command), tracker.clone(), &root)
            })
            .unzip();

        (
            Self {
                supervisors,
                tracker,
                root,
            },
            receivers,
        )
    }

    pub fn len(&self) -> usize {
        self.supervisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supervisors.is_empty()
    }

    pub fn supervisor(&self, index: usize) -> Option<&SessionSupervisor> {
        self.supervisors.get(index)
    }

    pub fn attach_all(&mut self) {
        for sup in &mut self.supervisors {
            info!(camera = sup.index() + 1, ip = %sup.camera().ip, "attaching camera");
            sup.attach();
        }
    }

    pub fn toggle_quality(&mut self, index: usize) -> Option<Quality> {
        self.supervisors.get_mut(index)?.toggle_quality()
    }

    /// Returns false when there is no such camera.
    pub fn detach(&mut self, index: usize) -> bool {
        match self.supervisors.get_mut(index) {
            Some(sup) => {
                sup.detach();
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> Vec<CameraStatus> {
        self.supervisors
            .iter()
            .map(|sup| CameraStatus {
                number: sup.index() + 1,
                name: sup.camera().name.clone(),
                ip: sup.camera().ip.clone(),
                quality: sup.quality(),
                attached: sup.is_attached(),
            })
            .collect()
    }

    /// One consumer task per receiver, feeding `sink` with the camera's index.
    pub fn spawn_display(&self, receivers: Vec<FrameReceiver>, sink: Arc<dyn DisplaySink>) {
        for (index, receiver) in receivers.into_iter().enumerate() {
            self.tracker
                .spawn(run_display(index, receiver, Arc::clone(&sink), self.root.child_token()));
        }
    }

    /// Cancel everything and wait up to `grace` for sessions and consumers
    /// to finish.
    pub async fn shutdown(self, grace: Duration) -> ShutdownOutcome {
        info!(cameras = self.supervisors.len(), "shutting down camera wall");
        self.root.cancel();
        self.tracker.close();
        // Dropping the supervisors drops the last frame senders they hold.
        drop(self.supervisors);

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("all sessions stopped");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "sessions still running after grace period");
                ShutdownOutcome::TimedOut
            }
        }
    }
}
