//! Per-camera session ownership and quality switching.

use super::channel::{delivery_channel, FrameReceiver, FrameSender};
use super::decoder::DecoderCommand;
use super::session::{SessionParams, StreamSession};
use common::{Camera, Quality};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

pub struct SessionSupervisor {
    index: usize,
    camera: Arc<Camera>,
    command: Arc<DecoderCommand>,
    tracker: TaskTracker,
    scope: CancellationToken,
    sender: FrameSender,
    generation: Arc<AtomicU64>,
    quality: Quality,
    current: Option<StreamSession>,
}

impl SessionSupervisor {
    /// Builds the supervisor and the receiving end of the camera's frames.
    /// The camera scope is a child of `parent`.
    pub fn new(
        index: usize,
        camera: Arc<Camera>,
        command: Arc<DecoderCommand>,
        tracker: TaskTracker,
        parent: &CancellationToken,
    ) -> (Self, FrameReceiver) {
        let generation = Arc::new(AtomicU64::new(0));
        let (sender, receiver) = delivery_channel(Arc::clone(&generation));
        let supervisor = Self {
            index,
            camera,
            command,
            tracker,
            scope: parent.child_token(),
            sender,
            generation,
            quality: Quality::default(),
            current: None,
        };
        (supervisor, receiver)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// True while a session is current and the camera scope is live.
    pub fn is_attached(&self) -> bool {
        !self.scope.is_cancelled() && self.current.is_some()
    }

    pub fn is_detached(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn current_session(&self) -> Option<&StreamSession> {
        self.current.as_ref()
    }

    /// Start the first session at the current quality. Does nothing when a
    /// session is already current or the camera was detached.
    pub fn attach(&mut self) {
        if self.current.is_some() || self.scope.is_cancelled() {
            return;
        }
        self.start_session();
    }

    /// Replace the current session with one at the other quality level.
    /// Returns the new level, or `None` when the camera is not attached.
    pub fn toggle_quality(&mut self) -> Option<Quality> {
        if !self.is_attached() {
            debug!(camera = self.index, "toggle ignored, camera not attached");
            return None;
        }
        if let Some(old) = self.current.take() {
            old.cancel();
        }
        self.quality = self.quality.toggled();
        self.start_session();
        info!(camera = self.index, quality = %self.quality, "quality switched");
        Some(self.quality)
    }

    /// Stop the camera for good. No quality transition happens.
    pub fn detach(&mut self) {
        self.scope.cancel();
        if let Some(session) = &self.current {
            session.cancel();
        }
        info!(camera = self.index, "camera detached");
    }

    fn start_session(&mut self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let params = SessionParams {
            camera: format!("{}#{}", self.camera.ip, self.index + 1),
            url: self.camera.url_for(self.quality),
            quality: self.quality,
            generation,
        };
        let session = StreamSession::spawn(
            &self.tracker,
            Arc::clone(&self.command),
            params,
            self.sender.clone(),
            self.scope.child_token(),
        );
        self.current = Some(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> (SessionSupervisor, FrameReceiver, CancellationToken) {
        let camera = Camera::new("cam", "10.0.0.1").unwrap();
        let root = CancellationToken::new();
        let (sup, rx) = SessionSupervisor::new(
            0,
            Arc::new(camera),
            Arc::new(DecoderCommand::new("/nonexistent/decoder")),
            TaskTracker::new(),
            &root,
        );
        (sup, rx, root)
    }

    #[tokio::test]
    async fn test_toggle_before_attach_is_ignored() {
        let (mut sup, _rx, _root) = supervisor();
        assert_eq!(sup.toggle_quality(), None);
        assert_eq!(sup.quality(), Quality::Low);
    }

    #[tokio::test]
    async fn test_toggle_flips_once_per_call() {
        let (mut sup, _rx, _root) = supervisor();
        sup.attach();
        let first = sup.current_session().unwrap().cancellation().clone();

        assert_eq!(sup.toggle_quality(), Some(Quality::High));
        assert!(first.is_cancelled());
        assert_eq!(sup.current_session().unwrap().quality(), Quality::High);
        assert_eq!(sup.current_session().unwrap().generation(), 2);

        assert_eq!(sup.toggle_quality(), Some(Quality::Low));
        assert_eq!(sup.current_session().unwrap().generation(), 3);
    }

    #[tokio::test]
    async fn test_detach_cancels_and_blocks_toggle() {
        let (mut sup, _rx, _root) = supervisor();
        sup.attach();
        let token = sup.current_session().unwrap().cancellation().clone();
        sup.detach();
        assert!(token.is_cancelled());
        assert!(!sup.is_attached());
        assert_eq!(sup.toggle_quality(), None);
        assert_eq!(sup.quality(), Quality::Low);
    }

    #[tokio::test]
    async fn test_root_cancel_reaches_session() {
        let (mut sup, _rx, root) = supervisor();
        sup.attach();
        root.cancel();
        assert!(sup.current_session().unwrap().is_cancelled());
        assert!(sup.is_detached());
    }
}
