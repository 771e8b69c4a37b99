//! One decoder run for one camera at one quality level.

use super::channel::{DecodedFrame, FrameSender};
use super::decoder::{DecoderCommand, DecoderProcess};
use super::extractor::FrameExtractor;
use crate::metrics::{
    DECODER_SPAWN_FAILURES_TOTAL, FRAMES_DELIVERED_TOTAL, FRAMES_DROPPED_TOTAL, SESSIONS_RUNNING,
};
use common::Quality;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

/// How long teardown waits for a killed decoder to be reaped.
pub const REAP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start decoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("decoder output error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
    EndOfStream,
    /// Every receiver for the camera is gone.
    ReceiverClosed,
}

/// What one session decodes and how its frames are tagged.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub camera: String,
    pub url: String,
    pub quality: Quality,
    pub generation: u64,
}

/// Run a decoder until cancellation, end of stream or a read error, pushing
/// each decoded frame into `sender` without waiting.
///
/// The decoder's process group is killed and reaped before this returns.
pub async fn run_session(
    command: &DecoderCommand,
    params: &SessionParams,
    sender: &FrameSender,
    cancel: &CancellationToken,
) -> Result<SessionEnd, SessionError> {
    if cancel.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }

    let mut process = DecoderProcess::start(command, &params.url).map_err(|source| {
        DECODER_SPAWN_FAILURES_TOTAL.inc();
        SessionError::Spawn {
            program: command.program.clone(),
            source,
        }
    })?;
    SESSIONS_RUNNING.inc();

    let end = match process.take_stdout() {
        Some(stdout) => pump_frames(FrameExtractor::new(stdout), params, sender, cancel).await,
        None => Err(SessionError::Io(io::Error::other("decoder stdout not captured"))),
    };

    process.kill_group();
    match tokio::time::timeout(REAP_TIMEOUT, process.wait()).await {
        Ok(Ok(status)) => debug!(pid = ?process.id(), %status, "decoder reaped"),
        Ok(Err(e)) => debug!(pid = ?process.id(), error = %e, "decoder wait failed"),
        Err(_) => warn!(pid = ?process.id(), "decoder not reaped in time"),
    }
    SESSIONS_RUNNING.dec();

    end
}

async fn pump_frames<R>(
    mut extractor: FrameExtractor<R>,
    params: &SessionParams,
    sender: &FrameSender,
    cancel: &CancellationToken,
) -> Result<SessionEnd, SessionError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut sequence = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            next = extractor.next_frame() => match next? {
                None => return Ok(SessionEnd::EndOfStream),
                Some(image) => {
                    sequence += 1;
                    let frame = DecodedFrame {
                        generation: params.generation,
                        quality: params.quality,
                        sequence,
                        image,
                    };
                    match sender.try_send(frame) {
                        Ok(()) => FRAMES_DELIVERED_TOTAL.inc(),
                        Err(TrySendError::Full(_)) => FRAMES_DROPPED_TOTAL.inc(),
                        Err(TrySendError::Closed(_)) => return Ok(SessionEnd::ReceiverClosed),
                    }
                }
            }
        }
    }
}

/// Handle to a session task running on the shared tracker.
pub struct StreamSession {
    cancel: CancellationToken,
    quality: Quality,
    generation: u64,
    handle: JoinHandle<()>,
}

impl StreamSession {
    pub fn spawn(
        tracker: &TaskTracker,
        command: Arc<DecoderCommand>,
        params: SessionParams,
        sender: FrameSender,
        cancel: CancellationToken,
    ) -> Self {
        let span = info_span!(
            "session",
            camera = %params.camera,
            quality = %params.quality,
            generation = params.generation
        );
        let quality = params.quality;
        let generation = params.generation;
        let token = cancel.clone();

        let handle = tracker.spawn(
            async move {
                info!(url = %params.url, "session starting");
                match run_session(&command, &params, &sender, &token).await {
                    Ok(SessionEnd::Cancelled) => debug!("session cancelled"),
                    Ok(SessionEnd::EndOfStream) => info!("decoder output ended"),
                    Ok(SessionEnd::ReceiverClosed) => debug!("display gone, session stopped"),
                    Err(e @ SessionError::Spawn { .. }) => warn!(error = %e, "session failed"),
                    Err(e) => debug!(error = %e, "session ended with error"),
                }
            }
            .instrument(span),
        );

        Self {
            cancel,
            quality,
            generation,
            handle,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
