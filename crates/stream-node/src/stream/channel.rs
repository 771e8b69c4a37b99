//! Single-slot delivery channel between a camera's sessions and its display.

use common::Quality;
use image::DynamicImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DELIVERY_CAPACITY: usize = 1;

#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Session generation that produced the frame.
    pub generation: u64,
    pub quality: Quality,
    /// Position within the producing session, starting at 1.
    pub sequence: u64,
    pub image: DynamicImage,
}

pub type FrameSender = mpsc::Sender<DecodedFrame>;

/// Receiving half. Frames from sessions other than the camera's current one
/// are discarded here.
pub struct FrameReceiver {
    rx: mpsc::Receiver<DecodedFrame>,
    current: Arc<AtomicU64>,
}

pub fn delivery_channel(current: Arc<AtomicU64>) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(DELIVERY_CAPACITY);
    (tx, FrameReceiver { rx, current })
}

impl FrameReceiver {
    fn is_current(&self, frame: &DecodedFrame) -> bool {
        frame.generation == self.current.load(Ordering::Acquire)
    }

    /// Wait for the next current frame. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<DecodedFrame> {
        loop {
            let frame = self.rx.recv().await?;
            if self.is_current(&frame) {
                return Some(frame);
            }
        }
    }

    /// Latest current frame if one is waiting.
    pub fn try_recv(&mut self) -> Option<DecodedFrame> {
        while let Ok(frame) = self.rx.try_recv() {
            if self.is_current(&frame) {
                return Some(frame);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TrySendError;

    fn frame(generation: u64, sequence: u64) -> DecodedFrame {
        DecodedFrame {
            generation,
            quality: Quality::Low,
            sequence,
            image: DynamicImage::new_rgb8(1, 1),
        }
    }

    #[tokio::test]
    async fn test_send_never_blocks_when_full() {
        let current = Arc::new(AtomicU64::new(1));
        let (tx, mut rx) = delivery_channel(current);

        tx.try_send(frame(1, 1)).unwrap();
        assert!(matches!(tx.try_send(frame(1, 2)), Err(TrySendError::Full(_))));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.sequence, 1);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let current = Arc::new(AtomicU64::new(1));
        let (tx, mut rx) = delivery_channel(Arc::clone(&current));

        tx.try_send(frame(1, 7)).unwrap();
        current.store(2, Ordering::Release);
        assert!(rx.try_recv().is_none());

        tx.try_send(frame(2, 1)).unwrap();
        assert_eq!(rx.recv().await.unwrap().generation, 2);

        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
