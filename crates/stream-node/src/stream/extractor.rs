//! Splits a decoder's image2pipe output into JPEG frames.
//!
//! Frame boundaries come only from the JPEG end-of-image marker: bytes are
//! accumulated since the last frame and a frame is complete as soon as the
//! accumulator ends with `FF D9`.

use crate::metrics::FRAMES_MALFORMED_TOTAL;
use futures::Stream;
use image::{DynamicImage, ImageFormat};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

const READ_BUFFER_BYTES: usize = 64 * 1024;
const INITIAL_FRAME_CAPACITY: usize = 128 * 1024;

pub struct FrameExtractor<R> {
    reader: BufReader<R>,
    frame: Vec<u8>,
    malformed: u64,
}

impl<R: AsyncRead + Unpin> FrameExtractor<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_BYTES, source),
            frame: Vec::with_capacity(INITIAL_FRAME_CAPACITY),
            malformed: 0,
        }
    }

    /// Frames dropped because they failed to decode.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed
    }

    /// Bytes accumulated towards the next frame.
    pub fn pending_bytes(&self) -> usize {
        self.frame.len()
    }

    /// Raw bytes of the next complete frame, `None` at end of stream.
    ///
    /// Cancel safe: bytes taken from the reader are already in the
    /// accumulator when the future is dropped.
    pub async fn next_jpeg(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                if !self.frame.is_empty() {
                    debug!(bytes = self.frame.len(), "discarding incomplete trailing frame");
                    self.frame.clear();
                }
                return Ok(None);
            }

            let mut consumed = 0;
            let mut complete = false;
            for &byte in chunk {
                self.frame.push(byte);
                consumed += 1;
                if self.frame.len() > 2 && self.frame.ends_with(&JPEG_EOI) {
                    complete = true;
                    break;
                }
            }
            self.reader.consume(consumed);

            if complete {
                let frame = std::mem::replace(&mut self.frame, Vec::with_capacity(INITIAL_FRAME_CAPACITY));
                return Ok(Some(frame));
            }
        }
    }

    /// Next frame that decodes. Malformed frames are skipped.
    ///
    /// Decoding runs on the blocking pool. A frame whose decode is still in
    /// flight when the future is dropped is lost.
    pub async fn next_frame(&mut self) -> io::Result<Option<DynamicImage>> {
        while let Some(jpeg) = self.next_jpeg().await? {
            let bytes = jpeg.len();
            let decoded = tokio::task::spawn_blocking(move || {
                image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            })
            .await
            .map_err(io::Error::other)?;

            match decoded {
                Ok(image) => return Ok(Some(image)),
                Err(e) => {
                    self.malformed += 1;
                    FRAMES_MALFORMED_TOTAL.inc();
                    debug!(bytes, error = %e, "dropping malformed frame");
                }
            }
        }
        Ok(None)
    }

    /// The extractor as a lazy frame sequence. It ends at end of stream or on
    /// the first read error.
    pub fn into_stream(self) -> impl Stream<Item = DynamicImage>
    where
        R: Send,
    {
        futures::stream::unfold(self, |mut extractor| async move {
            match extractor.next_frame().await {
                Ok(Some(image)) => Some((image, extractor)),
                Ok(None) => None,
                Err(e) => {
                    debug!(error = %e, "frame stream read error");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, Rgb, RgbImage};

    /// A small valid JPEG whose pixels vary with `seed`.
    pub fn jpeg(width: u32, height: u32, seed: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([seed.wrapping_add(x as u8), (y as u8).wrapping_mul(3), seed ^ 0x5A])
        });
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::jpeg;
    use super::*;
    use futures::StreamExt;
    use image::GenericImageView;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Places decoy byte pairs inside the APP segment area of a JPEG: after
    /// the SOI marker a COM segment carries `D9 FF`, `FF D8` and `FF 00`.
    fn jpeg_with_decoys(seed: u8) -> Vec<u8> {
        let base = jpeg(8, 8, seed);
        let payload = [0xD9, 0xFF, 0xD8, 0x00, 0xFF, 0xD8, 0xFF, 0x00, 0xD9];
        let len = (payload.len() + 2) as u16;
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xFE];
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&base[2..]);
        out
    }

    #[tokio::test]
    async fn test_splits_concatenated_frames() {
        let mut bytes = Vec::new();
        for seed in 0..3 {
            bytes.extend(jpeg(16, 8, seed * 40));
        }
        let mut extractor = FrameExtractor::new(bytes.as_slice());

        let mut count = 0;
        while let Some(img) = extractor.next_frame().await.unwrap() {
            assert_eq!(img.dimensions(), (16, 8));
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(extractor.malformed_frames(), 0);
    }

    #[tokio::test]
    async fn test_decoy_marker_pairs_do_not_split_frames() {
        let mut bytes = Vec::new();
        for seed in 0..5 {
            bytes.extend(jpeg_with_decoys(seed));
        }
        let frames: Vec<_> = FrameExtractor::new(bytes.as_slice()).into_stream().collect().await;
        assert_eq!(frames.len(), 5);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let mut bytes = jpeg(8, 8, 1);
        bytes.extend_from_slice(&[0x00, 0x11, 0x22, 0xFF, 0xD9]);
        bytes.extend(jpeg(8, 8, 2));

        let mut extractor = FrameExtractor::new(bytes.as_slice());
        assert!(extractor.next_frame().await.unwrap().is_some());
        assert!(extractor.next_frame().await.unwrap().is_some());
        assert!(extractor.next_frame().await.unwrap().is_none());
        assert_eq!(extractor.malformed_frames(), 1);
    }

    #[tokio::test]
    async fn test_raw_frames_end_at_marker() {
        let bytes = [0x01, 0xFF, 0xD9, 0xAA, 0xBB, 0xFF, 0xD9, 0xCC];
        let mut extractor = FrameExtractor::new(&bytes[..]);
        assert_eq!(extractor.next_jpeg().await.unwrap(), Some(vec![0x01, 0xFF, 0xD9]));
        assert_eq!(extractor.next_jpeg().await.unwrap(), Some(vec![0xAA, 0xBB, 0xFF, 0xD9]));
        assert_eq!(extractor.next_jpeg().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_marker_alone_is_not_a_frame() {
        let bytes = [0xFF, 0xD9, 0x10, 0xFF, 0xD9];
        let mut extractor = FrameExtractor::new(&bytes[..]);
        assert_eq!(
            extractor.next_jpeg().await.unwrap(),
            Some(vec![0xFF, 0xD9, 0x10, 0xFF, 0xD9])
        );
    }

    #[tokio::test]
    async fn test_decode_yields_to_other_tasks() {
        let bytes = jpeg(1280, 720, 9);
        let mut extractor = FrameExtractor::new(bytes.as_slice());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        // The slice reader never suspends, so the spawned task can only run
        // while the decode is parked on the blocking pool.
        let image = extractor.next_frame().await.unwrap().unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(image.dimensions(), (1280, 720));
    }

    #[tokio::test]
    async fn test_marker_split_across_reads() {
        let (mut tx, rx) = tokio::io::duplex(4);
        let mut extractor = FrameExtractor::new(rx);

        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(&[0x10, 0x20, 0xFF]).await.unwrap();
            tx.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.write_all(&[0xD9, 0x30]).await.unwrap();
        });

        assert_eq!(
            extractor.next_jpeg().await.unwrap(),
            Some(vec![0x10, 0x20, 0xFF, 0xD9])
        );
        writer.await.unwrap();
        assert_eq!(extractor.next_jpeg().await.unwrap(), None);
    }
}
