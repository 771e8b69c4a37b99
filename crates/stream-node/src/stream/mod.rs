//! Decoder sessions: process ownership, frame extraction, delivery and
//! per-camera supervision.

pub mod channel;
pub mod decoder;
pub mod extractor;
pub mod session;
pub mod supervisor;

pub use channel::{delivery_channel, DecodedFrame, FrameReceiver, FrameSender};
pub use decoder::{DecoderCommand, DecoderProcess};
pub use extractor::FrameExtractor;
pub use session::{run_session, SessionEnd, SessionError, SessionParams, StreamSession};
pub use supervisor::SessionSupervisor;
