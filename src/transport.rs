//! Pub/sub message contract between the server and the clocks.
//!
//! Every device listens on two channels named after its network address:
//!
//! | Channel | Payload |
//! |---------|---------|
//! | `{draw_prefix}_{address}` | base64 of the zlib-compressed frame buffer |
//! | `{clear_prefix}_{address}` | a short literal token (default `clear`) |
//!
//! Delivery itself (broker, retries, QoS) belongs to the [`Publisher`]
//! implementation.

use std::sync::{Mutex, PoisonError};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use miniz_oxide::deflate::compress_to_vec_zlib;
use miniz_oxide::inflate::decompress_to_vec_zlib;

use crate::frame::FrameBuffer;
use crate::{Error, Result};

/// Default prefix for frame channels.
pub const DEFAULT_DRAW_PREFIX: &str = "draw";

/// Default prefix for clear channels.
pub const DEFAULT_CLEAR_PREFIX: &str = "clear";

/// Default payload of a clear command.
pub const DEFAULT_CLEAR_TOKEN: &str = "clear";

/// Channel name for `address` under `prefix`.
///
/// # Example
///
/// ```
/// use paperclock::transport::channel_name;
///
/// assert_eq!(channel_name("draw", "10.0.0.7"), "draw_10.0.0.7");
/// ```
pub fn channel_name(prefix: &str, address: &str) -> String {
    format!("{}_{}", prefix, address)
}

/// zlib level used for frames.
const COMPRESSION_LEVEL: u8 = 6;

/// Compress and text-encode a frame for publishing.
pub fn encode_frame_message(frame: &FrameBuffer) -> String {
    STANDARD.encode(compress_to_vec_zlib(frame.as_bytes(), COMPRESSION_LEVEL))
}

/// Reverse [`encode_frame_message`], returning the raw packed bytes.
pub fn decode_frame_message(payload: &str) -> Result<Vec<u8>> {
    let compressed = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Transport(format!("Frame payload is not base64: {}", e)))?;
    decompress_to_vec_zlib(&compressed)
        .map_err(|e| Error::Transport(format!("Frame payload is not zlib: {}", e)))
}

/// Something that can deliver a text payload to a named channel.
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `channel`.
    fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}

/// A message captured by [`MemoryPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Target channel
    pub channel: String,
    /// Payload as sent
    pub payload: String,
}

/// Publisher that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    sent: Mutex<Vec<Published>>,
}

impl MemoryPublisher {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn messages(&self) -> Vec<Published> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages sent to one channel.
    pub fn on_channel(&self, channel: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.payload)
            .collect()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Published {
                channel: channel.to_string(),
                payload: payload.to_string(),
            });
        Ok(())
    }
}
