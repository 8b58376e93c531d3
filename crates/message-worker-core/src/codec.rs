//! Serialization provider seam.
//!
//! The wire format a deployment uses is pluggable; the runtime only needs to
//! turn a [`Message`] into bytes for the retry publish and back again on
//! receipt. JSON is the in-tree default.

use crate::error::Result;
use crate::message::Message;

pub trait MessageCodec: Send + Sync {
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;

    fn decode(&self, payload: &[u8]) -> Result<Message>;
}

/// JSON rendition of the message model.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Message> {
        Ok(serde_json::from_slice(payload)?)
    }
}
