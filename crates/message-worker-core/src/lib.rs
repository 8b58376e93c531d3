//! Core types for the message-worker runtime: the message model, per-queue
//! retry configuration, the backoff calculator, and the serialization seam.

pub mod backoff;
pub mod codec;
pub mod error;
pub mod message;
pub mod queue;

pub use backoff::{retry_delay_ms, visibility_timeout_secs, MAX_VISIBILITY_TIMEOUT_SECS};
pub use codec::{JsonCodec, MessageCodec};
pub use error::{Error, Result};
pub use message::{Message, MessageArgs};
pub use queue::{QueueSpec, RetryPolicy};
