use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A queue message as the broker delivers it.
///
/// `retry_attempts` counts prior redeliveries: 0 on first delivery. On the
/// AMQP-style broker the counter travels inside the payload and is bumped on
/// each republish; on the visibility-timeout broker it is derived from the
/// receive count the broker reports, and the payload value is overwritten on
/// receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    /// Message type name (e.g. "order.created"); routes to handler logic.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Opaque payload; the runtime never inspects it.
    pub content: Value,

    pub created: DateTime<Utc>,

    #[serde(default)]
    pub retry_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Message {
    pub fn new(message_type: impl Into<String>, content: Value) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            message_type: message_type.into(),
            content,
            created: Utc::now(),
            retry_attempts: 0,
            context: None,
            content_type: None,
        }
    }

    /// The handler-visible view of this message.
    pub fn args(&self) -> MessageArgs {
        MessageArgs {
            message_type: self.message_type.clone(),
            retry_attempts: self.retry_attempts,
            id: self.id.clone(),
            sent: self.created,
            context: self.context.clone(),
            content_type: self.content_type.clone(),
            abort: false,
        }
    }
}

/// What the handler sees alongside the content.
///
/// Every field is read-only to the handler except `abort`: setting it true
/// requests rejection of the message without panicking, and the rejection is
/// not reported through `on_error`.
#[derive(Debug, Clone)]
pub struct MessageArgs {
    pub message_type: String,
    pub retry_attempts: u32,
    pub id: String,
    pub sent: DateTime<Utc>,
    pub context: Option<Value>,
    pub content_type: Option<String>,
    pub abort: bool,
}
