//! Visibility-timeout adapter for cloud-style pull queues: long-poll receive,
//! delete on success, and retry delays expressed by extending the message's
//! visibility timeout. The broker's receive count is the authoritative retry
//! counter; the payload never carries it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use message_worker_core::{
    retry_delay_ms, visibility_timeout_secs, Error, Message, MessageCodec, QueueSpec, Result,
};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapter::{decide_retry, dispatch, BrokerAdapter, Disposition, RetryDecision, WorkerContext};
use crate::config::WorkerOptions;
use crate::signature::SignatureVerifier;

/// One received message. `receive_count` is the broker's delivery counter
/// (1 on the first delivery); implementations must request it with every
/// receive call.
#[derive(Debug, Clone)]
pub struct QueueDelivery {
    pub body: String,
    pub receipt_handle: String,
    pub receive_count: u32,
}

/// Thread-safe client for a visibility-timeout queue service. The wire-level
/// client is an external collaborator.
pub trait QueueClient: Send + Sync {
    fn queue_url(&self, queue_name: &str) -> Result<String>;

    fn receive(
        &self,
        queue_url: &str,
        max_messages: u32,
        wait: Duration,
    ) -> Result<Vec<QueueDelivery>>;

    fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<()>;

    fn change_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        timeout_secs: u64,
    ) -> Result<()>;
}

/// Outer body envelope: `{ "Message": "<serialized payload string>" }`.
#[derive(Debug, Deserialize)]
struct BodyEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

pub struct VisibilityAdapter {
    client: Arc<dyn QueueClient>,
    codec: Arc<dyn MessageCodec>,
    verifier: Arc<dyn SignatureVerifier>,
    queue_urls: RwLock<HashMap<String, String>>,
}

impl VisibilityAdapter {
    pub fn new(
        client: Arc<dyn QueueClient>,
        codec: Arc<dyn MessageCodec>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        VisibilityAdapter {
            client,
            codec,
            verifier,
            queue_urls: RwLock::new(HashMap::new()),
        }
    }

    fn resolve_queue_url(&self, queue_name: &str) -> Result<String> {
        if let Some(url) = self.queue_urls.read().get(queue_name) {
            return Ok(url.clone());
        }
        let url = self.client.queue_url(queue_name)?;
        self.queue_urls
            .write()
            .insert(queue_name.to_string(), url.clone());
        Ok(url)
    }

    fn try_fetch(&self, ctx: &WorkerContext) -> Result<bool> {
        let queue_url = self.resolve_queue_url(&ctx.queue().name)?;
        let wait = Duration::from_secs(ctx.options().queue_poll_wait_seconds);

        let deliveries = self.client.receive(&queue_url, 1, wait)?;
        let delivery = match deliveries.into_iter().next() {
            Some(delivery) => delivery,
            None => return Ok(false),
        };

        let message = match self.decode_delivery(&delivery) {
            Ok(message) => message,
            Err(error) => {
                // Leave the message to its visibility timeout; it redelivers
                // once the timeout lapses.
                ctx.callbacks().emit_error(&error, None);
                return Ok(false);
            }
        };

        let disposal = if let Err(error) = self.verifier.verify(&delivery.body) {
            // Signature failures follow the handler-failure path: report,
            // then reject per policy. The handler never runs.
            ctx.callbacks().emit_error(&error, Some(&message));
            self.reject_message(ctx, &queue_url, &delivery, &message, false)
        } else {
            match dispatch(ctx, &message) {
                Disposition::DuplicateDrop | Disposition::Ack => {
                    self.client.delete(&queue_url, &delivery.receipt_handle)
                }
                Disposition::Reject { abort } => {
                    self.reject_message(ctx, &queue_url, &delivery, &message, abort)
                }
            }
        };

        if let Err(error) = disposal {
            ctx.callbacks().emit_error(&error, Some(&message));
        }

        Ok(true)
    }

    fn decode_delivery(&self, delivery: &QueueDelivery) -> Result<Message> {
        let envelope: BodyEnvelope = serde_json::from_str(&delivery.body)?;
        let mut message = self.codec.decode(envelope.message.as_bytes())?;
        // The broker is authoritative for the retry counter here; whatever
        // the payload carried is overwritten.
        message.retry_attempts = delivery.receive_count.saturating_sub(1);
        Ok(message)
    }

    fn reject_message(
        &self,
        ctx: &WorkerContext,
        queue_url: &str,
        delivery: &QueueDelivery,
        message: &Message,
        abort: bool,
    ) -> Result<()> {
        let policy = ctx.queue().retry_policy();
        match decide_retry(&policy, message.retry_attempts) {
            RetryDecision::Schedule => {
                let delay_ms = retry_delay_ms(message.retry_attempts, &policy);
                let timeout_secs = visibility_timeout_secs(delay_ms);
                self.client
                    .change_visibility(queue_url, &delivery.receipt_handle, timeout_secs)?;
                debug!(
                    message_id = %message.id,
                    attempts = message.retry_attempts,
                    timeout_secs,
                    "retry scheduled via visibility timeout"
                );
                ctx.callbacks().emit_retry(message, abort);
            }
            RetryDecision::Exhausted => {
                self.client.delete(queue_url, &delivery.receipt_handle)?;
                warn!(
                    message_id = %message.id,
                    attempts = message.retry_attempts,
                    "retry attempts exhausted; message deleted"
                );
                ctx.callbacks().emit_retry_exceeded(message);
            }
            RetryDecision::Drop => {
                // Retries disabled: delete with no follow-up notification.
                self.client.delete(queue_url, &delivery.receipt_handle)?;
                debug!(message_id = %message.id, "deleted with retries disabled");
            }
        }

        Ok(())
    }
}

impl BrokerAdapter for VisibilityAdapter {
    fn configure(&self, queue: &QueueSpec, _options: &WorkerOptions) -> Result<()> {
        if queue.name.trim().is_empty() {
            return Err(Error::Configuration("queue name is required".to_string()));
        }
        Ok(())
    }

    fn pre_process(&self, ctx: &WorkerContext) -> Result<()> {
        let url = self.resolve_queue_url(&ctx.queue().name)?;
        debug!(queue = %ctx.queue().name, %url, "queue url resolved");
        Ok(())
    }

    fn fetch_and_process(&self, ctx: &WorkerContext) -> bool {
        match self.try_fetch(ctx) {
            Ok(received) => received,
            Err(error) => {
                ctx.callbacks().emit_error(&error, None);
                false
            }
        }
    }

    fn stop(&self) {
        self.queue_urls.write().clear();
        debug!("visibility adapter stopped");
    }
}
