//! AMQP-style adapter: manual-ack pop from a bound queue, delayed retries via
//! a per-queue retry exchange that republishes with a per-message TTL.

use std::sync::Arc;

use message_worker_core::{
    retry_delay_ms, Error, Message, MessageCodec, QueueSpec, Result,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::adapter::{decide_retry, dispatch, BrokerAdapter, Disposition, RetryDecision, WorkerContext};
use crate::config::WorkerOptions;

/// One delivered message as the broker client hands it over.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
}

/// Connection handle shared by every consumer thread of a process. The
/// wire-level client behind it is an external collaborator; it stays open
/// until the process exits.
pub trait AmqpClient: Send + Sync {
    fn channel(&self) -> Result<Box<dyn AmqpChannel>>;
}

/// A broker channel scoped to a single fetch iteration: created from the
/// shared client, dropped when the iteration ends. Implementations release
/// broker-side channel resources on drop.
pub trait AmqpChannel {
    fn bind_queue(&mut self, queue: &QueueSpec, durable: bool) -> Result<()>;

    /// Creates or looks up the retry exchange for the queue and returns its
    /// name. Messages published there carry a TTL and route back to the main
    /// queue on expiry.
    fn ensure_retry_exchange(&mut self, queue_name: &str, durable: bool) -> Result<String>;

    /// Pops at most one message with manual-ack semantics, blocking up to the
    /// client's configured wait.
    fn pop(&mut self, queue_name: &str) -> Result<Option<Delivery>>;

    fn ack(&mut self, delivery_tag: u64) -> Result<()>;

    fn reject(&mut self, delivery_tag: u64, requeue: bool) -> Result<()>;

    /// Publishes to an exchange; `expiration_ms` becomes the per-message TTL
    /// property (stringified milliseconds on the wire).
    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        expiration_ms: Option<String>,
    ) -> Result<()>;
}

#[derive(Debug, Default)]
struct AmqpState {
    durable: bool,
}

pub struct AmqpAdapter {
    client: Arc<dyn AmqpClient>,
    codec: Arc<dyn MessageCodec>,
    state: RwLock<AmqpState>,
}

impl AmqpAdapter {
    pub fn new(client: Arc<dyn AmqpClient>, codec: Arc<dyn MessageCodec>) -> Self {
        AmqpAdapter {
            client,
            codec,
            state: RwLock::new(AmqpState { durable: true }),
        }
    }

    fn try_fetch(&self, ctx: &WorkerContext) -> Result<bool> {
        let durable = self.state.read().durable;

        // Channel per iteration; dropped (and closed) before the next fetch.
        let mut channel = self.client.channel()?;
        channel.bind_queue(ctx.queue(), durable)?;
        let retry_exchange = channel.ensure_retry_exchange(&ctx.queue().name, durable)?;

        let delivery = match channel.pop(&ctx.queue().name)? {
            Some(delivery) => delivery,
            None => return Ok(false),
        };

        let message = match self.codec.decode(&delivery.body) {
            Ok(message) => message,
            Err(error) => {
                // Undecodable payload: report and leave the delivery unacked;
                // the broker redelivers when the channel closes.
                ctx.callbacks().emit_error(&error, None);
                return Ok(false);
            }
        };

        let disposal = match dispatch(ctx, &message) {
            Disposition::DuplicateDrop | Disposition::Ack => channel.ack(delivery.delivery_tag),
            Disposition::Reject { abort } => self.reject_message(
                ctx,
                channel.as_mut(),
                &retry_exchange,
                delivery.delivery_tag,
                message.clone(),
                abort,
            ),
        };

        if let Err(error) = disposal {
            ctx.callbacks().emit_error(&error, Some(&message));
        }

        Ok(true)
    }

    fn reject_message(
        &self,
        ctx: &WorkerContext,
        channel: &mut dyn AmqpChannel,
        retry_exchange: &str,
        delivery_tag: u64,
        mut message: Message,
        abort: bool,
    ) -> Result<()> {
        channel.reject(delivery_tag, false)?;

        let policy = ctx.queue().retry_policy();
        match decide_retry(&policy, message.retry_attempts) {
            RetryDecision::Schedule => {
                message.retry_attempts += 1;
                let ttl_ms = retry_delay_ms(message.retry_attempts, &policy);
                let body = self.codec.encode(&message)?;
                channel.publish(
                    retry_exchange,
                    &ctx.queue().name,
                    &body,
                    Some(ttl_ms.to_string()),
                )?;
                debug!(
                    message_id = %message.id,
                    attempt = message.retry_attempts,
                    ttl_ms,
                    "scheduled retry on {retry_exchange}"
                );
                ctx.callbacks().emit_retry(&message, abort);
            }
            RetryDecision::Exhausted => {
                warn!(
                    message_id = %message.id,
                    attempts = message.retry_attempts,
                    "retry attempts exhausted; message terminally rejected"
                );
                ctx.callbacks().emit_retry_exceeded(&message);
            }
            RetryDecision::Drop => {
                // Retries disabled for this queue: the broker reject above is
                // the whole disposal, with no republish and no callback.
                debug!(message_id = %message.id, "rejected with retries disabled");
            }
        }

        Ok(())
    }
}

impl BrokerAdapter for AmqpAdapter {
    fn configure(&self, queue: &QueueSpec, options: &WorkerOptions) -> Result<()> {
        if queue.name.trim().is_empty() {
            return Err(Error::Configuration("queue name is required".to_string()));
        }
        self.state.write().durable = options.durable;
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
        // The connection belongs to the caller and outlives the worker;
        // channels are already scoped to iterations.
        debug!("amqp adapter stopped");
    }
}
