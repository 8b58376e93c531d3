//! Broker adapter capability set and the dispatch logic shared by both
//! adapters.

pub mod amqp;
pub mod visibility;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use message_worker_core::{Error, Message, QueueSpec, Result, RetryPolicy};
use serde_json::Value;
use tracing::debug;

use crate::callbacks::Callbacks;
use crate::config::WorkerOptions;
use crate::nonce::NonceGate;

pub use amqp::{AmqpAdapter, AmqpChannel, AmqpClient, Delivery};
pub use visibility::{QueueClient, QueueDelivery, VisibilityAdapter};

/// User-supplied message handler. Receives the opaque content and the
/// handler-visible args; sets `args.abort = true` to request rejection
/// without panicking.
pub type Handler = Arc<dyn Fn(&Value, &mut message_worker_core::MessageArgs) + Send + Sync>;

/// Everything an adapter needs from the runtime for one consumption session:
/// the queue being drained, the options the worker started with, the callback
/// sinks and the per-process nonce gate. Built once per `start` and shared by
/// every consumer thread.
pub struct WorkerContext {
    queue: QueueSpec,
    options: WorkerOptions,
    callbacks: Callbacks,
    handler: Handler,
    nonce: NonceGate,
}

impl WorkerContext {
    pub fn new(
        queue: QueueSpec,
        options: WorkerOptions,
        callbacks: Callbacks,
        handler: Handler,
    ) -> Self {
        WorkerContext {
            queue,
            options,
            callbacks,
            handler,
            nonce: NonceGate::default(),
        }
    }

    pub fn queue(&self) -> &QueueSpec {
        &self.queue
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    pub fn nonce(&self) -> &NonceGate {
        &self.nonce
    }
}

/// Capability set every broker backend implements. One adapter instance is
/// shared by all consumer threads of a process; per-thread broker state (an
/// AMQP channel, for instance) is created inside `fetch_and_process`.
pub trait BrokerAdapter: Send + Sync {
    /// Validates and stores adapter-specific options. Runs once, before any
    /// thread spawns.
    fn configure(&self, queue: &QueueSpec, options: &WorkerOptions) -> Result<()>;

    /// One-shot hook before the consumer threads start.
    fn pre_process(&self, _ctx: &WorkerContext) -> Result<()> {
        Ok(())
    }

    /// Fetches at most one message and runs it through admission, dispatch
    /// and disposal. Returns true when a message was received. Errors are
    /// handled internally and routed to `on_error`; they never propagate.
    fn fetch_and_process(&self, ctx: &WorkerContext) -> bool;

    /// Releases adapter-held resources. Idempotent.
    fn stop(&self);
}

/// How an admitted (or duplicate) message left the dispatch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Nonce gate refused the id; drop the message without a handler call.
    DuplicateDrop,
    /// Handler finished normally; acknowledge.
    Ack,
    /// Handler aborted or panicked; reject, subject to the retry policy.
    Reject { abort: bool },
}

/// Runs nonce admission and the handler for one message, returning how the
/// adapter must dispose of it. Handler panics are caught here and reported
/// through `on_error`; an abort is not an error.
pub(crate) fn dispatch(ctx: &WorkerContext, message: &Message) -> Disposition {
    if !ctx.nonce().admit(&message.id) {
        debug!(message_id = %message.id, "duplicate delivery suppressed");
        return Disposition::DuplicateDrop;
    }

    let mut args = message.args();
    let outcome = catch_unwind(AssertUnwindSafe(|| (ctx.handler)(&message.content, &mut args)));

    match outcome {
        Ok(()) if !args.abort => {
            ctx.nonce().complete(&message.id);
            Disposition::Ack
        }
        Ok(()) => {
            ctx.nonce().failed(&message.id);
            Disposition::Reject { abort: true }
        }
        Err(panic) => {
            ctx.nonce().failed(&message.id);
            let error = Error::Handler(panic_description(panic));
            ctx.callbacks().emit_error(&error, Some(message));
            Disposition::Reject { abort: false }
        }
    }
}

/// What the retry policy says about a rejected message with the given prior
/// delivery count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Schedule another delivery.
    Schedule,
    /// Attempts used up; reject terminally and report.
    Exhausted,
    /// Retries disabled for this queue; drop with no further notification.
    Drop,
}

pub(crate) fn decide_retry(policy: &RetryPolicy, retry_attempts: u32) -> RetryDecision {
    if retry_attempts >= policy.max_retry_attempts {
        RetryDecision::Exhausted
    } else if !policy.allow_retry {
        RetryDecision::Drop
    } else {
        RetryDecision::Schedule
    }
}

pub(crate) fn panic_description(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}
