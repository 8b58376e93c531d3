//! Recording mocks for the broker client traits, shared by the adapter and
//! lifecycle tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use message_worker::adapter::{
    AmqpChannel, AmqpClient, BrokerAdapter, Delivery, QueueClient, QueueDelivery, WorkerContext,
};
use message_worker::{Callbacks, Message, QueueSpec, WorkerOptions};
use message_worker_core::Result;
use parking_lot::Mutex;
use serde_json::json;

pub fn options() -> WorkerOptions {
    WorkerOptions {
        mq_endpoint: "amqp://localhost:5672".to_string(),
        ..WorkerOptions::default()
    }
}

pub fn message_with_attempts(id: &str, retry_attempts: u32) -> Message {
    let mut message = Message::new("test.event", json!({"n": 1}));
    message.id = id.to_string();
    message.retry_attempts = retry_attempts;
    message
}

// ---------------------------------------------------------------------------
// Callback recording

#[derive(Clone, Default)]
pub struct CallbackLog {
    pub errors: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub retries: Arc<Mutex<Vec<(String, u32, bool)>>>,
    pub exceeded: Arc<Mutex<Vec<String>>>,
}

impl CallbackLog {
    pub fn install(&self, callbacks: &mut Callbacks) {
        let errors = self.errors.clone();
        callbacks.set_on_error(move |error, message| {
            errors
                .lock()
                .push((error.to_string(), message.map(|m| m.id.clone())));
        });

        let retries = self.retries.clone();
        callbacks.set_on_retry(move |message, abort| {
            retries
                .lock()
                .push((message.id.clone(), message.retry_attempts, abort));
        });

        let exceeded = self.exceeded.clone();
        callbacks.set_on_retry_exceeded(move |message| {
            exceeded.lock().push(message.id.clone());
        });
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn retry_count(&self) -> usize {
        self.retries.lock().len()
    }

    pub fn exceeded_count(&self) -> usize {
        self.exceeded.lock().len()
    }
}

pub fn context_with_log(
    queue: QueueSpec,
    options: WorkerOptions,
    log: &CallbackLog,
    handler: impl Fn(&serde_json::Value, &mut message_worker::MessageArgs) + Send + Sync + 'static,
) -> WorkerContext {
    let mut callbacks = Callbacks::default();
    log.install(&mut callbacks);
    WorkerContext::new(queue, options, callbacks, Arc::new(handler))
}

// ---------------------------------------------------------------------------
// AMQP-style mock client

#[derive(Debug, Clone, PartialEq)]
pub enum AmqpOp {
    BindQueue { queue: String, durable: bool },
    EnsureRetryExchange { queue: String },
    Ack { delivery_tag: u64 },
    Reject { delivery_tag: u64, requeue: bool },
    Publish {
        exchange: String,
        routing_key: String,
        body: Vec<u8>,
        expiration_ms: Option<String>,
    },
}

#[derive(Default)]
pub struct MockAmqpClient {
    deliveries: Arc<Mutex<VecDeque<Delivery>>>,
    ops: Arc<Mutex<Vec<AmqpOp>>>,
    channels_opened: Arc<AtomicU32>,
}

impl MockAmqpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(MockAmqpClient::default())
    }

    pub fn push_delivery(&self, delivery_tag: u64, body: Vec<u8>) {
        self.deliveries
            .lock()
            .push_back(Delivery { delivery_tag, body });
    }

    pub fn ops(&self) -> Vec<AmqpOp> {
        self.ops.lock().clone()
    }

    pub fn channels_opened(&self) -> u32 {
        self.channels_opened.load(Ordering::SeqCst)
    }
}

impl AmqpClient for MockAmqpClient {
    fn channel(&self) -> Result<Box<dyn AmqpChannel>> {
        self.channels_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockAmqpChannel {
            deliveries: self.deliveries.clone(),
            ops: self.ops.clone(),
        }))
    }
}

struct MockAmqpChannel {
    deliveries: Arc<Mutex<VecDeque<Delivery>>>,
    ops: Arc<Mutex<Vec<AmqpOp>>>,
}

impl AmqpChannel for MockAmqpChannel {
    fn bind_queue(&mut self, queue: &QueueSpec, durable: bool) -> Result<()> {
        self.ops.lock().push(AmqpOp::BindQueue {
            queue: queue.name.clone(),
            durable,
        });
        Ok(())
    }

    fn ensure_retry_exchange(&mut self, queue_name: &str, _durable: bool) -> Result<String> {
        self.ops.lock().push(AmqpOp::EnsureRetryExchange {
            queue: queue_name.to_string(),
        });
        Ok(format!("{queue_name}.retry"))
    }

    fn pop(&mut self, _queue_name: &str) -> Result<Option<Delivery>> {
        Ok(self.deliveries.lock().pop_front())
    }

    fn ack(&mut self, delivery_tag: u64) -> Result<()> {
        self.ops.lock().push(AmqpOp::Ack { delivery_tag });
        Ok(())
    }

    fn reject(&mut self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.ops.lock().push(AmqpOp::Reject {
            delivery_tag,
            requeue,
        });
        Ok(())
    }

    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        expiration_ms: Option<String>,
    ) -> Result<()> {
        self.ops.lock().push(AmqpOp::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
            expiration_ms,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Visibility-timeout mock client

#[derive(Debug, Clone, PartialEq)]
pub enum QueueOp {
    Delete { receipt_handle: String },
    ChangeVisibility {
        receipt_handle: String,
        timeout_secs: u64,
    },
}

#[derive(Default)]
pub struct MockQueueClient {
    deliveries: Mutex<VecDeque<QueueDelivery>>,
    ops: Arc<Mutex<Vec<QueueOp>>>,
    url_resolutions: Arc<AtomicU32>,
}

impl MockQueueClient {
    pub fn new() -> Arc<Self> {
        Arc::new(MockQueueClient::default())
    }

    pub fn push_delivery(&self, message: &Message, receipt_handle: &str, receive_count: u32) {
        let inner = serde_json::to_string(message).unwrap();
        let body = serde_json::json!({ "Message": inner }).to_string();
        self.push_raw(&body, receipt_handle, receive_count);
    }

    pub fn push_raw(&self, body: &str, receipt_handle: &str, receive_count: u32) {
        self.deliveries.lock().push_back(QueueDelivery {
            body: body.to_string(),
            receipt_handle: receipt_handle.to_string(),
            receive_count,
        });
    }

    pub fn ops(&self) -> Vec<QueueOp> {
        self.ops.lock().clone()
    }

    pub fn url_resolutions(&self) -> u32 {
        self.url_resolutions.load(Ordering::SeqCst)
    }
}

impl QueueClient for MockQueueClient {
    fn queue_url(&self, queue_name: &str) -> Result<String> {
        self.url_resolutions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://queue.example.com/{queue_name}"))
    }

    fn receive(
        &self,
        _queue_url: &str,
        max_messages: u32,
        _wait: Duration,
    ) -> Result<Vec<QueueDelivery>> {
        let mut deliveries = self.deliveries.lock();
        let mut batch = Vec::new();
        while batch.len() < max_messages as usize {
            match deliveries.pop_front() {
                Some(delivery) => batch.push(delivery),
                None => break,
            }
        }
        Ok(batch)
    }

    fn delete(&self, _queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.ops.lock().push(QueueOp::Delete {
            receipt_handle: receipt_handle.to_string(),
        });
        Ok(())
    }

    fn change_visibility(
        &self,
        _queue_url: &str,
        receipt_handle: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        self.ops.lock().push(QueueOp::ChangeVisibility {
            receipt_handle: receipt_handle.to_string(),
            timeout_secs,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Counting adapter for lifecycle tests

#[derive(Default)]
pub struct CountingAdapter {
    pub fetches: Arc<AtomicU32>,
    pub stops: Arc<AtomicU32>,
    pub fetch_delay: Duration,
}

impl CountingAdapter {
    pub fn with_fetch_delay(fetch_delay: Duration) -> Self {
        CountingAdapter {
            fetch_delay,
            ..CountingAdapter::default()
        }
    }
}

impl BrokerAdapter for CountingAdapter {
    fn configure(&self, _queue: &QueueSpec, _options: &WorkerOptions) -> Result<()> {
        Ok(())
    }

    fn fetch_and_process(&self, _ctx: &WorkerContext) -> bool {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            std::thread::sleep(self.fetch_delay);
        }
        false
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
