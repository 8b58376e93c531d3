//! Runs the worker against an in-memory visibility-timeout queue.
//!
//! ```sh
//! cargo run --example in_memory_worker
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use message_worker::adapter::{QueueClient, QueueDelivery};
use message_worker::{
    JsonCodec, Message, NullVerifier, QueueSpec, VisibilityAdapter, Worker, WorkerOptions,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Minimal visibility-timeout queue living in process memory.
struct InMemoryQueue {
    deliveries: Mutex<VecDeque<QueueDelivery>>,
}

impl InMemoryQueue {
    fn new(messages: Vec<Message>) -> Self {
        let deliveries = messages
            .into_iter()
            .enumerate()
            .map(|(index, message)| {
                let inner = serde_json::to_string(&message).unwrap();
                QueueDelivery {
                    body: json!({ "Message": inner }).to_string(),
                    receipt_handle: format!("rh-{index}"),
                    receive_count: 1,
                }
            })
            .collect();
        InMemoryQueue {
            deliveries: Mutex::new(deliveries),
        }
    }

    fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }
}

impl QueueClient for InMemoryQueue {
    fn queue_url(&self, queue_name: &str) -> message_worker::Result<String> {
        Ok(format!("mem://{queue_name}"))
    }

    fn receive(
        &self,
        _queue_url: &str,
        max_messages: u32,
        _wait: Duration,
    ) -> message_worker::Result<Vec<QueueDelivery>> {
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

    fn delete(&self, _queue_url: &str, receipt_handle: &str) -> message_worker::Result<()> {
        tracing::info!(receipt_handle, "message deleted");
        Ok(())
    }

    fn change_visibility(
        &self,
        _queue_url: &str,
        receipt_handle: &str,
        timeout_secs: u64,
    ) -> message_worker::Result<()> {
        tracing::info!(receipt_handle, timeout_secs, "retry scheduled");
        Ok(())
    }
}

fn main() -> message_worker::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut refund = Message::new("payment.refund", json!({"amount": 100}));
    refund.context = Some(json!({"tenant": "acme"}));

    let queue_client = Arc::new(InMemoryQueue::new(vec![
        Message::new("order.created", json!({"order_id": 41})),
        Message::new("order.created", json!({"order_id": 42})),
        refund,
    ]));

    let adapter = VisibilityAdapter::new(
        queue_client.clone(),
        Arc::new(JsonCodec),
        Arc::new(NullVerifier),
    );

    let mut worker = Worker::new(
        adapter,
        WorkerOptions {
            mq_endpoint: "mem://local".to_string(),
            thread_count: 2,
            sleep_seconds: 1,
            ..WorkerOptions::default()
        },
    );
    worker.on_retry(|message, abort| {
        tracing::warn!(message_id = %message.id, abort, "message will retry");
    });

    let worker = Arc::new(worker);
    let stopper = {
        let worker = worker.clone();
        let queue_client = queue_client.clone();
        thread::spawn(move || {
            while !queue_client.is_empty() {
                thread::sleep(Duration::from_millis(100));
            }
            thread::sleep(Duration::from_millis(500));
            worker.stop();
        })
    };

    worker.start(QueueSpec::new("demo"), |content, args| {
        if args.message_type == "payment.refund" {
            // Refunds are routed elsewhere in this demo.
            args.abort = true;
            return;
        }
        tracing::info!(message_id = %args.id, %content, "handled");
    })?;

    stopper.join().expect("stopper thread panicked");
    tracing::info!(tag = worker.consumer_tag(), "worker drained the queue");
    Ok(())
}
