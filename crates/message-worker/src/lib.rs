//! Broker-agnostic queue worker runtime.
//!
//! Pulls messages from an AMQP-style broker or a visibility-timeout cloud
//! queue, dispatches them to a user handler, and owns acknowledgement,
//! dedup, retry with backoff, and retry exhaustion. The wire-level broker
//! clients stay outside this crate, behind the [`AmqpClient`] and
//! [`QueueClient`] traits.
//!
//! ```no_run
//! use std::sync::Arc;
//! use message_worker::{
//!     JsonCodec, NullVerifier, QueueSpec, VisibilityAdapter, Worker, WorkerOptions,
//! };
//!
//! # fn connect() -> Arc<dyn message_worker::QueueClient> { unimplemented!() }
//! let adapter = VisibilityAdapter::new(connect(), Arc::new(JsonCodec), Arc::new(NullVerifier));
//! let options = WorkerOptions {
//!     mq_endpoint: "https://queue.region.example.com".to_string(),
//!     thread_count: 4,
//!     ..WorkerOptions::default()
//! };
//!
//! let worker = Worker::new(adapter, options);
//! worker.start(QueueSpec::new("orders"), |content, args| {
//!     if content.get("customer").is_none() {
//!         args.abort = true;
//!     }
//! }).unwrap();
//! ```

pub mod adapter;
pub mod callbacks;
pub mod config;
pub mod nonce;
pub mod signature;
pub mod worker;

pub use adapter::{
    AmqpAdapter, AmqpChannel, AmqpClient, BrokerAdapter, Delivery, Handler, QueueClient,
    QueueDelivery, VisibilityAdapter, WorkerContext,
};
pub use callbacks::Callbacks;
pub use config::WorkerOptions;
pub use nonce::{NonceGate, NonceState};
pub use signature::{NullVerifier, SignatureVerifier};
pub use worker::{ProcessStatus, Worker, WorkerStatus};

pub use message_worker_core::{
    Error, JsonCodec, Message, MessageArgs, MessageCodec, QueueSpec, Result, RetryPolicy,
};
