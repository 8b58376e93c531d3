//! Error/retry/retry-exceeded sinks installed on the worker.
//!
//! Callbacks are installed before `start` and read-only afterwards. A panic
//! inside a callback is logged and swallowed so the worker stays alive.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use message_worker_core::{Error, Message};
use tracing::warn;

pub type ErrorCallback = Arc<dyn Fn(&Error, Option<&Message>) + Send + Sync>;
pub type RetryCallback = Arc<dyn Fn(&Message, bool) + Send + Sync>;
pub type RetryExceededCallback = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Callbacks {
    on_error: Option<ErrorCallback>,
    on_retry: Option<RetryCallback>,
    on_retry_exceeded: Option<RetryExceededCallback>,
}

impl Callbacks {
    pub fn set_on_error<F>(&mut self, callback: F)
    where
        F: Fn(&Error, Option<&Message>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
    }

    pub fn set_on_retry<F>(&mut self, callback: F)
    where
        F: Fn(&Message, bool) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
    }

    pub fn set_on_retry_exceeded<F>(&mut self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.on_retry_exceeded = Some(Arc::new(callback));
    }

    pub fn emit_error(&self, error: &Error, message: Option<&Message>) {
        if let Some(callback) = &self.on_error {
            let guarded = catch_unwind(AssertUnwindSafe(|| callback(error, message)));
            if guarded.is_err() {
                warn!("on_error callback panicked; continuing");
            }
        }
    }

    pub fn emit_retry(&self, message: &Message, abort: bool) {
        if let Some(callback) = &self.on_retry {
            let guarded = catch_unwind(AssertUnwindSafe(|| callback(message, abort)));
            if guarded.is_err() {
                warn!(message_id = %message.id, "on_retry callback panicked; continuing");
            }
        }
    }

    pub fn emit_retry_exceeded(&self, message: &Message) {
        if let Some(callback) = &self.on_retry_exceeded {
            let guarded = catch_unwind(AssertUnwindSafe(|| callback(message)));
            if guarded.is_err() {
                warn!(message_id = %message.id, "on_retry_exceeded callback panicked; continuing");
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_error", &self.on_error.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("on_retry_exceeded", &self.on_retry_exceeded.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_unset_callbacks_are_noops() {
        let callbacks = Callbacks::default();
        let message = Message::new("t", json!(null));

        callbacks.emit_error(&Error::Transport("down".to_string()), None);
        callbacks.emit_retry(&message, false);
        callbacks.emit_retry_exceeded(&message);
    }

    #[test]
    fn test_emit_passes_arguments() {
        let seen = Arc::new(AtomicU32::new(0));
        let mut callbacks = Callbacks::default();

        let counter = seen.clone();
        callbacks.set_on_retry(move |message, abort| {
            assert_eq!(message.message_type, "t");
            assert!(abort);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let message = Message::new("t", json!(1));
        callbacks.emit_retry(&message, true);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_is_swallowed() {
        let mut callbacks = Callbacks::default();
        callbacks.set_on_retry_exceeded(|_| panic!("sink blew up"));

        let message = Message::new("t", json!(null));
        callbacks.emit_retry_exceeded(&message);
    }
}
