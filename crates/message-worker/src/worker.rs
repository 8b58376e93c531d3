//! Worker lifecycle engine: process fan-out, consumer threads, cooperative
//! shutdown and the memory-collection pacer.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use message_worker_core::{Error, Message, MessageArgs, QueueSpec, Result};
use parking_lot::Mutex;
use serde_json::Value;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info, trace};
use uuid::Uuid;

use crate::adapter::{panic_description, BrokerAdapter, Handler, WorkerContext};
use crate::callbacks::Callbacks;
use crate::config::WorkerOptions;

/// Snapshot of the processes and threads a worker has started.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub processes: Vec<ProcessStatus>,
}

#[derive(Debug, Clone)]
pub struct ProcessStatus {
    pub pid: u32,
    pub threads: Vec<String>,
}

/// Paces memory-collection hints. This runtime has no collector to trigger,
/// so the hint itself is a no-op; the interval bookkeeping and hint counter
/// stay in place for observability.
pub(crate) struct GcPacer {
    interval: Duration,
    last_flush: Mutex<Instant>,
    hints: AtomicU64,
}

impl GcPacer {
    pub(crate) fn new(interval_seconds: u64) -> Self {
        GcPacer {
            interval: Duration::from_secs(interval_seconds),
            last_flush: Mutex::new(Instant::now()),
            hints: AtomicU64::new(0),
        }
    }

    /// Emits a hint when the interval has elapsed; returns whether it fired.
    pub(crate) fn flush(&self) -> bool {
        let mut last_flush = self.last_flush.lock();
        if last_flush.elapsed() < self.interval {
            return false;
        }
        *last_flush = Instant::now();
        drop(last_flush);

        let hints = self.hints.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(hints, "memory collection hint");
        true
    }

    pub(crate) fn hints(&self) -> u64 {
        self.hints.load(Ordering::Relaxed)
    }
}

/// The queue worker runtime.
///
/// Owns the lifecycle: option validation, optional fork fan-out, per-process
/// signal installation and thread pool, and the cooperative stop flag every
/// consumer loop reads. The broker specifics live behind the adapter.
pub struct Worker {
    adapter: Arc<dyn BrokerAdapter>,
    options: WorkerOptions,
    callbacks: Callbacks,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    stop_issued: Arc<AtomicBool>,
    status: Arc<Mutex<WorkerStatus>>,
    consumer_tag: String,
}

impl Worker {
    pub fn new(adapter: impl BrokerAdapter + 'static, options: WorkerOptions) -> Self {
        Worker {
            adapter: Arc::new(adapter),
            options,
            callbacks: Callbacks::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            stop_issued: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(WorkerStatus::default())),
            consumer_tag: generate_consumer_tag(),
        }
    }

    pub fn on_error<F>(&mut self, callback: F)
    where
        F: Fn(&Error, Option<&Message>) + Send + Sync + 'static,
    {
        self.callbacks.set_on_error(callback);
    }

    pub fn on_retry<F>(&mut self, callback: F)
    where
        F: Fn(&Message, bool) + Send + Sync + 'static,
    {
        self.callbacks.set_on_retry(callback);
    }

    pub fn on_retry_exceeded<F>(&mut self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.callbacks.set_on_retry_exceeded(callback);
    }

    /// Starts consuming `queue` with `handler`.
    ///
    /// Validates options synchronously and refuses to start twice. With
    /// `fork_count > 0` the calling process becomes a supervisor: it forks
    /// the children and, unless `wait` is false, blocks until they exit.
    /// Otherwise the calling thread runs the process loop inline and blocks
    /// until the worker is stopped.
    pub fn start<F>(&self, queue: QueueSpec, handler: F) -> Result<()>
    where
        F: Fn(&Value, &mut MessageArgs) + Send + Sync + 'static,
    {
        self.options.validate()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Configuration(
                "worker is already running".to_string(),
            ));
        }
        self.shutdown.store(false, Ordering::SeqCst);
        self.stop_issued.store(false, Ordering::SeqCst);

        let result = self.run(queue, Arc::new(handler));
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Requests cooperative shutdown: flips the stop flag and releases the
    /// adapter. Threads observe the flag at the top of their next iteration;
    /// this call does not join them.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if !self.stop_issued.swap(true, Ordering::SeqCst) {
            self.adapter.stop();
        }
        info!(tag = %self.consumer_tag, "worker stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) && !self.shutdown.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.lock().clone()
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn fork_count(&self) -> u32 {
        self.options.fork_count
    }

    pub fn thread_count(&self) -> u32 {
        self.options.thread_count
    }

    pub fn sleep_seconds(&self) -> u64 {
        self.options.sleep_seconds
    }

    pub fn gc_flush_interval_seconds(&self) -> u64 {
        self.options.gc_flush_interval_seconds
    }

    pub fn queue_poll_wait_seconds(&self) -> u64 {
        self.options.queue_poll_wait_seconds
    }

    fn run(&self, queue: QueueSpec, handler: Handler) -> Result<()> {
        self.adapter.configure(&queue, &self.options)?;
        let ctx = Arc::new(WorkerContext::new(
            queue,
            self.options.clone(),
            self.callbacks.clone(),
            handler,
        ));

        if self.options.fork_count > 0 {
            self.fork_children(ctx)
        } else {
            self.start_process(ctx)
        }
    }

    #[cfg(unix)]
    fn fork_children(&self, ctx: Arc<WorkerContext>) -> Result<()> {
        use nix::sys::wait::waitpid;
        use nix::unistd::{fork, ForkResult};

        let mut children = Vec::with_capacity(self.options.fork_count as usize);
        for index in 0..self.options.fork_count {
            // Fork happens before any consumer thread exists in this process.
            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    let code = match self.start_process(ctx.clone()) {
                        Ok(()) => 0,
                        Err(error) => {
                            error!(%error, "worker process failed");
                            1
                        }
                    };
                    std::process::exit(code);
                }
                Ok(ForkResult::Parent { child }) => {
                    info!(pid = child.as_raw(), index, "forked worker process");
                    self.status.lock().processes.push(ProcessStatus {
                        pid: child.as_raw() as u32,
                        threads: Vec::new(),
                    });
                    children.push(child);
                }
                Err(errno) => {
                    return Err(Error::Io(std::io::Error::from_raw_os_error(errno as i32)));
                }
            }
        }

        if self.options.wait {
            for child in children {
                if let Err(errno) = waitpid(child, None) {
                    error!(pid = child.as_raw(), %errno, "failed to wait for worker process");
                }
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn fork_children(&self, _ctx: Arc<WorkerContext>) -> Result<()> {
        Err(Error::Configuration(
            "fork_count requires a unix target".to_string(),
        ))
    }

    fn start_process(&self, ctx: Arc<WorkerContext>) -> Result<()> {
        // Signal handlers only store to the shutdown flag; teardown runs on
        // the normal path once the loops observe it.
        let mut signal_ids = Vec::new();
        for signal in [SIGINT, SIGTERM] {
            let id = signal_hook::flag::register(signal, self.shutdown.clone())
                .map_err(Error::from)?;
            signal_ids.push(id);
        }

        let pid = std::process::id();
        info!(pid, tag = %self.consumer_tag, queue = %ctx.queue().name, "worker process starting");
        self.status.lock().processes.push(ProcessStatus {
            pid,
            threads: Vec::new(),
        });

        let result = self.run_process(&ctx, pid);

        for id in signal_ids {
            signal_hook::low_level::unregister(id);
        }

        // Covers stops initiated by a signal rather than `stop()`.
        if !self.stop_issued.swap(true, Ordering::SeqCst) {
            self.adapter.stop();
        }
        info!(pid, "worker process stopped");
        result
    }

    fn run_process(&self, ctx: &Arc<WorkerContext>, pid: u32) -> Result<()> {
        self.adapter.pre_process(ctx)?;

        let gc = Arc::new(GcPacer::new(self.options.gc_flush_interval_seconds));

        if self.options.thread_count == 0 {
            self.record_thread(pid, format!("{}-inline", self.consumer_tag));
            consume_loop(
                self.adapter.clone(),
                ctx.clone(),
                self.shutdown.clone(),
                gc,
            );
            return Ok(());
        }

        let mut handles = Vec::with_capacity(self.options.thread_count as usize);
        for index in 0..self.options.thread_count {
            let name = format!("{}-{}", self.consumer_tag, index);
            let adapter = self.adapter.clone();
            let thread_ctx = ctx.clone();
            let shutdown = self.shutdown.clone();
            let pacer = gc.clone();

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || consume_loop(adapter, thread_ctx, shutdown, pacer))
                .map_err(Error::from)?;
            self.record_thread(pid, name);
            handles.push(handle);
        }

        for handle in handles {
            if handle.join().is_err() {
                // The loop aborts the process on panic, so a panicked join
                // means the guard itself failed.
                error!("consumer thread terminated abnormally");
            }
        }
        Ok(())
    }

    fn record_thread(&self, pid: u32, name: String) {
        let mut status = self.status.lock();
        if let Some(process) = status.processes.iter_mut().rev().find(|p| p.pid == pid) {
            process.threads.push(name);
        }
    }
}

/// One consumer thread: fetch, pace the collection hint, idle-sleep on empty
/// polls, until the shutdown flag is observed. A panic escaping the adapter's
/// internal guards is fatal to the whole process, so an external supervisor
/// can respawn it.
fn consume_loop(
    adapter: Arc<dyn BrokerAdapter>,
    ctx: Arc<WorkerContext>,
    shutdown: Arc<AtomicBool>,
    gc: Arc<GcPacer>,
) {
    let idle_sleep = Duration::from_secs(ctx.options().sleep_seconds);

    while !shutdown.load(Ordering::Relaxed) {
        let iteration = catch_unwind(AssertUnwindSafe(|| {
            let received = adapter.fetch_and_process(&ctx);
            gc.flush();
            received
        }));

        match iteration {
            Ok(received) => {
                if !received && !idle_sleep.is_zero() && !shutdown.load(Ordering::Relaxed) {
                    thread::sleep(idle_sleep);
                }
            }
            Err(panic) => {
                let error = Error::Handler(format!(
                    "fatal worker thread error: {}",
                    panic_description(panic)
                ));
                error!(%error, "consumer loop panicked; aborting process");
                ctx.callbacks().emit_error(&error, None);
                std::process::abort();
            }
        }
    }
}

fn generate_consumer_tag() -> String {
    let hostname = gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown".to_string());
    let pid = std::process::id();
    let random = Uuid::new_v4().to_string()[..8].to_string();
    format!("{hostname}-{pid}-{random}")
}
