//! Single-consumer task queue with retry-by-sentinel and expiry.
//!
//! The on-chain protocol is sequential per issuer key, so all work funnels
//! through one worker: at most one task executes at any instant and the
//! execution order equals the enqueue order modulo re-enqueues. A task that
//! fails with its retry sentinel goes back to the tail; a task past its
//! expiration window is dropped without a callback.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{ErrorKind, IssuerError};

/// How long a task may sit in the queue, including retries.
pub const TASK_EXPIRATION_TIME: Duration = Duration::from_secs(4 * 60 * 60);

/// Default channel capacity. A full channel blocks `add`, which is the
/// intended backpressure.
pub const DEFAULT_CAPACITY: usize = 100;

/// What the queue sees of a task, with its payload type erased.
#[async_trait]
pub trait AnyTask: Send + Sync {
    async fn execute(&self) -> Result<(), IssuerError>;
    fn should_retry(&self, err: &IssuerError) -> bool;
    fn is_expired(&self) -> bool;
}

type ExecuteFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, IssuerError>> + Send + Sync>;
type CallbackFn<T> = Box<dyn Fn(Result<T, IssuerError>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A unit of work: an execute body, a completion callback and an optional
/// retry sentinel. The callback is invoked from inside `execute`, so the
/// queue never learns the payload type.
pub struct Task<T> {
    execute: ExecuteFn<T>,
    callback: CallbackFn<T>,
    retry_on: Option<ErrorKind>,
    created_at: Instant,
    ttl: Duration,
}

impl<T: Send + 'static> Task<T> {
    pub fn new(execute: ExecuteFn<T>, callback: CallbackFn<T>, retry_on: Option<ErrorKind>) -> Self {
        Self {
            execute,
            callback,
            retry_on,
            created_at: Instant::now(),
            ttl: TASK_EXPIRATION_TIME,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> AnyTask for Task<T> {
    async fn execute(&self) -> Result<(), IssuerError> {
        if self.is_expired() {
            return Err(IssuerError::TaskExpired);
        }

        let result = match AssertUnwindSafe((self.execute)()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(IssuerError::PanicInTask(panic_message(panic.as_ref()))),
        };

        let outcome = result.as_ref().err().cloned();
        (self.callback)(result).await;

        match outcome {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn should_retry(&self, err: &IssuerError) -> bool {
        self.retry_on == Some(err.kind())
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The single-consumer queue. Cheap to share; all state lives behind the
/// channel and atomics.
pub struct TaskQueue {
    tx: mpsc::Sender<Box<dyn AnyTask>>,
    inflight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl TaskQueue {
    /// Create a queue and spawn its worker.
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<Box<dyn AnyTask>>(capacity);
        let inflight = Arc::new(AtomicUsize::new(0));

        let worker_tx = tx.clone();
        let worker_inflight = inflight.clone();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                process_task(task, &worker_tx, &worker_inflight).await;
            }
        });

        Arc::new(Self {
            tx,
            inflight,
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue a task at the tail. Blocks when the channel is full.
    pub async fn add(&self, task: Box<dyn AnyTask>) -> Result<(), IssuerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IssuerError::QueueClosed);
        }
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(task).await.is_err() {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            return Err(IssuerError::QueueClosed);
        }
        Ok(())
    }

    /// Block until the in-flight count reaches zero.
    pub async fn wait(&self) {
        while self.inflight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Refuse new work, then drain.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wait().await;
    }
}

async fn process_task(
    task: Box<dyn AnyTask>,
    tx: &mpsc::Sender<Box<dyn AnyTask>>,
    inflight: &AtomicUsize,
) {
    if task.is_expired() {
        inflight.fetch_sub(1, Ordering::SeqCst);
        return;
    }

    if let Err(err) = task.execute().await {
        if err.kind() == ErrorKind::TaskExpired {
            inflight.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        if task.should_retry(&err) {
            // Back to the tail; the in-flight count covers the re-enqueue
            // before this execution is accounted done.
            inflight.fetch_add(1, Ordering::SeqCst);
            if tx.send(task).await.is_err() {
                inflight.fetch_sub(1, Ordering::SeqCst);
                warn!("task queue channel closed while re-enqueueing");
            }
        }
    }

    inflight.fetch_sub(1, Ordering::SeqCst);
}
