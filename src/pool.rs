use super::{
    config::Config,
    errors::BridgeError,
    handle::{
        Job,
        JoinHandle,
    },
    isolated::{
        self,
        IsolatedContext,
        SchedulerSettings,
    },
    model::{
        JoinOrdering,
        PoolMetrics,
    },
    result::BridgeResult,
};
use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use futures::{
    future,
    stream::{FuturesUnordered, StreamExt},
};
use tokio::{
    sync::{oneshot, Notify},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

pub type BridgePool = Arc<BridgePoolInner>;

/// Counters shared between the pool and its worker threads.
#[derive(Default)]
struct Shared {
    active: AtomicUsize,
    live_workers: AtomicUsize,
    idle_workers: AtomicUsize,
    queued: AtomicUsize,
    total_spawned: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    rejected: AtomicUsize,
    all_settled: Notify,
}

impl Shared {
    fn settle(&self, ok: bool) {
        if ok {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.release();
    }

    fn release(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.all_settled.notify_waiters();
        }
    }
}

/// Settles one admitted delegation when dropped, so the pool's counters stay
/// right even if publishing the outcome unwinds.
struct SettleGuard {
    shared: Arc<Shared>,
    id: u64,
    ok: bool,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        tracing::debug!(id = self.id, ok = self.ok, "delegation settled");
        self.shared.settle(self.ok);
    }
}

/// Pool of OS threads, each running one isolated scheduler per delegation.
///
/// The outer caller only awaits a oneshot receiver, so any executor can
/// drive the returned handles.
pub struct BridgePoolInner {
    // None once the pool is shut down
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    shared: Arc<Shared>,
    shutdown_token: CancellationToken,
    next_id: AtomicU64,
    settings: SchedulerSettings,
    config: Config,
}

impl BridgePoolInner {
    pub fn new(num_threads: usize, max_pending: Option<usize>) -> BridgeResult<BridgePool> {
        let config = Config {
            num_threads,
            max_pending,
            ..Default::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> BridgeResult<BridgePool> {
        config
            .validate()
            .map_err(|e| BridgeError::InvalidConfig(e.to_string()))?;

        let (sender, receiver) = match config.max_pending {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        let shared = Arc::new(Shared::default());
        let mut workers = Vec::with_capacity(config.num_threads);

        for index in 0..config.num_threads {
            let receiver = receiver.clone();
            let shared_clone = shared.clone();
            shared.live_workers.fetch_add(1, Ordering::Relaxed);
            shared.idle_workers.fetch_add(1, Ordering::Relaxed);
            let worker = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || worker_loop(receiver, shared_clone))
                .map_err(|e| {
                    shared.live_workers.fetch_sub(1, Ordering::Relaxed);
                    shared.idle_workers.fetch_sub(1, Ordering::Relaxed);
                    BridgeError::ResourceUnavailable(format!("failed to spawn worker {index}: {e}"))
                })?;
            workers.push(worker);
        }

        tracing::info!(
            num_threads = config.num_threads,
            max_pending = ?config.max_pending,
            thread_name = %config.thread_name,
            "bridge pool started"
        );

        Ok(Arc::new(BridgePoolInner {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            shared,
            shutdown_token: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            settings: SchedulerSettings::from_config(&config),
            config,
        }))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Delegates a zero-argument work item to a fresh isolated scheduler.
    pub fn spawn<T, F, Fut>(&self, work: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        self.spawn_with_context(move |_| work())
    }

    /// Like [`spawn`](Self::spawn), but hands the work item its
    /// [`IsolatedContext`]. The future is built on the worker thread and may
    /// be `!Send`.
    pub fn spawn_with_context<T, F, Fut>(&self, make_work: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(IsolatedContext) -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Admission holds the sender lock, so shutdown either sees this
        // delegation in `active` or we see the pool closed.
        let slot = self.sender.lock();
        self.shared.active.fetch_add(1, Ordering::SeqCst);
        let Some(sender) = slot.as_ref() else {
            return self.reject(id, "pool is shut down");
        };

        let (tx, rx) = oneshot::channel::<BridgeResult<T>>();
        let settled = Arc::new(AtomicBool::new(false));
        let settled_clone = settled.clone();
        let shared = self.shared.clone();
        let settings = self.settings.clone();

        let job: Job = Box::new(move || {
            let mut guard = SettleGuard { shared, id, ok: false };
            let result = isolated::run_isolated(id, &settings, make_work);
            guard.ok = result.is_ok();
            settled_clone.store(true, Ordering::Release);
            // an unclaimed outcome is dropped here, possibly unwinding
            let _ = tx.send(result);
        });

        self.shared.queued.fetch_add(1, Ordering::Relaxed);
        match sender.try_send(job) {
            Ok(()) => {
                self.shared.total_spawned.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(id, "delegation admitted");
                JoinHandle::new(id, settled, rx)
            }
            Err(err) => {
                self.shared.queued.fetch_sub(1, Ordering::Relaxed);
                let reason = match err {
                    TrySendError::Full(_) => "submission queue is full",
                    TrySendError::Disconnected(_) => "no worker threads left",
                };
                self.reject(id, reason)
            }
        }
    }

    pub async fn run<T, F, Fut>(&self, work: F) -> BridgeResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        self.spawn(work).await
    }

    /// Runs a fallible work item and returns its own error unchanged. Bridge
    /// failures are converted into `E`.
    pub async fn try_run<T, E, F, Fut>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<BridgeError> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
    {
        self.spawn(work).await.map_err(E::from)?
    }

    pub async fn join_handles<T>(
        &self,
        handles: Vec<JoinHandle<T>>,
        ordering: JoinOrdering,
    ) -> Vec<BridgeResult<T>> {
        if handles.is_empty() {
            return Vec::new();
        }

        match ordering {
            JoinOrdering::Ordered => future::join_all(handles).await,
            JoinOrdering::UnOrdered => {
                FuturesUnordered::from_iter(handles).collect::<Vec<_>>().await
            }
        }
    }

    fn reject<T>(&self, id: u64, reason: &str) -> JoinHandle<T> {
        self.shared.rejected.fetch_add(1, Ordering::Relaxed);
        self.shared.release();
        tracing::warn!(id, reason, "delegation rejected");
        JoinHandle::failed(id, BridgeError::ResourceUnavailable(reason.to_string()))
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            num_threads: self.config.num_threads,
            live_workers: self.shared.live_workers.load(Ordering::Relaxed),
            active_tasks: self.shared.active.load(Ordering::Relaxed),
            idle_workers: self.shared.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.shared.queued.load(Ordering::Relaxed),
            total_spawned: self.shared.total_spawned.load(Ordering::Relaxed),
            completed_tasks: self.shared.completed.load(Ordering::Relaxed),
            failed_tasks: self.shared.failed.load(Ordering::Relaxed),
            rejected_tasks: self.shared.rejected.load(Ordering::Relaxed),
        }
    }

    /// Waits until no admitted delegation is still in flight.
    pub async fn join_all(&self) {
        loop {
            let notified = self.shared.all_settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn join_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join_all()).await.is_ok()
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stops admitting work, waits for everything already admitted, then
    /// joins the worker threads. Needs a tokio runtime.
    pub async fn shutdown(&self) {
        self.close();
        self.join_all().await;
        self.shutdown_token.cancel();
        self.join_workers().await;
        tracing::info!("bridge pool shut down");
    }

    /// Like [`shutdown`](Self::shutdown), giving up on in-flight work after
    /// `timeout`. Workers are only joined when everything settled in time.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.close();
        let drained = self.join_all_timeout(timeout).await;
        self.shutdown_token.cancel();
        if drained {
            self.join_workers().await;
        } else {
            tracing::warn!(
                ?timeout,
                active = self.shared.active.load(Ordering::Relaxed),
                "shutdown timed out with work in flight"
            );
        }
        drained
    }

    fn close(&self) {
        // dropping the only sender lets workers exit once the queue is empty
        if self.sender.lock().take().is_some() {
            tracing::info!("bridge pool closed to new work");
        }
    }

    async fn join_workers(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        let count = workers.len();
        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .map(thread::JoinHandle::join)
                .filter(Result::is_err)
                .count()
        })
        .await;

        match joined {
            Ok(0) => tracing::debug!(count, "worker threads joined"),
            Ok(panicked) => tracing::warn!(count, panicked, "worker threads exited by panic"),
            Err(e) => tracing::warn!(error = %e, "failed to join worker threads"),
        }
    }

    /// Calls `callback` with fresh metrics every `interval` on the current
    /// tokio runtime. Stops on `token.cancel()` or pool shutdown.
    pub fn start_monitoring<F>(self: &Arc<Self>, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let pool_shutdown = self.shutdown_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(pool.metrics());
                    }
                    _ = token_clone.cancelled() => break,
                    _ = pool_shutdown.cancelled() => break,
                }
            }
            drop(pool);
        });

        token
    }

    pub fn stop_monitoring(token: CancellationToken) {
        token.cancel();
    }
}

fn worker_loop(receiver: Receiver<Job>, shared: Arc<Shared>) {
    // Exits once the pool is closed or dropped and the queue is drained.
    while let Ok(job) = receiver.recv() {
        shared.queued.fetch_sub(1, Ordering::Relaxed);
        shared.idle_workers.fetch_sub(1, Ordering::Relaxed);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::warn!(
                message = %isolated::panic_message(payload.as_ref()),
                "panic outside the isolated scheduler; worker keeps running"
            );
        }
        shared.idle_workers.fetch_add(1, Ordering::Relaxed);
    }
    shared.idle_workers.fetch_sub(1, Ordering::Relaxed);
    shared.live_workers.fetch_sub(1, Ordering::Relaxed);
    tracing::trace!(worker = ?thread::current().name(), "worker exiting");
}
