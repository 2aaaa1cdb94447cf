//! The isolated execution context: a current-thread tokio runtime plus a
//! `LocalSet`, built for exactly one work item on the worker thread that runs
//! it and closed before that worker returns.

use super::{
    config::Config,
    errors::BridgeError,
    result::BridgeResult,
};
use std::{
    any::Any,
    future::Future,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
    sync::Arc,
    time::Duration,
};
use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::{self, LocalSet},
};

/// Handle the work item receives to its own scheduler, in place of any
/// ambient "current loop".
///
/// `!Send`: it stays on the worker thread and cannot be returned out of the
/// invocation that created it.
#[derive(Debug, Clone)]
pub struct IsolatedContext {
    id: u64,
    worker: Arc<str>,
    handle: Handle,
    local: Weak<LocalSet>,
    _not_send: PhantomData<Rc<()>>,
}

impl IsolatedContext {
    fn new(id: u64, handle: Handle, local: Weak<LocalSet>) -> Self {
        let worker = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .into();
        Self {
            id,
            worker,
            handle,
            local,
            _not_send: PhantomData,
        }
    }

    /// Delegation id, unique within the owning pool.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn worker_name(&self) -> &str {
        &self.worker
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns a task on this context's `LocalSet`. The future need not be `Send`.
    pub fn spawn_local<F>(&self, fut: F) -> task::JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        match self.local.upgrade() {
            Some(local) => local.spawn_local(fut),
            // the set is being drained and is the one polling us
            None => task::spawn_local(fut),
        }
    }

    /// Sleeps on this context's timer driver.
    pub async fn sleep(&self, duration: Duration) {
        let sleep = {
            let _guard = self.handle.enter();
            tokio::time::sleep(duration)
        };
        sleep.await;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SchedulerSettings {
    pub drain_local_tasks: bool,
    pub shutdown_timeout: Duration,
    pub event_interval: u32,
    #[cfg(test)]
    pub fail_next_builds: Arc<std::sync::atomic::AtomicUsize>,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            drain_local_tasks: config.drain_local_tasks,
            shutdown_timeout: config.shutdown_timeout(),
            event_interval: config.event_interval,
            #[cfg(test)]
            fail_next_builds: Arc::default(),
        }
    }

    fn build(&self) -> std::io::Result<Runtime> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            if self
                .fail_next_builds
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(std::io::Error::other("injected runtime build failure"));
            }
        }
        Builder::new_current_thread()
            .enable_all()
            .event_interval(self.event_interval)
            .build()
    }
}

/// Builds a fresh scheduler, drives the work item on it and closes it.
///
/// Runs synchronously on the calling (worker) thread. The runtime is shut
/// down on every exit path, including a panicking work item.
pub(crate) fn run_isolated<T, F, Fut>(
    id: u64,
    settings: &SchedulerSettings,
    make_work: F,
) -> BridgeResult<T>
where
    F: FnOnce(IsolatedContext) -> Fut,
    Fut: Future<Output = T> + 'static,
{
    let runtime = settings.build().map_err(|e| {
        tracing::warn!(id, error = %e, "isolated scheduler failed to start");
        BridgeError::Scheduler(e.to_string())
    })?;
    let drain = settings.drain_local_tasks;
    let rt = &runtime;

    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        let local = Rc::new(LocalSet::new());
        let context = IsolatedContext::new(id, rt.handle().clone(), Rc::downgrade(&local));
        let value = local.block_on(rt, async move { make_work(context).await });
        if drain {
            // contexts only hold weak references, so this is the last strong one
            if let Ok(local) = Rc::try_unwrap(local) {
                rt.block_on(local);
            }
        }
        value
    }));

    runtime.shutdown_timeout(settings.shutdown_timeout);

    outcome.map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::warn!(id, %message, "work item panicked");
        BridgeError::Panic(message)
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
