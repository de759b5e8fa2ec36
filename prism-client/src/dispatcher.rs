//! Call dispatcher.
//!
//! By default the client owns a multi-threaded tokio runtime whose blocking
//! pool grows on demand and reclaims threads after an idle timeout, so an
//! enqueued call is either picked up by an idle worker or gets a new one.
//! A dispatcher can also borrow the caller's runtime through its handle.

use prism_core::{ConfigError, PrismResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Thread name used by the owned runtime.
pub const DISPATCHER_THREAD_NAME: &str = "prism-dispatcher";

/// Default idle timeout before a dispatcher thread is reclaimed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        // Shutting down in the background is the only way that is legal
        // from inside another runtime.
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Runs calls concurrently, off the caller's thread.
#[derive(Clone)]
pub struct Dispatcher {
    handle: Handle,
    owned: Option<Arc<OwnedRuntime>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("owns_runtime", &self.owned.is_some())
            .finish()
    }
}

impl Dispatcher {
    /// Build a dispatcher owning its runtime.
    pub fn new(idle_timeout: Duration) -> PrismResult<Self> {
        let runtime = Builder::new_multi_thread()
            .thread_name(DISPATCHER_THREAD_NAME)
            .thread_keep_alive(idle_timeout)
            .enable_all()
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "dispatcher".to_string(),
                value: format!("idle_timeout={:?}", idle_timeout),
                reason: e.to_string(),
            })?;
        tracing::debug!(idle_timeout_secs = idle_timeout.as_secs(), "Dispatcher runtime started");
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    /// Dispatch onto an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Dispatch onto the runtime this is called from, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn owns_runtime(&self) -> bool {
        self.owned.is_some()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run a closure on the blocking pool.
    pub fn spawn_blocking<F, R>(&self, work: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(work)
    }

    /// Drive `future` to completion from synchronous code.
    ///
    /// Must not be called from within an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}
