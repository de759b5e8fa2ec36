//! Per-call execution pipeline.
//!
//! A [`Call`] walks a fixed state machine:
//!
//! ```text
//! Created -> PolicyResolved -> [CacheLookup] -> [NetworkFetch -> Parse
//!         -> Normalize -> StoreWrite -> Publish] -> Delivered
//! ```
//!
//! `Cancelled` is reachable from every non-terminal state and `Failed` ends
//! a call with exactly one error. Once cancelled, no later state is entered:
//! an in-flight transport future is dropped, the write transaction refuses to
//! commit and nothing is delivered.

use parking_lot::Mutex;
use prism_core::{
    CachePolicy, Operation, OperationKind, PrismError, PrismResult, Response, ResponseFieldMapper,
    ResponseReader, ResponseSource, TransportCachePolicy, TransportError,
};
use prism_storage::{FetchedBytes, NormalizedCacheExt, WriteableCache};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::client::ClientInner;
use crate::serializer::{encode_request, parse_response};
use crate::transport::TransportRequest;

// ============================================================================
// STATE MACHINE
// ============================================================================

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Created,
    PolicyResolved,
    CacheLookup,
    NetworkFetch,
    Parse,
    Normalize,
    StoreWrite,
    Publish,
    Delivered,
    Failed,
    Cancelled,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PolicyResolved => "POLICY_RESOLVED",
            Self::CacheLookup => "CACHE_LOOKUP",
            Self::NetworkFetch => "NETWORK_FETCH",
            Self::Parse => "PARSE",
            Self::Normalize => "NORMALIZE",
            Self::StoreWrite => "STORE_WRITE",
            Self::Publish => "PUBLISH",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct CallShared {
    state: Mutex<CallState>,
    cancelled: watch::Sender<bool>,
}

impl CallShared {
    fn new() -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            state: Mutex::new(CallState::Created),
            cancelled,
        }
    }

    fn state(&self) -> CallState {
        *self.state.lock()
    }

    fn is_cancelled(&self) -> bool {
        self.state() == CallState::Cancelled
    }

    /// Move to `next` unless the call has been cancelled.
    fn advance(&self, next: CallState) -> PrismResult<()> {
        let mut state = self.state.lock();
        if *state == CallState::Cancelled {
            return Err(PrismError::Cancelled);
        }
        tracing::trace!(from = %*state, to = %next, "Call state transition");
        *state = next;
        Ok(())
    }

    fn cancel(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = CallState::Cancelled;
        }
        self.cancelled.send_replace(true);
        true
    }

    /// Enter the terminal state matching `result`.
    ///
    /// A call cancelled before this point reports `Cancelled` whatever the
    /// pipeline produced.
    fn settle<T>(&self, result: PrismResult<T>) -> PrismResult<T> {
        let mut state = self.state.lock();
        if *state == CallState::Cancelled {
            return Err(PrismError::Cancelled);
        }
        *state = match &result {
            Ok(_) => CallState::Delivered,
            Err(PrismError::Cancelled) => CallState::Cancelled,
            Err(_) => CallState::Failed,
        };
        result
    }
}

async fn wait_cancelled(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Cancels a call from any thread.
#[derive(Clone)]
pub struct CallCanceller {
    shared: Arc<CallShared>,
}

impl CallCanceller {
    /// Cancel the call. Returns `false` if it had already finished.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        if cancelled {
            tracing::debug!("Call cancelled");
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    pub fn state(&self) -> CallState {
        self.shared.state()
    }
}

impl fmt::Debug for CallCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallCanceller")
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// CALL
// ============================================================================

/// One execution of an operation against a client.
pub struct Call<O: Operation> {
    inner: Arc<ClientInner>,
    operation: Arc<O>,
    cache_policy: CachePolicy,
    transport_cache_policy: TransportCachePolicy,
    shared: Arc<CallShared>,
    id: Uuid,
}

impl<O: Operation> fmt::Debug for Call<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("operation", &self.operation.name())
            .field("cache_policy", &self.cache_policy)
            .field("transport_cache_policy", &self.transport_cache_policy)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl<O: Operation> Call<O> {
    pub(crate) fn new(inner: Arc<ClientInner>, operation: Arc<O>) -> Self {
        // Mutations always reach the server unless a policy is set explicitly.
        let (cache_policy, transport_cache_policy) = match operation.kind() {
            OperationKind::Query => (
                inner.default_cache_policy,
                inner.default_transport_cache_policy,
            ),
            OperationKind::Mutation => {
                (CachePolicy::NetworkOnly, TransportCachePolicy::NetworkOnly)
            }
        };
        Self {
            inner,
            operation,
            cache_policy,
            transport_cache_policy,
            shared: Arc::new(CallShared::new()),
            id: Uuid::now_v7(),
        }
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn transport_cache_policy(mut self, policy: TransportCachePolicy) -> Self {
        self.transport_cache_policy = policy;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CallState {
        self.shared.state()
    }

    /// Handle for cancelling this call once it has been handed off.
    pub fn canceller(&self) -> CallCanceller {
        CallCanceller {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the call to its terminal state.
    pub async fn execute(self) -> PrismResult<Response<O::Data>> {
        let span = tracing::debug_span!(
            "prism_call",
            operation = %self.operation.name(),
            call_id = %self.id,
            cache_policy = %self.cache_policy,
        );
        async move {
            let result = self.run().await;
            let result = self.shared.settle(result);
            match &result {
                Ok(response) => tracing::debug!(
                    source = ?response.source,
                    errors = response.errors.len(),
                    "Call delivered"
                ),
                Err(PrismError::Cancelled) => tracing::debug!("Call ended cancelled"),
                Err(e) => tracing::debug!(error = %e, kind = ?e.kind(), "Call failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run the call on the dispatcher and hand its outcome to `callback`.
    ///
    /// A cancelled call never invokes `callback`.
    pub fn enqueue<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(PrismResult<Response<O::Data>>) + Send + 'static,
    {
        let dispatcher = self.inner.dispatcher.clone();
        dispatcher.spawn(async move {
            match self.execute().await {
                Err(PrismError::Cancelled) => {}
                result => callback(result),
            }
        })
    }

    /// Run the call to completion from synchronous code.
    ///
    /// Must not be called from within an async context.
    pub fn execute_blocking(self) -> PrismResult<Response<O::Data>> {
        let dispatcher = self.inner.dispatcher.clone();
        dispatcher.block_on(self.execute())
    }

    async fn run(&self) -> PrismResult<Response<O::Data>> {
        self.shared.advance(CallState::PolicyResolved)?;
        let mapper = self.inner.mappers.get(self.operation.as_ref());

        if self.cache_policy.reads_cache() {
            self.shared.advance(CallState::CacheLookup)?;
            match self
                .inner
                .read_from_cache_with(self.operation.as_ref(), mapper.as_ref())
            {
                Ok(response) => {
                    tracing::debug!(keys = response.dependent_keys.len(), "Normalized cache hit");
                    return Ok(response);
                }
                Err(e) if self.cache_policy.allows_network() => {
                    tracing::debug!(error = %e, "Normalized cache miss, falling through to network");
                }
                Err(e) => return Err(e),
            }
        }

        self.shared.advance(CallState::NetworkFetch)?;
        let fetched = self.fetch().await?;
        self.deliver_network(fetched, mapper.as_ref())
    }

    async fn fetch(&self) -> PrismResult<FetchedBytes> {
        let encoded = encode_request(self.operation.as_ref());
        let request = TransportRequest {
            server_url: self.inner.server_url.clone(),
            operation_name: self.operation.name().to_string(),
            signature: encoded.signature,
            body: encoded.body,
            cache_policy: self.transport_cache_policy,
        };

        let transport = &self.inner.transport;
        let fetch = async {
            match &self.inner.http_cache {
                Some(http_cache) => {
                    http_cache
                        .fetch(&request.signature, request.cache_policy, || {
                            transport.execute(&request)
                        })
                        .await
                }
                None if request.cache_policy == TransportCachePolicy::CacheOnly => {
                    Err(TransportError::NotCached {
                        signature: request.signature.clone(),
                    })
                }
                None => transport.execute(&request).await.map(|body| FetchedBytes {
                    body,
                    from_cache: false,
                }),
            }
        };

        let cancelled = wait_cancelled(self.shared.cancelled.subscribe());
        let result = tokio::select! {
            biased;
            _ = cancelled => return Err(PrismError::Cancelled),
            result = fetch => result,
        };

        result.map_err(|e| match e {
            TransportError::Cancelled => PrismError::Cancelled,
            TransportError::NotCached { signature } => PrismError::PolicyViolation {
                policy: TransportCachePolicy::CacheOnly.to_string(),
                reason: format!("no cached response for request {}", signature),
            },
            other => PrismError::Transport(other),
        })
    }

    fn deliver_network(
        &self,
        fetched: FetchedBytes,
        mapper: &dyn ResponseFieldMapper<O::Data>,
    ) -> PrismResult<Response<O::Data>> {
        let source = if fetched.from_cache {
            ResponseSource::Cache
        } else {
            ResponseSource::Network
        };

        self.shared.advance(CallState::Parse)?;
        let parsed = parse_response(&fetched.body)?;

        let Some(data) = parsed.data else {
            return Ok(Response {
                data: None,
                errors: parsed.errors,
                source,
                dependent_keys: Default::default(),
            });
        };

        if !parsed.errors.is_empty() {
            tracing::debug!(
                errors = parsed.errors.len(),
                "Response carries errors, skipping normalization"
            );
            let mapped = mapper.map(&ResponseReader::new(&data, &self.inner.adapters))?;
            return Ok(Response {
                data: Some(mapped),
                errors: parsed.errors,
                source,
                dependent_keys: Default::default(),
            });
        }

        let cache = &self.inner.cache;
        let root_key = self.operation.kind().root_key();
        let variables = self.operation.variables();
        let shared = &self.shared;
        let (dependent_keys, changed) = cache.write_transaction(|tx: &mut dyn WriteableCache| {
            shared.advance(CallState::Normalize)?;
            let records = cache.network_response_normalizer().normalize(
                root_key,
                &data,
                self.operation.selections(),
                &variables,
            )?;
            let keys = records.keys();
            shared.advance(CallState::StoreWrite)?;
            tx.merge_all(records)?;
            Ok(keys)
        })?;
        self.shared.advance(CallState::Publish)?;
        tracing::debug!(
            records = dependent_keys.len(),
            changed = changed.len(),
            "Response normalized and committed"
        );

        let mapped = mapper.map(&ResponseReader::new(&data, &self.inner.adapters))?;
        Ok(Response {
            data: Some(mapped),
            errors: Vec::new(),
            source,
            dependent_keys,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
