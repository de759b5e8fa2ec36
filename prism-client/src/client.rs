//! Client and its validated builder.

use prism_core::{
    CacheKeyResolver, CachePolicy, ConfigError, CustomTypeAdapter, JsonObject, NoKeyResolver,
    Operation, PrismResult, Response, ResponseFieldMapper, ResponseReader, ResponseSource,
    ScalarType,
    ScalarTypeAdapters, TransportCachePolicy,
};
use prism_storage::{
    Denormalized, EvictionStrategy, ExpireAfterWrite, HttpCache, HttpCacheRead,
    InMemoryResponseCacheStore, NeverExpire, NoOpCache, NormalizedCache, NormalizedCacheExt,
    ReadableCache, RealCache, RecordStore, ResponseCacheStore, WriteableCache,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::call::Call;
use crate::config::ClientSettings;
use crate::dispatcher::{Dispatcher, DEFAULT_IDLE_TIMEOUT};
use crate::mapper_pool::ResponseMapperPool;
use crate::serializer::encode_request;
use crate::transport::{ReqwestTransport, Transport, TransportRequest};
use crate::watcher::Watcher;

// ============================================================================
// SHARED STATE
// ============================================================================

pub(crate) struct ClientInner {
    pub(crate) server_url: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) http_cache: Option<HttpCache>,
    pub(crate) cache: Arc<dyn NormalizedCache>,
    pub(crate) adapters: ScalarTypeAdapters,
    pub(crate) mappers: ResponseMapperPool,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) default_cache_policy: CachePolicy,
    pub(crate) default_transport_cache_policy: TransportCachePolicy,
}

impl ClientInner {
    /// Rebuild the operation's tree from the normalized cache.
    pub(crate) fn denormalize<O: Operation>(&self, operation: &O) -> PrismResult<Denormalized> {
        let root_key = operation.kind().root_key();
        let variables = operation.variables();
        let cache = &self.cache;
        cache.read_transaction(|view: &dyn ReadableCache| {
            cache.cache_response_normalizer().denormalize(
                view,
                root_key,
                operation.selections(),
                &variables,
            )
        })
    }

    pub(crate) fn map_tree<O: Operation>(
        &self,
        operation: &O,
        tree: &JsonObject,
    ) -> PrismResult<O::Data> {
        let mapper = self.mappers.get(operation);
        Ok(mapper.map(&ResponseReader::new(tree, &self.adapters))?)
    }

    pub(crate) fn read_from_cache<O: Operation>(
        &self,
        operation: &O,
    ) -> PrismResult<Response<O::Data>> {
        let mapper = self.mappers.get(operation);
        self.read_from_cache_with(operation, mapper.as_ref())
    }

    /// Cache read with an already resolved mapper.
    pub(crate) fn read_from_cache_with<O: Operation>(
        &self,
        operation: &O,
        mapper: &dyn ResponseFieldMapper<O::Data>,
    ) -> PrismResult<Response<O::Data>> {
        let denormalized = self.denormalize(operation)?;
        let data = mapper.map(&ResponseReader::new(&denormalized.data, &self.adapters))?;
        Ok(Response {
            data: Some(data),
            errors: Vec::new(),
            source: ResponseSource::Cache,
            dependent_keys: denormalized.dependent_keys,
        })
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Entry point for executing operations.
///
/// Cloning is cheap; clones share caches, mapper pool and dispatcher.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("server_url", &self.inner.server_url)
            .field("http_cache", &self.inner.http_cache.is_some())
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }

    pub fn normalized_cache(&self) -> &Arc<dyn NormalizedCache> {
        &self.inner.cache
    }

    pub fn http_cache(&self) -> Option<&HttpCache> {
        self.inner.http_cache.as_ref()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn scalar_type_adapters(&self) -> &ScalarTypeAdapters {
        &self.inner.adapters
    }

    pub fn response_mapper_pool(&self) -> &ResponseMapperPool {
        &self.inner.mappers
    }

    /// Prepare a call of `operation` with the client's default policies.
    pub fn query<O: Operation>(&self, operation: O) -> Call<O> {
        Call::new(Arc::clone(&self.inner), Arc::new(operation))
    }

    /// Prepare a mutation call. Results are normalized under the mutation root.
    ///
    /// Mutations default to [`CachePolicy::NetworkOnly`] for both caches, so
    /// repeating one always reaches the server.
    pub fn mutate<O: Operation>(&self, operation: O) -> Call<O> {
        self.query(operation)
    }

    /// Request signature of `operation`, the key of its transport cache entry.
    pub fn signature_of<O: Operation + ?Sized>(&self, operation: &O) -> String {
        encode_request(operation).signature
    }

    /// Fetch `operation` and store its raw response in the transport cache
    /// without touching the normalized cache.
    pub async fn prefetch<O: Operation + ?Sized>(&self, operation: &O) -> PrismResult<()> {
        let http_cache = self
            .inner
            .http_cache
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "http_cache_store".to_string(),
            })?;
        let encoded = encode_request(operation);
        let request = TransportRequest {
            server_url: self.inner.server_url.clone(),
            operation_name: operation.name().to_string(),
            signature: encoded.signature,
            body: encoded.body,
            cache_policy: TransportCachePolicy::NetworkOnly,
        };
        let transport = &self.inner.transport;
        let fetched = http_cache
            .fetch(&request.signature, request.cache_policy, || {
                transport.execute(&request)
            })
            .await?;
        tracing::debug!(
            operation = %request.operation_name,
            signature = %request.signature,
            bytes = fetched.body.len(),
            "Prefetched response"
        );
        Ok(())
    }

    /// Remove every record from the normalized cache.
    pub fn clear_normalized_cache(&self) -> PrismResult<()> {
        self.inner.cache.clear_all()
    }

    /// Drop every cached response, returning how many were removed.
    pub async fn clear_http_cache(&self) -> u64 {
        match &self.inner.http_cache {
            Some(http_cache) => http_cache.clear().await,
            None => 0,
        }
    }

    /// Cached response bytes for a request signature.
    pub async fn cached_http_response(&self, signature: &str) -> Option<HttpCacheRead> {
        match &self.inner.http_cache {
            Some(http_cache) => http_cache.read(signature).await,
            None => None,
        }
    }

    /// Read `operation` from the normalized cache only.
    pub fn read_cached<O: Operation>(&self, operation: &O) -> PrismResult<Response<O::Data>> {
        self.inner.read_from_cache(operation)
    }

    /// Write a locally built tree for `operation` into the normalized cache.
    ///
    /// Fields absent from `data` are left as stored. Returns the committed
    /// change set, which has already been published.
    pub fn write_cached<O: Operation + ?Sized>(
        &self,
        operation: &O,
        data: &JsonObject,
    ) -> PrismResult<BTreeSet<String>> {
        let root_key = operation.kind().root_key();
        let variables = operation.variables();
        let cache = &self.inner.cache;
        let ((), changed) = cache.write_transaction(|tx: &mut dyn WriteableCache| {
            let records = cache.cache_response_normalizer().normalize(
                root_key,
                data,
                operation.selections(),
                &variables,
            )?;
            tx.merge_all(records)?;
            Ok(())
        })?;
        tracing::debug!(
            operation = %operation.name(),
            changed = changed.len(),
            "Local write committed"
        );
        Ok(changed)
    }

    /// Re-read `operation` from the cache whenever records it was built from
    /// change, handing each new result to `callback`.
    ///
    /// Dropping the returned [`Watcher`] stops delivery.
    pub fn watch<O, F>(&self, operation: O, callback: F) -> Watcher
    where
        O: Operation,
        F: Fn(Response<O::Data>) + Send + Sync + 'static,
    {
        Watcher::register(&self.inner, Arc::new(operation), callback)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Collects client configuration; [`ClientBuilder::build`] validates it.
pub struct ClientBuilder {
    server_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    http_cache_store: Option<Arc<dyn ResponseCacheStore>>,
    eviction: Option<Arc<dyn EvictionStrategy>>,
    record_store: Option<Arc<dyn RecordStore>>,
    resolver: Option<Arc<dyn CacheKeyResolver>>,
    adapters: ScalarTypeAdapters,
    dispatcher: Option<Dispatcher>,
    dispatcher_idle_timeout: Duration,
    cache_policy: CachePolicy,
    transport_cache_policy: TransportCachePolicy,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            server_url: None,
            transport: None,
            http_cache_store: None,
            eviction: None,
            record_store: None,
            resolver: None,
            adapters: ScalarTypeAdapters::new(),
            dispatcher: None,
            dispatcher_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            cache_policy: CachePolicy::default(),
            transport_cache_policy: TransportCachePolicy::default(),
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("server_url", &self.server_url)
            .field("transport", &self.transport.is_some())
            .field("http_cache_store", &self.http_cache_store.is_some())
            .field("eviction", &self.eviction)
            .field("record_store", &self.record_store.is_some())
            .field("resolver", &self.resolver.is_some())
            .field("adapters", &self.adapters)
            .field("cache_policy", &self.cache_policy)
            .field("transport_cache_policy", &self.transport_cache_policy)
            .finish()
    }
}

impl ClientBuilder {
    /// Start from environment-derived settings.
    ///
    /// Sets the server URL when present, both default policies, the
    /// dispatcher idle timeout, and an in-memory transport cache when
    /// `http_cache_max_entries` is set.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let mut builder = Self {
            server_url: settings.server_url.clone(),
            dispatcher_idle_timeout: settings.dispatcher_idle_timeout,
            cache_policy: settings.cache_policy,
            transport_cache_policy: settings.transport_cache_policy,
            ..Self::default()
        };
        if let Some(max_entries) = settings.http_cache_max_entries {
            let eviction: Arc<dyn EvictionStrategy> = match settings.http_cache_max_age {
                Some(max_age) => Arc::new(ExpireAfterWrite::new(max_age)),
                None => Arc::new(NeverExpire),
            };
            builder = builder.http_cache(
                Arc::new(InMemoryResponseCacheStore::new(max_entries)),
                eviction,
            );
        }
        builder
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use HTTP over an existing reqwest client.
    pub fn reqwest_client(self, client: reqwest::Client) -> Self {
        self.transport(Arc::new(ReqwestTransport::from_client(client)))
    }

    /// Enable the transport-level response cache.
    pub fn http_cache(
        mut self,
        store: Arc<dyn ResponseCacheStore>,
        eviction: Arc<dyn EvictionStrategy>,
    ) -> Self {
        self.http_cache_store = Some(store);
        self.eviction = Some(eviction);
        self
    }

    pub fn http_cache_store(mut self, store: Arc<dyn ResponseCacheStore>) -> Self {
        self.http_cache_store = Some(store);
        self
    }

    pub fn eviction_strategy(mut self, eviction: Arc<dyn EvictionStrategy>) -> Self {
        self.eviction = Some(eviction);
        self
    }

    /// Enable the normalized cache over `store`.
    pub fn normalized_cache(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    pub fn cache_key_resolver(mut self, resolver: Arc<dyn CacheKeyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn add_custom_type_adapter<T, A>(mut self, scalar: ScalarType, adapter: A) -> Self
    where
        T: 'static,
        A: CustomTypeAdapter<T> + 'static,
    {
        self.adapters.register::<T, A>(scalar, adapter);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Idle timeout of the default dispatcher; ignored with an explicit one.
    pub fn dispatcher_idle_timeout(mut self, idle: Duration) -> Self {
        self.dispatcher_idle_timeout = idle;
        self
    }

    pub fn default_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn default_transport_cache_policy(mut self, policy: TransportCachePolicy) -> Self {
        self.transport_cache_policy = policy;
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> PrismResult<Client> {
        let server_url = self.server_url.ok_or_else(|| ConfigError::MissingRequired {
            field: "server_url".to_string(),
        })?;
        validate_server_url(&server_url)?;

        let transport = self.transport.ok_or_else(|| ConfigError::MissingRequired {
            field: "transport".to_string(),
        })?;

        let http_cache = match (self.http_cache_store, self.eviction) {
            (Some(store), Some(eviction)) => Some(HttpCache::new(store, eviction)),
            (None, None) => None,
            _ => {
                return Err(ConfigError::IncompatibleOptions {
                    option_a: "http_cache_store".to_string(),
                    option_b: "eviction_strategy".to_string(),
                }
                .into())
            }
        };

        let cache: Arc<dyn NormalizedCache> = match (self.record_store, self.resolver) {
            (Some(store), resolver) => {
                let resolver: Arc<dyn CacheKeyResolver> = match resolver {
                    Some(resolver) => resolver,
                    None => Arc::new(NoKeyResolver),
                };
                Arc::new(RealCache::new(store, resolver))
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompatibleOptions {
                    option_a: "cache_key_resolver".to_string(),
                    option_b: "normalized_cache_store".to_string(),
                }
                .into())
            }
            (None, None) => Arc::new(NoOpCache::new()),
        };

        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Dispatcher::new(self.dispatcher_idle_timeout)?,
        };

        tracing::info!(
            server_url = %server_url,
            http_cache = http_cache.is_some(),
            cache_policy = %self.cache_policy,
            transport_cache_policy = %self.transport_cache_policy,
            "Client built"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                server_url,
                transport,
                http_cache,
                cache,
                adapters: self.adapters,
                mappers: ResponseMapperPool::new(),
                dispatcher,
                default_cache_policy: self.cache_policy,
                default_transport_cache_policy: self.transport_cache_policy,
            }),
        })
    }
}

fn validate_server_url(url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        field: "server_url".to_string(),
        value: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidValue {
            field: "server_url".to_string(),
            value: url.to_string(),
            reason: format!("unsupported scheme {}", scheme),
        }),
    }
}
