//! prism Client - Call Pipeline and Transport
//!
//! The [`Client`] ties the layers together: it encodes operations, consults
//! the normalized and transport caches per call policy, runs the transport,
//! normalizes responses into the store and maps them into typed results.
//! Calls run as futures, on the [`Dispatcher`] with a callback, or blocking.

pub mod call;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod mapper_pool;
pub mod serializer;
pub mod telemetry;
pub mod transport;
pub mod watcher;

pub use call::{Call, CallCanceller, CallState};
pub use client::{Client, ClientBuilder};
pub use config::ClientSettings;
pub use dispatcher::{Dispatcher, DEFAULT_IDLE_TIMEOUT, DISPATCHER_THREAD_NAME};
pub use mapper_pool::ResponseMapperPool;
pub use serializer::{encode_request, parse_response, EncodedRequest, ParsedResponse};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use transport::{
    ReqwestTransport, Transport, TransportRequest, CACHE_KEY_HEADER, CACHE_POLICY_HEADER,
};
pub use watcher::Watcher;

pub use prism_core::{
    CachePolicy, ErrorKind, Operation, OperationKind, PrismError, PrismResult, Response,
    ResponseSource, TransportCachePolicy,
};
