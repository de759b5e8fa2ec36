//! prism Test Utilities
//!
//! Shared test infrastructure for the prism workspace:
//! - Fixture operations over a small `User` schema
//! - A scripted mock transport and a recording change subscriber
//! - Proptest generators for users and response payloads
//! - Assertions over the error taxonomy

pub use prism_client::{Client, ClientBuilder, Dispatcher};
pub use prism_core::{
    Argument, CachePolicy, ErrorKind, IdFieldResolver, JsonObject, MappingError, Operation,
    OperationKind, PrismError, PrismResult, Record, Response, ResponseField, ResponseFieldMapper,
    ResponseReader, TransportCachePolicy, TransportError, Variables,
};
pub use prism_storage::{
    InMemoryRecordStore, InMemoryResponseCacheStore, NeverExpire, RecordChangeSubscriber,
    RecordStore,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use prism_client::{Transport, TransportRequest};
use serde_json::{json, Value};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// FIXTURE OPERATIONS
// ============================================================================

/// Typed result of [`GetUser`] and [`RenameUser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// Typed result of [`GetUserEmail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEmail {
    pub id: String,
    pub email: String,
}

fn id_variables(id: &str) -> Variables {
    let mut variables = Variables::new();
    variables.insert("id".to_string(), Value::String(id.to_string()));
    variables
}

fn user_field(fields: &[&str]) -> ResponseField {
    let mut selections = vec![ResponseField::typename()];
    selections.extend(fields.iter().map(|f| ResponseField::scalar(*f)));
    ResponseField::object("user", selections).with_argument("id", Argument::variable("id"))
}

fn map_user(reader: &ResponseReader<'_>) -> Result<User, MappingError> {
    reader.read_object("user", |user| {
        Ok(User {
            id: user.read_string("id")?,
            name: user.read_string("name")?,
        })
    })
}

fn map_user_email(reader: &ResponseReader<'_>) -> Result<UserEmail, MappingError> {
    reader.read_object("user", |user| {
        Ok(UserEmail {
            id: user.read_string("id")?,
            email: user.read_string("email")?,
        })
    })
}

fn map_renamed(reader: &ResponseReader<'_>) -> Result<User, MappingError> {
    reader.read_object("renameUser", |user| {
        Ok(User {
            id: user.read_string("id")?,
            name: user.read_string("name")?,
        })
    })
}

/// `query GetUser($id: ID!) { user(id: $id) { __typename id name } }`
#[derive(Debug, Clone)]
pub struct GetUser {
    id: String,
    selections: Vec<ResponseField>,
}

impl GetUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selections: vec![user_field(&["id", "name"])],
        }
    }
}

impl Operation for GetUser {
    type Data = User;

    fn name(&self) -> &str {
        "GetUser"
    }

    fn document(&self) -> &str {
        "query GetUser($id: ID!) { user(id: $id) { __typename id name } }"
    }

    fn variables(&self) -> Variables {
        id_variables(&self.id)
    }

    fn selections(&self) -> &[ResponseField] {
        &self.selections
    }

    fn response_field_mapper(&self) -> Arc<dyn ResponseFieldMapper<User>> {
        Arc::new(map_user)
    }
}

/// `query GetUserEmail($id: ID!) { user(id: $id) { __typename id email } }`
#[derive(Debug, Clone)]
pub struct GetUserEmail {
    id: String,
    selections: Vec<ResponseField>,
}

impl GetUserEmail {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selections: vec![user_field(&["id", "email"])],
        }
    }
}

impl Operation for GetUserEmail {
    type Data = UserEmail;

    fn name(&self) -> &str {
        "GetUserEmail"
    }

    fn document(&self) -> &str {
        "query GetUserEmail($id: ID!) { user(id: $id) { __typename id email } }"
    }

    fn variables(&self) -> Variables {
        id_variables(&self.id)
    }

    fn selections(&self) -> &[ResponseField] {
        &self.selections
    }

    fn response_field_mapper(&self) -> Arc<dyn ResponseFieldMapper<UserEmail>> {
        Arc::new(map_user_email)
    }
}

/// `mutation RenameUser($id: ID!, $name: String!) { renameUser(id: $id, name: $name) { __typename id name } }`
#[derive(Debug, Clone)]
pub struct RenameUser {
    id: String,
    name: String,
    selections: Vec<ResponseField>,
}

impl RenameUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            selections: vec![ResponseField::object(
                "renameUser",
                vec![
                    ResponseField::typename(),
                    ResponseField::scalar("id"),
                    ResponseField::scalar("name"),
                ],
            )
            .with_argument("id", Argument::variable("id"))
            .with_argument("name", Argument::variable("name"))],
        }
    }
}

impl Operation for RenameUser {
    type Data = User;

    fn name(&self) -> &str {
        "RenameUser"
    }

    fn document(&self) -> &str {
        "mutation RenameUser($id: ID!, $name: String!) { renameUser(id: $id, name: $name) { __typename id name } }"
    }

    fn kind(&self) -> OperationKind {
        OperationKind::Mutation
    }

    fn variables(&self) -> Variables {
        let mut variables = id_variables(&self.id);
        variables.insert("name".to_string(), Value::String(self.name.clone()));
        variables
    }

    fn selections(&self) -> &[ResponseField] {
        &self.selections
    }

    fn response_field_mapper(&self) -> Arc<dyn ResponseFieldMapper<User>> {
        Arc::new(map_renamed)
    }
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Transport replaying scripted responses in order.
///
/// Every request is counted and recorded before the optional delay, so a
/// test can observe that a call reached the transport even if it was
/// cancelled mid-flight. Running out of script is an I/O error.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond_with(&self, body: impl Into<Vec<u8>>) -> &Self {
        self.script.lock().push_back(Ok(body.into()));
        self
    }

    pub fn respond_json(&self, body: &Value) -> &Self {
        self.respond_with(body.to_string())
    }

    pub fn fail_with(&self, error: TransportError) -> &Self {
        self.script.lock().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &TransportRequest) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Io {
                    reason: "mock transport has no scripted response".to_string(),
                })
            })
    }
}

// ============================================================================
// RECORDING SUBSCRIBER
// ============================================================================

/// Change subscriber that keeps every change set it receives.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    publications: Mutex<Vec<BTreeSet<String>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publications(&self) -> Vec<BTreeSet<String>> {
        self.publications.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.publications.lock().len()
    }

    /// Union of all received change sets.
    pub fn all_keys(&self) -> BTreeSet<String> {
        self.publications.lock().iter().flatten().cloned().collect()
    }
}

impl RecordChangeSubscriber for RecordingSubscriber {
    fn on_cache_keys_changed(&self, changed: &BTreeSet<String>) {
        self.publications.lock().push(changed.clone());
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for fixture payloads.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_user_id() -> impl Strategy<Value = String> {
        (1u32..10_000).prop_map(|n| n.to_string())
    }

    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,10}"
    }

    pub fn arb_email() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", "[a-z]{1,8}").prop_map(|(local, domain)| format!("{}@{}.test", local, domain))
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        (arb_user_id(), arb_name()).prop_map(|(id, name)| User { id, name })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built payloads and client setups.

    use super::*;

    pub const SERVER_URL: &str = "http://localhost:4000/graphql";

    /// `User:<id>` keys, plus argument lookup for `user(id:)`.
    pub fn user_resolver() -> Arc<IdFieldResolver> {
        Arc::new(IdFieldResolver::new().with_argument_lookup("user", "User"))
    }

    pub fn user_response(id: &str, name: &str) -> Value {
        json!({"data": {"user": {"__typename": "User", "id": id, "name": name}}})
    }

    pub fn user_email_response(id: &str, email: &str) -> Value {
        json!({"data": {"user": {"__typename": "User", "id": id, "email": email}}})
    }

    pub fn rename_response(id: &str, name: &str) -> Value {
        json!({"data": {"renameUser": {"__typename": "User", "id": id, "name": name}}})
    }

    pub fn error_response(message: &str) -> Value {
        json!({"data": null, "errors": [{"message": message}]})
    }

    /// Response data tree (without the envelope) for local writes.
    pub fn user_tree(id: &str, name: &str) -> JsonObject {
        match user_response(id, name).get("data") {
            Some(Value::Object(data)) => data.clone(),
            _ => JsonObject::new(),
        }
    }

    /// Builder with a normalized cache over a shared in-memory store.
    pub fn client_builder(transport: Arc<MockTransport>) -> (ClientBuilder, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let builder = Client::builder()
            .server_url(SERVER_URL)
            .transport(transport)
            .normalized_cache(store.clone())
            .cache_key_resolver(user_resolver());
        (builder, store)
    }

    /// Builder with both the normalized and the transport cache enabled.
    pub fn client_builder_with_http_cache(
        transport: Arc<MockTransport>,
    ) -> (ClientBuilder, Arc<InMemoryRecordStore>) {
        let (builder, store) = client_builder(transport);
        let builder = builder.http_cache(
            Arc::new(InMemoryResponseCacheStore::new(100)),
            Arc::new(NeverExpire),
        );
        (builder, store)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over call outcomes.

    use super::*;

    pub fn assert_kind<T: std::fmt::Debug>(result: &PrismResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "unexpected error: {}", e),
            Ok(v) => panic!("expected {:?} error, got Ok({:?})", kind, v),
        }
    }

    pub fn assert_cache_miss<T: std::fmt::Debug>(result: &PrismResult<T>) {
        assert_kind(result, ErrorKind::CacheMiss);
    }

    pub fn assert_cancelled<T: std::fmt::Debug>(result: &PrismResult<T>) {
        assert_kind(result, ErrorKind::Cancelled);
    }

    /// Assert `store` holds `key` with exactly `fields` as string values.
    pub fn assert_record_fields(store: &InMemoryRecordStore, key: &str, fields: &[(&str, &str)]) {
        let record = match store.read(key) {
            Ok(Some(record)) => record,
            other => panic!("expected record {}, got {:?}", key, other),
        };
        let expected: Record = fields
            .iter()
            .fold(Record::new(key), |record, (field, value)| {
                record.with_field(*field, *value)
            });
        assert_eq!(record.fields(), expected.fields(), "record {}", key);
    }
}
