//! Policy Engine.
//!
//! Orchestrates a cache read, a possibly-concurrent network fetch, and a
//! merge of the network result back into the store, delivering an ordered
//! stream of [`Message`]s to the caller. The four [`FetchPolicy`] variants
//! differ only in *when* the network is consulted and what gets emitted
//! before that happens; the merge-then-read-back tail is shared by every
//! policy and by the mutation flow.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::ast::{Document, OperationDefinition};
use crate::context::OperationContext;
use crate::error::PolicyError;
use crate::reader;
use crate::reference::EntityReference;
use crate::store::Store;
use crate::writer;

/// The four strategies governing the interplay of local cache and network.
/// Defaults to `LocalOnly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    #[default]
    LocalOnly,
    LocalFirst,
    LocalThenRemote,
    RemoteOnly,
}

impl FetchPolicy {
    /// Parses the symbolic policy name, rejecting anything but the four
    /// recognized strategies with `PolicyError::InvalidFetchPolicy`.
    pub fn parse(name: &str) -> Result<Self, PolicyError> {
        match name {
            "local-only" => Ok(FetchPolicy::LocalOnly),
            "local-first" => Ok(FetchPolicy::LocalFirst),
            "local-then-remote" => Ok(FetchPolicy::LocalThenRemote),
            "remote-only" => Ok(FetchPolicy::RemoteOnly),
            other => Err(PolicyError::InvalidFetchPolicy(other.to_string())),
        }
    }
}

/// One of the three states a message's network leg can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Ready,
    Fetching,
    Failed,
}

/// A single emission on a query/mutation's output stream.
#[derive(Debug, Clone)]
pub struct Message {
    pub data: Option<JsonValue>,
    pub variables: IndexMap<String, JsonValue>,
    pub in_flight: bool,
    pub network_status: NetworkStatus,
}

impl Message {
    fn new(
        data: Option<JsonValue>,
        variables: &IndexMap<String, JsonValue>,
        in_flight: bool,
        network_status: NetworkStatus,
    ) -> Self {
        Self { data, variables: variables.clone(), in_flight, network_status }
    }
}

/// A single `{data, errors?}` delivery from the transport.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    pub data: JsonValue,
    pub errors: Vec<String>,
}

/// The HTTP transport collaborator, kept external to this crate.
/// `execute` is modeled as resolving to the single
/// `{data, errors?}` delivery its result-stream carries before closing —
/// the policy engine is the only consumer and never needs more than one
/// value per call, so an `async fn` stands in for "a stream that yields
/// exactly once."
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        document: &Document,
        operation: &OperationDefinition,
        variables: &IndexMap<String, JsonValue>,
        context: &IndexMap<String, JsonValue>,
    ) -> Result<NetworkResponse, String>;
}

/// Output stream handed back to the caller by `query`/`mutate`. A
/// `tokio::sync::mpsc` channel wrapped as a `Stream`, matching the
/// teacher's `tokio` + `tokio-stream` dependency for its own response
/// streams.
pub type MessageStream = ReceiverStream<Message>;

fn channel() -> (mpsc::Sender<Message>, MessageStream) {
    let (tx, rx) = mpsc::channel(8);
    (tx, ReceiverStream::new(rx))
}

/// Runs the fetch-policy state machine for a query and returns the message
/// stream. Dropping/closing the stream cancels further delivery but not the
/// in-flight transport call — the spawned task keeps running to completion
/// and still writes a late response into the store.
#[instrument(skip(store, transport, document, operation, variables, context), fields(policy = ?policy))]
pub fn query(
    store: Arc<Store>,
    transport: Arc<dyn Transport>,
    document: Document,
    operation: OperationDefinition,
    variables: IndexMap<String, JsonValue>,
    context: IndexMap<String, JsonValue>,
    policy: FetchPolicy,
) -> MessageStream {
    let (tx, stream) = channel();
    tokio::spawn(async move {
        run_query(&store, transport.as_ref(), &document, &operation, &variables, &context, policy, &tx)
            .await;
    });
    stream
}

async fn run_query(
    store: &Store,
    transport: &dyn Transport,
    document: &Document,
    operation: &OperationDefinition,
    variables: &IndexMap<String, JsonValue>,
    context: &IndexMap<String, JsonValue>,
    policy: FetchPolicy,
    tx: &mpsc::Sender<Message>,
) {
    let local = read_local(store, document, operation, variables);

    let should_fetch = match policy {
        FetchPolicy::LocalOnly => false,
        FetchPolicy::LocalFirst => local.is_none(),
        FetchPolicy::LocalThenRemote | FetchPolicy::RemoteOnly => true,
    };

    match policy {
        FetchPolicy::LocalOnly => {
            debug!("local-only: emitting cache read, no network");
            let _ = tx.send(Message::new(local, variables, false, NetworkStatus::Ready)).await;
            return;
        }
        FetchPolicy::LocalFirst if local.is_some() => {
            debug!("local-first: cache hit, no network");
            let _ = tx.send(Message::new(local, variables, false, NetworkStatus::Ready)).await;
            return;
        }
        FetchPolicy::LocalFirst => {
            debug!("local-first: cache miss, fetching");
            let _ = tx.send(Message::new(None, variables, true, NetworkStatus::Fetching)).await;
        }
        FetchPolicy::LocalThenRemote => {
            let _ = tx.send(Message::new(local, variables, true, NetworkStatus::Fetching)).await;
        }
        FetchPolicy::RemoteOnly => {
            let _ = tx.send(Message::new(None, variables, true, NetworkStatus::Fetching)).await;
        }
    }

    if !should_fetch {
        return;
    }

    match transport.execute(document, operation, variables, context).await {
        Ok(response) => {
            if !response.errors.is_empty() {
                warn!(errors = ?response.errors, "network response carried errors alongside data");
            }
            match write_and_read_back(store, document, operation, variables, response.data) {
                Ok(data) => {
                    let _ = tx.send(Message::new(data, variables, false, NetworkStatus::Ready)).await;
                }
                Err(err) => {
                    warn!(%err, "failed to merge network response into store");
                    let _ = tx.send(Message::new(None, variables, false, NetworkStatus::Failed)).await;
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "network-error");
            let _ = tx.send(Message::new(None, variables, false, NetworkStatus::Failed)).await;
        }
    }
}

/// Runs the mutation flow: writes an optional optimistic result, emits it,
/// issues the network call, then merges and emits the real result.
#[instrument(skip_all)]
pub fn mutate(
    store: Arc<Store>,
    transport: Arc<dyn Transport>,
    document: Document,
    operation: OperationDefinition,
    variables: IndexMap<String, JsonValue>,
    context: IndexMap<String, JsonValue>,
    optimistic_result: Option<JsonValue>,
) -> MessageStream {
    let (tx, stream) = channel();
    tokio::spawn(async move {
        run_mutate(
            &store,
            transport.as_ref(),
            &document,
            &operation,
            &variables,
            &context,
            optimistic_result,
            &tx,
        )
        .await;
    });
    stream
}

async fn run_mutate(
    store: &Store,
    transport: &dyn Transport,
    document: &Document,
    operation: &OperationDefinition,
    variables: &IndexMap<String, JsonValue>,
    context: &IndexMap<String, JsonValue>,
    optimistic_result: Option<JsonValue>,
    tx: &mpsc::Sender<Message>,
) {
    if let Some(optimistic) = optimistic_result.clone() {
        if let Err(err) = write_and_read_back(store, document, operation, variables, optimistic) {
            warn!(%err, "failed to write optimistic result");
        }
    }
    let _ = tx
        .send(Message::new(optimistic_result, variables, true, NetworkStatus::Fetching))
        .await;

    match transport.execute(document, operation, variables, context).await {
        Ok(response) => {
            if !response.errors.is_empty() {
                warn!(errors = ?response.errors, "mutation response carried errors alongside data");
            }
            match write_and_read_back(store, document, operation, variables, response.data) {
                Ok(data) => {
                    let _ = tx.send(Message::new(data, variables, false, NetworkStatus::Ready)).await;
                }
                Err(err) => {
                    warn!(%err, "failed to merge mutation response into store");
                    let _ = tx.send(Message::new(None, variables, false, NetworkStatus::Failed)).await;
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "network-error");
            // No automatic rollback of optimistic state on failure — the
            // optimistic entity is left exactly as written above.
            let _ = tx.send(Message::new(None, variables, false, NetworkStatus::Failed)).await;
        }
    }
}

fn read_local(
    store: &Store,
    document: &Document,
    operation: &OperationDefinition,
    variables: &IndexMap<String, JsonValue>,
) -> Option<JsonValue> {
    let ctx = OperationContext::new(document, operation, variables.clone());
    let snapshot = store.snapshot();
    let pattern = reader::pull_pattern(&ctx).ok()?;
    reader::pull(&snapshot, &pattern, &EntityReference::root()).ok().flatten()
}

fn write_and_read_back(
    store: &Store,
    document: &Document,
    operation: &OperationDefinition,
    variables: &IndexMap<String, JsonValue>,
    response_data: JsonValue,
) -> Result<Option<JsonValue>, PolicyError> {
    let ctx = OperationContext::new(document, operation, variables.clone());
    writer::write(store, response_data, &ctx)?;
    let snapshot = store.snapshot();
    let pattern = reader::pull_pattern(&ctx)?;
    Ok(reader::pull(&snapshot, &pattern, &EntityReference::root())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::store::StoreConfig;
    use futures::StreamExt;
    use indexmap::IndexSet;
    use serde_json_bytes::Map as JsonMap;

    struct StaticTransport {
        response: NetworkResponse,
    }

    #[async_trait::async_trait]
    impl Transport for StaticTransport {
        async fn execute(
            &self,
            _document: &Document,
            _operation: &OperationDefinition,
            _variables: &IndexMap<String, JsonValue>,
            _context: &IndexMap<String, JsonValue>,
        ) -> Result<NetworkResponse, String> {
            Ok(self.response.clone())
        }
    }

    struct FailingTransport;

    #[async_trait::async_trait]
    impl Transport for FailingTransport {
        async fn execute(
            &self,
            _document: &Document,
            _operation: &OperationDefinition,
            _variables: &IndexMap<String, JsonValue>,
            _context: &IndexMap<String, JsonValue>,
        ) -> Result<NetworkResponse, String> {
            Err("boom".to_string())
        }
    }

    fn viewer_query() -> (Document, OperationDefinition) {
        let op = OperationDefinition {
            operation_type: OperationType::Query,
            name: None,
            variable_definitions: vec![],
            selection_set: vec![Selection::Field(FieldSelection {
                name: "viewer".into(),
                alias: None,
                arguments: vec![],
                directives: vec![],
                selection_set: vec![Selection::Field(FieldSelection {
                    name: "name".into(),
                    alias: None,
                    arguments: vec![],
                    directives: vec![],
                    selection_set: vec![],
                })],
            })],
        };
        (Document::default(), op)
    }

    fn viewer_response(name: &str) -> JsonValue {
        let mut viewer = JsonMap::new();
        viewer.insert("name", JsonValue::String(name.into()));
        let mut root = JsonMap::new();
        root.insert("viewer", JsonValue::Object(viewer));
        JsonValue::Object(root)
    }

    #[tokio::test]
    async fn local_only_emits_single_ready_message_and_closes() {
        let (doc, op) = viewer_query();
        let store = Arc::new(Store::new(StoreConfig::default()));
        let transport: Arc<dyn Transport> =
            Arc::new(StaticTransport { response: NetworkResponse { data: viewer_response("Ada"), errors: vec![] } });

        let mut stream = query(
            store,
            transport,
            doc,
            op,
            IndexMap::new(),
            IndexMap::new(),
            FetchPolicy::LocalOnly,
        );

        let message = stream.next().await.unwrap();
        assert_eq!(message.network_status, NetworkStatus::Ready);
        assert!(!message.in_flight);
        assert_eq!(message.data, None);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn local_first_hit_skips_network() {
        let (doc, op) = viewer_query();
        let store = Arc::new(Store::new(StoreConfig::default()));
        {
            let ctx = OperationContext::new(&doc, &op, IndexMap::new());
            writer::write(&store, viewer_response("Ada"), &ctx).unwrap();
        }
        let transport: Arc<dyn Transport> = Arc::new(FailingTransport);

        let mut stream = query(
            store,
            transport,
            doc,
            op,
            IndexMap::new(),
            IndexMap::new(),
            FetchPolicy::LocalFirst,
        );

        let message = stream.next().await.unwrap();
        assert_eq!(message.network_status, NetworkStatus::Ready);
        assert!(!message.in_flight);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn local_first_miss_fetches_then_ready() {
        let (doc, op) = viewer_query();
        let store = Arc::new(Store::new(StoreConfig::default()));
        let transport: Arc<dyn Transport> =
            Arc::new(StaticTransport { response: NetworkResponse { data: viewer_response("Ada"), errors: vec![] } });

        let mut stream = query(
            store,
            transport,
            doc,
            op,
            IndexMap::new(),
            IndexMap::new(),
            FetchPolicy::LocalFirst,
        );

        let first = stream.next().await.unwrap();
        assert_eq!(first.network_status, NetworkStatus::Fetching);
        assert!(first.in_flight);

        let second = stream.next().await.unwrap();
        assert_eq!(second.network_status, NetworkStatus::Ready);
        assert!(!second.in_flight);
        let viewer = second.data.unwrap();
        assert_eq!(viewer.as_object().unwrap().get("viewer").unwrap().as_object().unwrap().get("name"), Some(&JsonValue::String("Ada".into())));

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn remote_only_always_fetches() {
        let (doc, op) = viewer_query();
        let store = Arc::new(Store::new(StoreConfig::default()));
        {
            let ctx = OperationContext::new(&doc, &op, IndexMap::new());
            writer::write(&store, viewer_response("Stale"), &ctx).unwrap();
        }
        let transport: Arc<dyn Transport> =
            Arc::new(StaticTransport { response: NetworkResponse { data: viewer_response("Fresh"), errors: vec![] } });

        let mut stream = query(
            store,
            transport,
            doc,
            op,
            IndexMap::new(),
            IndexMap::new(),
            FetchPolicy::RemoteOnly,
        );

        let first = stream.next().await.unwrap();
        assert_eq!(first.network_status, NetworkStatus::Fetching);
        assert_eq!(first.data, None);

        let second = stream.next().await.unwrap();
        assert_eq!(second.network_status, NetworkStatus::Ready);
        let viewer = second.data.unwrap();
        assert_eq!(viewer.as_object().unwrap().get("viewer").unwrap().as_object().unwrap().get("name"), Some(&JsonValue::String("Fresh".into())));
    }

    #[tokio::test]
    async fn network_failure_surfaces_as_failed_status() {
        let (doc, op) = viewer_query();
        let store = Arc::new(Store::new(StoreConfig::default()));
        let transport: Arc<dyn Transport> = Arc::new(FailingTransport);

        let mut stream =
            query(store, transport, doc, op, IndexMap::new(), IndexMap::new(), FetchPolicy::RemoteOnly);

        let _fetching = stream.next().await.unwrap();
        let failed = stream.next().await.unwrap();
        assert_eq!(failed.network_status, NetworkStatus::Failed);
        assert_eq!(failed.data, None);
    }

    #[tokio::test]
    async fn mutation_with_optimistic_result_then_real_result() {
        let mutation_op = OperationDefinition {
            operation_type: OperationType::Mutation,
            name: None,
            variable_definitions: vec![],
            selection_set: vec![Selection::Field(FieldSelection {
                name: "addUser".into(),
                alias: None,
                arguments: vec![],
                directives: vec![],
                selection_set: vec![
                    Selection::Field(FieldSelection {
                        name: "__typename".into(),
                        alias: None,
                        arguments: vec![],
                        directives: vec![],
                        selection_set: vec![],
                    }),
                    Selection::Field(FieldSelection {
                        name: "id".into(),
                        alias: None,
                        arguments: vec![],
                        directives: vec![],
                        selection_set: vec![],
                    }),
                    Selection::Field(FieldSelection {
                        name: "name".into(),
                        alias: None,
                        arguments: vec![],
                        directives: vec![],
                        selection_set: vec![],
                    }),
                ],
            })],
        };
        let doc = Document::default();

        fn add_user(id: &str, name: &str) -> JsonValue {
            let mut user = JsonMap::new();
            user.insert("__typename", JsonValue::String("User".into()));
            user.insert("id", JsonValue::String(id.into()));
            user.insert("name", JsonValue::String(name.into()));
            let mut root = JsonMap::new();
            root.insert("addUser", JsonValue::Object(user));
            JsonValue::Object(root)
        }

        let mut id_attrs = IndexSet::new();
        id_attrs.insert("User/id".to_string());
        let store = Arc::new(Store::new(StoreConfig { id_attrs, ..StoreConfig::default() }));
        let transport: Arc<dyn Transport> =
            Arc::new(StaticTransport { response: NetworkResponse { data: add_user("u5", "Ada"), errors: vec![] } });

        let mut stream = mutate(
            store.clone(),
            transport,
            doc,
            mutation_op,
            IndexMap::new(),
            IndexMap::new(),
            Some(add_user("tmp", "Ada")),
        );

        let optimistic = stream.next().await.unwrap();
        assert_eq!(optimistic.network_status, NetworkStatus::Fetching);
        assert!(optimistic.in_flight);
        assert!(store.snapshot().contains(&EntityReference::keyed("User/id", JsonValue::String("tmp".into()))));

        let real = stream.next().await.unwrap();
        assert_eq!(real.network_status, NetworkStatus::Ready);
        assert!(!real.in_flight);
        assert!(store.snapshot().contains(&EntityReference::keyed("User/id", JsonValue::String("u5".into()))));
        assert!(stream.next().await.is_none());
    }
}
