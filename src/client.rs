//! Client facade.
//!
//! A thin struct pairing the snapshot cell with a [`Transport`] handle and
//! wiring `query`/`mutate` to the Policy Engine. Deliberately thin: no
//! retries, no document caching, no schema — those remain external
//! collaborators.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;

use crate::ast::{Document, OperationDefinition};
use crate::error::{CacheError, PolicyError};
use crate::policy::{self, FetchPolicy, MessageStream, Transport};
use crate::reader;
use crate::reference::EntityReference;
use crate::store::{Store, StoreConfig};
use crate::writer;

/// Options recognized by `query`/`mutate`.
#[derive(Default)]
pub struct QueryOptions {
    pub fetch_policy: FetchPolicy,
    pub context: IndexMap<String, JsonValue>,
    /// Accepted for interface parity with callers expecting it; semantically
    /// equivalent to its absence, since the Reader already tolerates missing
    /// fields rather than treating them as an error.
    pub return_partial: bool,
}

#[derive(Default)]
pub struct MutateOptions {
    pub context: IndexMap<String, JsonValue>,
    pub optimistic_result: Option<JsonValue>,
}

/// The client surface consumed by application code.
pub struct Client {
    store: Arc<Store>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(config: StoreConfig, transport: Arc<dyn Transport>) -> Self {
        Self { store: Arc::new(Store::new(config)), transport }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs the fetch-policy state machine and returns the message stream.
    pub fn query(
        &self,
        document: Document,
        variables: IndexMap<String, JsonValue>,
        options: QueryOptions,
    ) -> Result<MessageStream, PolicyError> {
        let operation = document
            .single_operation()
            .cloned()
            .ok_or_else(|| PolicyError::InvalidFetchPolicy("no single operation in document".into()))?;
        Ok(policy::query(
            self.store.clone(),
            self.transport.clone(),
            document,
            operation,
            variables,
            options.context,
            options.fetch_policy,
        ))
    }

    /// Runs the mutation flow and returns the message stream.
    pub fn mutate(
        &self,
        document: Document,
        variables: IndexMap<String, JsonValue>,
        options: MutateOptions,
    ) -> Result<MessageStream, PolicyError> {
        let operation = document
            .single_operation()
            .cloned()
            .ok_or_else(|| PolicyError::InvalidFetchPolicy("no single operation in document".into()))?;
        Ok(policy::mutate(
            self.store.clone(),
            self.transport.clone(),
            document,
            operation,
            variables,
            options.context,
            options.optimistic_result,
        ))
    }

    /// Store operation: reader-driven, denormalizing the current snapshot
    /// against `document`'s selections.
    pub fn read(
        &self,
        document: &Document,
        variables: IndexMap<String, JsonValue>,
    ) -> Result<Option<JsonValue>, CacheError> {
        let operation = document
            .single_operation()
            .ok_or_else(|| PolicyError::InvalidFetchPolicy("no single operation in document".into()))?;
        let ctx = crate::context::OperationContext::new(document, operation, variables);
        let snapshot = self.store.snapshot();
        let pattern = reader::pull_pattern(&ctx)?;
        Ok(reader::pull(&snapshot, &pattern, &EntityReference::root())?)
    }

    /// Store operation: writes `data` into the store and returns nothing —
    /// callers observe the effect via `read` or the snapshot cell. The new
    /// snapshot is already installed by the time this returns, so there is
    /// no separate snapshot handle to hand back beyond what `store()`
    /// exposes.
    pub fn write(
        &self,
        data: JsonValue,
        document: &Document,
        variables: IndexMap<String, JsonValue>,
    ) -> Result<(), CacheError> {
        let operation = document
            .single_operation()
            .ok_or_else(|| PolicyError::InvalidFetchPolicy("no single operation in document".into()))?;
        let ctx = crate::context::OperationContext::new(document, operation, variables);
        writer::write(&self.store, data, &ctx)?;
        Ok(())
    }
}
