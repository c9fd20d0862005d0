//! Query handlers and the query dispatcher.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{DomainError, ErrorBody, ErrorKind, Registry, RegistryError};
use serde::{Deserialize, Serialize};

use crate::query::QuerySpec;
use crate::read_model::ReadModel;
use crate::store::{ReadStore, ReadStoreExt};

/// A query as received from a transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEnvelope {
    pub query_type: String,
    #[serde(flatten)]
    pub spec: QuerySpec,
}

impl QueryEnvelope {
    pub fn new(query_type: impl Into<String>, spec: QuerySpec) -> Self {
        Self {
            query_type: query_type.into(),
            spec,
        }
    }
}

/// Outcome of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub data: serde_json::Value,
}

impl QueryResult {
    pub fn succeeded(data: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    pub fn failed(error: &DomainError) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: serde_json::Value::Null,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn handle(&self, spec: &QuerySpec) -> Result<serde_json::Value, DomainError>;
}

/// Fetches one read model of type `M` by `criteria.id`.
pub struct GetByIdQuery<M, R> {
    store: R,
    _model: PhantomData<fn() -> M>,
}

impl<M, R> GetByIdQuery<M, R> {
    pub fn new(store: R) -> Self {
        Self {
            store,
            _model: PhantomData,
        }
    }
}

#[async_trait]
impl<M: ReadModel, R: ReadStore> QueryHandler for GetByIdQuery<M, R> {
    async fn handle(&self, spec: &QuerySpec) -> Result<serde_json::Value, DomainError> {
        let id = spec
            .criteria
            .id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DomainError::validation("criteria.id is required"))?;

        match self.store.get_model::<M>(id).await? {
            Some(model) => Ok(serde_json::to_value(model)?),
            None => Err(DomainError::not_found(M::MODEL_TYPE, id)),
        }
    }
}

/// Lists read models of type `M` with filters, sort and pagination.
pub struct ListQuery<M, R> {
    store: R,
    _model: PhantomData<fn() -> M>,
}

impl<M, R> ListQuery<M, R> {
    pub fn new(store: R) -> Self {
        Self {
            store,
            _model: PhantomData,
        }
    }
}

#[async_trait]
impl<M: ReadModel, R: ReadStore> QueryHandler for ListQuery<M, R> {
    async fn handle(&self, spec: &QuerySpec) -> Result<serde_json::Value, DomainError> {
        let page = self.store.query_models::<M>(spec).await?;
        Ok(serde_json::to_value(page)?)
    }
}

/// Query registry with a `new → register* → freeze → dispatch` lifecycle.
pub struct QueryDispatcher {
    handlers: Registry<Arc<dyn QueryHandler>>,
}

impl Default for QueryDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Registry::new("query"),
        }
    }

    pub fn register(
        &mut self,
        query_type: impl Into<String>,
        handler: Arc<dyn QueryHandler>,
    ) -> Result<(), RegistryError> {
        self.handlers.register(query_type, handler)
    }

    pub fn freeze(&mut self) {
        self.handlers.freeze();
    }

    pub fn supported_query_types(&self) -> Vec<&str> {
        self.handlers.keys()
    }

    /// Dispatches and folds any error into a failed [`QueryResult`].
    pub async fn dispatch(&self, query: QueryEnvelope) -> QueryResult {
        match self.try_dispatch(query).await {
            Ok(data) => QueryResult::succeeded(data),
            Err(e) => QueryResult::failed(&e),
        }
    }

    #[tracing::instrument(skip(self, query), fields(query_type = %query.query_type))]
    pub async fn try_dispatch(
        &self,
        query: QueryEnvelope,
    ) -> Result<serde_json::Value, DomainError> {
        metrics::counter!("queries_executed_total").increment(1);

        let handler = Arc::clone(self.handlers.get(&query.query_type)?);
        let result = handler.handle(&query.spec).await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, kind = %e.kind(), "query failed");
        }
        result
    }
}
