use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::query::{self, DEFAULT_MAX_PAGE_SIZE, Page, QuerySpec};
use crate::read_model::ReadModelDocument;
use crate::store::ReadStore;

/// In-memory read store, keyed by model type then id.
///
/// Cheap to clone; clones share the same documents.
#[derive(Clone)]
pub struct InMemoryReadStore {
    docs: Arc<RwLock<HashMap<String, BTreeMap<String, ReadModelDocument>>>>,
    checkpoints: Arc<RwLock<HashMap<String, u32>>>,
    max_page_size: usize,
}

impl InMemoryReadStore {
    pub fn new() -> Self {
        Self::with_max_page_size(DEFAULT_MAX_PAGE_SIZE)
    }

    /// A store whose queries return at most `max_page_size` items.
    pub fn with_max_page_size(max_page_size: usize) -> Self {
        Self {
            docs: Arc::new(RwLock::new(HashMap::new())),
            checkpoints: Arc::new(RwLock::new(HashMap::new())),
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }
}

impl Default for InMemoryReadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadStore for InMemoryReadStore {
    async fn save(&self, doc: ReadModelDocument) -> Result<()> {
        self.docs
            .write()
            .await
            .entry(doc.model_type.clone())
            .or_default()
            .insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn get_by_id(&self, model_type: &str, id: &str) -> Result<Option<ReadModelDocument>> {
        Ok(self
            .docs
            .read()
            .await
            .get(model_type)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn delete(&self, model_type: &str, id: &str) -> Result<bool> {
        Ok(self
            .docs
            .write()
            .await
            .get_mut(model_type)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }

    async fn clear_type(&self, model_type: &str) -> Result<usize> {
        Ok(self
            .docs
            .write()
            .await
            .remove(model_type)
            .map_or(0, |docs| docs.len()))
    }

    async fn count(&self, model_type: &str) -> Result<usize> {
        Ok(self
            .docs
            .read()
            .await
            .get(model_type)
            .map_or(0, BTreeMap::len))
    }

    #[tracing::instrument(skip(self, spec))]
    async fn query(&self, model_type: &str, spec: &QuerySpec) -> Result<Page<ReadModelDocument>> {
        let docs = self.docs.read().await;
        let page = match docs.get(model_type) {
            Some(docs) => query::execute(docs.values(), spec, self.max_page_size),
            None => query::execute(std::iter::empty(), spec, self.max_page_size),
        };
        Ok(page)
    }

    async fn get_checkpoint(&self, projection: &str) -> Result<Option<u32>> {
        Ok(self.checkpoints.read().await.get(projection).copied())
    }

    async fn set_checkpoint(&self, projection: &str, version: u32) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(projection.to_string(), version);
        Ok(())
    }
}
