//! Read store trait and typed helpers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::query::{Page, QuerySpec};
use crate::read_model::{ReadModel, ReadModelDocument};

/// Persistence for read-model documents and projection checkpoints.
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Inserts or replaces the document with the same type and id.
    async fn save(&self, doc: ReadModelDocument) -> Result<()>;

    async fn get_by_id(&self, model_type: &str, id: &str) -> Result<Option<ReadModelDocument>>;

    /// Returns true if a document was removed.
    async fn delete(&self, model_type: &str, id: &str) -> Result<bool>;

    /// Removes every document of a type; returns how many were removed.
    async fn clear_type(&self, model_type: &str) -> Result<usize>;

    async fn count(&self, model_type: &str) -> Result<usize>;

    async fn query(&self, model_type: &str, spec: &QuerySpec) -> Result<Page<ReadModelDocument>>;

    /// Version of the projection that last rebuilt its read models.
    async fn get_checkpoint(&self, projection: &str) -> Result<Option<u32>>;

    async fn set_checkpoint(&self, projection: &str, version: u32) -> Result<()>;
}

/// Typed access on top of [`ReadStore`].
#[async_trait]
pub trait ReadStoreExt: ReadStore {
    async fn save_model<M: ReadModel>(&self, model: &M) -> Result<()> {
        self.save(ReadModelDocument::from_model(model)?).await
    }

    async fn get_model<M: ReadModel>(&self, id: &str) -> Result<Option<M>> {
        match self.get_by_id(M::MODEL_TYPE, id).await? {
            Some(doc) => Ok(Some(doc.into_model()?)),
            None => Ok(None),
        }
    }

    async fn query_models<M: ReadModel>(&self, spec: &QuerySpec) -> Result<Page<M>> {
        self.query(M::MODEL_TYPE, spec)
            .await?
            .map(ReadModelDocument::into_model)
    }
}

impl<T: ReadStore + ?Sized> ReadStoreExt for T {}

#[async_trait]
impl<T: ReadStore + ?Sized> ReadStore for Arc<T> {
    async fn save(&self, doc: ReadModelDocument) -> Result<()> {
        (**self).save(doc).await
    }

    async fn get_by_id(&self, model_type: &str, id: &str) -> Result<Option<ReadModelDocument>> {
        (**self).get_by_id(model_type, id).await
    }

    async fn delete(&self, model_type: &str, id: &str) -> Result<bool> {
        (**self).delete(model_type, id).await
    }

    async fn clear_type(&self, model_type: &str) -> Result<usize> {
        (**self).clear_type(model_type).await
    }

    async fn count(&self, model_type: &str) -> Result<usize> {
        (**self).count(model_type).await
    }

    async fn query(&self, model_type: &str, spec: &QuerySpec) -> Result<Page<ReadModelDocument>> {
        (**self).query(model_type, spec).await
    }

    async fn get_checkpoint(&self, projection: &str) -> Result<Option<u32>> {
        (**self).get_checkpoint(projection).await
    }

    async fn set_checkpoint(&self, projection: &str, version: u32) -> Result<()> {
        (**self).set_checkpoint(projection, version).await
    }
}
