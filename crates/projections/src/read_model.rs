//! Read models and their stored document form.

use event_store::Version;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// A denormalized, queryable view maintained by a projection.
///
/// `version` is the version of the last event folded into the model; a
/// projection skips any event whose version is not strictly greater.
/// Models should serialize their fields in camelCase so filter and sort
/// field names match the wire.
pub trait ReadModel: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Type tag under which documents of this model are stored.
    const MODEL_TYPE: &'static str;

    fn id(&self) -> String;

    fn version(&self) -> Version;

    /// Precomputed text matched by free-text queries.
    fn searchable_text(&self) -> String {
        String::new()
    }
}

/// A read model as held by a read store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadModelDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub version: Version,
    pub data: serde_json::Value,
    pub searchable_text: String,
}

impl ReadModelDocument {
    pub fn from_model<M: ReadModel>(model: &M) -> Result<Self> {
        Ok(Self {
            id: model.id(),
            model_type: M::MODEL_TYPE.to_string(),
            version: model.version(),
            data: serde_json::to_value(model)?,
            searchable_text: model.searchable_text().to_lowercase(),
        })
    }

    pub fn into_model<M: ReadModel>(self) -> Result<M> {
        Ok(serde_json::from_value(self.data)?)
    }

    /// Value of a named field. `id` and `version` come from the document,
    /// everything else from the model data.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "id" => Some(serde_json::Value::String(self.id.clone())),
            "version" => Some(serde_json::Value::from(self.version.as_i64())),
            other => self.data.get(other).cloned(),
        }
    }
}
