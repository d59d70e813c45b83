use anyhow::{bail, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::types::ModelEntry;
use crate::constants::DEFAULT_MODELS;

/// One catalog entry as written in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub id: String,
    pub name: String,
}

/// Ordered, read-only mapping from short key to model
///
/// Serializes as a JSON object in catalog order, e.g. `{"1": {"id": .., "name": ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelEntry>,
}

impl ModelCatalog {
    /// Build a catalog, rejecting empty catalogs and duplicate keys
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Result<Self> {
        let mut models = IndexMap::new();
        for entry in entries {
            let key = entry.key.trim().to_string();
            if key.is_empty() || entry.id.trim().is_empty() {
                bail!("Model catalog entries need a non-empty key and id");
            }
            if models.contains_key(&key) {
                bail!("Duplicate model key in catalog: {}", key);
            }
            models.insert(
                key,
                ModelEntry {
                    id: entry.id,
                    name: entry.name,
                },
            );
        }

        if models.is_empty() {
            bail!("Model catalog is empty");
        }

        Ok(Self { models })
    }

    /// Look up a model by short key first, then by model id
    pub fn resolve(&self, key_or_id: &str) -> Option<&ModelEntry> {
        let needle = key_or_id.trim();
        self.models
            .get(needle)
            .or_else(|| self.models.values().find(|m| m.id == needle))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.models.iter().map(|(key, model)| (key.as_str(), model))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// The built-in Gemini model list
pub fn default_catalog_entries() -> Vec<CatalogEntry> {
    DEFAULT_MODELS
        .iter()
        .map(|(key, id, name)| CatalogEntry {
            key: key.to_string(),
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let models = default_catalog_entries()
            .into_iter()
            .map(|e| (e.key, ModelEntry { id: e.id, name: e.name }))
            .collect();
        Self { models }
    }
}
