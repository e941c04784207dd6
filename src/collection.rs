//! Collection catalogue
//!
//! A collection is one independently paginated slice of the catalogue (for
//! example every listing in one category). The catalogue file is a JSON array
//! of `{ "id": .., "name": .. }` objects.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Catalogue errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Catalogue file could not be read
    #[error("failed to read catalogue {path}: {reason}")]
    Io {
        /// File path
        path: String,
        /// OS error text
        reason: String,
    },

    /// Catalogue JSON is malformed
    #[error("failed to parse catalogue: {0}")]
    Parse(String),

    /// Two entries share an id
    #[error("duplicate collection id {0}")]
    DuplicateId(u64),
}

/// One paginated collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Stable identifier used as the checkpoint key and in page URLs
    pub id: u64,
    /// Human-readable name, also used as the search query
    pub name: String,
}

impl Collection {
    /// Create a collection
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Selection applied to the catalogue before a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionFilter {
    /// Exact name match (case-insensitive)
    pub name: Option<String>,
    /// Exact id match
    pub id: Option<u64>,
    /// Entries to skip after matching
    pub offset: usize,
    /// Maximum entries to keep after the offset
    pub limit: Option<usize>,
}

/// Ordered list of collections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionCatalog {
    collections: Vec<Collection>,
}

impl CollectionCatalog {
    /// Build from a list, rejecting duplicate ids
    pub fn new(collections: Vec<Collection>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(collections.len());
        for collection in &collections {
            if !seen.insert(collection.id) {
                return Err(CatalogError::DuplicateId(collection.id));
            }
        }
        Ok(Self { collections })
    }

    /// Parse a JSON array
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let collections: Vec<Collection> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(collections)
    }

    /// Load a JSON catalogue file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// All collections in file order
    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Collections matching `filter`, in catalogue order
    pub fn select(&self, filter: &CollectionFilter) -> Vec<Collection> {
        let matching = self.collections.iter().filter(|c| {
            filter
                .name
                .as_ref()
                .map_or(true, |name| c.name.eq_ignore_ascii_case(name.trim()))
                && filter.id.map_or(true, |id| c.id == id)
        });

        matching
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

/// Builds the search URL for a collection page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchUrlTemplate {
    base: Url,
    entity_type: String,
}

impl SearchUrlTemplate {
    /// Template over the search endpoint `base`, restricted to `entity_type`
    pub fn new(base: Url, entity_type: impl Into<String>) -> Self {
        Self {
            base,
            entity_type: entity_type.into(),
        }
    }

    /// URL of `page` (1-based) of `collection`
    pub fn page_url(&self, collection: &Collection, page: u32) -> String {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("q", &collection.name)
            .append_pair("loc", "")
            .append_pair("filters[entity_type][0]", &self.entity_type)
            .append_pair("filters[specializations][0]", &collection.id.to_string())
            .append_pair("page", &page.to_string());
        url.into()
    }
}
