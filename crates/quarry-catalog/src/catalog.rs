use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use quarry_core::QueryParam;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::filter::{FilterSpec, Filters};

/// Catalog file format version this build understands
pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    version: u32,
    #[serde(default)]
    datasets: Vec<DatasetSpec>,
}

/// A declared dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Query template using positional parameters `?1..?n`, one per filter
    #[serde(skip_serializing)]
    pub query: String,
    /// Accepted filters, in binding order
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Values applied when a filter is unset
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub defaults: IndexMap<String, String>,
}

/// A dataset bound to concrete filter values, ready to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDataset {
    pub id: String,
    pub query: String,
    /// One parameter per declared filter, in declaration order
    pub params: Vec<QueryParam>,
    /// Filters that ended up set, including defaults
    pub applied: IndexMap<String, String>,
}

/// The closed set of declared datasets, immutable once loaded
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    datasets: IndexMap<String, DatasetSpec>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?(\d+)").expect("valid placeholder regex"))
}

impl DatasetCatalog {
    /// A catalog with no datasets
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and validate a catalog file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let catalog = Self::from_toml(&raw)?;

        tracing::info!(path = %path.display(), datasets = catalog.len(), "dataset catalog loaded");

        Ok(catalog)
    }

    /// Parse and validate catalog TOML
    pub fn from_toml(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;

        if file.version != CATALOG_VERSION {
            return Err(CatalogError::UnsupportedVersion(file.version));
        }

        let mut datasets = IndexMap::with_capacity(file.datasets.len());

        for dataset in file.datasets {
            validate_dataset(&dataset)?;

            if datasets.contains_key(&dataset.id) {
                return Err(CatalogError::DuplicateDataset(dataset.id));
            }

            datasets.insert(dataset.id.clone(), dataset);
        }

        Ok(Self { datasets })
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DatasetSpec> {
        self.datasets.get(id)
    }

    /// Declared datasets in file order
    pub fn datasets(&self) -> impl Iterator<Item = &DatasetSpec> {
        self.datasets.values()
    }

    /// Bind `filters` to the dataset named `id`
    ///
    /// Returns `Ok(None)` for an unknown id. Every declared filter is bound,
    /// in declaration order, as `NULL` when it is unset and has no default.
    pub fn resolve(&self, id: &str, filters: &Filters) -> Result<Option<ResolvedDataset>, CatalogError> {
        let Some(dataset) = self.datasets.get(id) else {
            return Ok(None);
        };

        if let Some(unknown) = filters
            .keys()
            .find(|key| !dataset.filters.iter().any(|filter| filter.key == **key))
        {
            return Err(CatalogError::UnknownFilter {
                dataset: dataset.id.clone(),
                key: unknown.clone(),
            });
        }

        let mut params = Vec::with_capacity(dataset.filters.len());
        let mut applied = IndexMap::new();

        for filter in &dataset.filters {
            let supplied = match filters.get(&filter.key) {
                Some(raw) => filter.coerce(raw)?,
                None => None,
            };

            let bound = match (supplied, dataset.defaults.get(&filter.key)) {
                (Some(bound), _) => Some(bound),
                (None, Some(default)) => Some(filter.coerce_text(default)?),
                (None, None) => None,
            };

            match bound {
                Some((param, shown)) => {
                    applied.insert(filter.key.clone(), shown);
                    params.push(param);
                }
                None => params.push(QueryParam::Null),
            }
        }

        tracing::debug!(dataset = %dataset.id, filters = ?applied, "dataset resolved");

        Ok(Some(ResolvedDataset {
            id: dataset.id.clone(),
            query: dataset.query.clone(),
            params,
            applied,
        }))
    }
}

fn validate_dataset(dataset: &DatasetSpec) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidDataset {
        id: dataset.id.clone(),
        reason,
    };

    if dataset.id.trim().is_empty() {
        return Err(invalid("id must not be empty".to_owned()));
    }

    if let Err(rejection) = quarry_guard::classify(&dataset.query) {
        return Err(invalid(format!("query is not read-only: {rejection}")));
    }

    let mut keys = HashSet::new();
    for filter in &dataset.filters {
        if !keys.insert(filter.key.as_str()) {
            return Err(invalid(format!("filter '{}' is declared twice", filter.key)));
        }
    }

    for placeholder in placeholder_regex().captures_iter(&dataset.query) {
        let index: usize = placeholder[1]
            .parse()
            .map_err(|_| invalid(format!("bad placeholder ?{}", &placeholder[1])))?;

        if index == 0 || index > dataset.filters.len() {
            return Err(invalid(format!(
                "placeholder ?{index} has no matching filter ({} declared)",
                dataset.filters.len()
            )));
        }
    }

    for (key, value) in &dataset.defaults {
        let filter = dataset
            .filters
            .iter()
            .find(|filter| filter.key == *key)
            .ok_or_else(|| invalid(format!("default for undeclared filter '{key}'")))?;

        filter
            .coerce_text(value)
            .map_err(|e| invalid(format!("default for '{key}': {e}")))?;
    }

    Ok(())
}
