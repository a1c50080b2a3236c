//! Core data models used throughout the catalog.
//!
//! These types represent the service records, categories, snapshots, and
//! search results that flow from the parser through the search engine to
//! the tool surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One catalogued free-tier offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub name: String,
    pub url: String,
    pub description: String,
    /// Free-tier summary; falls back to the description when the source
    /// line has no separate clause.
    pub free_tier: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limitation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl ServiceRecord {
    /// Tags as a slice, empty when none were inferred.
    pub fn tag_list(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }

    pub fn has_tags(&self) -> bool {
        !self.tag_list().is_empty()
    }
}

/// A named grouping of services, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub services: Vec<ServiceRecord>,
}

/// One immutable generation of the catalog.
///
/// `services` is always the concatenation of every category's services in
/// order. It is derived in [`CatalogSnapshot::new`] and rebuilt on
/// deserialization, so it never appears in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotParts", rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub categories: Vec<Category>,
    #[serde(skip_serializing)]
    pub services: Vec<ServiceRecord>,
    pub generated_at: DateTime<Utc>,
    /// Hex SHA-256 of the raw document this snapshot was parsed from.
    pub source_digest: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotParts {
    categories: Vec<Category>,
    generated_at: DateTime<Utc>,
    #[serde(default)]
    source_digest: String,
}

impl From<SnapshotParts> for CatalogSnapshot {
    fn from(parts: SnapshotParts) -> Self {
        CatalogSnapshot::new(parts.categories, parts.generated_at, parts.source_digest)
    }
}

impl CatalogSnapshot {
    pub fn new(
        categories: Vec<Category>,
        generated_at: DateTime<Utc>,
        source_digest: String,
    ) -> Self {
        let services = categories
            .iter()
            .flat_map(|c| c.services.iter().cloned())
            .collect();
        Self {
            categories,
            services,
            generated_at,
            source_digest,
        }
    }

    /// True when the snapshot holds the same catalog content, ignoring the
    /// generation timestamp.
    pub fn same_content(&self, other: &CatalogSnapshot) -> bool {
        self.categories == other.categories && self.services == other.services
    }
}

/// Caller-supplied filter/query tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub limit: usize,
}

pub const DEFAULT_LIMIT: usize = 10;

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            tags: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchQuery {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The trimmed free-text query, or `None` when absent or blank.
    pub fn trimmed_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// Where a fuzzy query term matched inside a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSpan {
    /// Record field the term matched in (`"name"`, `"description"`, ...).
    pub field: &'static str,
    /// The query term.
    pub term: String,
    /// Edit operations needed to align the term with the field text.
    pub errors: usize,
}

/// A ranked search hit. Lower `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub record: ServiceRecord,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_spans: Option<Vec<MatchSpan>>,
}

/// Lookup key for [`crate::catalog::CatalogService::get_service`].
#[derive(Debug, Clone, Default)]
pub struct ServiceLookup {
    pub name: Option<String>,
    pub url: Option<String>,
}

/// Category name with its service count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}
