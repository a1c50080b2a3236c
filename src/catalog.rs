//! Catalog orchestration.
//!
//! [`CatalogService`] owns one published generation of the catalog: a
//! snapshot plus the search engine indexed over it. Both live under a single
//! `RwLock` and are replaced together, so readers never see a snapshot
//! paired with another generation's index.
//!
//! # Lifecycle
//!
//! ```text
//! initialize(): cache hit? ──yes──▶ publish
//!                   │no / error (logged)
//!                   ▼
//!               fetch ▶ parse ▶ save ▶ publish
//!
//! refresh():    fetch ▶ parse ▶ clear cache ▶ invalidate memo ▶ save ▶ publish
//! ```
//!
//! Fetch and parse failures are fatal. Cache failures are logged at `warn`
//! and otherwise ignored. Every query before the first publish fails with
//! [`CatalogError::IndexNotReady`].

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::{CatalogError, Result, StoreError};
use crate::fetch::{fetcher_from_config, Fetcher};
use crate::models::{
    CatalogSnapshot, CategoryCount, SearchQuery, SearchResult, ServiceLookup, ServiceRecord,
};
use crate::parser::CatalogParser;
use crate::search::{SearchEngine, SearchSettings, SearchStats};
use crate::store::{CacheManager, CacheStats, JsonFileStore};

/// Categories whose services get a popularity bonus.
const POPULAR_CATEGORIES: [&str; 4] = ["APIs, Data, and ML", "Cloud Providers", "Hosting", "Database"];

struct Published {
    snapshot: Option<Arc<CatalogSnapshot>>,
    engine: SearchEngine,
}

/// Outcome of a [`CatalogService::refresh`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub services: usize,
    pub categories: usize,
    /// False when the new document parsed to the same content.
    pub changed: bool,
    pub source_digest: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub initialized: bool,
    pub total_services: usize,
    pub total_categories: usize,
    pub services_with_tags: usize,
    pub services_with_limitations: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub source_digest: Option<String>,
    pub source: String,
    pub search: SearchStats,
    pub cache: CacheStats,
}

pub struct CatalogService {
    fetcher: Box<dyn Fetcher>,
    parser: CatalogParser,
    cache: CacheManager,
    settings: SearchSettings,
    state: RwLock<Published>,
}

impl CatalogService {
    pub fn new(fetcher: Box<dyn Fetcher>, cache: CacheManager, settings: SearchSettings) -> Self {
        let engine = SearchEngine::new(settings.clone());
        Self {
            fetcher,
            parser: CatalogParser::new(),
            cache,
            settings,
            state: RwLock::new(Published {
                snapshot: None,
                engine,
            }),
        }
    }

    /// Wire the service from configuration: fetcher per `[source]`, JSON
    /// file cache under `[cache].dir`, engine settings from `[search]`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = fetcher_from_config(&config.source)?;
        let cache = CacheManager::new(
            Box::new(JsonFileStore::new(&config.cache.dir)),
            config.cache.settings(),
        );
        Ok(Self::new(fetcher, cache, config.search.settings()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Published> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_initialized(&self) -> bool {
        self.read().snapshot.is_some()
    }

    /// Load the catalog from cache, or fetch and parse it. No-op when a
    /// snapshot is already published.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let cached = match self.cache.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load cached catalog; fetching fresh data");
                None
            }
        };

        let snapshot = match cached {
            Some(snapshot) => {
                tracing::info!(services = snapshot.services.len(), "catalog loaded from cache");
                snapshot
            }
            None => {
                let snapshot = self.fetch_and_parse().await?;
                self.save(&snapshot).await;
                snapshot
            }
        };

        self.publish(snapshot);
        Ok(())
    }

    /// Fetch and parse a fresh generation, replacing the cache and the
    /// published snapshot.
    ///
    /// Not safe to run concurrently with itself.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        let snapshot = self.fetch_and_parse().await?;

        if let Err(e) = self.cache.clear().await {
            tracing::warn!(error = %e, "failed to clear catalog cache");
        }
        self.read().engine.invalidate_cache();
        self.save(&snapshot).await;

        let changed = self
            .read()
            .snapshot
            .as_ref()
            .map_or(true, |current| !current.same_content(&snapshot));
        let summary = RefreshSummary {
            services: snapshot.services.len(),
            categories: snapshot.categories.len(),
            changed,
            source_digest: snapshot.source_digest.clone(),
            generated_at: snapshot.generated_at,
        };

        self.publish(snapshot);
        tracing::info!(
            services = summary.services,
            categories = summary.categories,
            changed = summary.changed,
            "catalog refreshed"
        );
        Ok(summary)
    }

    /// Drop both cache layers and the search memo. The published snapshot
    /// stays in place.
    pub async fn clear_cache(&self) -> std::result::Result<(), StoreError> {
        self.read().engine.invalidate_cache();
        self.cache.clear().await
    }

    async fn fetch_and_parse(&self) -> Result<CatalogSnapshot> {
        let raw = self.fetcher.fetch_raw().await?;
        let snapshot = self.parser.parse(&raw)?;
        tracing::info!(
            source = %self.fetcher.source(),
            services = snapshot.services.len(),
            categories = snapshot.categories.len(),
            digest = %snapshot.source_digest,
            "parsed catalog"
        );
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &CatalogSnapshot) {
        if let Err(e) = self.cache.save(snapshot).await {
            tracing::warn!(error = %e, "failed to save catalog cache");
        }
    }

    fn publish(&self, snapshot: CatalogSnapshot) {
        let mut engine = SearchEngine::new(self.settings.clone());
        engine.build_index(&snapshot.services);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.snapshot = Some(Arc::new(snapshot));
        state.engine = engine;
    }

    /// The published snapshot.
    pub fn snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        self.read()
            .snapshot
            .clone()
            .ok_or(CatalogError::IndexNotReady)
    }

    /// Fuzzy, ranked search.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.read().engine.search(query)
    }

    /// Plain substring search in document order.
    ///
    /// The query matches case-insensitively against name, description, free
    /// tier, or category. Category is a substring filter; tags match-any.
    pub fn basic_search(&self, query: &SearchQuery) -> Result<Vec<ServiceRecord>> {
        let snapshot = self.snapshot()?;
        let text = query.trimmed_query().map(str::to_lowercase);
        let category = query.category.as_deref().map(str::to_lowercase);
        let tags: Vec<String> = query
            .tags
            .iter()
            .flatten()
            .map(|t| t.to_lowercase())
            .collect();

        Ok(snapshot
            .services
            .iter()
            .filter(|s| match &text {
                Some(q) => [&s.name, &s.description, &s.free_tier, &s.category]
                    .iter()
                    .any(|field| field.to_lowercase().contains(q.as_str())),
                None => true,
            })
            .filter(|s| match &category {
                Some(c) => s.category.to_lowercase().contains(c.as_str()),
                None => true,
            })
            .filter(|s| {
                tags.is_empty() || s.tag_list().iter().any(|t| tags.contains(&t.to_lowercase()))
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    /// Services similar to the one named `name` (case-insensitive), or
    /// `None` when no such service exists.
    pub fn similar(&self, name: &str, limit: usize) -> Result<Option<Vec<ServiceRecord>>> {
        let state = self.read();
        let snapshot = state.snapshot.as_ref().ok_or(CatalogError::IndexNotReady)?;
        let needle = name.trim().to_lowercase();
        let Some(source) = snapshot
            .services
            .iter()
            .find(|s| s.name.to_lowercase() == needle)
        else {
            return Ok(None);
        };
        state.engine.similar(source, limit).map(Some)
    }

    /// Look up one service. An exact URL match wins over a case-insensitive
    /// name match.
    pub fn get_service(&self, lookup: &ServiceLookup) -> Result<Option<ServiceRecord>> {
        let snapshot = self.snapshot()?;

        if let Some(url) = lookup.url.as_deref() {
            if let Some(found) = snapshot.services.iter().find(|s| s.url == url) {
                return Ok(Some(found.clone()));
            }
        }
        if let Some(name) = lookup.name.as_deref() {
            let needle = name.trim().to_lowercase();
            return Ok(snapshot
                .services
                .iter()
                .find(|s| s.name.to_lowercase() == needle)
                .cloned());
        }
        Ok(None)
    }

    pub fn categories(&self) -> Result<Vec<String>> {
        Ok(self
            .snapshot()?
            .categories
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    pub fn categories_with_count(&self) -> Result<Vec<CategoryCount>> {
        Ok(self
            .snapshot()?
            .categories
            .iter()
            .map(|c| CategoryCount {
                name: c.name.clone(),
                count: c.services.len(),
            })
            .collect())
    }

    /// Every tag in use, sorted and deduplicated.
    pub fn all_tags(&self) -> Result<Vec<String>> {
        let snapshot = self.snapshot()?;
        let tags: BTreeSet<&String> = snapshot.services.iter().flat_map(|s| s.tag_list()).collect();
        Ok(tags.into_iter().cloned().collect())
    }

    /// Services ranked by [`popularity_score`], highest first.
    pub fn popular(&self, limit: usize) -> Result<Vec<ServiceRecord>> {
        let snapshot = self.snapshot()?;
        let mut scored: Vec<(f64, &ServiceRecord)> = snapshot
            .services
            .iter()
            .map(|s| (popularity_score(s), s))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, s)| s.clone())
            .collect())
    }

    pub fn stats(&self) -> CatalogStats {
        let state = self.read();
        let snapshot = state.snapshot.as_deref();
        let services = snapshot.map(|s| s.services.as_slice()).unwrap_or_default();

        CatalogStats {
            initialized: snapshot.is_some(),
            total_services: services.len(),
            total_categories: snapshot.map_or(0, |s| s.categories.len()),
            services_with_tags: services.iter().filter(|s| s.has_tags()).count(),
            services_with_limitations: services.iter().filter(|s| s.limitation.is_some()).count(),
            last_updated: snapshot.map(|s| s.generated_at),
            source_digest: snapshot.map(|s| s.source_digest.clone()),
            source: self.fetcher.source(),
            search: state.engine.stats(),
            cache: self.cache.stats(),
        }
    }
}

/// Heuristic popularity: longer descriptions (capped), a stated limitation,
/// more tags, and membership in a few broad categories all score higher.
pub fn popularity_score(service: &ServiceRecord) -> f64 {
    let mut score = (service.description.chars().count() as f64 / 10.0).min(20.0);
    if service.limitation.is_some() {
        score += 10.0;
    }
    score += 5.0 * service.tag_list().len() as f64;
    if POPULAR_CATEGORIES
        .iter()
        .any(|c| service.category.contains(c))
    {
        score += 15.0;
    }
    score
}
