//! In-memory search engine over catalog records.
//!
//! # Query Pipeline
//!
//! 1. Category filter: case-insensitive equality or substring match.
//! 2. Tag filter: keep records carrying any requested tag (match-any).
//! 3. Free-text ranking: weighted multi-field fuzzy match, ascending score,
//!    stable on document order. If nothing matches fuzzily, fall back to a
//!    literal substring search where every hit scores [`FALLBACK_SCORE`].
//! 4. No query: the filtered set in document order, scored [`BEST_SCORE`].
//! 5. Truncate to `limit`.
//!
//! Results are memoized per `(query, category, sorted tags, limit)` in a
//! bounded TTL cache. Rebuilding the index clears the memo.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::error::{CatalogError, Result};
use crate::fuzzy::{match_term, tokenize};
use crate::models::{MatchSpan, SearchQuery, SearchResult, ServiceRecord};
use crate::ttl_cache::TtlCache;

/// Score for exact/no-query matches (lower is better).
pub const BEST_SCORE: f64 = 0.0;

/// Fixed score assigned to every substring-fallback hit.
pub const FALLBACK_SCORE: f64 = 0.5;

/// Fuzzy terms shorter than this are dropped before ranking.
const MIN_TERM_LEN: usize = 2;

const FIELD_WEIGHTS: [(&str, f64); 6] = [
    ("name", 0.25),
    ("description", 0.35),
    ("freeTier", 0.25),
    ("category", 0.10),
    ("tags", 0.05),
    ("limitation", 0.05),
];

/// Tuning knobs for the engine, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Allowed edit errors per term character (see [`crate::fuzzy`]).
    pub fuzzy_threshold: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            cache_ttl: Duration::from_secs(5 * 60),
            fuzzy_threshold: 0.34,
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub record_count: usize,
    pub cache_entries: usize,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    category: String,
    tags: Vec<String>,
    limit: usize,
}

impl From<&SearchQuery> for CacheKey {
    fn from(q: &SearchQuery) -> Self {
        let mut tags = q.tags.clone().unwrap_or_default();
        tags.sort();
        Self {
            query: q.query.clone().unwrap_or_default(),
            category: q.category.clone().unwrap_or_default(),
            tags,
            limit: q.limit,
        }
    }
}

struct Field {
    name: &'static str,
    weight: f64,
    text: Vec<char>,
}

struct IndexedRecord {
    record: ServiceRecord,
    category_lower: String,
    tags_lower: Vec<String>,
    fields: Vec<Field>,
    /// Lowercase concatenation of all searchable fields for the fallback.
    haystack: String,
}

impl IndexedRecord {
    fn new(record: &ServiceRecord) -> Self {
        let tags = record.tag_list().join(" ");
        let limitation = record.limitation.clone().unwrap_or_default();
        let texts = [
            record.name.as_str(),
            record.description.as_str(),
            record.free_tier.as_str(),
            record.category.as_str(),
            tags.as_str(),
            limitation.as_str(),
        ];

        let fields = FIELD_WEIGHTS
            .iter()
            .zip(texts)
            .map(|(&(name, weight), text)| Field {
                name,
                weight,
                text: text.to_lowercase().chars().collect(),
            })
            .collect();

        let haystack = [
            record.name.as_str(),
            record.description.as_str(),
            record.free_tier.as_str(),
            record.category.as_str(),
            limitation.as_str(),
            tags.as_str(),
        ]
        .join(" ")
        .to_lowercase();

        Self {
            record: record.clone(),
            category_lower: record.category.to_lowercase(),
            tags_lower: record.tag_list().iter().map(|t| t.to_lowercase()).collect(),
            fields,
            haystack,
        }
    }
}

/// Fuzzy, filterable search over one generation of catalog records.
pub struct SearchEngine {
    records: Option<Vec<IndexedRecord>>,
    memo: Mutex<TtlCache<CacheKey, Vec<SearchResult>>>,
    fuzzy_threshold: f64,
}

impl SearchEngine {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            records: None,
            memo: Mutex::new(TtlCache::new(settings.cache_capacity, settings.cache_ttl)),
            fuzzy_threshold: settings.fuzzy_threshold,
        }
    }

    /// Replace the index with `services` and drop all memoized results.
    pub fn build_index(&mut self, services: &[ServiceRecord]) {
        self.records = Some(services.iter().map(IndexedRecord::new).collect());
        self.invalidate_cache();
        tracing::debug!(records = services.len(), "search index rebuilt");
    }

    pub fn is_ready(&self) -> bool {
        self.records.is_some()
    }

    fn index(&self) -> Result<&[IndexedRecord]> {
        self.records.as_deref().ok_or(CatalogError::IndexNotReady)
    }

    fn memo(&self) -> MutexGuard<'_, TtlCache<CacheKey, Vec<SearchResult>>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the query pipeline, serving repeated queries from the memo.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let index = self.index()?;
        let key = CacheKey::from(query);
        if let Some(cached) = self.memo().get(&key) {
            return Ok(cached);
        }

        let candidates = filter_candidates(index, query);
        let mut results = match query.trimmed_query() {
            Some(text) => {
                let ranked = self.rank(&candidates, text);
                if ranked.is_empty() {
                    tracing::debug!(query = text, "no fuzzy matches; using substring fallback");
                    substring_fallback(&candidates, text)
                } else {
                    ranked
                }
            }
            None => candidates
                .iter()
                .map(|r| SearchResult {
                    record: r.record.clone(),
                    score: BEST_SCORE,
                    match_spans: None,
                })
                .collect(),
        };
        results.truncate(query.limit);

        self.memo().insert(key, results.clone());
        Ok(results)
    }

    fn rank(&self, candidates: &[&IndexedRecord], text: &str) -> Vec<SearchResult> {
        let terms: Vec<(String, Vec<char>)> = tokenize(text)
            .into_iter()
            .filter(|t| t.chars().count() >= MIN_TERM_LEN)
            .map(|t| {
                let chars = t.chars().collect();
                (t, chars)
            })
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let total_weight: f64 = FIELD_WEIGHTS.iter().map(|(_, w)| w).sum();
        let mut results: Vec<SearchResult> = Vec::new();

        for candidate in candidates {
            let mut relevance = 0.0;
            let mut spans: Vec<MatchSpan> = Vec::new();

            for field in &candidate.fields {
                let mut quality = 0.0;
                for (term, chars) in &terms {
                    if let Some(m) = match_term(chars, &field.text, self.fuzzy_threshold) {
                        quality += m.quality;
                        spans.push(MatchSpan {
                            field: field.name,
                            term: term.clone(),
                            errors: m.errors,
                        });
                    }
                }
                relevance += field.weight * quality / terms.len() as f64;
            }

            if spans.is_empty() {
                continue;
            }
            let score = (1.0 - relevance / total_weight).clamp(0.0, 1.0);
            results.push(SearchResult {
                record: candidate.record.clone(),
                score,
                match_spans: Some(spans),
            });
        }

        // Stable: equal scores keep document order.
        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        results
    }

    /// Records related to `record` by category and shared tags.
    ///
    /// Exclusion is by exact name, so distinct entries sharing a display
    /// name are also excluded.
    pub fn similar(&self, record: &ServiceRecord, limit: usize) -> Result<Vec<ServiceRecord>> {
        let index = self.index()?;
        let others = index.iter().map(|r| &r.record).filter(|r| r.name != record.name);

        if !record.has_tags() {
            return Ok(others
                .filter(|r| r.category == record.category)
                .take(limit)
                .cloned()
                .collect());
        }

        let source_tags = record.tag_list();
        let mut scored: Vec<(u32, &ServiceRecord)> = others
            .map(|r| {
                let mut score = 0;
                if r.category == record.category {
                    score += 2;
                }
                let shared = r.tag_list().iter().filter(|t| source_tags.contains(t)).count();
                score += 3 * shared as u32;
                (score, r)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    /// Drop every memoized query result.
    pub fn invalidate_cache(&self) {
        self.memo().clear();
    }

    pub fn stats(&self) -> SearchStats {
        let memo = self.memo();
        SearchStats {
            record_count: self.records.as_ref().map_or(0, Vec::len),
            cache_entries: memo.len(),
            cache_capacity: memo.capacity(),
        }
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(SearchSettings::default())
    }
}

fn filter_candidates<'a>(index: &'a [IndexedRecord], query: &SearchQuery) -> Vec<&'a IndexedRecord> {
    let category = query
        .category
        .as_deref()
        .map(str::to_lowercase)
        .filter(|c| !c.is_empty());
    let tags: Vec<String> = query
        .tags
        .iter()
        .flatten()
        .map(|t| t.to_lowercase())
        .collect();

    index
        .iter()
        .filter(|r| match &category {
            Some(c) => r.category_lower == *c || r.category_lower.contains(c.as_str()),
            None => true,
        })
        .filter(|r| tags.is_empty() || r.tags_lower.iter().any(|t| tags.contains(t)))
        .collect()
}

fn substring_fallback(candidates: &[&IndexedRecord], text: &str) -> Vec<SearchResult> {
    let lower = text.to_lowercase();
    let terms: Vec<&str> = lower.split_whitespace().collect();
    candidates
        .iter()
        .filter(|r| terms.iter().any(|t| r.haystack.contains(t)))
        .map(|r| SearchResult {
            record: r.record.clone(),
            score: FALLBACK_SCORE,
            match_spans: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, category: &str, description: &str, tags: &[&str]) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            url: format!("https://{}.example", name.to_lowercase().replace(' ', "-")),
            description: description.to_string(),
            free_tier: description.to_string(),
            category: category.to_string(),
            limitation: None,
            tags: if tags.is_empty() {
                None
            } else {
                Some(tags.iter().map(|t| t.to_string()).collect())
            },
        }
    }

    fn fixture() -> Vec<ServiceRecord> {
        vec![
            record("Postgres Cloud", "Database", "Managed Postgres", &["cloud", "database"]),
            record("KeyStore", "Database", "Key value store", &[]),
            record("Pages", "Web Hosting", "Static site hosting", &["hosting"]),
            record("Runner", "CI and CD", "Build pipelines for C++ projects", &["cicd"]),
            record("Mailer", "Email", "Transactional email", &["email", "api"]),
            record("LogBox", "Monitoring", "Log monitoring for cloud apps", &["monitoring", "cloud"]),
        ]
    }

    fn engine() -> SearchEngine {
        let mut engine = SearchEngine::default();
        engine.build_index(&fixture());
        engine
    }

    #[test]
    fn test_search_before_index_fails() {
        let engine = SearchEngine::default();
        assert!(matches!(
            engine.search(&SearchQuery::text("db")),
            Err(CatalogError::IndexNotReady)
        ));
        assert!(matches!(
            engine.similar(&fixture()[0], 3),
            Err(CatalogError::IndexNotReady)
        ));
    }

    #[test]
    fn test_typo_matches_via_fuzzy_stage() {
        let results = engine().search(&SearchQuery::text("databse").with_limit(5)).unwrap();
        assert!(results.iter().any(|r| r.record.name == "Postgres Cloud"));
        assert!(results.iter().all(|r| r.score != FALLBACK_SCORE));
        assert!(results.iter().all(|r| r.match_spans.is_some()));
    }

    #[test]
    fn test_scores_ascending() {
        let results = engine().search(&SearchQuery::text("cloud monitoring")).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].record.name, "LogBox");
        for pair in results.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
        for r in &results {
            assert!((0.0..=1.0).contains(&r.score));
        }
    }

    #[test]
    fn test_unrelated_records_not_matched() {
        let results = engine().search(&SearchQuery::text("transactional")).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(names, vec!["Mailer"]);
    }

    #[test]
    fn test_fallback_uses_fixed_score() {
        // "c++" has no fuzzy terms of usable length, only a literal hit.
        let results = engine().search(&SearchQuery::text("c++")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.name, "Runner");
        assert_eq!(results[0].score, FALLBACK_SCORE);
        assert!(results[0].match_spans.is_none());
    }

    #[test]
    fn test_category_filter_without_query_preserves_order() {
        let results = engine()
            .search(&SearchQuery::default().with_category("database"))
            .unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(names, vec!["Postgres Cloud", "KeyStore"]);
        assert!(results.iter().all(|r| r.score == BEST_SCORE));
    }

    #[test]
    fn test_category_filter_is_substring() {
        let results = engine()
            .search(&SearchQuery::default().with_category("HOSTING"))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.category, "Web Hosting");
    }

    #[test]
    fn test_tag_filter_match_any_case_insensitive() {
        let results = engine()
            .search(&SearchQuery::default().with_tags(["EMAIL", "hosting"]))
            .unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(names, vec!["Pages", "Mailer"]);
    }

    #[test]
    fn test_filters_apply_before_ranking() {
        let results = engine()
            .search(&SearchQuery::text("cloud").with_tags(["monitoring"]))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.name, "LogBox");
    }

    #[test]
    fn test_limit_truncates_after_ranking() {
        let results = engine().search(&SearchQuery::default().with_limit(2)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.name, "Postgres Cloud");
    }

    #[test]
    fn test_repeated_query_served_from_memo() {
        let engine = engine();
        let q = SearchQuery::text("hosting").with_limit(5);
        let first = engine.search(&q).unwrap();
        let second = engine.search(&q).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.stats().cache_entries, 1);

        engine.invalidate_cache();
        assert_eq!(engine.stats().cache_entries, 0);
    }

    #[test]
    fn test_tag_order_shares_cache_key() {
        let engine = engine();
        engine
            .search(&SearchQuery::default().with_tags(["email", "api"]))
            .unwrap();
        engine
            .search(&SearchQuery::default().with_tags(["api", "email"]))
            .unwrap();
        assert_eq!(engine.stats().cache_entries, 1);
    }

    #[test]
    fn test_rebuild_invalidates_memo() {
        let mut engine = engine();
        let q = SearchQuery::default().with_category("email");
        assert_eq!(engine.search(&q).unwrap().len(), 1);

        engine.build_index(&fixture()[..2]);
        assert_eq!(engine.stats().cache_entries, 0);
        assert!(engine.search(&q).unwrap().is_empty());
    }

    #[test]
    fn test_similar_scores_tags_and_category() {
        let engine = engine();
        let source = &fixture()[0]; // Postgres Cloud: Database, [cloud, database]
        let similar = engine.similar(source, 5).unwrap();
        let names: Vec<&str> = similar.iter().map(|r| r.name.as_str()).collect();
        // LogBox shares "cloud" (3); KeyStore shares the category (2).
        assert_eq!(names, vec!["LogBox", "KeyStore"]);
    }

    #[test]
    fn test_similar_without_tags_uses_category() {
        let engine = engine();
        let source = &fixture()[1]; // KeyStore: Database, no tags
        let similar = engine.similar(source, 5).unwrap();
        let names: Vec<&str> = similar.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Postgres Cloud"]);
    }

    #[test]
    fn test_similar_excludes_by_name_and_limits() {
        let mut services = fixture();
        let mut twin = services[4].clone();
        twin.url = "https://other-mailer.example".into();
        services.push(twin);
        services.push(record("Sender", "Email", "Bulk email", &["email"]));
        let mut engine = SearchEngine::default();
        engine.build_index(&services);

        let similar = engine.similar(&services[4], 1).unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].name, "Sender");
    }
}
