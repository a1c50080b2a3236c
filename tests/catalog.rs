use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use freetier_catalog::catalog::CatalogService;
use freetier_catalog::error::{CatalogError, Result};
use freetier_catalog::fetch::{Fetcher, FileFetcher};
use freetier_catalog::models::{SearchQuery, ServiceLookup};
use freetier_catalog::search::{SearchSettings, FALLBACK_SCORE};
use freetier_catalog::store::{
    CacheEntry, CacheManager, CacheSettings, DurableStore, JsonFileStore, CACHE_FILE,
};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/free-for-dev.md")
}

fn fixture() -> String {
    std::fs::read_to_string(fixture_path()).unwrap()
}

/// Serves a swappable document and counts fetches.
struct StubFetcher {
    body: Mutex<Option<String>>,
    calls: Arc<AtomicUsize>,
}

impl StubFetcher {
    fn new(body: Option<String>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                body: Mutex::new(body),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch_raw(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CatalogError::Fetch("stub offline".into()))
    }

    fn source(&self) -> String {
        "stub".into()
    }
}

fn cache(dir: &TempDir) -> CacheManager {
    CacheManager::new(
        Box::new(JsonFileStore::new(dir.path())),
        CacheSettings::default(),
    )
}

fn service_with(fetcher: impl Fetcher + 'static, dir: &TempDir) -> CatalogService {
    CatalogService::new(Box::new(fetcher), cache(dir), SearchSettings::default())
}

async fn ready_service(dir: &TempDir) -> CatalogService {
    let service = service_with(FileFetcher::new(fixture_path()), dir);
    service.initialize().await.unwrap();
    service
}

fn names_of(results: &[freetier_catalog::models::SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.record.name.as_str()).collect()
}

fn names(records: &[freetier_catalog::models::ServiceRecord]) -> Vec<&str> {
    records.iter().map(|r| r.name.as_str()).collect()
}

#[tokio::test]
async fn test_queries_before_initialize_fail() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(FileFetcher::new(fixture_path()), &tmp);

    assert!(!service.is_initialized());
    assert!(matches!(
        service.search(&SearchQuery::text("db")),
        Err(CatalogError::IndexNotReady)
    ));
    assert!(matches!(
        service.similar("Pages", 3),
        Err(CatalogError::IndexNotReady)
    ));
    assert!(matches!(
        service.categories(),
        Err(CatalogError::IndexNotReady)
    ));
    assert!(!service.stats().initialized);
}

#[tokio::test]
async fn test_initialize_parses_fixture() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    assert_eq!(
        service.categories().unwrap(),
        vec!["Major Cloud Providers", "Database", "Web Hosting", "Email"]
    );
    let snapshot = service.snapshot().unwrap();
    assert_eq!(snapshot.services.len(), 9);

    let postgres = service
        .get_service(&ServiceLookup {
            name: Some("postgres cloud".into()),
            url: None,
        })
        .unwrap()
        .unwrap();
    assert_eq!(postgres.url, "https://postgres.example.com");
    assert_eq!(postgres.description, "Managed Postgres database");
    assert_eq!(postgres.free_tier, "500MB storage, 1 database");
    assert_eq!(postgres.category, "Database");
    assert_eq!(postgres.limitation.as_deref(), Some("500MB"));
    assert_eq!(
        postgres.tags,
        Some(vec!["cloud".into(), "database".into(), "storage".into()])
    );

    assert!(tmp.path().join(CACHE_FILE).exists());
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let (fetcher, calls) = StubFetcher::new(Some(fixture()));
    let service = service_with(fetcher, &tmp);

    service.initialize().await.unwrap();
    service.initialize().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_instance_loads_from_cache() {
    let tmp = TempDir::new().unwrap();
    let first = ready_service(&tmp).await;
    let expected = first.snapshot().unwrap();

    let (offline, calls) = StubFetcher::new(None);
    let second = service_with(offline, &tmp);
    second.initialize().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.snapshot().unwrap().services, expected.services);
}

#[tokio::test]
async fn test_corrupt_cache_falls_back_to_fetch() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(CACHE_FILE), "{ definitely not json").unwrap();

    let (fetcher, calls) = StubFetcher::new(Some(fixture()));
    let service = service_with(fetcher, &tmp);
    service.initialize().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.snapshot().unwrap().services.len(), 9);

    // The corrupt file was replaced with a readable one.
    let reloaded = JsonFileStore::new(tmp.path()).load().await.unwrap();
    assert!(reloaded.is_some());
}

#[tokio::test]
async fn test_stale_cache_is_refetched() {
    let tmp = TempDir::new().unwrap();
    let seeded = ready_service(&tmp).await.snapshot().unwrap();

    let store = JsonFileStore::new(tmp.path());
    let mut entry = CacheEntry::new((*seeded).clone());
    entry.saved_at = Utc::now() - chrono::Duration::hours(25);
    store.save(&entry).await.unwrap();

    let (fetcher, calls) = StubFetcher::new(Some(fixture()));
    let service = service_with(fetcher, &tmp);
    service.initialize().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_schema_mismatch_is_refetched() {
    let tmp = TempDir::new().unwrap();
    let seeded = ready_service(&tmp).await.snapshot().unwrap();

    let store = JsonFileStore::new(tmp.path());
    let mut entry = CacheEntry::new((*seeded).clone());
    entry.schema_version = "0.1.0".into();
    store.save(&entry).await.unwrap();

    let (fetcher, calls) = StubFetcher::new(Some(fixture()));
    let service = service_with(fetcher, &tmp);
    service.initialize().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fetch_failure_without_cache_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let (offline, _) = StubFetcher::new(None);
    let service = service_with(offline, &tmp);

    assert!(matches!(
        service.initialize().await,
        Err(CatalogError::Fetch(_))
    ));
    assert!(!service.is_initialized());
}

#[tokio::test]
async fn test_empty_document_is_parse_error() {
    let tmp = TempDir::new().unwrap();
    let (fetcher, _) = StubFetcher::new(Some("   \n\n".into()));
    let service = service_with(fetcher, &tmp);

    assert!(matches!(
        service.initialize().await,
        Err(CatalogError::Parse(_))
    ));
}

#[tokio::test]
async fn test_refresh_invalidates_memo_and_swaps_snapshot() {
    let tmp = TempDir::new().unwrap();
    let (fetcher, calls) = StubFetcher::new(Some(fixture()));
    let body = Arc::new(fetcher);
    let service = CatalogService::new(
        Box::new(SharedFetcher(body.clone())),
        cache(&tmp),
        SearchSettings::default(),
    );
    service.initialize().await.unwrap();

    let query = SearchQuery::default().with_category("email");
    assert_eq!(service.search(&query).unwrap().len(), 2);
    assert_eq!(service.stats().search.cache_entries, 1);

    *body.body.lock().unwrap() = Some(
        "## Email\n\n* [Relay](https://relay.example.com) — SMTP relay — 100 emails/day\n".into(),
    );
    let summary = service.refresh().await.unwrap();
    assert!(summary.changed);
    assert_eq!(summary.services, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(service.stats().search.cache_entries, 0);
    let results = service.search(&query).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.name, "Relay");
}

#[tokio::test]
async fn test_refresh_same_content_reports_unchanged() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;
    let summary = service.refresh().await.unwrap();
    assert!(!summary.changed);
    assert_eq!(summary.services, 9);
    assert_eq!(summary.categories, 4);
}

struct SharedFetcher(Arc<StubFetcher>);

#[async_trait]
impl Fetcher for SharedFetcher {
    async fn fetch_raw(&self) -> Result<String> {
        self.0.fetch_raw().await
    }

    fn source(&self) -> String {
        self.0.source()
    }
}

#[tokio::test]
async fn test_typo_search_finds_database_service() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    let results = service
        .search(&SearchQuery::text("databse").with_limit(5))
        .unwrap();
    assert!(results.len() <= 5);
    assert!(results
        .iter()
        .any(|r| r.record.name == "Postgres Cloud" && r.record.category == "Database"));
    for pair in results.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
}

#[tokio::test]
async fn test_search_filters_and_fallback() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    let results = service
        .search(&SearchQuery::text("storage").with_category("database"))
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.record.category == "Database"));

    let results = service
        .search(&SearchQuery::default().with_tags(["SERVERLESS"]))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.name, "Edge Functions");

    let results = service.search(&SearchQuery::text("f1-micro")).unwrap();
    assert_eq!(results[0].record.name, "Google Cloud");

    // Single-character terms are too short to rank.
    let results = service.search(&SearchQuery::text("@")).unwrap();
    assert!(results.is_empty());
    // "rust" only occurs inside "infrastructure": a literal hit, never a fuzzy one.
    let results = service.search(&SearchQuery::text("rust")).unwrap();
    assert_eq!(names_of(&results), vec!["Oracle Cloud"]);
    assert!(results
        .iter()
        .all(|r| r.match_spans.is_none() && r.score == FALLBACK_SCORE));

    let results = service.search(&SearchQuery::text("x")).unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.score == FALLBACK_SCORE));
}

#[tokio::test]
async fn test_basic_search() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    let found = service.basic_search(&SearchQuery::text("EMAIL")).unwrap();
    assert_eq!(names(&found), vec!["Mailer", "Inbox"]);

    let found = service
        .basic_search(&SearchQuery::default().with_category("host"))
        .unwrap();
    assert_eq!(names(&found), vec!["Pages", "Edge Functions"]);

    let found = service
        .basic_search(&SearchQuery::default().with_tags(["free"]).with_limit(2))
        .unwrap();
    assert_eq!(names(&found), vec!["Google Cloud", "Oracle Cloud"]);

    // Typos get no help here.
    assert!(service
        .basic_search(&SearchQuery::text("databse"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_similar_services() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    let similar = service.similar("postgres cloud", 3).unwrap().unwrap();
    // Google/Oracle share cloud+storage (6), DocStore shares category+database (5).
    assert_eq!(
        names(&similar),
        vec!["Google Cloud", "Oracle Cloud", "DocStore"]
    );

    // Tagless source: same category, catalog order.
    let similar = service.similar("KeyValue", 5).unwrap().unwrap();
    assert_eq!(names(&similar), vec!["Postgres Cloud", "DocStore"]);

    assert!(service.similar("No Such Service", 5).unwrap().is_none());
}

#[tokio::test]
async fn test_get_service_prefers_url() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    let found = service
        .get_service(&ServiceLookup {
            name: Some("Mailer".into()),
            url: Some("https://pages.example.com".into()),
        })
        .unwrap()
        .unwrap();
    assert_eq!(found.name, "Pages");

    // URL miss falls back to the name.
    let found = service
        .get_service(&ServiceLookup {
            name: Some("MAILER".into()),
            url: Some("https://nowhere.example.com".into()),
        })
        .unwrap()
        .unwrap();
    assert_eq!(found.name, "Mailer");

    assert!(service
        .get_service(&ServiceLookup {
            name: Some("Nope".into()),
            url: None,
        })
        .unwrap()
        .is_none());
    assert!(service.get_service(&ServiceLookup::default()).unwrap().is_none());
}

#[tokio::test]
async fn test_get_service_url_is_exact_match() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    for url in [
        "HTTPS://PAGES.EXAMPLE.COM",
        "https://pages.example.com/",
        "pages.example.com",
    ] {
        let found = service
            .get_service(&ServiceLookup {
                name: None,
                url: Some(url.into()),
            })
            .unwrap();
        assert!(found.is_none(), "{url} should not match");
    }
}

#[tokio::test]
async fn test_listings() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;

    let counts = service.categories_with_count().unwrap();
    let pairs: Vec<(&str, usize)> = counts.iter().map(|c| (c.name.as_str(), c.count)).collect();
    assert_eq!(
        pairs,
        vec![
            ("Major Cloud Providers", 2),
            ("Database", 3),
            ("Web Hosting", 2),
            ("Email", 2),
        ]
    );

    assert_eq!(
        service.all_tags().unwrap(),
        vec!["api", "cloud", "database", "email", "free", "hosting", "serverless", "storage"]
    );

    let popular = service.popular(3).unwrap();
    assert_eq!(names(&popular), vec!["Google Cloud", "DocStore", "Postgres Cloud"]);
}

#[tokio::test]
async fn test_stats_after_initialize() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;
    let stats = service.stats();

    assert!(stats.initialized);
    assert_eq!(stats.total_services, 9);
    assert_eq!(stats.total_categories, 4);
    assert_eq!(stats.services_with_tags, 8);
    assert_eq!(stats.services_with_limitations, 7);
    assert!(stats.last_updated.is_some());
    assert_eq!(stats.source_digest.as_deref().map(str::len), Some(64));
    assert!(stats.cache.location.ends_with(CACHE_FILE));
}

#[tokio::test]
async fn test_clear_cache_keeps_published_snapshot() {
    let tmp = TempDir::new().unwrap();
    let service = ready_service(&tmp).await;
    service.clear_cache().await.unwrap();

    assert!(!tmp.path().join(CACHE_FILE).exists());
    assert!(service.is_initialized());
    assert_eq!(service.categories().unwrap().len(), 4);
}
