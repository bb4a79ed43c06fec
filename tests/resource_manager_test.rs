//! ResourceManager behavior with in-process providers

use async_trait::async_trait;
use resource_relay::{
    resources::default_cache_key, Cache, CacheOptions, CacheRegistry, RelayError, RelayResult,
    Resource, ResourceManager, ResourceProvider,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serves a fixed set of resources, counting list/read calls.
struct StaticProvider {
    prefix: String,
    resources: Vec<Resource>,
    list_calls: AtomicU32,
    read_calls: AtomicU32,
    cache_reads: bool,
}

impl StaticProvider {
    fn new(prefix: &str, uris: &[&str]) -> Self {
        Self {
            prefix: prefix.to_string(),
            resources: uris.iter().map(|u| Resource::new(*u, *u)).collect(),
            list_calls: AtomicU32::new(0),
            read_calls: AtomicU32::new(0),
            cache_reads: true,
        }
    }

    fn uncached(prefix: &str, uris: &[&str]) -> Self {
        Self {
            cache_reads: false,
            ..Self::new(prefix, uris)
        }
    }

    fn reads(&self) -> u32 {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn lists(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProvider for StaticProvider {
    async fn list_resources(&self) -> RelayResult<Vec<Resource>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.resources.clone())
    }

    async fn read_resource(&self, uri: &str) -> RelayResult<String> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if uri.starts_with(&self.prefix) {
            Ok(format!("body of {}", uri))
        } else {
            Err(RelayError::ResourceNotFound(uri.to_string()))
        }
    }

    fn should_cache(&self, _uri: &str) -> bool {
        self.cache_reads
    }
}

/// Fails everything, for partial-failure scenarios.
struct BrokenProvider;

#[async_trait]
impl ResourceProvider for BrokenProvider {
    async fn list_resources(&self) -> RelayResult<Vec<Resource>> {
        Err(RelayError::Transport("worker is down".to_string()))
    }

    async fn read_resource(&self, uri: &str) -> RelayResult<String> {
        Err(RelayError::ResourceNotFound(uri.to_string()))
    }
}

/// Supplies a custom cache key and TTL per URI.
struct CustomKeyProvider;

#[async_trait]
impl ResourceProvider for CustomKeyProvider {
    async fn list_resources(&self) -> RelayResult<Vec<Resource>> {
        Ok(vec![])
    }

    async fn read_resource(&self, uri: &str) -> RelayResult<String> {
        Ok(format!("custom body of {}", uri))
    }

    fn cache_key(&self, uri: &str) -> Option<String> {
        Some(format!("custom:{}", uri))
    }

    fn cache_ttl(&self, _uri: &str) -> Option<Duration> {
        Some(Duration::from_millis(40))
    }
}

fn manager_with_caches() -> (ResourceManager, Arc<Cache>, Arc<Cache>) {
    let body = Arc::new(Cache::new("bodies", CacheOptions::default()));
    let list = Arc::new(Cache::new("listings", CacheOptions::default()));
    let manager = ResourceManager::with_caches(body.clone(), list.clone());
    (manager, body, list)
}

#[tokio::test]
async fn test_read_falls_back_through_providers_in_order() {
    let (manager, _, _) = manager_with_caches();
    manager.register_provider("broken", Arc::new(BrokenProvider));
    manager.register_provider("docs", Arc::new(StaticProvider::new("doc://", &["doc://a"])));

    let body = manager.read_resource("doc://a").await.unwrap();
    assert_eq!(body, "body of doc://a");
}

#[tokio::test]
async fn test_read_with_no_matching_provider_names_the_uri() {
    let (manager, _, _) = manager_with_caches();
    manager.register_provider("broken", Arc::new(BrokenProvider));

    let err = manager.read_resource("ghost://x").await.unwrap_err();
    assert!(matches!(err, RelayError::NoProviderFound(_)));
    assert!(err.to_string().contains("ghost://x"));
}

#[tokio::test]
async fn test_read_with_no_providers_fails() {
    let (manager, _, _) = manager_with_caches();
    let err = manager.read_resource("doc://a").await.unwrap_err();
    assert!(matches!(err, RelayError::NoProviderFound(_)));
}

#[tokio::test]
async fn test_listing_aggregates_and_skips_failing_providers() {
    let (manager, _, _) = manager_with_caches();
    manager.register_provider("broken", Arc::new(BrokenProvider));
    manager.register_provider(
        "docs",
        Arc::new(StaticProvider::new("doc://", &["doc://a", "doc://b"])),
    );
    manager.register_provider("notes", Arc::new(StaticProvider::new("note://", &["note://x"])));

    let resources = manager.list_resources().await.unwrap();
    let uris: Vec<&str> = resources.iter().map(|r| r.uri.as_str()).collect();
    assert_eq!(uris, vec!["doc://a", "doc://b", "note://x"]);
}

#[tokio::test]
async fn test_listing_is_cached() {
    let (manager, _, _) = manager_with_caches();
    let docs = Arc::new(StaticProvider::new("doc://", &["doc://a"]));
    manager.register_provider("docs", docs.clone());

    manager.list_resources().await.unwrap();
    manager.list_resources().await.unwrap();
    assert_eq!(docs.lists(), 1);
}

#[tokio::test]
async fn test_read_is_cached_until_invalidated() {
    let (manager, _, _) = manager_with_caches();
    let docs = Arc::new(StaticProvider::new("doc://", &["doc://a"]));
    manager.register_provider("docs", docs.clone());

    manager.read_resource("doc://a").await.unwrap();
    manager.read_resource("doc://a").await.unwrap();
    assert_eq!(docs.reads(), 1);

    manager.invalidate_cache(Some("doc://a")).await;
    manager.read_resource("doc://a").await.unwrap();
    assert_eq!(docs.reads(), 2);
}

#[tokio::test]
async fn test_provider_can_opt_out_of_caching() {
    let (manager, _, _) = manager_with_caches();
    let docs = Arc::new(StaticProvider::uncached("doc://", &["doc://a"]));
    manager.register_provider("docs", docs.clone());

    manager.read_resource("doc://a").await.unwrap();
    manager.read_resource("doc://a").await.unwrap();
    assert_eq!(docs.reads(), 2);
}

#[tokio::test]
async fn test_provider_supplied_cache_key_and_ttl() {
    let (manager, body_cache, _) = manager_with_caches();
    manager.register_provider("custom", Arc::new(CustomKeyProvider));

    let body = manager.read_resource("doc://a").await.unwrap();
    assert_eq!(body, "custom body of doc://a");

    // Stored under the provider's key, not the default one.
    assert!(body_cache.get("custom:doc://a").await.is_some());
    assert!(body_cache.get(&default_cache_key("doc://a")).await.is_none());

    // And it honors the provider's short TTL.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(body_cache.get("custom:doc://a").await.is_none());
}

#[tokio::test]
async fn test_invalidate_all_clears_bodies_and_listing() {
    let (manager, _, _) = manager_with_caches();
    let docs = Arc::new(StaticProvider::new("doc://", &["doc://a"]));
    manager.register_provider("docs", docs.clone());

    manager.read_resource("doc://a").await.unwrap();
    manager.list_resources().await.unwrap();

    manager.invalidate_cache(None).await;

    manager.read_resource("doc://a").await.unwrap();
    manager.list_resources().await.unwrap();
    assert_eq!(docs.reads(), 2);
    assert_eq!(docs.lists(), 2);
}

#[tokio::test]
async fn test_notify_resource_change_for_one_uri() {
    let (manager, _, _) = manager_with_caches();
    let docs = Arc::new(StaticProvider::new("doc://", &["doc://a", "doc://b"]));
    manager.register_provider("docs", docs.clone());

    manager.read_resource("doc://a").await.unwrap();
    manager.read_resource("doc://b").await.unwrap();
    manager.list_resources().await.unwrap();

    manager.notify_resource_change("docs", Some("doc://a")).await.unwrap();

    // Only doc://a refetches; the listing always refreshes.
    manager.read_resource("doc://a").await.unwrap();
    manager.read_resource("doc://b").await.unwrap();
    assert_eq!(docs.reads(), 3);
    manager.list_resources().await.unwrap();
    assert_eq!(docs.lists(), 2);
}

#[tokio::test]
async fn test_notify_resource_change_by_provider_pattern() {
    let (manager, _, _) = manager_with_caches();
    let docs = Arc::new(StaticProvider::new("doc://", &["doc://a"]));
    let notes = Arc::new(StaticProvider::new("note://", &["note://x"]));
    manager.register_provider("docs", docs.clone());
    manager.register_provider("notes", notes.clone());

    manager.read_resource("doc://a").await.unwrap();
    // Falls through docs (a counted failed attempt) before notes resolves.
    manager.read_resource("note://x").await.unwrap();
    assert_eq!(docs.reads(), 2);
    assert_eq!(notes.reads(), 1);

    // The pattern is built from the provider name, which here appears in
    // the cached keys through the URI scheme.
    manager.notify_resource_change("doc", None).await.unwrap();

    manager.read_resource("doc://a").await.unwrap();
    assert_eq!(docs.reads(), 3);
    manager.read_resource("note://x").await.unwrap();
    assert_eq!(notes.reads(), 1);
}

#[tokio::test]
async fn test_pattern_invalidation_delegates_to_body_cache() {
    let (manager, _, _) = manager_with_caches();
    let docs = Arc::new(StaticProvider::new("doc://", &["doc://a", "doc://b"]));
    manager.register_provider("docs", docs.clone());

    manager.read_resource("doc://a").await.unwrap();
    manager.read_resource("doc://b").await.unwrap();

    let removed = manager.invalidate_cache_pattern(".*doc://a.*").await.unwrap();
    assert_eq!(removed, 1);

    manager.read_resource("doc://a").await.unwrap();
    manager.read_resource("doc://b").await.unwrap();
    assert_eq!(docs.reads(), 3);
}

#[tokio::test]
async fn test_unregister_provider() {
    let (manager, _, _) = manager_with_caches();
    manager.register_provider("docs", Arc::new(StaticProvider::new("doc://", &["doc://a"])));

    assert!(manager.unregister_provider("docs"));
    assert!(!manager.unregister_provider("docs"));
    assert!(manager.provider_names().is_empty());

    let err = manager.read_resource("doc://a").await.unwrap_err();
    assert!(matches!(err, RelayError::NoProviderFound(_)));
}

#[tokio::test]
async fn test_reregistering_same_name_replaces_in_place() {
    let (manager, _, _) = manager_with_caches();
    manager.register_provider("docs", Arc::new(StaticProvider::new("doc://", &["doc://a"])));
    manager.register_provider(
        "docs",
        Arc::new(StaticProvider::new("doc://", &["doc://a", "doc://b"])),
    );

    assert_eq!(manager.provider_names(), vec!["docs"]);
    let resources = manager.list_resources().await.unwrap();
    assert_eq!(resources.len(), 2);
}

#[tokio::test]
async fn test_manager_from_registry_uses_named_caches() {
    let registry = CacheRegistry::new();
    let manager = ResourceManager::new(&registry);
    manager.register_provider("docs", Arc::new(StaticProvider::new("doc://", &["doc://a"])));

    manager.read_resource("doc://a").await.unwrap();

    let mut names = registry.names();
    names.sort();
    assert_eq!(names, vec!["resource-bodies", "resource-listings"]);
}
