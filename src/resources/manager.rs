//! Cached aggregation over registered resource providers

use crate::cache::{Cache, CacheOptions, CacheRegistry, SetOptions};
use crate::core::protocol::Resource;
use crate::resources::provider::ResourceProvider;
use crate::utils::errors::{RelayError, RelayResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key under which the aggregated listing is cached.
pub const LISTING_CACHE_KEY: &str = "resources:all";

const BODY_CACHE: &str = "resource-bodies";
const LISTING_CACHE: &str = "resource-listings";

type ProviderEntry = (String, Arc<dyn ResourceProvider>);

/// Aggregates heterogeneous resource providers behind one cached
/// read/list surface. Reads fall back through providers in registration
/// order; listings concatenate whatever each provider can deliver.
pub struct ResourceManager {
    providers: RwLock<Vec<ProviderEntry>>,
    body_cache: Arc<Cache>,
    list_cache: Arc<Cache>,
}

impl ResourceManager {
    /// Build with per-purpose caches from the injected registry.
    pub fn new(registry: &CacheRegistry) -> Self {
        let body_cache = registry.get_cache(BODY_CACHE, CacheOptions::default());
        let list_cache = registry.get_cache(
            LISTING_CACHE,
            CacheOptions {
                ttl: Duration::from_secs(60),
                ..Default::default()
            },
        );
        Self::with_caches(body_cache, list_cache)
    }

    /// Build with explicit cache instances.
    pub fn with_caches(body_cache: Arc<Cache>, list_cache: Arc<Cache>) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            body_cache,
            list_cache,
        }
    }

    /// Register a provider at the end of the fallback chain. A provider
    /// re-registered under the same name is replaced in place.
    pub fn register_provider(&self, name: impl Into<String>, provider: Arc<dyn ResourceProvider>) {
        let name = name.into();
        let mut providers = self.providers.write();
        if let Some(entry) = providers.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = provider;
        } else {
            debug!(provider = %name, "registered resource provider");
            providers.push((name, provider));
        }
    }

    pub fn unregister_provider(&self, name: &str) -> bool {
        let mut providers = self.providers.write();
        let before = providers.len();
        providers.retain(|(n, _)| n != name);
        before != providers.len()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.read().iter().map(|(n, _)| n.clone()).collect()
    }

    fn provider_snapshot(&self) -> Vec<ProviderEntry> {
        self.providers.read().clone()
    }

    /// Aggregate listing across all providers, served from the listing
    /// cache. A failing provider is logged and simply contributes nothing.
    pub async fn list_resources(&self) -> RelayResult<Vec<Resource>> {
        let providers = self.provider_snapshot();

        let value = self
            .list_cache
            .get_or_fetch(
                LISTING_CACHE_KEY,
                || async move {
                    let mut all = Vec::new();
                    for (name, provider) in providers {
                        match provider.list_resources().await {
                            Ok(resources) => all.extend(resources),
                            Err(e) => {
                                warn!(provider = %name, error = %e, "provider failed to list resources");
                            }
                        }
                    }
                    Ok(serde_json::to_value(all)?)
                },
                SetOptions::default(),
            )
            .await?;

        Ok(serde_json::from_value(value)?)
    }

    /// Resolve one URI, trying providers in registration order and caching
    /// the first success unless every provider opts this URI out.
    pub async fn read_resource(&self, uri: &str) -> RelayResult<String> {
        let providers = self.provider_snapshot();

        let cacheable = providers.iter().any(|(_, p)| p.should_cache(uri));
        if !cacheable {
            return fetch_from_providers(&providers, uri).await;
        }

        let key = providers
            .iter()
            .find_map(|(_, p)| p.cache_key(uri))
            .unwrap_or_else(|| default_cache_key(uri));
        let ttl = providers.iter().find_map(|(_, p)| p.cache_ttl(uri));

        let fetch_uri = uri.to_string();
        let value = self
            .body_cache
            .get_or_fetch(
                &key,
                || async move {
                    let body = fetch_from_providers(&providers, &fetch_uri).await?;
                    Ok(Value::String(body))
                },
                SetOptions { ttl, version: None },
            )
            .await?;

        match value {
            Value::String(body) => Ok(body),
            other => Ok(serde_json::to_string(&other)?),
        }
    }

    /// Invalidate one resource body, or everything (bodies and listing)
    /// when no URI is given.
    pub async fn invalidate_cache(&self, uri: Option<&str>) {
        match uri {
            Some(uri) => self.body_cache.invalidate(&default_cache_key(uri)).await,
            None => {
                self.body_cache.clear().await;
                self.list_cache.clear().await;
            }
        }
    }

    pub async fn invalidate_cache_pattern(&self, pattern: &str) -> RelayResult<usize> {
        self.body_cache.invalidate_pattern(pattern).await
    }

    /// React to a provider-side change: drop the affected body (or every
    /// key mentioning the provider) and always refresh the listing, since
    /// any resource change can alter the aggregate.
    pub async fn notify_resource_change(
        &self,
        provider_name: &str,
        uri: Option<&str>,
    ) -> RelayResult<()> {
        match uri {
            Some(uri) => self.body_cache.invalidate(&default_cache_key(uri)).await,
            None => {
                let pattern = format!(".*{}.*", regex::escape(provider_name));
                self.body_cache.invalidate_pattern(&pattern).await?;
            }
        }
        self.list_cache.clear().await;
        Ok(())
    }
}

/// Default body-cache key for a URI.
pub fn default_cache_key(uri: &str) -> String {
    format!("resource:{}", uri)
}

async fn fetch_from_providers(providers: &[ProviderEntry], uri: &str) -> RelayResult<String> {
    for (name, provider) in providers {
        match provider.read_resource(uri).await {
            Ok(body) => return Ok(body),
            Err(e) => {
                debug!(provider = %name, uri, error = %e, "provider could not resolve resource");
            }
        }
    }
    Err(RelayError::NoProviderFound(uri.to_string()))
}
