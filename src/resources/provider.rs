//! Resource provider contract and the worker-backed implementation

use crate::core::protocol::{
    ReadResourceResult, Resource, ResourceList, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
};
use crate::transport::WorkerTransport;
use crate::utils::errors::{RelayError, RelayResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// A collaborator implementing list/read for some subset of resource URIs.
///
/// `read_resource` must fail with [`RelayError::ResourceNotFound`] for URIs
/// it does not own so the manager can fall through to the next provider.
/// The cache hooks are optional: by default every URI is cached under the
/// manager's default key and TTL.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list_resources(&self) -> RelayResult<Vec<Resource>>;

    async fn read_resource(&self, uri: &str) -> RelayResult<String>;

    /// Custom cache key for `uri`; `None` selects the manager default.
    fn cache_key(&self, _uri: &str) -> Option<String> {
        None
    }

    /// Custom TTL for `uri`; `None` selects the cache's configured TTL.
    fn cache_ttl(&self, _uri: &str) -> Option<Duration> {
        None
    }

    /// Whether `uri` should be cached at all.
    fn should_cache(&self, _uri: &str) -> bool {
        true
    }
}

/// Provider backed by a remote worker over the transport.
pub struct WorkerProvider {
    name: String,
    transport: WorkerTransport,
}

impl WorkerProvider {
    pub fn new(name: impl Into<String>, transport: WorkerTransport) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ResourceProvider for WorkerProvider {
    async fn list_resources(&self) -> RelayResult<Vec<Resource>> {
        let result = self
            .transport
            .send_request(METHOD_RESOURCES_LIST, None)
            .await?;
        let list: ResourceList = serde_json::from_value(result)?;
        Ok(list.resources)
    }

    async fn read_resource(&self, uri: &str) -> RelayResult<String> {
        let result = self
            .transport
            .send_request(METHOD_RESOURCES_READ, Some(json!({ "uri": uri })))
            .await?;
        let read: ReadResourceResult = serde_json::from_value(result)
            .map_err(|_| RelayError::ResourceNotFound(uri.to_string()))?;

        match read.contents {
            Value::String(text) => Ok(text),
            other => Ok(serde_json::to_string(&other)?),
        }
    }
}
