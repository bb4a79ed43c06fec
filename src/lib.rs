//! resource-relay: resilient JSON-RPC worker transport with TTL-cached
//! resource providers
//!
//! The crate has three layers. [`transport::WorkerTransport`] owns a child
//! worker process and speaks newline-delimited JSON-RPC over its stdio,
//! correlating out-of-order responses and reconnecting with exponential
//! backoff after crashes. [`cache::Cache`] keeps TTL-limited entries in
//! memory with optional disk persistence and pattern invalidation.
//! [`resources::ResourceManager`] aggregates [`resources::ResourceProvider`]
//! implementations behind one cached read/list surface with fallback
//! chaining.

pub mod cache;
pub mod config;
pub mod core;
pub mod resources;
pub mod transport;
pub mod utils;

pub use crate::cache::{Cache, CacheOptions, CacheRegistry, SetOptions};
pub use crate::config::{Config, WorkerConfig};
pub use crate::core::protocol::{Message, RequestId, Resource};
pub use crate::resources::{ResourceManager, ResourceProvider, WorkerProvider};
pub use crate::transport::{ConnectionState, TransportEvent, WorkerTransport};
pub use crate::utils::errors::{RelayError, RelayResult};
