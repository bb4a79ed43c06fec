pub mod manager;
pub mod provider;

pub use manager::{default_cache_key, ResourceManager, LISTING_CACHE_KEY};
pub use provider::{ResourceProvider, WorkerProvider};
