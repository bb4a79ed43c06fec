pub mod registry;
pub mod store;

pub use registry::CacheRegistry;
pub use store::{default_cache_dir, Cache, CacheEntry, CacheOptions, SetOptions};
