pub mod errors;
pub mod tracing;

pub use self::errors::{RelayError, RelayResult};
pub use self::tracing::init_tracing;
