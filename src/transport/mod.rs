pub mod events;
pub mod pending;
pub mod worker;

pub use events::TransportEvent;
pub use pending::PendingRequests;
pub use worker::{backoff_delay, ConnectionState, WorkerTransport};
