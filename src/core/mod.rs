pub mod protocol;
pub mod request_id;

pub use protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, Message, ReadResourceResult, RequestId,
    Resource, ResourceList, RpcError,
};
pub use request_id::{RequestIdGenerator, SharedRequestIdGenerator};
