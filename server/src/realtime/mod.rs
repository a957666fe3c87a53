mod dispatch;
mod registry;
mod websocket;

pub use dispatch::{dispatch, DispatchOutcome, DropReason};
pub use registry::{ConnectionRegistry, ConnectionToken};
pub use websocket::chat_ws;
