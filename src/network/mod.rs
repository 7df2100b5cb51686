//! Network Layer
//!
//! WebSocket server for stream subscribers and dataset clients.

pub mod protocol;
pub mod server;

pub use protocol::{
    AddValuesRequest, ClientMessage, ErrorCode, ErrorPayload, MultiplierInput, ServerMessage,
};
pub use server::{CrashServer, ServerError};
