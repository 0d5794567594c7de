//! Conversational backend gateway.
//!
//! Plain webhook forwards, admin takeover/release/send_message, and session streams (SSE).

mod client;
mod types;

pub use client::{Backend, BackendClient, ByteStream};
pub use types::{AdminCommand, StreamRequest, StreamRoute};
