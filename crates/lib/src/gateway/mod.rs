//! Gateway: the webhook HTTP endpoint.
//!
//! One port serves the platform's subscription handshake, event delivery, and a liveness
//! probe. Event work runs in the background; the handler only acknowledges.

mod server;

pub use server::{router, run_gateway, GatewayState, ACK_TEXT, RUNNING_TEXT};
