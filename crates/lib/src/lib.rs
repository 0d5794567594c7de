//! Relay core library: Messenger webhook intake, event dispatch, backend calls, and the
//! streaming reply relay, used by the `messenger-relay` CLI.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod init;
pub mod messenger;
pub mod relay;
pub mod session;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use error::RelayError;
