//! Webhook subscription handshake.

use serde::Deserialize;

/// Query of the GET /webhook handshake (`hub.mode`, `hub.verify_token`, `hub.challenge`).
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Verify webhook subscription (GET request).
///
/// The platform sends `hub.mode=subscribe`, the configured verify token, and a random
/// challenge that must be echoed back. Returns `Some(challenge)` if verification succeeds;
/// an unset `expected_token` never verifies.
pub fn verify_subscription(query: &VerifyQuery, expected_token: Option<&str>) -> Option<String> {
    let expected = expected_token?;
    let mode = query.mode.as_deref()?;
    let token = query.verify_token.as_deref()?;
    let challenge = query.challenge.as_deref()?;

    if mode == "subscribe" && constant_time_eq(token, expected) {
        Some(challenge.to_string())
    } else {
        None
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
