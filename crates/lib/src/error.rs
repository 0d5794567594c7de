//! Relay error kinds. None of these reach the platform: every call site logs and moves on.

/// Errors from outbound calls, stream decoding, and inbound classification.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A required setting (named by its env variable) is unset.
    #[error("{0} is not configured")]
    ConfigurationMissing(&'static str),
    /// Non-success status from the platform or the backend.
    #[error("upstream returned {status}: {body}")]
    UpstreamHttp { status: u16, body: String },
    /// Network failure or timeout.
    #[error("connection failed: {0}")]
    Connection(#[from] reqwest::Error),
    /// An SSE data line that is not a JSON record.
    #[error("malformed stream chunk: {0}")]
    MalformedStreamChunk(String),
    /// Inbound payload shape that matches no known event.
    #[error("unrecognized event: {0}")]
    UnrecognizedEvent(String),
}

impl RelayError {
    /// Build an UpstreamHttp error from a failed response, consuming its body.
    pub(crate) async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        RelayError::UpstreamHttp { status, body }
    }
}
