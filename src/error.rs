/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration: malformed URL, bad header name/value, or a
    /// non-positive timeout. Never retried.
    #[error("configuration error: {0}")]
    Config(String),
    /// Network or request execution error from `reqwest`.
    ///
    /// Covers connect failures, DNS failures, per-attempt timeouts, and
    /// response body read failures. The retry loop re-attempts these; the
    /// last one is surfaced when the budget is exhausted.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// The exchange completed but the HTTP status was outside `[200, 300)`.
    ///
    /// Carries the status code and the raw response body text. HTTP error
    /// statuses do not consume retry budget.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    /// JSON serialization failure from [`body_json`].
    ///
    /// [`body_json`]: crate::RequestBuilder::body_json
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}
