use std::fmt;
use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method, Url,
};
use serde::Serialize;
use tokio::time::sleep;

use crate::{Backoff, Error, Result};

const DEFAULT_RETRY_TIMES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Retry-aware HTTP request builder.
///
/// Accumulates headers, a retry budget, a per-attempt timeout, and an
/// optional body through chainable setters, then dispatches one HTTP
/// exchange per verb call. Transport-level failures are retried up to the
/// configured budget; HTTP error statuses are surfaced immediately.
///
/// One builder represents one logical client configuration and may be
/// reused across many requests. Verb methods borrow `&self`, so a
/// configured builder can serve concurrent tasks; setters consume the
/// builder by value, so configuration cannot race an in-flight call.
#[derive(Clone)]
pub struct RequestBuilder {
    http: reqwest::Client,
    headers: HeaderMap,
    max_retry_times: u32,
    timeout: Duration,
    backoff: Backoff,
    body: Option<Vec<u8>>,
    // First header parse failure, surfaced as Error::Config at dispatch.
    invalid_header: Option<String>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values may carry credentials; print names only.
        f.debug_struct("RequestBuilder")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("max_retry_times", &self.max_retry_times)
            .field("timeout", &self.timeout)
            .field("backoff", &self.backoff)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    /// Creates a builder with the default configuration: retry budget 3,
    /// per-attempt timeout 30 seconds, no headers, no body, immediate
    /// retries, and a fresh [`reqwest::Client`].
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Creates a builder around a caller-supplied [`reqwest::Client`].
    ///
    /// Useful when the surrounding application already maintains a shared
    /// client (connection pools are per-client).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            http: client,
            headers: HeaderMap::new(),
            max_retry_times: DEFAULT_RETRY_TIMES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            backoff: Backoff::default(),
            body: None,
            invalid_header: None,
        }
    }

    /// Appends `value` to the header `key`, keeping any values already
    /// present under that name.
    ///
    /// A key or value the transport cannot represent is remembered and
    /// reported as [`Error::Config`] by the next verb call.
    pub fn add_header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match parse_header(key.as_ref(), value.as_ref()) {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(message) => self.record_invalid_header(message),
        }
        self
    }

    /// Sets the header `key` to the single `value`, replacing any values
    /// already present under that name.
    pub fn set_header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match parse_header(key.as_ref(), value.as_ref()) {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(message) => self.record_invalid_header(message),
        }
        self
    }

    /// Sets the retry budget: `n` additional attempts after the first
    /// failure, at most `n + 1` attempts in total. Negative input clamps
    /// to 0 (a single attempt). The default is 3.
    pub fn retry(mut self, n: i32) -> Self {
        self.max_retry_times = n.max(0) as u32;
        self
    }

    /// Sets the per-attempt timeout in seconds. The deadline restarts with
    /// every attempt; it is not cumulative across retries. The default is
    /// 30 seconds.
    ///
    /// `seconds <= 0` is rejected with [`Error::Config`].
    pub fn timeout(mut self, seconds: i64) -> Result<Self> {
        if seconds <= 0 {
            return Err(Error::Config(format!(
                "timeout must be positive, got {seconds}"
            )));
        }
        self.timeout = Duration::from_secs(seconds as u64);
        Ok(self)
    }

    /// Selects the delay policy applied between retry attempts. The
    /// default is [`Backoff::None`]: failed attempts are retried
    /// immediately.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attaches a raw byte payload to be sent by [`post`] and [`put`].
    /// Any byte sequence is accepted, including empty. [`get`] and
    /// [`delete`] ignore the attached body.
    ///
    /// [`post`]: RequestBuilder::post
    /// [`put`]: RequestBuilder::put
    /// [`get`]: RequestBuilder::get
    /// [`delete`]: RequestBuilder::delete
    pub fn body(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.body = Some(data.into());
        self
    }

    /// Serializes `value` as JSON and attaches it as the payload.
    pub fn body_json<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(value).map_err(Error::Encode)?);
        Ok(self)
    }

    /// Executes a GET request and returns the response body bytes.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.dispatch(Method::GET, url, None).await
    }

    /// Executes a POST request with the attached body and returns the
    /// response body bytes.
    pub async fn post(&self, url: &str) -> Result<Vec<u8>> {
        self.dispatch(Method::POST, url, self.body.as_deref()).await
    }

    /// Executes a PUT request with the attached body and returns the
    /// response body bytes.
    pub async fn put(&self, url: &str) -> Result<Vec<u8>> {
        self.dispatch(Method::PUT, url, self.body.as_deref()).await
    }

    /// Executes a DELETE request and returns the response body bytes.
    pub async fn delete(&self, url: &str) -> Result<Vec<u8>> {
        self.dispatch(Method::DELETE, url, None).await
    }

    async fn dispatch(&self, method: Method, url: &str, body: Option<&[u8]>) -> Result<Vec<u8>> {
        if let Some(message) = &self.invalid_header {
            return Err(Error::Config(message.clone()));
        }
        let url = parse_absolute_url(url)?;
        let headers = self.request_headers();

        let mut attempt = 0u32;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .timeout(self.timeout)
                .headers(headers.clone());
            if let Some(body) = body {
                request = request.body(body.to_vec());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    match response.bytes().await {
                        Ok(bytes) if status.is_success() => return Ok(bytes.to_vec()),
                        Ok(bytes) => {
                            return Err(Error::Server {
                                status: status.as_u16(),
                                body: String::from_utf8_lossy(&bytes).into_owned(),
                            });
                        }
                        // Losing the body mid-read is a transport failure:
                        // a partially read body is never returned.
                        Err(err) => {
                            if attempt < self.max_retry_times {
                                self.wait_before_retry(attempt).await;
                                attempt += 1;
                                continue;
                            }
                            return Err(Error::Transport(err));
                        }
                    }
                }
                Err(err) => {
                    if attempt < self.max_retry_times {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            attempt,
                            budget = self.max_retry_times,
                            error = %err,
                            "attempt failed, retrying"
                        );
                        self.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Transport(err));
                }
            }
        }
    }

    /// Configured headers plus the default `Content-Type: application/json`,
    /// unless the caller set a content type themselves.
    fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers
    }

    fn record_invalid_header(&mut self, message: String) {
        // First failure wins.
        self.invalid_header.get_or_insert(message);
    }

    async fn wait_before_retry(&self, attempt: u32) {
        let delay = self.backoff.delay_for(attempt);
        if delay.is_zero() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying request after {} ms", delay.as_millis());

        sleep(delay).await;
    }
}

fn parse_header(key: &str, value: &str) -> std::result::Result<(HeaderName, HeaderValue), String> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|err| format!("invalid header name {key:?}: {err}"))?;
    let value = HeaderValue::from_str(value)
        .map_err(|err| format!("invalid value for header {key:?}: {err}"))?;
    Ok((name, value))
}

fn parse_absolute_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|err| Error::Config(format!("invalid url {url:?}: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::Config(format!(
            "unsupported url scheme {other:?} in {url:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::CONTENT_TYPE;

    use super::RequestBuilder;
    use crate::Error;

    #[test]
    fn retry_clamps_negative_to_zero() {
        let builder = RequestBuilder::new().retry(-5);
        assert_eq!(builder.max_retry_times, 0);

        let builder = builder.retry(2);
        assert_eq!(builder.max_retry_times, 2);
    }

    #[test]
    fn timeout_rejects_non_positive() {
        for seconds in [0, -1, i64::MIN] {
            let err = RequestBuilder::new()
                .timeout(seconds)
                .expect_err("non-positive timeout must fail");
            assert!(matches!(err, Error::Config(_)));
        }
    }

    #[test]
    fn rejected_timeout_leaves_previous_value_standing() {
        let builder = RequestBuilder::new()
            .timeout(5)
            .expect("positive timeout must be accepted");

        assert!(builder.clone().timeout(0).is_err());
        assert_eq!(builder.timeout, Duration::from_secs(5));
    }

    #[test]
    fn add_header_appends_in_order() {
        let builder = RequestBuilder::new()
            .add_header("X-Tag", "a")
            .add_header("X-Tag", "b");

        let values: Vec<_> = builder.headers.get_all("X-Tag").iter().collect();
        assert_eq!(values, ["a", "b"]);
    }

    #[test]
    fn set_header_replaces_all_values() {
        let builder = RequestBuilder::new()
            .add_header("X-Tag", "a")
            .add_header("X-Tag", "b")
            .set_header("X-Tag", "c");

        let values: Vec<_> = builder.headers.get_all("X-Tag").iter().collect();
        assert_eq!(values, ["c"]);
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let builder = RequestBuilder::new()
            .add_header("Content-Type", "text/plain")
            .set_header("content-type", "application/xml");

        let headers = builder.request_headers();
        let values: Vec<_> = headers.get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(values, ["application/xml"]);
    }

    #[test]
    fn default_content_type_yields_to_caller_value() {
        let headers = RequestBuilder::new().request_headers();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");

        let headers = RequestBuilder::new()
            .set_header("Content-Type", "text/plain")
            .request_headers();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn invalid_header_surfaces_as_config_error_at_dispatch() {
        let builder = RequestBuilder::new().add_header("bad header\n", "x");
        let err = builder
            .get("http://localhost/ignored")
            .await
            .expect_err("dispatch must refuse an invalid header");
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn relative_url_is_config_error() {
        let err = RequestBuilder::new()
            .get("/just/a/path")
            .await
            .expect_err("relative url must fail");
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn non_http_scheme_is_config_error() {
        let err = RequestBuilder::new()
            .get("ftp://example.com/file")
            .await
            .expect_err("non-http scheme must fail");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn body_json_encodes_value() {
        let builder = RequestBuilder::new()
            .body_json(&serde_json::json!({"name": "kit"}))
            .expect("plain value must encode");
        assert_eq!(builder.body.as_deref(), Some(br#"{"name":"kit"}"# as &[u8]));
    }

    #[test]
    fn debug_prints_header_names_without_values() {
        let builder = RequestBuilder::new().set_header("Authorization", "Bearer secret-token");
        let debug = format!("{builder:?}");
        assert!(debug.contains("authorization"));
        assert!(!debug.contains("secret-token"));
    }
}
