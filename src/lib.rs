//! `sturdy-http` is a retrying HTTP request builder on top of `reqwest`.
//!
//! A [`RequestBuilder`] accumulates headers, a retry budget, a per-attempt
//! timeout, and an optional body through chainable setters, then executes
//! one HTTP exchange per verb call:
//! - [`RequestBuilder::get`]
//! - [`RequestBuilder::post`]
//! - [`RequestBuilder::put`]
//! - [`RequestBuilder::delete`]
//!
//! Transport-level failures (connect, DNS, timeout) are retried up to the
//! configured budget; HTTP error statuses are returned immediately as
//! [`Error::Server`] without consuming retry budget.
//!
//! # Example
//!
//! ```no_run
//! use sturdy_http::RequestBuilder;
//!
//! # async fn run() -> sturdy_http::Result<()> {
//! let client = RequestBuilder::new()
//!     .set_header("Authorization", "Bearer token")
//!     .retry(2)
//!     .timeout(10)?;
//!
//! let body = client.get("https://api.example.com/v1/status").await?;
//! println!("{}", String::from_utf8_lossy(&body));
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;
mod options;

pub use builder::RequestBuilder;
pub use error::Error;
pub use options::Backoff;

pub type Result<T> = std::result::Result<T, Error>;
