//! Transport: HTTP client, signed ACME requests, retry/backoff policy.

pub mod acme;
pub mod http_client;
pub mod retry;

pub use acme::AcmeTransport;
pub use http_client::{HttpClient, HttpClientConfig, HttpResponse};
pub use retry::{RetryPolicy, RetryStrategy};
