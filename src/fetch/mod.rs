pub mod direct;
pub mod proxy;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use direct::DirectFetcher;
pub use proxy::ProxyFetcher;

pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: Headers,
}

/// A page returned by the fetch collaborator.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub final_url: String,
    /// Status of the first, non-redirected response.
    pub initial_status_code: u16,
    pub final_status_code: u16,
    pub headers: Headers,
    pub redirect_chain: Vec<RedirectHop>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: String,
    pub message: String,
    /// 504 for timeouts, 500 otherwise.
    pub http_code: u16,
}

impl FetchFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, http_code: u16) -> Self {
        FetchFailure {
            kind: kind.into(),
            message: message.into(),
            http_code,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("timeout", message, 504)
    }
}

pub type FetchOutcome = Result<FetchedPage, FetchFailure>;

/// Performs the outbound request for one probe URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

pub(crate) fn header_map(headers: &reqwest::header::HeaderMap) -> Headers {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect()
}

pub(crate) fn classify_reqwest_error(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::timeout(err.to_string())
    } else if err.is_connect() {
        FetchFailure::new("connect", err.to_string(), 500)
    } else if err.is_decode() || err.is_body() {
        FetchFailure::new("body", err.to_string(), 500)
    } else {
        FetchFailure::new("request", err.to_string(), 500)
    }
}
