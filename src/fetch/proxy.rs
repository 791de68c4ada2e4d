use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{classify_reqwest_error, FetchFailure, FetchOutcome, FetchedPage, Fetcher, RedirectHop};
use crate::error::Result;

/// Talks to an external fetch service: `GET <proxy>?url=<target>` returning
/// the status/contents/url envelope.
pub struct ProxyFetcher {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<EnvelopeStatus>,
    #[serde(default)]
    contents: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeStatus {
    http_code: Option<u16>,
    initial_http_code: Option<u16>,
    #[serde(default)]
    headers: BTreeMap<String, Value>,
    #[serde(default)]
    redirect_history: Vec<EnvelopeHop>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeHop {
    url: String,
    status_code: u16,
    #[serde(default)]
    headers: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: String,
}

impl ProxyFetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(ProxyFetcher {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Fetcher for ProxyFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if response.status() != StatusCode::OK {
            return Err(FetchFailure::new(
                "proxy_status",
                format!("proxy answered {}", response.status()),
                response.status().as_u16(),
            ));
        }

        let raw = response.text().await.map_err(|e| classify_reqwest_error(&e))?;
        decode_envelope(&raw)
    }
}

fn decode_envelope(raw: &str) -> FetchOutcome {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| FetchFailure::new("malformed_response", e.to_string(), 500))?;

    let status = envelope
        .status
        .ok_or_else(|| FetchFailure::new("malformed_response", "missing status object", 500))?;

    if let Some(err) = envelope.error {
        let kind = if err.code.is_empty() { "proxy_error".to_string() } else { err.code };
        return Err(FetchFailure::new(kind, err.message, status.http_code.unwrap_or(500)));
    }

    let final_status = status
        .http_code
        .ok_or_else(|| FetchFailure::new("malformed_response", "missing http_code", 500))?;

    Ok(FetchedPage {
        final_url: envelope.url.unwrap_or_default(),
        initial_status_code: status.initial_http_code.unwrap_or(final_status),
        final_status_code: final_status,
        headers: flatten_headers(status.headers),
        redirect_chain: status
            .redirect_history
            .into_iter()
            .map(|h| RedirectHop {
                url: h.url,
                status_code: h.status_code,
                headers: flatten_headers(h.headers),
            })
            .collect(),
        body: envelope.contents.unwrap_or_default(),
    })
}

fn flatten_headers(headers: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect()
}
