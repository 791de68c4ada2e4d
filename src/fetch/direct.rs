use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{redirect, Client, Response};
use tracing::debug;

use super::{
    classify_reqwest_error, header_map, FetchFailure, FetchOutcome, FetchedPage, Fetcher,
    RedirectHop,
};
use crate::error::Result;

const MAX_REDIRECTS: usize = 10;

const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("user-agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36"),
    ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "no-cache"),
];

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36";
const BOT_UA: &str = "Mozilla/5.0 (compatible; SocialMediaBot/1.0)";

/// Host substring → header overrides. First match wins.
const DOMAIN_HEADERS: &[(&str, &[(&str, &str)])] = &[
    (".ru", &[("accept-language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7"), ("user-agent", CHROME_UA)]),
    (
        ".pl",
        &[
            ("accept-language", "pl-PL,pl;q=0.9,en-US;q=0.8,en;q=0.7"),
            ("user-agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Firefox/120.0"),
        ],
    ),
    (
        ".jp",
        &[
            ("accept-language", "ja-JP,ja;q=0.9,en-US;q=0.8,en;q=0.7"),
            ("user-agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Safari/605.1.15"),
        ],
    ),
    (".cn", &[("accept-language", "zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"), ("user-agent", CHROME_UA)]),
    (
        "behance.net",
        &[
            ("accept-language", "en-US,en;q=0.9"),
            ("user-agent", CHROME_UA),
            ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
            ("referer", "https://www.behance.net/"),
        ],
    ),
    ("community", &[("accept", "application/activity+json"), ("user-agent", BOT_UA)]),
    ("mastodon", &[("accept", "application/activity+json"), ("user-agent", BOT_UA)]),
];

/// In-process fetcher: locale-aware headers, no TLS verification, and the
/// pre-redirect status captured separately from the final one.
pub struct DirectFetcher {
    client: Client,
}

impl DirectFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(DirectFetcher { client })
    }

    async fn get(&self, url: &str, headers: &HeaderMap) -> std::result::Result<Response, FetchFailure> {
        self.client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))
    }
}

#[async_trait]
impl Fetcher for DirectFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let headers = headers_for(url);
        let mut response = self.get(url, &headers).await?;
        let initial_status_code = response.status().as_u16();
        let mut redirect_chain = Vec::new();

        while response.status().is_redirection() && redirect_chain.len() < MAX_REDIRECTS {
            let Some(next) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| response.url().join(loc).ok())
            else {
                break;
            };

            redirect_chain.push(RedirectHop {
                url: response.url().to_string(),
                status_code: response.status().as_u16(),
                headers: header_map(response.headers()),
            });
            debug!("Following redirect {} -> {}", response.url(), next);
            response = self.get(next.as_str(), &headers).await?;
        }

        let final_url = response.url().to_string();
        let final_status_code = response.status().as_u16();
        let response_headers = header_map(response.headers());
        let body = response.text().await.map_err(|e| classify_reqwest_error(&e))?;

        Ok(FetchedPage {
            final_url,
            initial_status_code,
            final_status_code,
            headers: response_headers,
            redirect_chain,
            body,
        })
    }
}

/// Default browser headers with the first matching domain override applied.
fn headers_for(url: &str) -> HeaderMap {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
        .replace("www.", "");

    let mut headers = HeaderMap::new();
    let overrides = DOMAIN_HEADERS
        .iter()
        .find(|(pattern, _)| host.contains(pattern))
        .map(|(_, h)| *h)
        .unwrap_or(&[]);

    for &(name, value) in DEFAULT_HEADERS.iter().chain(overrides) {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_headers_without_override() {
        let h = headers_for("https://www.example.com/u/alice");
        assert_eq!(h.get("accept-language").unwrap(), "en-US,en;q=0.9");
        assert_eq!(h.get("cache-control").unwrap(), "no-cache");
        assert!(h.get("referer").is_none());
    }

    #[test]
    fn locale_override_by_tld() {
        let h = headers_for("https://vk.ru/alice");
        assert_eq!(h.get("accept-language").unwrap(), "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7");
    }

    #[test]
    fn first_matching_pattern_wins() {
        let h = headers_for("https://www.behance.net/alice");
        assert_eq!(h.get("referer").unwrap(), "https://www.behance.net/");

        let h = headers_for("https://mastodon.social/@alice");
        assert_eq!(h.get("accept").unwrap(), "application/activity+json");
    }
}
