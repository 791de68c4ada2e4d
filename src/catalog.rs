use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ProbeError, Result};

const ACCOUNT_PLACEHOLDER: &str = "{account}";

/// One entry of the catalog. Loaded once per run and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub name: String,
    #[serde(rename = "cat")]
    pub category: String,
    #[serde(rename = "uri_check")]
    pub url_template: String,
    #[serde(rename = "uri_pretty", default, skip_serializing_if = "Option::is_none")]
    pub pretty_url_template: Option<String>,
    #[serde(rename = "e_code")]
    pub expected_code: u16,
    #[serde(rename = "e_string", default)]
    pub expected_string: String,
    #[serde(rename = "m_code")]
    pub miss_code: u16,
    #[serde(rename = "m_string", default)]
    pub miss_string: String,
}

impl SiteDefinition {
    /// URL actually probed. Plain `http://` templates are upgraded to https.
    pub fn probe_url(&self, handle: &str) -> String {
        let url = self.url_template.replace(ACCOUNT_PLACEHOLDER, handle);
        match url.strip_prefix("http://") {
            Some(rest) => format!("https://{}", rest),
            None => url,
        }
    }

    /// URL shown to the user; falls back to the check template.
    pub fn display_url(&self, handle: &str) -> String {
        self.pretty_url_template
            .as_deref()
            .unwrap_or(&self.url_template)
            .replace(ACCOUNT_PLACEHOLDER, handle)
    }
}

#[derive(Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    sites: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    sites: Vec<Arc<SiteDefinition>>,
}

impl Catalog {
    pub fn from_sites(sites: Vec<SiteDefinition>) -> Self {
        Catalog {
            sites: sites.into_iter().map(Arc::new).collect(),
        }
    }

    /// Parse a catalog document. An entry that does not fit
    /// `SiteDefinition` is skipped without affecting the others.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(raw)?;
        let mut sites = Vec::with_capacity(doc.sites.len());
        for entry in doc.sites {
            let name = entry
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();
            match serde_json::from_value::<SiteDefinition>(entry) {
                Ok(site) => sites.push(site),
                Err(e) => warn!("Skipping catalog entry {}: {}", name, e),
            }
        }
        Ok(Self::from_sites(sites))
    }

    /// Download the catalog, refreshing the local cache on success.
    /// Falls back to the cache when the remote is unreachable or invalid.
    pub async fn load(url: &str, cache: &Path) -> Result<Self> {
        info!("Downloading site catalog: {}", url);
        let remote_err = match fetch_remote(url).await {
            Ok((raw, catalog)) => {
                if let Err(e) = write_cache(cache, &raw) {
                    warn!("Could not refresh catalog cache {}: {}", cache.display(), e);
                }
                info!("Catalog loaded: {} sites", catalog.len());
                return Ok(catalog);
            }
            Err(e) => e,
        };

        warn!("Remote catalog failed ({}), using local copy", remote_err);
        let local = std::fs::read_to_string(cache)
            .map_err(ProbeError::from)
            .and_then(|raw| Self::from_json(&raw));

        match local {
            Ok(catalog) => {
                info!("Catalog loaded from {}: {} sites", cache.display(), catalog.len());
                Ok(catalog)
            }
            Err(local_err) => Err(ProbeError::CatalogUnavailable {
                remote: remote_err.to_string(),
                local: local_err.to_string(),
            }),
        }
    }

    pub fn sites(&self) -> &[Arc<SiteDefinition>] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Keep sites matching the category (case-insensitive) and, when names
    /// are given, only those sites.
    pub fn filtered(&self, category: Option<&str>, names: &[String]) -> Self {
        let sites = self
            .sites
            .iter()
            .filter(|s| category.map_or(true, |c| s.category.eq_ignore_ascii_case(c)))
            .filter(|s| names.is_empty() || names.iter().any(|n| s.name.eq_ignore_ascii_case(n)))
            .cloned()
            .collect();
        Catalog { sites }
    }

    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for site in &self.sites {
            *counts.entry(site.category.clone()).or_insert(0) += 1;
        }
        counts
    }
}

async fn fetch_remote(url: &str) -> Result<(String, Catalog)> {
    let response = reqwest::get(url).await?.error_for_status()?;
    let raw = response.text().await?;
    let catalog = Catalog::from_json(&raw)?;
    Ok((raw, catalog))
}

fn write_cache(cache: &Path, raw: &str) -> Result<()> {
    if let Some(dir) = cache.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(cache, raw)?;
    Ok(())
}
