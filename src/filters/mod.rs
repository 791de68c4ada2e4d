//! Heuristic passes run over a matched page: outbound links, profile text
//! and join date.
//!
//! Keyword tables are plain data held in the `*Rules` structs so each pass
//! can be driven with a reduced table.

pub mod date;
pub mod links;
pub mod profile;

use scraper::node::Element;
use scraper::{ElementRef, Html};
use url::Url;

pub use date::{normalize_date, DateExtractor, DateRules};
pub use links::{LinkAnalyzer, LinkRules};
pub use profile::{ProfileExtractor, ProfileRules};

use crate::results::ExtractionRecord;

/// All tables used by the three passes.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    pub links: LinkRules,
    pub profile: ProfileRules,
    pub date: DateRules,
}

/// Where a page came from: its host and the bare name used for
/// self-reference checks.
#[derive(Debug, Clone)]
pub struct PageOrigin {
    pub url: Option<Url>,
    pub domain: String,
    pub bare_domain: String,
}

impl PageOrigin {
    pub fn new(page_url: &str) -> Self {
        let url = Url::parse(page_url).ok();
        let domain = url.as_ref().map(netloc).unwrap_or_default();
        let bare_domain = bare_domain(&domain);
        PageOrigin {
            url,
            domain,
            bare_domain,
        }
    }

    /// True when `text` (already lowercased) names the source site.
    pub fn is_mentioned_in(&self, text_lower: &str) -> bool {
        !self.bare_domain.is_empty() && text_lower.contains(&self.bare_domain)
    }
}

/// Host (lowercased) plus explicit port, like a URL's network location.
pub fn netloc(url: &Url) -> String {
    let host = url.host_str().unwrap_or("").to_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// `www.github.com` → `github`, `gist.github.com` → `github`,
/// `github.com` → `github`.
pub fn bare_domain(domain: &str) -> String {
    let parts: Vec<&str> = domain.split('.').collect();
    let kept: &[&str] = if parts.first() == Some(&"www") || parts.len() > 2 {
        if parts.len() >= 2 {
            &parts[1..parts.len() - 1]
        } else {
            &[]
        }
    } else {
        &parts[..parts.len().saturating_sub(1)]
    };
    kept.join(".")
}

fn class_string(el: &Element) -> String {
    el.classes().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Id matches in either direction, classes by substring, tag names exactly.
pub fn is_excluded_element(el: &Element, containers: &[&str]) -> bool {
    if let Some(id) = el.id().map(str::to_lowercase).filter(|id| !id.is_empty()) {
        if containers
            .iter()
            .any(|c| id.contains(c) || c.contains(id.as_str()))
        {
            return true;
        }
    }

    let classes = class_string(el);
    if !classes.is_empty() && containers.iter().any(|c| classes.contains(c)) {
        return true;
    }

    let tag = el.name().to_lowercase();
    containers.iter().any(|c| *c == tag)
}

/// `ancestors` is the upward element chain of a node, nearest first,
/// e.g. `node.ancestors().filter_map(ElementRef::wrap)`.
pub fn in_excluded_container<'a>(
    mut ancestors: impl Iterator<Item = ElementRef<'a>>,
    containers: &[&str],
) -> bool {
    ancestors.any(|el| is_excluded_element(el.value(), containers))
}

pub fn in_profile_container<'a>(
    mut ancestors: impl Iterator<Item = ElementRef<'a>>,
    keywords: &[&str],
) -> bool {
    ancestors.any(|el| {
        let el = el.value();
        let id = el.id().unwrap_or("").to_lowercase();
        let classes = class_string(el);
        keywords
            .iter()
            .any(|k| id.contains(k) || classes.contains(k))
    })
}

/// Link and profile passes over one parsed document. Date extraction is
/// left to the caller since it only applies to confirmed matches.
pub fn extract_page(rules: &FilterRules, body: &str, page_url: &str) -> ExtractionRecord {
    let doc = Html::parse_document(body);
    let origin = PageOrigin::new(page_url);

    let links = LinkAnalyzer::new(&rules.links, &origin).analyze(&doc);
    let profile = ProfileExtractor::new(&rules.profile, &origin).extract(&doc);

    ExtractionRecord {
        links,
        metadata: profile.metadata,
        content: profile.content,
    }
}
