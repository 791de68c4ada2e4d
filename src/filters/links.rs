use std::collections::BTreeSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{in_excluded_container, netloc, PageOrigin};

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const SOCIAL_DOMAINS: &[&str] = &[
    "twitter.com", "facebook.com", "linkedin.com", "instagram.com", "github.com", "gitlab.com",
    "bitbucket.org", "youtube.com", "medium.com", "dev.to", "behance.net", "dribbble.com",
    "stackoverflow.com", "t.me", "mastodon.social",
];

const PROFILE_INDICATORS: &[&str] = &["/user/", "/users/", "/profile/", "@", "/u/", "/channel/"];

const EXCLUDE_CONTAINERS: &[&str] = &[
    "footer", "nav", "navigation", "navbar", "menu", "sidebar", "header", "topbar", "bottombar",
    "copyright", "legal",
];

const EXCLUDE_KEYWORDS: &[&str] = &[
    // legal / site pages
    "privacy", "legal", "terms", "policy", "cookie", "about", "contact", "help", "support",
    "documentation", "docs", "guidelines", "static", "api", "enterprise", "showcase", "policie",
    "advertising", "welcome",
    // sharing
    "share", "sharer", "sharing", "newsletter", "subscribe", "subscription", "marketing",
    // auth
    "login", "signin", "signup", "register", "authentication", "password", "forgot",
    // commerce
    "shop", "store", "pricing", "payment", "checkout", "cart", "billing",
    // misc
    "sitemap", "search", "tag", "category", "feed", "rss", "download", "uploads", "status",
    "stats", "analytics", "envato", "placeit",
];

#[derive(Debug, Clone)]
pub struct LinkRules {
    pub social_domains: &'static [&'static str],
    pub profile_indicators: &'static [&'static str],
    pub exclude_keywords: &'static [&'static str],
    pub exclude_containers: &'static [&'static str],
}

impl Default for LinkRules {
    fn default() -> Self {
        LinkRules {
            social_domains: SOCIAL_DOMAINS,
            profile_indicators: PROFILE_INDICATORS,
            exclude_keywords: EXCLUDE_KEYWORDS,
            exclude_containers: EXCLUDE_CONTAINERS,
        }
    }
}

pub struct LinkAnalyzer<'a> {
    rules: &'a LinkRules,
    origin: &'a PageOrigin,
}

impl<'a> LinkAnalyzer<'a> {
    pub fn new(rules: &'a LinkRules, origin: &'a PageOrigin) -> Self {
        LinkAnalyzer { rules, origin }
    }

    /// Outbound links worth reporting, query-stripped, deduplicated and sorted.
    pub fn analyze(&self, doc: &Html) -> Vec<String> {
        let mut links = BTreeSet::new();

        for anchor in doc.select(&ANCHOR) {
            if in_excluded_container(
                anchor.ancestors().filter_map(ElementRef::wrap),
                self.rules.exclude_containers,
            ) {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(full) = self.resolve(href.trim()) else {
                continue;
            };
            if self.is_valid_external_link(&full) {
                links.insert(clean_link(&full));
            }
        }

        links.into_iter().collect()
    }

    fn resolve(&self, href: &str) -> Option<String> {
        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_string());
        }
        let base = self.origin.url.as_ref()?;
        base.join(href).ok().map(String::from)
    }

    pub fn is_valid_external_link(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let domain = netloc(&parsed);
        if domain.is_empty() || domain == self.origin.domain {
            return false;
        }

        let lower = url.to_lowercase();
        let social = self.rules.social_domains.iter().any(|d| domain.contains(d));
        if social && self.rules.profile_indicators.iter().any(|i| lower.contains(i)) {
            return !self.origin.is_mentioned_in(&lower);
        }

        if self.rules.exclude_keywords.iter().any(|k| lower.contains(k)) {
            return false;
        }
        !self.origin.is_mentioned_in(&lower)
    }
}

/// Drop the query string (and anything after it) and one trailing slash.
fn clean_link(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    without_query
        .strip_suffix('/')
        .unwrap_or(without_query)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(html: &str, page: &str) -> Vec<String> {
        let rules = LinkRules::default();
        let origin = PageOrigin::new(page);
        LinkAnalyzer::new(&rules, &origin).analyze(&Html::parse_document(html))
    }

    #[test]
    fn keeps_external_profile_links_sorted_and_unique() {
        let html = r#"<html><body><div class="bio">
            <a href="https://twitter.com/alice_dev?ref=profile">tw</a>
            <a href="https://alice.example.net/">home</a>
            <a href="https://twitter.com/alice_dev/">tw again</a>
            <a href="https://github.com/alice">gh</a>
        </div></body></html>"#;
        let links = analyze(html, "https://forum.somesite.org/u/alice");
        assert_eq!(
            links,
            vec![
                "https://alice.example.net",
                "https://github.com/alice",
                "https://twitter.com/alice_dev",
            ]
        );
    }

    #[test]
    fn social_profile_with_source_name_is_rejected() {
        let html = r#"<a href="https://twitter.com/@somesite_official">tw</a>
                      <a href="https://youtube.com/channel/xyz">yt</a>"#;
        let links = analyze(html, "https://www.somesite.com/alice");
        assert_eq!(links, vec!["https://youtube.com/channel/xyz"]);
    }

    #[test]
    fn same_domain_and_relative_links_are_dropped() {
        let html = r#"<a href="/alice/followers">f</a>
                      <a href="https://www.somesite.com/other">o</a>
                      <a href="mailto:alice@example.org">mail</a>"#;
        assert!(analyze(html, "https://www.somesite.com/alice").is_empty());
    }

    #[test]
    fn keyword_exclusions_apply_outside_social_profiles() {
        let html = r#"<a href="https://partner.example.org/privacy">p</a>
                      <a href="https://shop.example.org/item">s</a>
                      <a href="https://blog.example.org/post-1">b</a>"#;
        let links = analyze(html, "https://www.somesite.com/alice");
        assert_eq!(links, vec!["https://blog.example.org/post-1"]);
    }

    #[test]
    fn links_inside_excluded_containers_are_ignored() {
        let html = r#"<body>
            <footer><a href="https://blog.example.org/footer-link">f</a></footer>
            <div id="topnav"><a href="https://blog.example.org/nav-link">n</a></div>
            <main><a href="https://blog.example.org/kept">k</a></main>
        </body>"#;
        let links = analyze(html, "https://www.somesite.com/alice");
        assert_eq!(links, vec!["https://blog.example.org/kept"]);
    }

    #[test]
    fn reduced_tables_can_be_substituted() {
        let rules = LinkRules {
            exclude_keywords: &["blog"],
            exclude_containers: &[],
            ..LinkRules::default()
        };
        let origin = PageOrigin::new("https://www.somesite.com/alice");
        let html = r#"<footer><a href="https://shop.example.org/x">s</a></footer>
                      <a href="https://blog.example.org/y">b</a>"#;
        let links = LinkAnalyzer::new(&rules, &origin).analyze(&Html::parse_document(html));
        assert_eq!(links, vec!["https://shop.example.org/x"]);
    }
}
