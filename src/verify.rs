use tracing::debug;

use crate::catalog::SiteDefinition;
use crate::error::ProbeError;
use crate::fetch::{FetchedPage, Fetcher};
use crate::filters::{extract_page, normalize_date, DateExtractor, FilterRules};
use crate::results::{ResultRecord, SiteIdentity, Verdict};

/// Case-insensitive substring test after collapsing whitespace on both
/// sides. Escaped quotes in the pattern (`\"`) match plain quotes.
/// An empty pattern always matches.
pub fn contains_normalized(content: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    let content = collapse(content).to_lowercase();
    let pattern = collapse(&pattern.replace("\\\"", "\"")).to_lowercase();
    content.contains(&pattern)
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The inputs the decision table looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    pub status: u16,
    pub has_expected_string: bool,
    pub has_miss_string: bool,
}

impl Signals {
    pub fn read(site: &SiteDefinition, status: u16, body: &str) -> Self {
        Signals {
            status,
            has_expected_string: contains_normalized(body, &site.expected_string),
            has_miss_string: contains_normalized(body, &site.miss_string),
        }
    }
}

/// Ordered decision table; the first matching rule wins. `Found` is
/// returned without a date, the caller fills it in.
pub fn classify(site: &SiteDefinition, signals: Signals) -> Verdict {
    let expected = site.expected_code;
    let miss = site.miss_code;
    let codes_coincide = miss == expected;

    if signals.status == miss && !codes_coincide {
        return Verdict::NotFound;
    }
    if signals.status == expected {
        if signals.has_expected_string && !(codes_coincide && signals.has_miss_string) {
            return Verdict::Found { date: None };
        }
        if !signals.has_expected_string && miss == 404 {
            return Verdict::Unsure;
        }
    }
    Verdict::NotFound
}

/// Turns a fetched page into a record, running the content filters on
/// any match.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    rules: FilterRules,
}

impl Verifier {
    pub fn new(rules: FilterRules) -> Self {
        Verifier { rules }
    }

    pub fn inspect(&self, site: &SiteDefinition, handle: &str, page: &FetchedPage) -> Option<ResultRecord> {
        let signals = Signals::read(site, page.initial_status_code, &page.body);
        let verdict = classify(site, signals);
        debug!(
            site = %site.name,
            final_url = %page.final_url,
            final_status = page.final_status_code,
            redirects = page.redirect_chain.len(),
            headers = page.headers.len(),
            ?signals,
            ?verdict,
            "classified"
        );

        let probe_url = site.probe_url(handle);
        let (verdict, extraction) = match verdict {
            Verdict::NotFound => return None,
            Verdict::Found { .. } => {
                let extraction = extract_page(&self.rules, &page.body, &probe_url);
                let date = DateExtractor::new(&self.rules.date)
                    .extract(&page.body, &extraction.metadata, &site.name)
                    .map(|d| normalize_date(&d));
                (Verdict::Found { date }, extraction)
            }
            Verdict::Unsure => {
                let extraction = extract_page(&self.rules, &page.body, &probe_url);
                (Verdict::Unsure, extraction)
            }
        };

        Some(ResultRecord {
            site: SiteIdentity::new(site, handle),
            verdict,
            http_code: page.initial_status_code,
            extraction: Some(extraction),
        })
    }
}

/// Probe one site. Fetch failures become `ProbeFailure`; a non-match is
/// `Ok(None)`.
pub async fn check_site(
    fetcher: &dyn Fetcher,
    verifier: &Verifier,
    site: &SiteDefinition,
    handle: &str,
) -> Result<Option<ResultRecord>, ProbeError> {
    let url = site.probe_url(handle);
    let page = fetcher.fetch(&url).await.map_err(|f| {
        debug!(site = %site.name, http_code = f.http_code, "fetch failed");
        ProbeError::ProbeFailure {
            site: site.name.clone(),
            kind: f.kind,
            message: f.message,
        }
    })?;
    Ok(verifier.inspect(site, handle, &page))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::fetch::{FetchFailure, FetchOutcome};

    fn site(e_code: u16, e_string: &str, m_code: u16, m_string: &str) -> SiteDefinition {
        SiteDefinition {
            name: "Example".into(),
            category: "social".into(),
            url_template: "https://example.org/u/{account}".into(),
            pretty_url_template: None,
            expected_code: e_code,
            expected_string: e_string.into(),
            miss_code: m_code,
            miss_string: m_string.into(),
        }
    }

    fn verdict(site: &SiteDefinition, status: u16, body: &str) -> Verdict {
        classify(site, Signals::read(site, status, body))
    }

    fn page(status: u16, body: &str) -> FetchedPage {
        FetchedPage {
            final_url: "https://example.org/u/alice".into(),
            initial_status_code: status,
            final_status_code: status,
            body: body.into(),
            ..Default::default()
        }
    }

    #[test]
    fn normalized_matching() {
        assert!(contains_normalized("anything", ""));
        assert!(contains_normalized("<h1>Profile   of\n  ALICE</h1>", "profile of alice"));
        assert!(contains_normalized(r#"{"login": "alice"}"#, r#"\"login\":"#));
        assert!(!contains_normalized("nothing here", "alice"));
    }

    #[test]
    fn miss_code_rejects_regardless_of_body() {
        let s = site(200, "alice", 404, "not found");
        assert_eq!(verdict(&s, 404, "alice alice alice"), Verdict::NotFound);
        assert_eq!(verdict(&s, 404, ""), Verdict::NotFound);
    }

    #[test]
    fn expected_code_and_string_is_found() {
        let s = site(200, "@alice", 404, "not found");
        assert_eq!(verdict(&s, 200, "<p>@alice</p>"), Verdict::Found { date: None });
    }

    #[test]
    fn both_signals_with_shared_code_is_suppressed() {
        let s = site(200, "profile", 200, "does not exist");
        assert_eq!(verdict(&s, 200, "profile page: user does not exist"), Verdict::NotFound);
        assert_eq!(verdict(&s, 200, "profile page"), Verdict::Found { date: None });
    }

    #[test]
    fn missing_string_with_404_miss_code_is_unsure() {
        let s = site(200, "@alice", 404, "");
        assert_eq!(verdict(&s, 200, "<p>generic page</p>"), Verdict::Unsure);
    }

    #[test]
    fn missing_string_with_other_miss_code_is_dropped() {
        let s = site(200, "@alice", 302, "");
        assert_eq!(verdict(&s, 200, "<p>generic page</p>"), Verdict::NotFound);
        assert_eq!(verdict(&s, 500, "@alice"), Verdict::NotFound);
    }

    #[test]
    fn unsure_skips_date_extraction() {
        let s = site(200, "@alice", 404, "");
        let body = r#"<div class="bio">Joined March 2019</div>"#;
        let record = Verifier::default().inspect(&s, "alice", &page(200, body)).unwrap();
        assert_eq!(record.verdict, Verdict::Unsure);
        assert!(record.extraction.is_some());
    }

    #[test]
    fn found_carries_normalized_date() {
        let s = site(200, "@alice", 404, "");
        let body = "<p>@alice</p><p>Account created: March 15, 2021</p>";
        let record = Verifier::default().inspect(&s, "alice", &page(200, body)).unwrap();
        assert_eq!(record.verdict, Verdict::Found { date: Some("March 15 2021".into()) });
    }

    struct CannedFetcher(HashMap<String, FetchOutcome>);

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            self.0
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchFailure::new("unknown", url, 500)))
        }
    }

    #[tokio::test]
    async fn end_to_end_single_site() {
        let s = site(200, "@alice", 404, "");
        let body = r#"<html><head><meta name="description" content="Alice builds things"></head>
            <body><div class="bio"><h1>@alice</h1>
            <a href="https://github.com/alice">gh</a></div></body></html>"#;
        let fetcher = CannedFetcher(HashMap::from([(
            "https://example.org/u/alice".to_string(),
            Ok(page(200, body)),
        )]));

        let record = check_site(&fetcher, &Verifier::default(), &s, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.verdict, Verdict::Found { date: None });
        let extraction = record.extraction.unwrap();
        assert_eq!(extraction.links, vec!["https://github.com/alice"]);
        assert_eq!(extraction.metadata.get("description"), Some("Alice builds things"));
        assert_eq!(extraction.content, vec!["@alice"]);
    }

    #[tokio::test]
    async fn fetch_failure_is_probe_failure() {
        let s = site(200, "@alice", 404, "");
        let fetcher = CannedFetcher(HashMap::from([(
            "https://example.org/u/alice".to_string(),
            Err(FetchFailure::timeout("deadline elapsed")),
        )]));
        let err = check_site(&fetcher, &Verifier::default(), &s, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::ProbeFailure { ref kind, .. } if kind == "timeout"));
    }
}
