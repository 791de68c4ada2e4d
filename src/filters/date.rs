use std::sync::LazyLock;

use regex::Regex;

use crate::results::Metadata;

/// Each pattern pairs a join indicator with a date shape; group 1 is the date.
/// Order matters: the first pattern that matches wins.
const JOIN_PATTERNS: &[&str] = &[
    // Joined September 2023
    r"[Jj]oined\s+(\w+\s+\d{4})",
    // Member since: Jan 2022
    r"[Mm]ember\s+[Ss]ince:?\s+(\w+\s+\d{4})",
    // Joined on 12/05/2021, Created 12.05.21
    r"(?:[Jj]oined|[Cc]reated)(?:\s+on)?\s+(\d{1,2}[-/\.]\d{1,2}[-/\.]\d{2,4})",
    // Registration date: 2022-03-15
    r"[Rr]egistration\s+[Dd]ate:?\s+(\d{4}[-/\.]\d{1,2}[-/\.]\d{1,2})",
    // Account created: March 15, 2021
    r"[Aa]ccount\s+[Cc]reated:?\s+(\w+\s+\d{1,2},?\s+\d{4})",
    // User since 2021
    r"[Uu]ser\s+[Ss]ince\s+(\d{4})",
    // Est. 2015
    r"[Ee]st\.\s+(\d{4})",
    // Created: 2020-01-31
    r"[Cc]reated:?\s+(\d{4}[-/\.]\d{1,2}[-/\.]\d{1,2})",
];

const METADATA_KEYWORDS: &[&str] = &["joined", "since", "registration", "created"];

/// (site name, marker): when the marker is present the page's own date
/// fields cannot be told apart from the account's.
const AMBIGUOUS_SITES: &[(&str, &str)] = &[("behance", "created_on")];

static DEFAULT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    JOIN_PATTERNS
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

static LINK_REL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<link\s+rel=["'].*?date.*?["']"#).unwrap());

#[derive(Debug, Clone)]
pub struct DateRules {
    pub patterns: Vec<Regex>,
    pub metadata_keywords: &'static [&'static str],
    pub ambiguous_sites: &'static [(&'static str, &'static str)],
}

impl DateRules {
    #[cfg(test)]
    pub fn with_patterns(patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DateRules {
            patterns,
            ..DateRules::default()
        })
    }
}

impl Default for DateRules {
    fn default() -> Self {
        DateRules {
            patterns: DEFAULT_PATTERNS.clone(),
            metadata_keywords: METADATA_KEYWORDS,
            ambiguous_sites: AMBIGUOUS_SITES,
        }
    }
}

pub struct DateExtractor<'a> {
    rules: &'a DateRules,
}

impl<'a> DateExtractor<'a> {
    pub fn new(rules: &'a DateRules) -> Self {
        DateExtractor { rules }
    }

    /// First date found next to a join indicator: join-like metadata fields
    /// first, then the raw body. Not a best-match search.
    pub fn extract(&self, body: &str, metadata: &Metadata, site_name: &str) -> Option<String> {
        let skip = self
            .rules
            .ambiguous_sites
            .iter()
            .any(|(site, marker)| site_name.eq_ignore_ascii_case(site) && body.contains(marker));
        if skip {
            return None;
        }

        let guard_link_rel = body.contains("<link rel=") && LINK_REL_DATE.is_match(body);
        let accept = |candidate: &str| !guard_link_rel || !inside_link_rel(body, candidate);

        let join_fields = metadata.iter().filter(|(key, _)| {
            let key = key.to_lowercase();
            self.rules.metadata_keywords.iter().any(|k| key.contains(k))
        });
        for (_, value) in join_fields {
            if let Some(date) = self.first_match(value, &accept) {
                return Some(date);
            }
        }

        self.first_match(body, &accept)
    }

    fn first_match(&self, text: &str, accept: &dyn Fn(&str) -> bool) -> Option<String> {
        self.rules.patterns.iter().find_map(|pattern| {
            let date = pattern.captures(text)?.get(1)?.as_str();
            accept(date).then(|| date.to_string())
        })
    }
}

/// Whether `candidate` sits inside a `<link rel=...>` attribute.
fn inside_link_rel(body: &str, candidate: &str) -> bool {
    let pattern = format!(
        r#"(?i)<link\s+rel=["'].*?\b{}\b.*?["']"#,
        regex::escape(candidate)
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(body))
}

/// Trim and drop commas. No calendar parsing.
pub fn normalize_date(date: &str) -> String {
    date.trim().replace(',', "")
}
