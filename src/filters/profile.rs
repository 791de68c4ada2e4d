use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::{in_excluded_container, in_profile_container, PageOrigin};
use crate::error::ProbeError;
use crate::results::Metadata;

static META: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta").unwrap());
static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static UI_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(Follow|Message|Subscribe|Share|Like|Comment|Post|View|Open|Close|Toggle|Click|Tap)\s*")
        .unwrap()
});

const PROFILE_CONTAINERS: &[&str] = &[
    "profile", "bio", "about", "description", "user-info", "user-profile", "userprofile",
    "user-bio", "userbio", "author-info", "author-bio", "biography",
    // social networks
    "profile-header", "profile-card", "profile-info", "profile-details", "user-details",
    "personal-info", "account-info",
    "user-description", "creator-info", "artist-info", "member-info",
];

const METADATA_FIELDS: &[&str] = &[
    "description", "og:description", "profile:username", "profile:first_name",
    "profile:last_name", "author", "twitter:description", "article:author", "profile:gender",
    "profile:location",
];

const STRUCTURED_TYPES: &[&str] = &["Person", "Profile"];

const UI_ELEMENTS: &[&str] = &[
    "menu", "navigation", "nav", "search", "button", "dialog", "modal", "popup", "tooltip",
    "dropdown", "tab", "menu-item", "sidebar", "widget", "footer",
];

const COMMON_WORDS: &[&str] = &["menu", "home", "about", "contact", "search", "login", "signup"];

const EXCLUDE_CONTAINERS: &[&str] = &[
    "footer", "header", "nav", "navigation", "menu", "sidebar", "copyright", "legal",
    "advertisement", "cookie", "popup", "stats", "style", "script",
];

#[derive(Debug, Clone)]
pub struct ProfileRules {
    pub profile_containers: &'static [&'static str],
    pub metadata_fields: &'static [&'static str],
    pub structured_types: &'static [&'static str],
    pub ui_elements: &'static [&'static str],
    pub common_words: &'static [&'static str],
    pub exclude_containers: &'static [&'static str],
}

impl Default for ProfileRules {
    fn default() -> Self {
        ProfileRules {
            profile_containers: PROFILE_CONTAINERS,
            metadata_fields: METADATA_FIELDS,
            structured_types: STRUCTURED_TYPES,
            ui_elements: UI_ELEMENTS,
            common_words: COMMON_WORDS,
            exclude_containers: EXCLUDE_CONTAINERS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileInfo {
    pub metadata: Metadata,
    pub content: Vec<String>,
}

pub struct ProfileExtractor<'a> {
    rules: &'a ProfileRules,
    origin: &'a PageOrigin,
}

impl<'a> ProfileExtractor<'a> {
    pub fn new(rules: &'a ProfileRules, origin: &'a PageOrigin) -> Self {
        ProfileExtractor { rules, origin }
    }

    pub fn extract(&self, doc: &Html) -> ProfileInfo {
        ProfileInfo {
            metadata: self.metadata(doc),
            content: self.content(doc),
        }
    }

    fn metadata(&self, doc: &Html) -> Metadata {
        let mut metadata = Metadata::default();

        for meta in doc.select(&META) {
            let el = meta.value();
            let name = el
                .attr("name")
                .or_else(|| el.attr("property"))
                .unwrap_or("")
                .to_lowercase();
            if !self.rules.metadata_fields.contains(&name.as_str()) {
                continue;
            }
            let content = clean_text(el.attr("content").unwrap_or(""));
            if self.keep_value(&content) {
                metadata.insert(name, content);
            }
        }

        for script in doc.select(&LD_JSON) {
            let raw: String = script.text().collect();
            let fields = match self.structured_fields(&raw) {
                Ok(fields) => fields,
                Err(e) => {
                    debug!("Skipping structured data block: {}", e);
                    continue;
                }
            };
            for (key, value) in fields {
                let cleaned = clean_text(&value);
                if self.keep_value(&cleaned) {
                    metadata.insert(key, cleaned);
                }
            }
        }

        metadata
    }

    /// String fields of a JSON-LD block typed as a person/profile.
    fn structured_fields(&self, raw: &str) -> Result<Vec<(String, String)>, ProbeError> {
        let data: Value = serde_json::from_str(raw.trim())
            .map_err(|e| ProbeError::MalformedStructuredData(e.to_string()))?;

        let Value::Object(map) = data else {
            return Ok(Vec::new());
        };
        let typed = map
            .get("@type")
            .and_then(Value::as_str)
            .is_some_and(|t| self.rules.structured_types.contains(&t));
        if !typed {
            return Ok(Vec::new());
        }

        Ok(map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect())
    }

    fn keep_value(&self, value: &str) -> bool {
        !value.is_empty() && !self.origin.is_mentioned_in(&value.to_lowercase())
    }

    /// Text nodes under a profile container and outside any excluded one.
    fn content(&self, doc: &Html) -> Vec<String> {
        let mut texts = BTreeSet::new();

        for node in doc.tree.root().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            // exclusion is checked first and always wins
            if in_excluded_container(
                node.ancestors().filter_map(ElementRef::wrap),
                self.rules.exclude_containers,
            ) {
                continue;
            }
            if !in_profile_container(
                node.ancestors().filter_map(ElementRef::wrap),
                self.rules.profile_containers,
            ) {
                continue;
            }

            let cleaned = clean_text(text);
            if self.is_meaningful(&cleaned) {
                texts.insert(cleaned);
            }
        }

        texts.into_iter().collect()
    }

    fn is_meaningful(&self, text: &str) -> bool {
        if text.chars().count() < 3 {
            return false;
        }
        let lower = text.to_lowercase();
        if self.rules.common_words.contains(&lower.as_str())
            || self.rules.ui_elements.contains(&lower.as_str())
        {
            return false;
        }
        let digits: String = text.chars().filter(|c| *c != ',' && *c != '.').collect();
        digits.is_empty() || !digits.chars().all(char::is_numeric)
    }
}

/// Collapse whitespace and strip UI verbs such as "Follow".
pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    UI_VERBS.replace_all(&collapsed, "").trim().to_string()
}
