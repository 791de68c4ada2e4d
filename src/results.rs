use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::catalog::SiteDefinition;
use crate::error::Result;

/// Outcome for one site. `NotFound` never produces a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    NotFound,
    Found { date: Option<String> },
    Unsure,
}

impl Verdict {
    /// The join date when known, otherwise a plain status word.
    pub fn label(&self) -> String {
        match self {
            Verdict::NotFound => "not found".to_string(),
            Verdict::Found { date: Some(date) } => date.clone(),
            Verdict::Found { date: None } => "found".to_string(),
            Verdict::Unsure => "unsure".to_string(),
        }
    }
}

/// Field name → value, kept in insertion order. Re-inserting a key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    pub fn insert(&mut self, key: String, value: String) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Signals harvested from a matching page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionRecord {
    pub links: Vec<String>,
    pub metadata: Metadata,
    pub content: Vec<String>,
}

impl ExtractionRecord {
    /// `Metadata: k: v, ... | Content: a, b`, each part only when present.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.metadata.is_empty() {
            let fields: Vec<String> = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            parts.push(format!("Metadata: {}", fields.join(", ")));
        }
        if !self.content.is_empty() {
            parts.push(format!("Content: {}", self.content.join(", ")));
        }
        parts.join(" | ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteIdentity {
    pub name: String,
    pub category: String,
    pub url: String,
}

impl SiteIdentity {
    pub fn new(site: &SiteDefinition, handle: &str) -> Self {
        SiteIdentity {
            name: site.name.clone(),
            category: site.category.clone(),
            url: site.display_url(handle),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub site: SiteIdentity,
    pub verdict: Verdict,
    pub http_code: u16,
    pub extraction: Option<ExtractionRecord>,
}

/// Flat projection used for CSV and the console table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    #[serde(rename = "Site")]
    pub site: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "External Links")]
    pub external_links: String,
    #[serde(rename = "Profile Info")]
    pub profile_info: String,
}

impl From<&ResultRecord> for ResultRow {
    fn from(record: &ResultRecord) -> Self {
        let (external_links, profile_info) = record
            .extraction
            .as_ref()
            .map(|e| (e.links.join("; "), e.summary()))
            .unwrap_or_default();
        ResultRow {
            site: record.site.name.clone(),
            category: record.site.category.clone(),
            status: record.verdict.label(),
            url: record.site.url.clone(),
            external_links,
            profile_info,
        }
    }
}

/// Records for one handle. At most one record per site; appended a whole
/// batch at a time.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    handle: String,
    records: Vec<ResultRecord>,
    seen: HashSet<String>,
}

impl ResultSet {
    pub fn new(handle: &str) -> Self {
        ResultSet {
            handle: handle.to_string(),
            ..Default::default()
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Returns how many records were new.
    pub fn extend_batch(&mut self, records: Vec<ResultRecord>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen.insert(record.site.name.clone()) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rows(&self) -> Vec<ResultRow> {
        self.records.iter().map(ResultRow::from).collect()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        if self.records.is_empty() {
            writer.write_record(["Site", "Category", "Status", "URL", "External Links", "Profile Info"])?;
        }
        for row in self.rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &self.records)?;
        Ok(())
    }

    /// `<dir>/results_<handle>_<YYYYmmdd_HHMMSS>.<ext>`, creating `dir`.
    /// The file always lands directly inside `dir`.
    pub fn export_path(&self, dir: &Path, ext: &str, at: NaiveDateTime) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        Ok(dir.join(format!(
            "results_{}_{}.{}",
            file_safe(&self.handle),
            at.format("%Y%m%d_%H%M%S"),
            ext
        )))
    }
}

/// Replace path separators and characters Windows rejects in file names.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, verdict: Verdict, extraction: Option<ExtractionRecord>) -> ResultRecord {
        ResultRecord {
            site: SiteIdentity {
                name: name.to_string(),
                category: "social".to_string(),
                url: format!("https://{}.example/alice", name.to_lowercase()),
            },
            verdict,
            http_code: 200,
            extraction,
        }
    }

    fn sample_extraction() -> ExtractionRecord {
        let mut metadata = Metadata::default();
        metadata.insert("description".into(), "Rust dev".into());
        metadata.insert("author".into(), "Alice".into());
        ExtractionRecord {
            links: vec!["https://a.example".into(), "https://b.example".into()],
            metadata,
            content: vec!["Climber".into(), "Rust dev".into()],
        }
    }

    #[test]
    fn labels() {
        assert_eq!(Verdict::Found { date: Some("Jan 2022".into()) }.label(), "Jan 2022");
        assert_eq!(Verdict::Found { date: None }.label(), "found");
        assert_eq!(Verdict::Unsure.label(), "unsure");
    }

    #[test]
    fn metadata_replaces_in_place() {
        let mut m = Metadata::default();
        m.insert("a".into(), "1".into());
        m.insert("b".into(), "2".into());
        m.insert("a".into(), "3".into());
        let pairs: Vec<_> = m.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn flat_row_projection() {
        let r = record("GitHub", Verdict::Found { date: None }, Some(sample_extraction()));
        let row = ResultRow::from(&r);
        assert_eq!(row.status, "found");
        assert_eq!(row.external_links, "https://a.example; https://b.example");
        assert_eq!(
            row.profile_info,
            "Metadata: description: Rust dev, author: Alice | Content: Climber, Rust dev"
        );
    }

    #[test]
    fn one_record_per_site() {
        let mut set = ResultSet::new("alice");
        let added = set.extend_batch(vec![
            record("GitHub", Verdict::Unsure, None),
            record("GitLab", Verdict::Unsure, None),
        ]);
        assert_eq!(added, 2);
        let added = set.extend_batch(vec![record("GitHub", Verdict::Found { date: None }, None)]);
        assert_eq!(added, 0);
        assert_eq!(set.len(), 2);
        assert_eq!(set.records()[0].verdict, Verdict::Unsure);
    }

    #[test]
    fn exports_csv_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = ResultSet::new("alice");
        set.extend_batch(vec![record(
            "GitHub",
            Verdict::Found { date: Some("2015".into()) },
            Some(sample_extraction()),
        )]);

        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        let csv_path = set.export_path(&dir.path().join("out"), "csv", at).unwrap();
        assert!(csv_path.ends_with("results_alice_20240309_140500.csv"));
        set.write_csv(&csv_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Site,Category,Status,URL,External Links,Profile Info"));
        assert!(lines.next().unwrap().starts_with("GitHub,social,2015,https://github.example/alice,"));

        let json_path = set.export_path(dir.path(), "json", at).unwrap();
        set.write_json(&json_path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value[0]["verdict"]["status"], "found");
        assert_eq!(value[0]["verdict"]["date"], "2015");
        assert_eq!(value[0]["extraction"]["metadata"]["author"], "Alice");
    }

    #[test]
    fn export_name_stays_inside_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();

        for (handle, expected) in [
            ("../x", "results_.._x_20240102_030405.csv"),
            ("a/b", "results_a_b_20240102_030405.csv"),
            (r"c:\d", "results_c__d_20240102_030405.csv"),
        ] {
            let path = ResultSet::new(handle).export_path(dir.path(), "csv", at).unwrap();
            assert_eq!(path.parent(), Some(dir.path()));
            assert_eq!(path.file_name().unwrap(), expected);
        }

        let set = ResultSet::new("../x");
        let path = set.export_path(dir.path(), "json", at).unwrap();
        set.write_json(&path).unwrap();
        assert!(path.exists());
    }
}
