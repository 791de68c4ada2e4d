use std::path::PathBuf;
use std::time::Duration;

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::scheduler::ScheduleOptions;

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/degun-osint/WhatsMyName/main/wmn-data.json";
const CACHE_FILE: &str = "wmn-data.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub catalog_url: String,
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub proxy_url: Option<String>,
    pub batch_size: usize,
    pub concurrent_batches: usize,
    pub connection_limit: usize,
    pub request_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub progress_delay_ms: u64,
}

impl Settings {
    /// Defaults, then `handle_probe.toml`, then `PROBE_*` variables.
    /// `WMN_JSON_URL` and `PROXY_URL` are honoured on top of that.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let builder = defaults()?
            .add_source(File::with_name("handle_probe").required(false))
            .add_source(Environment::with_prefix("PROBE").try_parsing(true))
            .set_override_option("catalog_url", std::env::var("WMN_JSON_URL").ok())?
            .set_override_option("proxy_url", std::env::var("PROXY_URL").ok())?;

        let settings = Self::from_builder(builder)?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        Ok(builder.build()?.try_deserialize::<Settings>()?)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE)
    }

    pub fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            batch_size: self.batch_size.max(1),
            concurrent_batches: self.concurrent_batches.max(1),
            connection_limit: self.connection_limit.max(1),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            progress_delay: Duration::from_millis(self.progress_delay_ms),
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("catalog_url", DEFAULT_CATALOG_URL)?
        .set_default("data_dir", "data")?
        .set_default("results_dir", "results")?
        .set_default("batch_size", 50_i64)?
        .set_default("concurrent_batches", 2_i64)?
        .set_default("connection_limit", 50_i64)?
        .set_default("request_timeout_secs", 15_i64)?
        .set_default("fetch_timeout_secs", 25_i64)?
        .set_default("progress_delay_ms", 10_i64)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built_in() -> Settings {
        Settings::from_builder(defaults().unwrap()).unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = built_in();
        assert_eq!(s.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(s.batch_size, 50);
        assert_eq!(s.concurrent_batches, 2);
        assert_eq!(s.connection_limit, 50);
        assert_eq!(s.request_timeout_secs, 15);
        assert_eq!(s.fetch_timeout_secs, 25);
        assert_eq!(s.proxy_url, None);
        assert_eq!(s.cache_path(), PathBuf::from("data").join("wmn-data.json"));
    }

    #[test]
    fn later_layers_win() {
        let builder = defaults()
            .unwrap()
            .set_override("batch_size", 25_i64)
            .unwrap()
            .set_override_option("proxy_url", Some("http://127.0.0.1:8080"))
            .unwrap()
            .set_override_option("catalog_url", None::<String>)
            .unwrap();
        let s = Settings::from_builder(builder).unwrap();
        assert_eq!(s.batch_size, 25);
        assert_eq!(s.proxy_url.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(s.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(s.schedule_options().batch_size, 25);
    }

    #[test]
    fn schedule_options_never_zero() {
        let mut s = built_in();
        s.batch_size = 0;
        s.connection_limit = 0;
        let opts = s.schedule_options();
        assert_eq!(opts.batch_size, 1);
        assert_eq!(opts.connection_limit, 1);
    }
}
