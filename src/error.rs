use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Remote catalog and local cache both failed; nothing can be probed.
    #[error("site catalog unavailable (remote: {remote}; local: {local})")]
    CatalogUnavailable { remote: String, local: String },

    #[error("probe failed for {site} ({kind}): {message}")]
    ProbeFailure {
        site: String,
        kind: String,
        message: String,
    },

    #[error("malformed structured data: {0}")]
    MalformedStructuredData(String),

    #[error("handle must not be empty")]
    EmptyInput,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
