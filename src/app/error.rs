use std::io;

/// Failures that can end a crawl or an export.
///
/// Markup problems are not errors here: a block or resolver strategy that
/// cannot be parsed yields no value and the next fallback is tried.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("invalid profile URL '{url}': {reason}")]
    InvalidProfileUrl { url: String, reason: &'static str },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to write {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode JSON report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode CSV export: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read from the terminal: {0}")]
    Prompt(#[source] io::Error),
}

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;
