use reqwest::StatusCode;

/// Errors raised while fetching or decoding a single unit of work.
///
/// Drivers catch these per page/record and fold them into a
/// [`Harvest`](crate::scraper::pagination::Harvest); they only reach `main`
/// through the orchestration layer's `anyhow` context.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// True for failures on the wire (network, timeout, non-2xx).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::HttpStatus { .. })
    }
}

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;
