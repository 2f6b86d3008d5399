use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Transport failure reported by a fetcher not backed by reqwest.
    #[error("Fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Bad response for {url}: status {status}: {body}")]
    BadStatus { url: String, status: u16, body: String },

    #[error("Region has been deleted: {0}")]
    RegionClosed(String),

    #[error("Invalid deployment: {0}")]
    InvalidDeployment(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Maximum length for response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl CacheError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &[u8]) -> Self {
        CacheError::BadStatus {
            url: url.to_string(),
            status,
            body: Self::truncate_body(body),
        }
    }
}
