//! The fetch seam
//!
//! Network access lives outside this crate. A [`Fetcher`] turns one package
//! path into a document (or a not-modified answer), and one person id into
//! the package paths listed on that person's page.

use pkgsift_merge::DocInfo;

/// Successful crawl of one package.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(DocInfo),
    /// The source answered "not modified" for the stored etag.
    NotModified,
}

/// Failed crawl of one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network trouble, rate limits, 5xx. Retry on the failure schedule.
    Transient(String),
    /// The identifier does not name a fetchable thing. Stop tracking it.
    Invalid(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

/// Shared by every host worker of a crawl stage.
pub trait Fetcher: Sync {
    /// Fetch `package`. A non-empty `etag` asks for a conditional fetch.
    fn crawl(&self, package: &str, etag: &str) -> Result<FetchOutcome, FetchError>;

    /// Package paths found on the page of person `id` (`site:username`).
    fn crawl_person(&self, id: &str) -> Result<Vec<String>, FetchError>;
}
