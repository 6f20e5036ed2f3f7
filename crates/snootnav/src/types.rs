//! Core data types shared by the page model, the fetcher and the interceptor.

use serde::{Deserialize, Serialize};

/// A parsed load instruction: a URL plus an optional container selector.
///
/// Written the way a load call spells it, `"<url> <selector>"`, where
/// everything after the first run of whitespace is the selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTarget {
    pub url: String,
    pub selector: Option<String>,
}

impl LoadTarget {
    pub fn new(url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: Some(selector.into()),
        }
    }

    /// Parse `"<url> <selector>"`. Leading and trailing whitespace is ignored.
    pub fn parse(instruction: &str) -> Self {
        let trimmed = instruction.trim();
        match trimmed.split_once(char::is_whitespace) {
            Some((url, selector)) => {
                let selector = selector.trim();
                Self {
                    url: url.to_string(),
                    selector: (!selector.is_empty()).then(|| selector.to_string()),
                }
            }
            None => Self {
                url: trimmed.to_string(),
                selector: None,
            },
        }
    }
}

impl std::fmt::Display for LoadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.selector {
            Some(selector) => write!(f, "{} {}", self.url, selector),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Errors that can occur while intercepting and splicing a navigation.
#[derive(thiserror::Error, Debug)]
pub enum NavError {
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Container '{selector}' not found in {source_url}")]
    ContainerNotFound {
        selector: String,
        source_url: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

impl From<reqwest::Error> for NavError {
    fn from(e: reqwest::Error) -> Self {
        NavError::FetchFailed(e.to_string())
    }
}

impl From<url::ParseError> for NavError {
    fn from(e: url::ParseError) -> Self {
        NavError::InvalidUrl(e.to_string())
    }
}

/// Convenience result type.
pub type NavResult<T> = Result<T, NavError>;

/// Parse a CSS selector, mapping the parser's borrowed error into [`NavError`].
pub(crate) fn parse_selector(selector: &str) -> NavResult<scraper::Selector> {
    scraper::Selector::parse(selector)
        .map_err(|e| NavError::InvalidSelector(format!("{selector}: {e}")))
}
