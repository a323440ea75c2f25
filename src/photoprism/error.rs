use std::path::PathBuf;

use thiserror::Error;

use crate::retry::Retryable;

/// Errors raised by read calls against PhotoPrism and the originals folder.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("PhotoPrism returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("Unexpected response body from {url}: {source}")]
    Decode {
        source: serde_json::Error,
        url: String,
    },

    #[error("Cannot read original {}: {source}", path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Retryable for SourceError {
    /// Rate limits, server errors and transport failures are transient; a
    /// bad body or a missing original will not fix itself.
    fn is_retryable(&self) -> bool {
        match self {
            SourceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            SourceError::Http { .. } => true,
            SourceError::Decode { .. } => false,
            SourceError::Io { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> SourceError {
        SourceError::HttpStatus {
            status: code,
            url: "http://prism/api/v1/photos".into(),
        }
    }

    #[test]
    fn test_client_errors_not_retryable() {
        assert!(!status(401).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn test_rate_limit_and_server_errors_retryable() {
        assert!(status(429).is_retryable());
        assert!(status(502).is_retryable());
    }

    #[test]
    fn test_missing_original_not_retryable() {
        let e = SourceError::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            path: PathBuf::from("/originals/a.jpg"),
        };
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("/originals/a.jpg"));
    }

    #[test]
    fn test_decode_not_retryable() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e = SourceError::Decode {
            source,
            url: "x".into(),
        };
        assert!(!e.is_retryable());
    }
}
