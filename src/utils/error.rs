use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("Page structure mismatch: expected element {selector}")]
    PageStructure { selector: String },

    #[error("Invalid selector {selector}: {message}")]
    Selector { selector: String, message: String },

    #[error("Notification to {recipient} failed: {message}")]
    Notification { recipient: String, message: String },

    #[error("Captcha not resolved within {0:?}")]
    CaptchaTimeout(Duration),

    #[error("Captcha service error: {0}")]
    Captcha(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Network-level failures are worth another attempt; a page that does
    /// not look the way we expect will not fix itself within a cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Http(e) => !e.is_builder(),
            AppError::Fetch { .. } | AppError::Browser(_) | AppError::Timeout(..) => true,
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
        assert!(!app_err.is_retryable());
    }

    #[test]
    fn test_page_structure_error() {
        let err = AppError::PageStructure {
            selector: ".meeting-availability".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Page structure mismatch: expected element .meeting-availability"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_fetch_errors_are_retryable() {
        let err = AppError::Fetch {
            url: "https://example.com".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
        assert!(AppError::Timeout(Duration::from_secs(30), "body".to_string()).is_retryable());
        assert!(AppError::Browser("navigation failed".to_string()).is_retryable());
    }

    #[test]
    fn test_captcha_timeout_is_fatal() {
        let err = AppError::CaptchaTimeout(Duration::from_secs(300));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("300s"));
    }
}
