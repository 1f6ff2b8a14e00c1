use policyflow_core::CoreError;
use thiserror::Error;

/// Error type for the PolicyFlow binary: startup, configuration and CLI
/// paths. Request handling maps `CoreError` straight to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("authentication error: {0}")]
    Auth(#[from] crate::identity::AuthError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(format!("TOML parse error: {}", e))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Internal("something broke".into());
        assert_eq!(err.to_string(), "internal error: something broke");
    }

    #[test]
    fn test_app_error_config() {
        let err = AppError::Config("missing database_path".into());
        assert_eq!(err.to_string(), "configuration error: missing database_path");
    }

    #[test]
    fn test_core_error_passes_through() {
        let err: AppError = CoreError::not_found("user not found").into();
        assert_eq!(err.to_string(), "not found: user not found");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: AppError = io_err.into();
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: AppError = toml_err.into();
        assert!(err.to_string().starts_with("configuration error: TOML parse error"));
    }
}
