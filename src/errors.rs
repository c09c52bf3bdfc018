//! Typed error hierarchy for pmboard.
//!
//! Two enums cover the two layers:
//! - `BoardError`: domain failures raised by the store and board services
//! - `ConfigError`: configuration loading failures
//!
//! Store methods return `anyhow::Result`; domain failures are wrapped in it
//! and recovered by the API layer with `downcast_ref::<BoardError>()`.

use thiserror::Error;

/// Domain failures from the board store and services.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),
}

impl BoardError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Errors raised while loading `pmboard.toml` or applying overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_error_not_found_carries_entity_and_id() {
        let err = BoardError::not_found("Card", 42);
        match &err {
            BoardError::NotFound { entity, id } => {
                assert_eq!(*entity, "Card");
                assert_eq!(*id, 42);
            }
            _ => panic!("Expected NotFound"),
        }
        assert_eq!(err.to_string(), "Card 42 not found");
    }

    #[test]
    fn board_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = BoardError::conflict("Sprint is already active").into();
        let err = err.context("Failed to start sprint");
        let inner = err.downcast_ref::<BoardError>().expect("should downcast");
        assert!(matches!(inner, BoardError::Conflict(msg) if msg == "Sprint is already active"));
    }

    #[test]
    fn board_error_variants_are_distinct() {
        let invalid = BoardError::invalid("x");
        let transition = BoardError::InvalidTransition("x".into());
        assert!(matches!(invalid, BoardError::Invalid(_)));
        assert!(!matches!(transition, BoardError::Invalid(_)));
    }

    #[test]
    fn config_error_invalid_value_mentions_key() {
        let err = ConfigError::InvalidValue {
            key: "notifications.send_at".into(),
            value: "25:99".into(),
        };
        assert!(err.to_string().contains("notifications.send_at"));
        assert!(err.to_string().contains("25:99"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardError::Forbidden("no".into()));
        assert_std_error(&ConfigError::InvalidValue {
            key: "k".into(),
            value: "v".into(),
        });
    }
}
