//! Error types and handling for the alerting pipeline

use crate::gate::GateError;
use crate::meteogram::ParseError;
use crate::thresholds::ThresholdConfigError;
use thiserror::Error;

/// Main error type of a processing run, named after the failing stage
#[derive(Error, Debug)]
pub enum AlertError {
    /// The meteogram yielded no usable series
    #[error("Parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    /// Threshold table or application configuration is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Control marker storage failed
    #[error("Control gate error: {source}")]
    Gate {
        #[from]
        source: GateError,
    },

    /// Alert delivery failed
    #[error("Export error: {message}")]
    Export { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl From<ThresholdConfigError> for AlertError {
    fn from(err: ThresholdConfigError) -> Self {
        Self::config(err.to_string())
    }
}

impl AlertError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new export error
    pub fn export<S: Into<String>>(message: S) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    /// Pipeline stage that failed
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            AlertError::Parse { .. } => "parse",
            AlertError::Config { .. } => "config",
            AlertError::Gate { .. } => "gate",
            AlertError::Export { .. } => "export",
            AlertError::Io { .. } => "io",
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            AlertError::Parse { source } => {
                format!("The meteogram could not be used: {source}.")
            }
            AlertError::Config { message } => {
                format!("Configuration error: {message}. Please check the threshold table and config file.")
            }
            AlertError::Gate { .. } => {
                "Unable to read or write the control marker. Please check the control directory permissions."
                    .to_string()
            }
            AlertError::Export { .. } => {
                "Alerts could not be delivered. Please check the export destination; whether the file is retried today depends on the control policy."
                    .to_string()
            }
            AlertError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(AlertError::from(ParseError::NoLocations).stage(), "parse");
        assert_eq!(AlertError::config("bad").stage(), "config");
        assert_eq!(AlertError::export("down").stage(), "export");
        assert_eq!(
            AlertError::from(GateError::NotClaimed("x".to_string())).stage(),
            "gate"
        );
    }

    #[test]
    fn test_threshold_errors_are_config_errors() {
        let err: AlertError = ThresholdConfigError::Empty.into();
        assert!(matches!(err, AlertError::Config { .. }));
        assert!(err.to_string().contains("no rules"));
    }

    #[test]
    fn test_user_messages() {
        let parse_err = AlertError::from(ParseError::NoDataPoints);
        assert!(parse_err.user_message().contains("No parseable data points"));

        let config_err = AlertError::config("test");
        assert!(config_err.user_message().contains("Configuration error"));
    }

    #[test]
    fn test_export_message_holds_for_every_policy() {
        let message = AlertError::export("connection refused").user_message();
        assert!(message.contains("could not be delivered"));
        assert!(message.contains("control policy"));
        assert!(!message.contains("will not be retried"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AlertError = io_err.into();
        assert!(matches!(err, AlertError::Io { .. }));
    }
}
