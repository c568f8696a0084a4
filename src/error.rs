//! Error types and handling for the CVL optimizer
//!
//! Every failure that can abort a tick is expressed as a [`CvlError`]. The
//! controller contains all of them the same way (log and skip), but
//! [`CvlError::kind`] keeps the classification available to callers.

use thiserror::Error;

/// Result type alias for optimizer operations
pub type Result<T> = std::result::Result<T, CvlError>;

/// Main error type for the optimizer
#[derive(Debug, Error)]
pub enum CvlError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// D-Bus communication errors (no connection, proxy or call failure)
    #[error("D-Bus error: {message}")]
    DBus { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// A telemetry path returned no usable value
    #[error("Missing value: {path}")]
    MissingValue { path: String },

    /// A telemetry path returned a value of the wrong shape or range
    #[error("Invalid value at {path}: {message}")]
    InvalidValue { path: String, message: String },

    /// The charge voltage limit could not be derived from the snapshot
    #[error("Computation error: {message}")]
    Computation { message: String },

    /// A remote SetValue returned a non-zero code
    #[error("Write rejected at {path}: code {code}")]
    WriteRejected { path: String, code: i32 },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

/// Coarse classification of tick failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bus unreachable, proxy or call failed, or timed out
    ConnectionUnavailable,
    /// A required telemetry value was absent or invalid on the bus
    MissingField,
    /// A telemetry value had the wrong type or an impossible value
    InvalidValue,
    /// The policy produced no finite limit
    Computation,
    /// The settings service refused the new limit
    WriteRejected,
    /// Anything else (config, I/O, serialization)
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::ConnectionUnavailable => "connection_unavailable",
            FailureKind::MissingField => "missing_field",
            FailureKind::InvalidValue => "invalid_value",
            FailureKind::Computation => "computation",
            FailureKind::WriteRejected => "write_rejected",
            FailureKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl CvlError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        CvlError::Config {
            message: message.into(),
        }
    }

    /// Create a new D-Bus error
    pub fn dbus<S: Into<String>>(message: S) -> Self {
        CvlError::DBus {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        CvlError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new missing-value error
    pub fn missing<S: Into<String>>(path: S) -> Self {
        CvlError::MissingValue { path: path.into() }
    }

    /// Create a new invalid-value error
    pub fn invalid<S: Into<String>>(path: S, message: S) -> Self {
        CvlError::InvalidValue {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new computation error
    pub fn computation<S: Into<String>>(message: S) -> Self {
        CvlError::Computation {
            message: message.into(),
        }
    }

    /// Create a new rejected-write error
    pub fn rejected<S: Into<String>>(path: S, code: i32) -> Self {
        CvlError::WriteRejected {
            path: path.into(),
            code,
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        CvlError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        CvlError::Io {
            message: message.into(),
        }
    }

    /// Classify this error for tick failure accounting
    pub fn kind(&self) -> FailureKind {
        match self {
            CvlError::DBus { .. } | CvlError::Timeout { .. } => FailureKind::ConnectionUnavailable,
            CvlError::MissingValue { .. } => FailureKind::MissingField,
            CvlError::InvalidValue { .. } => FailureKind::InvalidValue,
            CvlError::Computation { .. } => FailureKind::Computation,
            CvlError::WriteRejected { .. } => FailureKind::WriteRejected,
            CvlError::Config { .. }
            | CvlError::Validation { .. }
            | CvlError::Serialization { .. }
            | CvlError::Io { .. } => FailureKind::Other,
        }
    }
}

impl From<std::io::Error> for CvlError {
    fn from(err: std::io::Error) -> Self {
        CvlError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for CvlError {
    fn from(err: serde_yaml::Error) -> Self {
        CvlError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CvlError {
    fn from(err: serde_json::Error) -> Self {
        CvlError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<zbus::Error> for CvlError {
    fn from(err: zbus::Error) -> Self {
        CvlError::dbus(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CvlError::config("test config error");
        assert!(matches!(err, CvlError::Config { .. }));

        let err = CvlError::missing("/Soc");
        assert!(matches!(err, CvlError::MissingValue { .. }));

        let err = CvlError::validation("field", "test validation error");
        assert!(matches!(err, CvlError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = CvlError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = CvlError::invalid("/System/NrOfCellsPerBattery", "must be positive");
        assert_eq!(
            format!("{}", err),
            "Invalid value at /System/NrOfCellsPerBattery: must be positive"
        );

        let err = CvlError::rejected("/Settings/SystemSetup/MaxChargeVoltage", 1);
        assert_eq!(
            format!("{}", err),
            "Write rejected at /Settings/SystemSetup/MaxChargeVoltage: code 1"
        );
    }

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            CvlError::dbus("no connection").kind(),
            FailureKind::ConnectionUnavailable
        );
        assert_eq!(
            CvlError::timeout("GetValue timed out").kind(),
            FailureKind::ConnectionUnavailable
        );
        assert_eq!(CvlError::missing("/Soc").kind(), FailureKind::MissingField);
        assert_eq!(
            CvlError::invalid("/Soc", "not a number").kind(),
            FailureKind::InvalidValue
        );
        assert_eq!(
            CvlError::computation("nan").kind(),
            FailureKind::Computation
        );
        assert_eq!(CvlError::rejected("/x", 2).kind(), FailureKind::WriteRejected);
        assert_eq!(CvlError::io("disk").kind(), FailureKind::Other);
        assert_eq!(FailureKind::MissingField.to_string(), "missing_field");
    }
}
