//! Error types for the ovfedit core library.

use std::path::PathBuf;

/// The main error type for ovfedit operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error with optional path context.
    #[error("I/O error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// Malformed XML or a document structure this tool cannot edit.
    #[error("OVF document error: {message}")]
    Xml { message: String },

    /// Malformed or type-mismatched caller input.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Value is below the platform's supported range.
    #[error("{kind} value {value} is too low for {platform} (minimum {min})")]
    ValueTooLow {
        kind: String,
        value: u64,
        min: u64,
        platform: String,
    },

    /// Value is above the platform's supported range.
    #[error("{kind} value {value} is too high for {platform} (maximum {max})")]
    ValueTooHigh {
        kind: String,
        value: u64,
        max: u64,
        platform: String,
    },

    /// Value is not one the platform supports, or an unsupported device kind.
    #[error("unsupported value: {message}")]
    ValueUnsupported { message: String },

    /// No eligible device, parent or file was found.
    #[error("lookup failed: {message}")]
    Lookup { message: String },

    /// An external helper program failed or could not be found.
    #[error("helper '{program}' failed: {message}")]
    Helper { program: String, message: String },
}

/// A specialized Result type for ovfedit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an I/O error without path context.
    pub fn io_simple(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    /// Create a document structure error.
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an unsupported value error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::ValueUnsupported {
            message: message.into(),
        }
    }

    /// Create a lookup error.
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup {
            message: message.into(),
        }
    }

    /// Create a helper program error.
    pub fn helper(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Helper {
            program: program.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io_simple(source)
    }
}

impl From<quick_xml::Error> for Error {
    fn from(source: quick_xml::Error) -> Self {
        Self::xml(source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io(io_err, "/path/to/package.ovf");
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("/path/to/package.ovf"));
    }

    #[test]
    fn test_io_error_without_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io_simple(io_err);
        assert!(!err.to_string().contains("at '"));
    }

    #[test]
    fn test_value_too_low_message() {
        let err = Error::ValueTooLow {
            kind: "cpus".to_string(),
            value: 0,
            min: 1,
            platform: "generic platform".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cpus value 0 is too low"));
        assert!(msg.contains("minimum 1"));
    }

    #[test]
    fn test_value_too_high_message() {
        let err = Error::ValueTooHigh {
            kind: "nic count".to_string(),
            value: 99,
            max: 26,
            platform: "Cisco CSR1000V".to_string(),
        };
        assert!(err.to_string().contains("maximum 26"));
    }

    #[test]
    fn test_lookup_error() {
        let err = Error::lookup("no empty cdrom drive");
        assert!(err.to_string().contains("lookup failed"));
    }

    #[test]
    fn test_helper_error() {
        let err = Error::helper("mkisofs", "exit status 1");
        let msg = err.to_string();
        assert!(msg.contains("mkisofs"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { path: None, .. }));
    }
}
