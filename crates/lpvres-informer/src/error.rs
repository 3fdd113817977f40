// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading cluster state
#[derive(Error, Debug, Diagnostic)]
pub enum InformerError {
    /// The HTTP request could not be sent
    #[error("HTTP request to {url} failed: {message}")]
    #[diagnostic(
        code(lpvres::informer::http_error),
        help("Verify the API server address and that it is reachable from this host")
    )]
    Http {
        #[allow(unused)]
        url: String,
        #[allow(unused)]
        message: String,
    },

    /// The API server answered with a non-success status
    #[error("GET {url} failed with status {status}: {body}")]
    #[diagnostic(
        code(lpvres::informer::unexpected_status),
        help("A 401 or 403 usually means the token lacks list permission on nodes, pods, persistentvolumes and persistentvolumeclaims")
    )]
    UnexpectedStatus {
        #[allow(unused)]
        url: String,
        #[allow(unused)]
        status: u16,
        #[allow(unused)]
        body: String,
    },

    /// A response or document could not be decoded
    #[error("Failed to decode {what}: {message}")]
    #[diagnostic(
        code(lpvres::informer::decode_error),
        help("The payload is not a valid Kubernetes object list")
    )]
    Decode {
        #[allow(unused)]
        what: String,
        #[allow(unused)]
        message: String,
    },

    /// A local file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    #[diagnostic(
        code(lpvres::informer::io_error),
        help("Check that the file exists and is readable by this process")
    )]
    Io {
        #[allow(unused)]
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Connection settings are incomplete or invalid
    #[error("Invalid cluster configuration: {message}")]
    #[diagnostic(code(lpvres::informer::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] lpvres_core::CoreError),
}

/// Result type for informer operations
pub type Result<T> = std::result::Result<T, InformerError>;

impl InformerError {
    /// Create an Http error
    pub fn http(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an UnexpectedStatus error
    pub fn unexpected_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Create a Decode error
    pub fn decode(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Create an Io error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}
