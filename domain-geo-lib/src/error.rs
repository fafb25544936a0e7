//! Error handling for the resolve-and-classify pipeline.
//!
//! Every failure the pipeline can meet is one variant of [`GeoScanError`].
//! The pool only needs one question answered about an error: retry it or
//! abort the run. [`GeoScanError::is_retryable`] answers it.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Main error type for scan operations.
#[derive(Debug, Clone)]
pub enum GeoScanError {
    /// Network-related errors (connection refused, reset, DNS failure of the resolver host)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// The DNS-over-HTTPS resolver answered, but not with a usable response
    ResolverError {
        domain: String,
        message: String,
        status_code: Option<u16>,
    },

    /// Malformed JSON, either from the resolver or a reference file
    ParseError {
        message: String,
        content: Option<String>,
    },

    /// Geo-IP database failures (open or lookup)
    GeoIpError {
        ip: Option<IpAddr>,
        message: String,
    },

    /// Invalid configuration values
    ConfigError { message: String },

    /// File I/O errors on input, reference, checkpoint or output files
    FileError { path: String, message: String },

    /// A single attempt ran past its deadline
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// The run was aborted through the shared cancellation signal
    Cancelled { reason: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl GeoScanError {
    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new resolver error carrying the HTTP status code.
    pub fn resolver_with_status<D: Into<String>, M: Into<String>>(
        domain: D,
        message: M,
        status_code: u16,
    ) -> Self {
        Self::ResolverError {
            domain: domain.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a new parse error.
    pub fn parse<M: Into<String>>(message: M) -> Self {
        Self::ParseError {
            message: message.into(),
            content: None,
        }
    }

    /// Create a new geo-IP error.
    pub fn geoip<M: Into<String>>(ip: Option<IpAddr>, message: M) -> Self {
        Self::GeoIpError {
            ip,
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new cancellation error.
    pub fn cancelled<R: Into<String>>(reason: R) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is a transient resolution failure.
    ///
    /// Only failures of the resolver round-trip qualify: network errors,
    /// attempt timeouts, non-2xx answers and unreadable response bodies.
    /// Everything else aborts the run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. }
                | Self::Timeout { .. }
                | Self::ResolverError { .. }
                | Self::ParseError { .. }
        )
    }

    /// Check if this error is the result of cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl fmt::Display for GeoScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::ResolverError {
                domain,
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(
                        f,
                        "Resolver error for '{}' (HTTP {}): {}",
                        domain, code, message
                    )
                } else {
                    write!(f, "Resolver error for '{}': {}", domain, message)
                }
            }
            Self::ParseError { message, content: _ } => {
                write!(f, "Parse error: {}", message)
            }
            Self::GeoIpError { ip, message } => match ip {
                Some(ip) => write!(f, "Geo-IP error for {}: {}", ip, message),
                None => write!(f, "Geo-IP error: {}", message),
            },
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::Cancelled { reason } => {
                write!(f, "Scan cancelled: {}", reason)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for GeoScanError {}

impl From<serde_json::Error> for GeoScanError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: format!("JSON parsing failed: {}", err),
            content: None,
        }
    }
}
