use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Connection to {address} failed: {source}")]
    Connection {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("{key} not found in registry {registry}")]
    NotFound { registry: String, key: String },

    #[error("Failed to resolve {domain}: {source}")]
    Resolution {
        domain: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Registration failed at {stage}: {source}")]
    Registration {
        stage: RegistrationStage,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Failed to fetch registry spec from {url}: {reason}")]
    SpecFetch { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap a failure from the two-hop lookup.
    ///
    /// Malformed input, absent keys and misconfiguration surface as themselves.
    pub fn resolution(domain: &str, err: CoreError) -> Self {
        match err {
            e @ (CoreError::InvalidDomain(_)
            | CoreError::NotFound { .. }
            | CoreError::Configuration(_)
            | CoreError::Resolution { .. }) => e,
            other => CoreError::Resolution {
                domain: domain.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn registration(stage: RegistrationStage, err: CoreError) -> Self {
        CoreError::Registration {
            stage,
            source: Box::new(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

/// Step of the registration state machine that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationStage {
    FetchSpec,
    Connect,
    Schema,
    Nonce,
    Sign,
    Submit,
    Inclusion,
    Emit,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            RegistrationStage::FetchSpec => "spec fetch",
            RegistrationStage::Connect => "connect",
            RegistrationStage::Schema => "schema",
            RegistrationStage::Nonce => "nonce lookup",
            RegistrationStage::Sign => "signing",
            RegistrationStage::Submit => "submission",
            RegistrationStage::Inclusion => "inclusion wait",
            RegistrationStage::Emit => "result emission",
        };
        f.write_str(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_passes_through_terminal_errors() {
        let err = CoreError::resolution(
            "missing.com",
            CoreError::NotFound {
                registry: "com".to_string(),
                key: "missing.com".to_string(),
            },
        );
        assert!(err.is_not_found());

        let err = CoreError::resolution("noTLD", CoreError::InvalidDomain("noTLD".to_string()));
        assert!(matches!(err, CoreError::InvalidDomain(_)));
    }

    #[test]
    fn test_resolution_wraps_transport_errors() {
        let err = CoreError::resolution(
            "example.com",
            CoreError::Transport(TransportError::Rpc("state_getStorage timed out".to_string())),
        );
        match err {
            CoreError::Resolution { domain, source } => {
                assert_eq!(domain, "example.com");
                assert!(matches!(*source, CoreError::Transport(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_registration_message() {
        let err = CoreError::registration(
            RegistrationStage::Nonce,
            CoreError::Codec("truncated account info".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "Registration failed at nonce lookup: Codec error: truncated account info"
        );
    }
}
