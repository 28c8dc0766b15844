//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that port names are present and unique
//! - Check that TLS material is given as a pair
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Protocol support is checked by `Agent::start`, not here

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::Config;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyServiceName,
    NoPorts,
    EmptyPortName { index: usize },
    DuplicatePortName(String),
    TlsCertWithoutKey,
    TlsKeyWithoutCert,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyServiceName => write!(f, "service_name must not be empty"),
            ValidationError::NoPorts => write!(f, "at least one port must be declared"),
            ValidationError::EmptyPortName { index } => {
                write!(f, "port #{} has an empty name", index)
            }
            ValidationError::DuplicatePortName(name) => {
                write!(f, "port name '{}' declared more than once", name)
            }
            ValidationError::TlsCertWithoutKey => write!(f, "tls_cert set without tls_key"),
            ValidationError::TlsKeyWithoutCert => write!(f, "tls_key set without tls_cert"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate an agent configuration.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }

    if config.ports.is_empty() {
        errors.push(ValidationError::NoPorts);
    }

    let mut seen = HashSet::new();
    for (index, port) in config.ports.iter().enumerate() {
        if port.name.trim().is_empty() {
            errors.push(ValidationError::EmptyPortName { index });
        } else if !seen.insert(port.name.as_str()) {
            errors.push(ValidationError::DuplicatePortName(port.name.clone()));
        }
    }

    match (&config.tls_cert, &config.tls_key) {
        (Some(_), None) => errors.push(ValidationError::TlsCertWithoutKey),
        (None, Some(_)) => errors.push(ValidationError::TlsKeyWithoutCert),
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
