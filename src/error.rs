//! Error types for the agent lifecycle.
//!
//! `start` surfaces the first failure verbatim. `stop` never bails early:
//! every component failure is collected into a [`MultiError`].

use std::fmt;

use thiserror::Error;

use crate::config::Protocol;

/// Boxed cause carried by the wrapping variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while starting or stopping an agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A declared port uses a protocol the agent cannot front yet.
    #[error("protocol {0} not currently supported")]
    UnsupportedProtocol(Protocol),

    /// The OS refused to hand out an ephemeral port.
    #[error("failed to allocate a free port: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// The backend reported a different number of ports than were declared.
    #[error("backend bound {bound} ports but {declared} were declared")]
    PortCountMismatch { declared: usize, bound: usize },

    #[error("failed to start backend: {0}")]
    BackendStart(#[source] BoxError),

    #[error("failed to stop backend: {0}")]
    BackendStop(#[source] BoxError),

    #[error("failed to generate envoy config: {0}")]
    ConfigGeneration(#[source] BoxError),

    #[error("failed to start envoy: {0}")]
    ProxyStart(#[source] BoxError),

    #[error("failed to stop envoy: {0}")]
    ProxyStop(#[source] BoxError),

    /// `start` was called while components from a previous start are live.
    #[error("agent already started; call stop first")]
    AlreadyStarted,

    /// One or more components failed to shut down.
    #[error("{0}")]
    Teardown(MultiError),
}

impl AgentError {
    /// Wrap any error as a backend start failure.
    pub fn backend_start(err: impl Into<BoxError>) -> Self {
        Self::BackendStart(err.into())
    }

    pub fn backend_stop(err: impl Into<BoxError>) -> Self {
        Self::BackendStop(err.into())
    }

    pub fn config_generation(err: impl Into<BoxError>) -> Self {
        Self::ConfigGeneration(err.into())
    }

    pub fn proxy_start(err: impl Into<BoxError>) -> Self {
        Self::ProxyStart(err.into())
    }

    pub fn proxy_stop(err: impl Into<BoxError>) -> Self {
        Self::ProxyStop(err.into())
    }
}

/// An ordered list of independent failures.
///
/// An empty list means success; [`MultiError::into_result`] turns it into
/// `Ok(())` without ever building an error value.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<AgentError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one step, keeping only failures.
    pub fn record(&mut self, result: Result<(), AgentError>) {
        if let Err(err) = result {
            self.errors.push(err);
        }
    }

    pub fn push(&mut self, err: AgentError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[AgentError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<AgentError> {
        self.errors
    }

    /// `Ok(())` when nothing failed, otherwise [`AgentError::Teardown`].
    pub fn into_result(self) -> Result<(), AgentError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Teardown(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}
