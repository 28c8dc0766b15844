//! Envoy process management.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::process::{Child, Command};

use crate::config::EnvoySettings;
use crate::envoy::config::EnvoyConfig;
use crate::error::AgentError;

/// A proxy the agent puts in front of the backend.
#[async_trait]
pub trait Proxy: Send {
    /// Launch the proxy against a written config.
    async fn start(&mut self, config: &EnvoyConfig) -> Result<(), AgentError>;

    /// Terminate the proxy. A no-op when it is not running.
    async fn stop(&mut self) -> Result<(), AgentError>;
}

/// An `envoy` child process.
pub struct EnvoyProcess {
    settings: EnvoySettings,
    child: Option<Child>,
}

impl EnvoyProcess {
    pub fn new(settings: EnvoySettings) -> Self {
        Self {
            settings,
            child: None,
        }
    }

    /// OS pid of the running process.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

impl Default for EnvoyProcess {
    fn default() -> Self {
        Self::new(EnvoySettings::default())
    }
}

#[async_trait]
impl Proxy for EnvoyProcess {
    async fn start(&mut self, config: &EnvoyConfig) -> Result<(), AgentError> {
        if self.child.is_some() {
            return Err(AgentError::proxy_start("envoy is already running"));
        }

        // Distinct base ids keep concurrent envoys from sharing hot-restart memory.
        let base_id: u32 = rand::thread_rng().gen_range(1..u16::MAX as u32);

        let mut child = Command::new(&self.settings.binary)
            .arg("-c")
            .arg(config.config_file())
            .arg("--base-id")
            .arg(base_id.to_string())
            .arg("--log-level")
            .arg(&self.settings.log_level)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::proxy_start(format!(
                    "failed to spawn {}: {}",
                    self.settings.binary.display(),
                    e
                ))
            })?;

        tokio::time::sleep(Duration::from_millis(self.settings.startup_grace_ms)).await;

        if let Some(status) = child.try_wait().map_err(AgentError::proxy_start)? {
            return Err(AgentError::proxy_start(format!(
                "envoy exited during startup ({})",
                status
            )));
        }

        tracing::info!(
            pid = ?child.id(),
            base_id,
            admin_port = config.admin_port(),
            config = %config.config_file().display(),
            "Envoy started"
        );
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AgentError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let pid = child.id();

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::warn!(pid = ?pid, %status, "Envoy had already exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                self.child = Some(child);
                return Err(AgentError::proxy_stop(e));
            }
        }

        if let Err(e) = child.kill().await {
            self.child = Some(child);
            return Err(AgentError::proxy_stop(e));
        }

        tracing::info!(pid = ?pid, "Envoy stopped");
        Ok(())
    }
}
