//! Envoy bootstrap generation.
//!
//! # Responsibilities
//! - Describe one listener → cluster pair per mapped port, plus the admin listener
//! - Write the description as a JSON bootstrap under a fresh directory in `tmp_dir`
//! - Remove everything it created on dispose or drop
//!
//! # Design Decisions
//! - The artifact records each directory as soon as it exists, so a failed
//!   build is cleaned up by the same dispose path as a finished one
//! - Dispose never fails; cleanup problems are logged and dropped

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AgentError;
use crate::ports::Port;

/// File name of the bootstrap inside the working directory.
pub const CONFIG_FILE_NAME: &str = "envoy.json";

const LOOPBACK: &str = "127.0.0.1";

/// Inputs for an envoy bootstrap.
#[derive(Debug, Clone)]
pub struct EnvoyConfigBuilder<'a> {
    pub service_name: &'a str,
    pub admin_port: u16,
    pub ports: &'a [Port],
    pub tmp_dir: &'a Path,
}

impl<'a> EnvoyConfigBuilder<'a> {
    /// Write the bootstrap to disk.
    pub fn build(&self) -> Result<EnvoyConfig, AgentError> {
        let work_dir = self.tmp_dir.join(format!("envoy-{}", Uuid::new_v4().simple()));
        let mut artifact = EnvoyConfig {
            config_file: work_dir.join(CONFIG_FILE_NAME),
            admin_port: self.admin_port,
            work_dir: None,
            created_dirs: missing_ancestors(self.tmp_dir),
        };

        if !artifact.created_dirs.is_empty() {
            fs::create_dir_all(self.tmp_dir).map_err(AgentError::config_generation)?;
        }

        fs::create_dir(&work_dir).map_err(AgentError::config_generation)?;
        artifact.work_dir = Some(work_dir);

        let contents =
            serde_json::to_vec_pretty(&self.bootstrap()).map_err(AgentError::config_generation)?;
        fs::write(&artifact.config_file, contents).map_err(AgentError::config_generation)?;

        tracing::info!(
            path = %artifact.config_file.display(),
            admin_port = self.admin_port,
            listeners = self.ports.len(),
            "Envoy config written"
        );
        Ok(artifact)
    }

    /// The bootstrap document.
    pub fn bootstrap(&self) -> Value {
        let listeners: Vec<Value> = self.ports.iter().map(|p| self.listener(p)).collect();
        let clusters: Vec<Value> = self.ports.iter().map(|p| self.cluster(p)).collect();

        json!({
            "node": {
                "id": format!("{}-{}", self.service_name, Uuid::new_v4().simple()),
                "cluster": self.service_name,
            },
            "admin": {
                "address": socket_address(self.admin_port),
            },
            "static_resources": {
                "listeners": listeners,
                "clusters": clusters,
            },
        })
    }

    fn cluster_name(&self, port: &Port) -> String {
        format!("{}|{}|{}", self.service_name, port.config.name, port.service_port)
    }

    fn listener(&self, port: &Port) -> Value {
        let name = &port.config.name;
        let protocol = port.config.protocol.as_str();

        json!({
            "name": name,
            "address": socket_address(port.envoy_port),
            "metadata": {
                "filter_metadata": {
                    "envoy_agent": {
                        "port_name": name,
                        "protocol": protocol,
                        "service_port": port.service_port,
                    },
                },
            },
            "filter_chains": [{
                "filters": [{
                    "name": "envoy.filters.network.http_connection_manager",
                    "typed_config": {
                        "@type": "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager",
                        "stat_prefix": format!("{}_{}", protocol.to_lowercase(), name),
                        "codec_type": "AUTO",
                        "route_config": {
                            "name": name,
                            "virtual_hosts": [{
                                "name": self.service_name,
                                "domains": ["*"],
                                "routes": [{
                                    "match": { "prefix": "/" },
                                    "route": { "cluster": self.cluster_name(port) },
                                }],
                            }],
                        },
                        "http_filters": [{
                            "name": "envoy.filters.http.router",
                            "typed_config": {
                                "@type": "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router",
                            },
                        }],
                    },
                }],
            }],
        })
    }

    fn cluster(&self, port: &Port) -> Value {
        let name = self.cluster_name(port);
        json!({
            "name": name,
            "connect_timeout": "1s",
            "type": "STATIC",
            "load_assignment": {
                "cluster_name": name,
                "endpoints": [{
                    "lb_endpoints": [{
                        "endpoint": { "address": socket_address(port.service_port) },
                    }],
                }],
            },
        })
    }
}

/// `dir` and each ancestor that does not exist yet, deepest first.
fn missing_ancestors(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

fn socket_address(port: u16) -> Value {
    json!({ "socket_address": { "address": LOOPBACK, "port_value": port } })
}

/// A bootstrap file on disk, removed on [`EnvoyConfig::dispose`] or drop.
#[derive(Debug)]
pub struct EnvoyConfig {
    config_file: PathBuf,
    admin_port: u16,
    /// Working directory holding `config_file`, once created.
    work_dir: Option<PathBuf>,
    /// Directories above `work_dir` the build created, deepest first.
    created_dirs: Vec<PathBuf>,
}

impl EnvoyConfig {
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn admin_port(&self) -> u16 {
        self.admin_port
    }

    pub fn is_disposed(&self) -> bool {
        self.work_dir.is_none() && self.created_dirs.is_empty()
    }

    /// Remove everything the build created. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(dir) = self.work_dir.take() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => tracing::debug!(path = %dir.display(), "Removed envoy config directory"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to remove envoy config directory"
                ),
            }
        }

        // Only removed when empty; other agents may share them.
        for dir in self.created_dirs.drain(..) {
            if let Err(e) = fs::remove_dir(&dir) {
                tracing::debug!(path = %dir.display(), error = %e, "Left temp dir in place");
                break;
            }
        }
    }
}

impl Drop for EnvoyConfig {
    fn drop(&mut self) {
        self.dispose();
    }
}
