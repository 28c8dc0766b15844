//! In-process HTTP echo backend.
//!
//! # Responsibilities
//! - Bind one loopback listener per requested port
//! - Serve plain HTTP, or HTTPS when cert and key are both given
//! - Describe each request back to the caller
//! - Release every listener on stop

use std::net::TcpListener;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    response::IntoResponse,
    routing::any,
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::backend::{Backend, BackendSpec};
use crate::error::AgentError;

/// Largest request body echoed back.
const MAX_ECHO_BODY: usize = 1024 * 1024;

/// Time allowed for in-flight requests to finish on stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct EchoState {
    version: String,
    port: u16,
}

struct RunningListener {
    port: u16,
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
}

/// Echo server listening on one or more loopback ports.
#[derive(Default)]
pub struct EchoServer {
    listeners: Vec<RunningListener>,
}

impl EchoServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports currently being served.
    pub fn ports(&self) -> Vec<u16> {
        self.listeners.iter().map(|l| l.port).collect()
    }

    fn spawn_listener(&mut self, version: &str, tls: Option<RustlsConfig>) -> std::io::Result<u16> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        let app = Router::new()
            .route("/", any(echo_handler))
            .route("/{*path}", any(echo_handler))
            .with_state(EchoState {
                version: version.to_string(),
                port,
            })
            .layer(TraceLayer::new_for_http());

        let handle = Handle::new();
        let task = match tls {
            Some(tls) => tokio::spawn(
                axum_server::tls_rustls::from_tcp_rustls(listener, tls)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            ),
            None => tokio::spawn(
                axum_server::from_tcp(listener)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            ),
        };

        self.listeners.push(RunningListener { port, handle, task });
        Ok(port)
    }

    /// Gracefully stop every listener, collecting the first failure.
    async fn shutdown_all(&mut self) -> Result<(), AgentError> {
        let mut first_error = None;

        for listener in self.listeners.drain(..) {
            listener.handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
            let outcome = match listener.task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(AgentError::backend_stop(e)),
                Err(e) => Err(AgentError::backend_stop(e)),
            };
            if let Err(e) = outcome {
                tracing::error!(port = listener.port, error = %e, "Echo listener did not stop cleanly");
                first_error.get_or_insert(e);
            } else {
                tracing::debug!(port = listener.port, "Echo listener stopped");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for EchoServer {
    async fn start(&mut self, spec: &BackendSpec) -> Result<Vec<u16>, AgentError> {
        if !self.listeners.is_empty() {
            return Err(AgentError::backend_start("echo server is already running"));
        }

        let tls = tls_config(spec).await?;

        let mut ports = Vec::with_capacity(spec.port_count);
        for _ in 0..spec.port_count {
            match self.spawn_listener(&spec.version, tls.clone()) {
                Ok(port) => ports.push(port),
                Err(e) => {
                    // Listeners bound so far are not handed to the agent.
                    if let Err(rollback) = self.shutdown_all().await {
                        tracing::warn!(error = %rollback, "Echo backend rollback left a listener behind");
                    }
                    return Err(AgentError::backend_start(e));
                }
            }
        }

        tracing::info!(
            ports = ?ports,
            tls = tls.is_some(),
            version = %spec.version,
            "Echo backend started"
        );
        Ok(ports)
    }

    async fn stop(&mut self) -> Result<(), AgentError> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        let result = self.shutdown_all().await;
        if result.is_ok() {
            tracing::info!("Echo backend stopped");
        }
        result
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.handle.shutdown();
        }
    }
}

/// Rustls settings for the cert/key pair in `spec`; `None` serves plain HTTP.
async fn tls_config(spec: &BackendSpec) -> Result<Option<RustlsConfig>, AgentError> {
    let (cert, key) = match (&spec.tls_cert, &spec.tls_key) {
        (Some(cert), Some(key)) => (cert, key),
        (None, None) => return Ok(None),
        _ => {
            return Err(AgentError::backend_start(
                "tls_cert and tls_key must be provided together",
            ))
        }
    };

    for (kind, path) in [("certificate", cert), ("key", key)] {
        if !path.is_file() {
            return Err(AgentError::backend_start(format!(
                "echo backend TLS {} {} does not exist",
                kind,
                path.display()
            )));
        }
    }

    RustlsConfig::from_pem_file(cert, key)
        .await
        .map(Some)
        .map_err(|e| {
            AgentError::backend_start(format!(
                "echo backend could not load TLS pair {} / {}: {}",
                cert.display(),
                key.display(),
                e
            ))
        })
}

/// Describe the request as `Key=Value` lines, followed by the request body.
async fn echo_handler(State(state): State<EchoState>, request: Request<Body>) -> impl IntoResponse {
    let (parts, body) = request.into_parts();

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!("ServiceVersion={}\n", state.version));
    out.push_str(&format!("ServicePort={}\n", state.port));
    out.push_str(&format!("Method={}\n", parts.method));
    out.push_str(&format!("URL={}\n", parts.uri));
    out.push_str(&format!("Proto={:?}\n", parts.version));
    out.push_str(&format!("Host={}\n", host));

    let mut names: Vec<_> = parts.headers.keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for name in names {
        for value in parts.headers.get_all(name) {
            out.push_str(&format!(
                "RequestHeader={}:{}\n",
                name,
                String::from_utf8_lossy(value.as_bytes())
            ));
        }
    }

    match axum::body::to_bytes(body, MAX_ECHO_BODY).await {
        Ok(bytes) if !bytes.is_empty() => {
            out.push_str(&String::from_utf8_lossy(&bytes));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(port = state.port, error = %e, "Failed to read request body"),
    }

    out
}
