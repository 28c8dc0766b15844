//! Lifecycle tests for the agent: ordering, port mapping and teardown.

use std::collections::HashSet;

use envoy_agent::backend::EchoServer;
use envoy_agent::config::EnvoySettings;
use envoy_agent::envoy::EnvoyProcess;
use envoy_agent::{Agent, AgentError, AgentState, Protocol};
use serde_json::Value;

mod common;

use common::{config, refuses_connections, FakeBackend, FakeProxy};

#[tokio::test]
async fn echo_service_behind_envoy_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tmp_dir = dir.path().join("agent-test");
    let (proxy, proxy_probe, config_file) = FakeProxy::new();
    let mut agent = Agent::new(
        config(&tmp_dir, &[("http", Protocol::Http)]),
        Box::new(EchoServer::new()),
        Box::new(proxy),
    );

    agent.start().await.unwrap();
    assert_eq!(agent.state(), AgentState::Running);
    assert_eq!(proxy_probe.starts(), 1);

    let ports = agent.ports().to_vec();
    assert_eq!(ports.len(), 1);
    let port = &ports[0];
    assert_eq!(port.config.name, "http");
    assert_ne!(port.envoy_port, port.service_port);
    assert!(port.envoy_port > 0 && port.service_port > 0);

    let admin = agent.envoy_admin_port();
    assert_ne!(admin, 0);
    assert_ne!(admin, port.envoy_port);
    assert_ne!(admin, port.service_port);

    // The bootstrap envoy was handed points at the backend.
    let path = config_file.lock().unwrap().clone().unwrap();
    assert!(path.starts_with(&tmp_dir));
    assert_eq!(agent.envoy_config_file(), Some(path.as_path()));
    let bootstrap: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(bootstrap["admin"]["address"]["socket_address"]["port_value"], admin);
    let cluster = &bootstrap["static_resources"]["clusters"][0];
    assert_eq!(
        cluster["load_assignment"]["endpoints"][0]["lb_endpoints"][0]["endpoint"]["address"]
            ["socket_address"]["port_value"],
        port.service_port
    );

    // The backend answers on its port.
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let body = client
        .get(format!("http://127.0.0.1:{}/", port.service_port))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("ServiceVersion=v1"));
    drop(client);

    agent.stop().await.unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);
    assert_eq!(proxy_probe.stops(), 1);
    assert!(!path.exists());
    assert!(!tmp_dir.exists());
    assert!(refuses_connections(port.service_port).await);
}

#[tokio::test]
async fn every_port_is_distinct_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let names = ["http", "http-alt", "metrics", "debug", "admin-api"];
    let declared: Vec<_> = names.iter().map(|n| (*n, Protocol::Http)).collect();
    let (backend, _) = FakeBackend::new();
    let (proxy, _, _) = FakeProxy::new();
    let mut agent = Agent::new(config(dir.path(), &declared), Box::new(backend), Box::new(proxy));

    agent.start().await.unwrap();

    let ports = agent.ports();
    assert_eq!(ports.len(), names.len());
    for (port, name) in ports.iter().zip(names) {
        assert_eq!(port.config.name, name);
    }

    let mut seen = HashSet::new();
    assert!(seen.insert(agent.envoy_admin_port()));
    for port in ports {
        assert!(seen.insert(port.envoy_port), "duplicate envoy port {}", port.envoy_port);
        assert!(seen.insert(port.service_port), "duplicate service port {}", port.service_port);
    }
    assert!(!seen.contains(&0));

    agent.stop().await.unwrap();
}

#[tokio::test]
async fn unsupported_protocol_starts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http), ("grpc", Protocol::Grpc)]),
        Box::new(backend),
        Box::new(proxy),
    );

    let err = agent.start().await.unwrap_err();
    assert!(matches!(err, AgentError::UnsupportedProtocol(Protocol::Grpc)));
    assert!(err.to_string().contains("GRPC"));

    assert_eq!(backend_probe.starts(), 0);
    assert_eq!(proxy_probe.starts(), 0);
    assert!(agent.ports().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    agent.stop().await.unwrap();
    assert_eq!(backend_probe.stops(), 0);
}

#[tokio::test]
async fn accessors_and_stop_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http)]),
        Box::new(backend),
        Box::new(proxy),
    );

    assert!(agent.ports().is_empty());
    assert_eq!(agent.envoy_admin_port(), 0);
    assert!(agent.envoy_config_file().is_none());

    agent.stop().await.unwrap();
    agent.stop().await.unwrap();
    assert_eq!(agent.state(), AgentState::Unstarted);
    assert_eq!(backend_probe.stops(), 0);
    assert_eq!(proxy_probe.stops(), 0);
}

#[tokio::test]
async fn second_stop_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http)]),
        Box::new(backend),
        Box::new(proxy),
    );

    agent.start().await.unwrap();
    agent.stop().await.unwrap();
    agent.stop().await.unwrap();

    assert_eq!(backend_probe.stops(), 1);
    assert_eq!(proxy_probe.stops(), 1);
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[tokio::test]
async fn envoy_failure_after_backend_start_is_fully_unwound() {
    let dir = tempfile::tempdir().unwrap();
    let tmp_dir = dir.path().join("agent-test");
    let envoy = EnvoyProcess::new(EnvoySettings {
        binary: dir.path().join("missing-envoy"),
        startup_grace_ms: 0,
        ..EnvoySettings::default()
    });
    let mut agent = Agent::new(
        config(&tmp_dir, &[("http", Protocol::Http)]),
        Box::new(EchoServer::new()),
        Box::new(envoy),
    );

    let err = agent.start().await.unwrap_err();
    assert!(matches!(err, AgentError::ProxyStart(_)));
    assert_ne!(agent.state(), AgentState::Running);

    // Backend is up and the config is on disk until stop.
    let service_port = agent.ports()[0].service_port;
    assert!(!refuses_connections(service_port).await);
    let path = agent.envoy_config_file().unwrap().to_path_buf();
    assert!(path.exists());

    // Restarting without cleanup is refused.
    assert!(matches!(agent.start().await.unwrap_err(), AgentError::AlreadyStarted));

    agent.stop().await.unwrap();
    assert!(refuses_connections(service_port).await);
    assert!(!path.exists());
    assert!(!tmp_dir.exists());
}

#[tokio::test]
async fn backend_failure_stops_the_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    backend_probe.set_fail_start(true);
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http)]),
        Box::new(backend),
        Box::new(proxy),
    );

    let err = agent.start().await.unwrap_err();
    assert!(matches!(err, AgentError::BackendStart(_)));
    assert_eq!(proxy_probe.starts(), 0);
    assert_eq!(agent.envoy_admin_port(), 0);
    assert!(agent.envoy_config_file().is_none());

    agent.stop().await.unwrap();
    assert_eq!(backend_probe.stops(), 0);
}

#[tokio::test]
async fn port_mapping_failure_still_stops_backend() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    backend_probe.set_short_ports(true);
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http), ("http-alt", Protocol::Http)]),
        Box::new(backend),
        Box::new(proxy),
    );

    let err = agent.start().await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::PortCountMismatch { declared: 2, bound: 1 }
    ));
    assert_eq!(backend_probe.starts(), 1);
    assert_eq!(proxy_probe.starts(), 0);
    assert!(agent.ports().is_empty());
    assert_eq!(agent.envoy_admin_port(), 0);
    assert!(agent.envoy_config_file().is_none());

    agent.stop().await.unwrap();
    assert_eq!(backend_probe.stops(), 1);
    assert_eq!(proxy_probe.stops(), 0);
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[tokio::test]
async fn config_generation_failure_still_stops_backend() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the temp dir should be.
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    let mut agent = Agent::new(
        config(&blocker, &[("http", Protocol::Http)]),
        Box::new(backend),
        Box::new(proxy),
    );

    let err = agent.start().await.unwrap_err();
    assert!(matches!(err, AgentError::ConfigGeneration(_)));
    assert_eq!(proxy_probe.starts(), 0);
    assert!(agent.envoy_config_file().is_none());

    agent.stop().await.unwrap();
    assert_eq!(backend_probe.stops(), 1);
    assert_eq!(proxy_probe.stops(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn failed_restart_does_not_report_previous_ports() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, _, _) = FakeProxy::new();
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http)]),
        Box::new(backend),
        Box::new(proxy),
    );

    agent.start().await.unwrap();
    assert_eq!(agent.ports().len(), 1);
    agent.stop().await.unwrap();

    backend_probe.set_fail_start(true);
    let err = agent.start().await.unwrap_err();
    assert!(matches!(err, AgentError::BackendStart(_)));
    assert!(agent.ports().is_empty());
    assert_eq!(agent.envoy_admin_port(), 0);
}

#[tokio::test]
async fn stop_attempts_everything_and_aggregates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, backend_probe) = FakeBackend::new();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http)]),
        Box::new(backend),
        Box::new(proxy),
    );

    agent.start().await.unwrap();
    let path = agent.envoy_config_file().unwrap().to_path_buf();

    proxy_probe.set_fail_stop(true);
    backend_probe.set_fail_stop(true);

    let err = agent.stop().await.unwrap_err();
    let AgentError::Teardown(errors) = err else {
        panic!("expected teardown error");
    };
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors.errors()[0], AgentError::ProxyStop(_)));
    assert!(matches!(errors.errors()[1], AgentError::BackendStop(_)));

    // Config is removed regardless, and the agent is still considered running.
    assert!(!path.exists());
    assert_eq!(agent.state(), AgentState::Running);

    // Only the proxy keeps failing; the retry reports just that.
    backend_probe.set_fail_stop(false);
    let err = agent.stop().await.unwrap_err();
    match err {
        AgentError::Teardown(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors.errors()[0], AgentError::ProxyStop(_)));
        }
        other => panic!("unexpected error: {}", other),
    }

    proxy_probe.set_fail_stop(false);
    agent.stop().await.unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);
    assert_eq!(proxy_probe.stops(), 3);
    assert_eq!(backend_probe.stops(), 2);
}

#[tokio::test]
async fn restart_after_stop_resolves_new_ports() {
    let dir = tempfile::tempdir().unwrap();
    let (proxy, proxy_probe, _) = FakeProxy::new();
    let mut agent = Agent::new(
        config(dir.path(), &[("http", Protocol::Http)]),
        Box::new(EchoServer::new()),
        Box::new(proxy),
    );

    agent.start().await.unwrap();
    agent.stop().await.unwrap();
    agent.start().await.unwrap();

    assert_eq!(agent.state(), AgentState::Running);
    assert_eq!(agent.ports().len(), 1);
    assert_eq!(proxy_probe.starts(), 2);
    assert!(!refuses_connections(agent.ports()[0].service_port).await);

    agent.stop().await.unwrap();
}
