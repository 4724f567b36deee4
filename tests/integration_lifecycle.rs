//! Fixture lifecycle integration tests
//!
//! Drives the controller end to end with a fake `java` (a shell script that
//! records its arguments and sleeps) and an in-process HTTP stub standing in
//! for the Maven repository.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use wiremock_launcher::config::{Config, ReadinessConfig, StdioMode};
use wiremock_launcher::error::{FetchError, PrepareError};
use wiremock_launcher::lifecycle::{Capabilities, LifecycleController, LifecyclePhase, RunnerConfig, TriggerSet};
use wiremock_launcher::process::ProcessState;

/// Shell script standing in for `java`
fn fake_java(dir: &Path) -> PathBuf {
    let script = dir.join("fake-java");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\nexec sleep 30\n",
            dir.join("args.txt").display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

async fn read_args(dir: &Path) -> Vec<String> {
    let path = dir.join("args.txt");
    for _ in 0..100 {
        if let Ok(content) = std::fs::read_to_string(&path) {
            if !content.is_empty() {
                return content.lines().map(str::to_string).collect();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("fake java never recorded its arguments");
}

/// HTTP stub answering every request with the same status and body
async fn maven_stub(status_line: &'static str, body: &'static [u8]) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let mut request = Vec::new();
                loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status_line,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/maven2", addr), hits)
}

/// Listener playing the part of WireMock's HTTP port
async fn fixture_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn config(dir: &Path, port: u16) -> Config {
    Config {
        port,
        root_dir: dir.join("m"),
        stdio: StdioMode::Ignore,
        skip_wiremock_install: true,
        java_bin: fake_java(dir).to_string_lossy().into_owned(),
        install_dir: dir.join("cache"),
        readiness: ReadinessConfig {
            poll_interval_ms: 20,
            timeout_ms: 2_000,
            terminate_on_timeout: false,
        },
        shutdown_wait_ms: Some(5_000),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_skip_install_end_to_end() {
    let temp = TempDir::new().unwrap();
    let (_wiremock, port) = fixture_port().await;
    let config = config(temp.path(), port);

    let mut controller = LifecycleController::from_config(&config)
        .unwrap()
        .with_triggers(TriggerSet::manual());
    let root = temp.path().join("m");
    assert!(root.is_dir(), "root dir is created with the launch config");

    controller
        .prepare(&RunnerConfig { watch: false }, &Capabilities::Null)
        .await
        .unwrap();
    assert_eq!(controller.phase(), LifecyclePhase::Ready);
    assert!(!temp.path().join("cache").exists(), "install was skipped");

    let args = read_args(temp.path()).await;
    let jar = temp.path().join("cache").join("wiremock-standalone-2.26.0.jar");
    assert_eq!(
        args,
        vec![
            "-jar".to_string(),
            jar.to_string_lossy().into_owned(),
            "-port".to_string(),
            port.to_string(),
            "-root-dir".to_string(),
            root.to_string_lossy().into_owned(),
        ]
    );

    controller.complete().await;
    assert_eq!(controller.phase(), LifecyclePhase::Done);
    assert_eq!(controller.supervisor().signals_sent(), 1);
    assert_eq!(controller.supervisor().state(), ProcessState::Terminated);
}

#[tokio::test]
async fn test_download_happens_once_across_runs() {
    let temp = TempDir::new().unwrap();
    let (base, hits) = maven_stub("200 OK", b"PK fake standalone jar").await;
    let (_wiremock, port) = fixture_port().await;
    let mut config = config(temp.path(), port);
    config.skip_wiremock_install = false;
    config.maven_base_url = base;

    for _ in 0..2 {
        let mut controller = LifecycleController::from_config(&config)
            .unwrap()
            .with_triggers(TriggerSet::manual());
        controller
            .prepare(&RunnerConfig::default(), &Capabilities::Null)
            .await
            .unwrap();
        assert!(controller.location().exists());
        controller.complete().await;
    }

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let jar = temp.path().join("cache").join("wiremock-standalone-2.26.0.jar");
    assert_eq!(std::fs::read(jar).unwrap(), b"PK fake standalone jar");
}

#[tokio::test]
async fn test_missing_release_aborts_before_launch() {
    let temp = TempDir::new().unwrap();
    let (base, _hits) = maven_stub("404 Not Found", b"").await;
    let (_wiremock, port) = fixture_port().await;
    let mut config = config(temp.path(), port);
    config.skip_wiremock_install = false;
    config.maven_base_url = base;
    config.version = "0.0.0-missing".to_string();

    let mut controller = LifecycleController::from_config(&config)
        .unwrap()
        .with_triggers(TriggerSet::manual());
    let err = controller
        .prepare(&RunnerConfig::default(), &Capabilities::Null)
        .await
        .unwrap_err();

    assert!(matches!(err, PrepareError::Fetch(FetchError::BadStatus { status: 404, .. })));
    assert!(err.to_string().contains("0.0.0-missing"));
    assert_eq!(controller.supervisor().state(), ProcessState::NotStarted);
    assert!(!temp.path().join("args.txt").exists());
}

#[tokio::test]
async fn test_watch_mode_stops_on_fault() {
    let temp = TempDir::new().unwrap();
    let (_wiremock, port) = fixture_port().await;
    let config = config(temp.path(), port);

    let mut controller = LifecycleController::from_config(&config)
        .unwrap()
        .with_triggers(TriggerSet {
            interrupt: false,
            fault_hook: true,
        });
    controller
        .prepare(&RunnerConfig { watch: true }, &Capabilities::Null)
        .await
        .unwrap();

    controller.complete().await;
    assert_eq!(controller.supervisor().state(), ProcessState::Running);

    let result = std::thread::spawn(|| panic!("unhandled fault in the runner")).join();
    assert!(result.is_err());

    assert_eq!(controller.supervisor().signals_sent(), 1);
    let record = controller
        .supervisor()
        .wait_for_exit(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(record.signal, Some(libc::SIGTERM));

    // host exit after the fault does not signal again
    let supervisor = Arc::clone(controller.supervisor());
    drop(controller);
    assert_eq!(supervisor.signals_sent(), 1);
}
