//! End-to-end run of the real pipeline on the Linux branch.
//!
//! The build tool is replaced by `true`/`false` so the test controls whether
//! the build "succeeds"; the upload goes to a local server.

#![cfg(unix)]

use std::io::{ErrorKind, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use release_matrix::job::{JobState, Pipeline};
use release_matrix::{
    Bootstrapper, CompilerInvoker, Credential, JobError, MatrixConfig, MatrixOrchestrator,
    Platform, Publisher, Release,
};

fn spawn_upload_server() -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("failed to accept");
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        // Read until the client pauses; the body is a handful of bytes.
        while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let body = r#"{"name":"mybinary_linux","content_type":"application/zip"}"#;
        let response = format!(
            "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = tx.send(String::from_utf8_lossy(&request).to_string());
    });

    (format!("http://{addr}"), rx)
}

fn config(build_program: &str, workspace: &std::path::Path) -> MatrixConfig {
    let mut config = MatrixConfig {
        binary: "mybinary".to_string(),
        workspace_dir: workspace.to_path_buf(),
        ..MatrixConfig::default()
    };
    config.build.program = build_program.to_string();
    config
}

fn orchestrator(config: &MatrixConfig) -> MatrixOrchestrator<Pipeline> {
    let credential = Credential::new("e2e-token").map(Arc::new);
    let pipeline = Pipeline::new(
        Bootstrapper::new(config).unwrap(),
        CompilerInvoker::new(config),
        Publisher::new(config, credential).unwrap(),
    );
    MatrixOrchestrator::new(Arc::new(pipeline), config.workspace_dir.clone())
        .with_platforms(&[Platform::Linux])
}

#[tokio::test]
async fn test_linux_release_end_to_end() {
    let (base, rx) = spawn_upload_server();
    let dir = tempfile::tempdir().unwrap();
    let config = config("true", dir.path());

    // Stand in for the compiler output.
    let compiler = CompilerInvoker::new(&config);
    let output = compiler.output_path(Platform::Linux.spec(), &dir.path().join("linux"));
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    std::fs::write(&output, b"\x7fELF release build").unwrap();

    let release = Release::new(3, "v2.0.0", &format!("{base}/releases/3/assets{{?name,label}}")).unwrap();
    let reports = orchestrator(&config).run(Arc::new(release)).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].final_state(), JobState::Succeeded);
    assert_eq!(reports[0].asset().unwrap().name, "mybinary_linux");

    let request = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(request.starts_with("POST /releases/3/assets?name=mybinary_linux "));
    assert!(request.to_ascii_lowercase().contains("content-type: application/zip"));
    assert!(request.ends_with("\x7fELF release build"));
}

#[tokio::test]
async fn test_failed_build_never_uploads() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let dir = tempfile::tempdir().unwrap();
    let config = config("false", dir.path());

    let release = Release::new(4, "v2.0.1", &format!("{base}/releases/4/assets")).unwrap();
    let reports = orchestrator(&config).run(Arc::new(release)).await;

    assert_eq!(reports[0].final_state(), JobState::Failed);
    assert!(matches!(reports[0].error(), Some(JobError::Build(_))));
    assert!(matches!(listener.accept(), Err(e) if e.kind() == ErrorKind::WouldBlock));
}
