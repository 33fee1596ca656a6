use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::sleep;

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config. The external binary points at a path that
/// does not exist, so the capability probe soft-fails and every job would
/// route in-process.
fn minimal_config(port: u16, temp_dir: &std::path::Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[engine]
external_binary = "/nonexistent/transcoder"
temp_dir = "{}"
probe_timeout_secs = 1
"#,
        temp_dir.display()
    )
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &std::path::Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_mediamill"))
        .env("MEDIAMILL_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(client: &Client, port: u16, max_attempts: u32) -> bool {
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{port}/api/v1/health"))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

struct TestServer {
    _child: tokio::process::Child,
    _config: NamedTempFile,
    _temp_dir: TempDir,
    client: Client,
    port: u16,
}

impl TestServer {
    async fn start() -> Self {
        let port = get_available_port();
        let temp_dir = TempDir::new().unwrap();
        let mut config = NamedTempFile::new().unwrap();
        write!(config, "{}", minimal_config(port, temp_dir.path())).unwrap();

        let child = spawn_server(config.path()).await;
        let client = Client::new();
        assert!(
            wait_for_server(&client, port, 100).await,
            "server did not become ready"
        );
        Self {
            _child: child,
            _config: config,
            _temp_dir: temp_dir,
            client,
            port,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Enqueues one file with default x264 options, returning the job id.
    async fn enqueue(&self, filename: &str) -> String {
        let options = serde_json::json!({
            "args": ["-c:v", "libx264"],
            "output_extension": "mp4",
        });
        let form = reqwest::multipart::Form::new()
            .text("options", options.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(b"not really a video".to_vec())
                    .file_name(filename.to_string()),
            );
        let resp = self
            .client
            .post(self.url("/api/v1/jobs"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let views: serde_json::Value = resp.json().await.unwrap();
        views[0]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_and_config_endpoints() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let resp = server
        .client
        .get(server.url("/api/v1/config"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_capability_reports_probe_failure() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/api/v1/capability"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    // The configured binary does not exist; the probe soft-fails.
    assert_eq!(body["external_available"], false);
    assert_eq!(body["external_supports_hap"], false);
}

#[tokio::test]
async fn test_upload_enqueues_without_processing() {
    let server = TestServer::start().await;

    let id = server.enqueue("clip.avi").await;

    let resp = server
        .client
        .get(server.url(&format!("/api/v1/jobs/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let job: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(job["state"], "pending");
    assert_eq!(job["source_name"], "clip.avi");
    assert_eq!(job["progress_percent"], 0);

    let resp = server
        .client
        .get(server.url("/api/v1/queue/summary"))
        .send()
        .await
        .unwrap();
    let summary: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(summary["pending"], 1);
    assert_eq!(summary["processing"], 0);
}

#[tokio::test]
async fn test_upload_rejected_without_options() {
    let server = TestServer::start().await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(vec![1, 2, 3]).file_name("a.avi"),
    );
    let resp = server
        .client
        .post(server.url("/api/v1/jobs"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("options"));
}

#[tokio::test]
async fn test_result_download_conflicts_before_completion() {
    let server = TestServer::start().await;
    let id = server.enqueue("clip.avi").await;

    let resp = server
        .client
        .get(server.url(&format!("/api/v1/jobs/{id}/result")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_retry_rejected_for_pending_job() {
    let server = TestServer::start().await;
    let id = server.enqueue("clip.avi").await;

    let resp = server
        .client
        .post(server.url(&format!("/api/v1/jobs/{id}/retry")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_remove_and_not_found() {
    let server = TestServer::start().await;
    let id = server.enqueue("clip.avi").await;

    let resp = server
        .client
        .delete(server.url(&format!("/api/v1/jobs/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = server
        .client
        .get(server.url(&format!("/api/v1/jobs/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_move_changes_list_order() {
    let server = TestServer::start().await;
    let a = server.enqueue("a.avi").await;
    let b = server.enqueue("b.avi").await;

    let resp = server
        .client
        .post(server.url(&format!("/api/v1/jobs/{b}/move")))
        .json(&serde_json::json!({ "index": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = server
        .client
        .get(server.url("/api/v1/jobs"))
        .send()
        .await
        .unwrap();
    let jobs: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(jobs[0]["id"], b.as_str());
    assert_eq!(jobs[1]["id"], a.as_str());
}

#[tokio::test]
async fn test_pause_and_clear_endpoints() {
    let server = TestServer::start().await;
    server.enqueue("a.avi").await;
    server.enqueue("b.avi").await;

    let resp = server
        .client
        .post(server.url("/api/v1/queue/pause"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let status: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(status["paused"], true);

    let resp = server
        .client
        .delete(server.url("/api/v1/queue"))
        .send()
        .await
        .unwrap();
    let cleared: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(cleared["removed"], 2);

    let resp = server
        .client
        .get(server.url("/api/v1/jobs"))
        .send()
        .await
        .unwrap();
    let jobs: serde_json::Value = resp.json().await.unwrap();
    assert!(jobs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::start().await;
    server.enqueue("a.avi").await;

    let resp = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("mediamill_jobs_enqueued_total"));
}
