//! Integration tests for the drive-mirror binary
//!
//! These tests run the real binary against a wiremock Drive API and mirror
//! into a temporary directory, so they need neither network nor AWS access.
//!
//! Note: These tests are disabled during CI package verification to avoid
//! compilation overhead during cargo publish.

#![cfg(not(feature = "ci-tests-disabled"))]

use std::path::Path;
use std::process::Output;

use serde_json::{json, Value};
use tokio::process::Command;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FOLDER: &str = "application/vnd.google-apps.folder";

/// Run the binary with a test token and the mock server as Drive API
async fn run_mirror(server: &MockServer, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_drive-mirror"))
        .args(args)
        .arg("--drive-api-url")
        .arg(server.uri())
        .env("DRIVE_ACCESS_TOKEN", "test-token")
        .env("RUST_LOG", "info")
        .output()
        .await
        .expect("failed to run drive-mirror")
}

async fn mount_node(server: &MockServer, id: &str, name: &str, mime_type: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{id}")))
        .and(query_param("fields", "id, name, mimeType"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id, "name": name, "mimeType": mime_type
        })))
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, folder_id: &str, files: Value) {
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", format!("'{folder_id}' in parents and trashed = false")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": files })))
        .mount(server)
        .await;
}

async fn mount_content(server: &MockServer, id: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{id}")))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/octet-stream"))
        .mount(server)
        .await;
}

/// R/{a.txt, S/b.txt}
async fn sample_drive() -> MockServer {
    let server = MockServer::start().await;
    mount_node(&server, "root", "R", FOLDER).await;
    mount_listing(
        &server,
        "root",
        json!([
            { "id": "a", "name": "a.txt", "mimeType": "text/plain" },
            { "id": "s", "name": "S", "mimeType": FOLDER }
        ]),
    )
    .await;
    mount_listing(
        &server,
        "s",
        json!([{ "id": "b", "name": "b.txt", "mimeType": "text/plain" }]),
    )
    .await;
    mount_content(&server, "a", b"alpha").await;
    mount_content(&server, "b", b"bravo").await;
    server
}

fn read(dir: &Path, key: &str) -> String {
    std::fs::read_to_string(dir.join(key)).unwrap_or_default()
}

#[tokio::test]
async fn test_mirror_tree_into_local_directory() {
    let server = sample_drive().await;
    let out = tempfile::tempdir().unwrap();

    let output = run_mirror(&server, &["root", "--local-dir", out.path().to_str().unwrap(), "--json"]).await;

    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(read(out.path(), "R/a.txt"), "alpha");
    assert_eq!(read(out.path(), "R/S/b.txt"), "bravo");

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["outcome"], "all_succeeded");
    assert_eq!(summary["succeeded"], 2);
    assert_eq!(summary["bytes_transferred"], 10);
}

#[tokio::test]
async fn test_native_document_is_partial_failure() {
    let server = MockServer::start().await;
    mount_node(&server, "root", "R", FOLDER).await;
    mount_listing(
        &server,
        "root",
        json!([
            { "id": "a", "name": "a.txt", "mimeType": "text/plain" },
            { "id": "doc", "name": "Notes", "mimeType": "application/vnd.google-apps.document" }
        ]),
    )
    .await;
    mount_content(&server, "a", b"alpha").await;
    let out = tempfile::tempdir().unwrap();

    let output = run_mirror(&server, &["root", "--local-dir", out.path().to_str().unwrap(), "--json"]).await;

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(read(out.path(), "R/a.txt"), "alpha");
    assert!(!out.path().join("R/Notes").exists());

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["outcome"], "partial_failure");
    assert_eq!(summary["skipped_keys"][0]["key"], "R/Notes");
    assert_eq!(summary["skipped_keys"][0]["reason"], "not exportable");
}

#[tokio::test]
async fn test_expired_token_aborts_run() {
    let server = MockServer::start().await;
    mount_node(&server, "root", "R", FOLDER).await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 401, "message": "Invalid Credentials",
                       "errors": [{ "reason": "authError" }] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let out = tempfile::tempdir().unwrap();

    let output = run_mirror(&server, &["root", "--local-dir", out.path().to_str().unwrap()]).await;

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("TotalFailure"), "stdout: {stdout}");
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let server = sample_drive().await;
    let out = tempfile::tempdir().unwrap();

    let output = run_mirror(
        &server,
        &["root", "--local-dir", out.path().to_str().unwrap(), "--dry-run", "--json"],
    )
    .await;

    assert_eq!(output.status.code(), Some(0));
    assert!(!out.path().join("R").exists());
    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["skipped"], 2);

    let downloads = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|req| req.url.query_pairs().any(|(k, v)| k == "alt" && v == "media"))
        .count();
    assert_eq!(downloads, 0);
}

#[tokio::test]
async fn test_missing_arguments_fail() {
    let server = MockServer::start().await;

    let output = run_mirror(&server, &[]).await;
    assert_ne!(output.status.code(), Some(0));

    let output = run_mirror(&server, &["root"]).await;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("bucket"));
}
