//! Source-side access for drive-mirror
//!
//! `SourceBrowser` is the seam between the traversal pipeline and the storage
//! provider. `DriveBrowser` implements it over the Google Drive v3 REST API
//! with an injected bearer credential.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::core::error::{Error, Result};
use crate::core::model::{is_native_mime_type, Node};
use crate::core::retry::{retry_transient, METADATA_ATTEMPTS};
use crate::core::stream::{create_http_stream, DownloadStream};

const NODE_FIELDS: &str = "id, name, mimeType";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";
const PAGE_SIZE: &str = "1000";

/// Read access to a hierarchical source tree
#[async_trait]
pub trait SourceBrowser: Send + Sync {
    /// Fetch metadata for a single node
    async fn get_node(&self, id: &str) -> Result<Node>;

    /// List every immediate child of a folder, following pagination to the end
    async fn list_children(&self, folder_id: &str) -> Result<Vec<Node>>;

    /// Open the content of a file as a byte stream
    ///
    /// Fails with `NotExportable` for provider-native formats.
    async fn open_download_stream(&self, file_id: &str, mime_type: &str) -> Result<DownloadStream>;
}

/// Opaque, pre-established credential for the source provider
#[derive(Clone)]
pub struct Credential {
    access_token: String,
}

#[derive(Deserialize)]
struct TokenFile {
    access_token: String,
}

impl Credential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// Read an access token from an environment variable
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::bearer(token.trim())),
            _ => Err(Error::InvalidInput(format!("environment variable {var} is not set"))),
        }
    }

    /// Read the `access_token` field from a saved OAuth token file
    pub fn from_token_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let token: TokenFile = serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidInput(format!("invalid token file {}: {e}", path.display()))
        })?;
        Ok(Self::bearer(token.access_token))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Build the Drive search expression for the children of `folder_id`
pub fn build_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents and trashed = false")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<Node>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Map a failed Drive response onto the error taxonomy
pub fn classify_status(status: StatusCode, reason: Option<&str>, message: String) -> Error {
    match (status, reason) {
        (StatusCode::UNAUTHORIZED, _) => Error::AuthExpired(message),
        (StatusCode::FORBIDDEN, Some("rateLimitExceeded" | "userRateLimitExceeded")) => {
            Error::Transient(message)
        }
        (StatusCode::FORBIDDEN, Some("fileNotDownloadable" | "cannotExportFile")) => {
            Error::NotExportable(message)
        }
        (StatusCode::NOT_FOUND, _) => Error::NotFound(message),
        (StatusCode::TOO_MANY_REQUESTS, _) => Error::Transient(message),
        (s, _) if s.is_server_error() => Error::Transient(message),
        _ => Error::Http(message),
    }
}

/// Turn a non-success response into a classified error
async fn check_response(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ApiErrorBody>(&body).ok();
    let reason = parsed
        .as_ref()
        .and_then(|b| b.error.errors.first())
        .map(|d| d.reason.clone());
    let detail = parsed
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string());

    Err(classify_status(
        status,
        reason.as_deref(),
        format!("{context}: {detail} ({status})"),
    ))
}

/// Google Drive v3 implementation of `SourceBrowser`
pub struct DriveBrowser {
    client: Client,
    base_url: String,
    credential: Credential,
    retry_delay: Duration,
}

impl DriveBrowser {
    /// Create a browser against the given API base URL
    pub fn new(base_url: &str, credential: Credential) -> Result<Self> {
        let client = ClientBuilder::new()
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(20)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("drive-mirror/{}", env!("DRIVE_MIRROR_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Override the backoff base used for metadata and listing retries
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.base_url, id)
    }

    /// List every child of `folder_id`, following continuation tokens
    async fn list_all(&self, folder_id: &str) -> Result<Vec<Node>> {
        let query = build_query(folder_id);
        let url = format!("{}/files", self.base_url);
        let mut nodes = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: FileList = retry_transient("list folder", METADATA_ATTEMPTS, self.retry_delay, || async {
                let mut params = vec![
                    ("q", query.as_str()),
                    ("fields", LIST_FIELDS),
                    ("pageSize", PAGE_SIZE),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ];
                if let Some(token) = page_token.as_deref() {
                    params.push(("pageToken", token));
                }

                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.credential.access_token)
                    .query(&params)
                    .timeout(Duration::from_secs(30))
                    .send()
                    .await?;
                let response = check_response(response, &format!("list {folder_id}")).await?;
                Ok(response.json::<FileList>().await?)
            })
            .await?;

            debug!("Listed {} children of {folder_id}", page.files.len());
            nodes.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(nodes)
    }
}

#[async_trait]
impl SourceBrowser for DriveBrowser {
    async fn get_node(&self, id: &str) -> Result<Node> {
        let url = self.file_url(id);
        retry_transient("get metadata", METADATA_ATTEMPTS, self.retry_delay, || async {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.credential.access_token)
                .query(&[("fields", NODE_FIELDS), ("supportsAllDrives", "true")])
                .timeout(Duration::from_secs(30))
                .send()
                .await?;
            let response = check_response(response, &format!("get {id}")).await?;
            Ok(response.json::<Node>().await?)
        })
        .await
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<Node>> {
        self.list_all(folder_id).await
    }

    async fn open_download_stream(&self, file_id: &str, mime_type: &str) -> Result<DownloadStream> {
        if is_native_mime_type(mime_type) {
            return Err(Error::NotExportable(format!(
                "{file_id} is a native document ({mime_type})"
            )));
        }

        let response = self
            .client
            .get(self.file_url(file_id))
            .bearer_auth(&self.credential.access_token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;
        let response = check_response(response, &format!("download {file_id}")).await?;

        Ok(create_http_stream(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::FOLDER_MIME_TYPE;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn browser(server: &MockServer) -> DriveBrowser {
        DriveBrowser::new(&server.uri(), Credential::bearer("test-token"))
            .unwrap()
            .with_retry_delay(Duration::from_millis(1))
    }

    fn error_body(code: u16, reason: &str) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": code,
                "message": format!("{reason} happened"),
                "errors": [{ "reason": reason }]
            }
        })
    }

    #[test]
    fn test_build_query() {
        assert_eq!(build_query("abc"), "'abc' in parents and trashed = false");
        assert_eq!(build_query("it's"), "'it\\'s' in parents and trashed = false");
    }

    #[test]
    fn test_classify_status() {
        let msg = || "m".to_string();
        assert!(matches!(classify_status(StatusCode::UNAUTHORIZED, None, msg()), Error::AuthExpired(_)));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, Some("userRateLimitExceeded"), msg()),
            Error::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, Some("fileNotDownloadable"), msg()),
            Error::NotExportable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, Some("insufficientFilePermissions"), msg()),
            Error::Http(_)
        ));
        assert!(matches!(classify_status(StatusCode::NOT_FOUND, None, msg()), Error::NotFound(_)));
        assert!(matches!(classify_status(StatusCode::BAD_GATEWAY, None, msg()), Error::Transient(_)));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None, msg()),
            Error::Transient(_)
        ));
    }

    #[test]
    fn test_credential_from_token_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"access_token":"ya29.abc","token_type":"Bearer","refresh_token":"1//x","expiry":"2024-01-01T00:00:00Z"}}"#
        )
        .unwrap();

        let credential = Credential::from_token_file(file.path()).unwrap();
        assert_eq!(credential.access_token, "ya29.abc");
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
    }

    #[tokio::test]
    async fn test_get_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/abc"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abc",
                "name": "Reports",
                "mimeType": FOLDER_MIME_TYPE
            })))
            .expect(1)
            .mount(&server)
            .await;

        let node = browser(&server).get_node("abc").await.unwrap();
        assert_eq!(node, Node::folder("abc", "Reports"));
    }

    #[tokio::test]
    async fn test_get_node_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "notFound")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/locked"))
            .respond_with(ResponseTemplate::new(401).set_body_json(error_body(401, "authError")))
            .expect(1)
            .mount(&server)
            .await;

        let drive = browser(&server);
        assert!(matches!(drive.get_node("gone").await, Err(Error::NotFound(_))));
        // authorization failures are never retried
        assert!(matches!(drive.get_node("locked").await, Err(Error::AuthExpired(_))));
    }

    #[tokio::test]
    async fn test_get_node_retries_transient_errors() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        Mock::given(method("GET"))
            .and(path("/files/flaky"))
            .respond_with(move |_: &wiremock::Request| {
                if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "id": "flaky", "name": "f.bin", "mimeType": "application/octet-stream"
                    }))
                }
            })
            .mount(&server)
            .await;

        let node = browser(&server).get_node("flaky").await.unwrap();
        assert_eq!(node.name, "f.bin");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_list_children_follows_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", "'root' in parents and trashed = false"))
            .respond_with(|req: &wiremock::Request| {
                let token = req
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "pageToken")
                    .map(|(_, v)| v.to_string());
                match token.as_deref() {
                    None => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "nextPageToken": "page-2",
                        "files": [
                            { "id": "1", "name": "a.txt", "mimeType": "text/plain" },
                            { "id": "2", "name": "S", "mimeType": FOLDER_MIME_TYPE }
                        ]
                    })),
                    Some("page-2") => ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "files": [ { "id": "3", "name": "c.bin", "mimeType": "application/octet-stream" } ]
                    })),
                    Some(_) => ResponseTemplate::new(400),
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let children = browser(&server).list_children("root").await.unwrap();
        let names: Vec<_> = children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "S", "c.bin"]);
    }

    #[tokio::test]
    async fn test_download_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/bin"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"A".repeat(2048), "application/octet-stream"))
            .mount(&server)
            .await;

        let mut stream = browser(&server)
            .open_download_stream("bin", "application/octet-stream")
            .await
            .unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"A".repeat(2048));
    }

    #[tokio::test]
    async fn test_native_documents_are_not_exportable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = browser(&server)
            .open_download_stream("doc", "application/vnd.google-apps.document")
            .await;
        assert!(matches!(result, Err(Error::NotExportable(_))));
    }

    #[tokio::test]
    async fn test_not_downloadable_maps_to_skip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/blocked"))
            .respond_with(ResponseTemplate::new(403).set_body_json(error_body(403, "fileNotDownloadable")))
            .mount(&server)
            .await;

        let result = browser(&server)
            .open_download_stream("blocked", "application/pdf")
            .await;
        assert!(matches!(result, Err(e) if e.is_skip()));
    }
}
