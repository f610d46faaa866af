//! Google Drive v3 storage client.
//!
//! Uploads use the resumable protocol so artifacts are streamed from disk instead of being
//! buffered in memory. Authentication is delegated: the client is handed an OAuth access
//! token through an environment variable or the output of a helper command.

use super::{RemoteRef, StorageClient};
use crate::producer::Artifact;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

/// Where the OAuth access token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Read from the named environment variable
    Env(String),
    /// Printed on stdout by a helper, e.g. `gcloud auth print-access-token`
    Command(Vec<String>),
}

impl TokenSource {
    async fn resolve(&self) -> Result<String> {
        let token = match self {
            TokenSource::Env(var) => std::env::var(var).map_err(|_| {
                Error::transfer(format!("access token variable {var} is not set"))
            })?,
            TokenSource::Command(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| Error::transfer("empty token command"))?;
                let output = Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| Error::transfer(format!("failed to execute {program}: {e}")))?;
                if !output.status.success() {
                    return Err(Error::transfer(format!(
                        "token command {program} exited with {}: {}",
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
                String::from_utf8_lossy(&output.stdout).to_string()
            }
        };

        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(Error::transfer("access token is empty"));
        }
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// Drive client bound to one run. The access token is fetched once, on first use.
#[derive(Debug)]
pub struct DriveStorage {
    client: Client,
    api_base: String,
    token_source: TokenSource,
    token: OnceCell<String>,
}

impl DriveStorage {
    pub fn new(token_source: TokenSource) -> Result<Self> {
        Self::with_api_base(token_source, DEFAULT_API_BASE)
    }

    pub fn with_api_base(token_source: TokenSource, api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("drivesync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token_source,
            token: OnceCell::new(),
        })
    }

    async fn token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| self.token_source.resolve())
            .await?;
        Ok(token.as_str())
    }

    fn create_url(&self) -> String {
        format!(
            "{}/upload/drive/v3/files?uploadType=resumable&fields=id",
            self.api_base
        )
    }

    fn update_url(&self, file_id: &str) -> String {
        format!(
            "{}/upload/drive/v3/files/{}?uploadType=resumable&fields=id",
            self.api_base, file_id
        )
    }

    /// Open a resumable session; Drive answers with the session URI in `Location`
    async fn start_session(
        &self,
        method: reqwest::Method,
        url: String,
        metadata: serde_json::Value,
        artifact: &Artifact,
    ) -> Result<String> {
        let token = self.token().await?;
        let response = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", artifact.size())
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response, "start upload session").await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::transfer("upload session response carried no Location header"))
    }

    /// Stream the artifact into an open session
    async fn send_content(&self, session_uri: &str, artifact: &Artifact) -> Result<RemoteRef> {
        let file = tokio::fs::File::open(artifact.path()).await.map_err(|e| {
            Error::transfer(format!(
                "cannot read artifact {}: {e}",
                artifact.path().display()
            ))
        })?;
        let body = Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .client
            .put(session_uri)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, artifact.size())
            .body(body)
            .send()
            .await?;
        let response = check_status(response, "upload content").await?;

        let file: DriveFile = response.json().await?;
        Ok(RemoteRef::new(file.id))
    }
}

async fn check_status(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::transfer(format!(
        "{action} failed with {status}: {}",
        body.trim()
    )))
}

#[async_trait]
impl StorageClient for DriveStorage {
    async fn create_object(&self, parent: &str, name: &str, artifact: &Artifact) -> Result<RemoteRef> {
        let metadata = json!({ "name": name, "parents": [parent] });
        let session = self
            .start_session(reqwest::Method::POST, self.create_url(), metadata, artifact)
            .await?;
        debug!("Opened create session for {}", name);

        let remote_ref = self.send_content(&session, artifact).await?;
        info!("Created Drive file {} ({} bytes)", remote_ref, artifact.size());
        Ok(remote_ref)
    }

    async fn overwrite_object(&self, remote_ref: &RemoteRef, artifact: &Artifact) -> Result<RemoteRef> {
        let session = self
            .start_session(
                reqwest::Method::PATCH,
                self.update_url(remote_ref.as_str()),
                json!({}),
                artifact,
            )
            .await?;
        debug!("Opened update session for {}", remote_ref);

        let updated = self.send_content(&session, artifact).await?;
        info!("Updated Drive file {} ({} bytes)", updated, artifact.size());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn test_storage(server: &MockServer) -> Result<DriveStorage> {
        DriveStorage::with_api_base(
            TokenSource::Command(vec!["echo".to_string(), "test-token".to_string()]),
            server.base_url(),
        )
    }

    fn artifact(staging: &TempDir, content: &[u8]) -> Result<Artifact> {
        let path = Artifact::reserve(staging.path(), "shop", ".sql")?;
        std::fs::File::create(&path)?.write_all(content)?;
        Artifact::from_temp_path(path, "shop.sql")
    }

    #[test]
    fn test_urls_use_resumable_uploads() -> Result<()> {
        let storage = DriveStorage::with_api_base(
            TokenSource::Env("DRIVESYNC_TEST_UNUSED".to_string()),
            "http://localhost:9999/",
        )?;
        assert_eq!(
            storage.create_url(),
            "http://localhost:9999/upload/drive/v3/files?uploadType=resumable&fields=id"
        );
        assert_eq!(
            storage.update_url("abc123"),
            "http://localhost:9999/upload/drive/v3/files/abc123?uploadType=resumable&fields=id"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_create_opens_session_then_streams_content() -> Result<()> {
        let server = MockServer::start_async().await;
        let staging = TempDir::new()?;
        let artifact = artifact(&staging, b"-- dump v1")?;

        let session = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/upload/drive/v3/files")
                    .query_param("uploadType", "resumable")
                    .header("authorization", "Bearer test-token")
                    .header("x-upload-content-length", "10")
                    .json_body(json!({ "name": "shop.sql", "parents": ["folder-1"] }));
                then.status(200)
                    .header("Location", server.url("/sessions/create-1"));
            })
            .await;
        let upload = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/sessions/create-1")
                    .body("-- dump v1");
                then.status(200).json_body(json!({ "id": "file-42" }));
            })
            .await;

        let storage = test_storage(&server)?;
        let remote_ref = storage.create_object("folder-1", "shop.sql", &artifact).await?;

        assert_eq!(remote_ref, RemoteRef::new("file-42"));
        session.assert_async().await;
        upload.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_patches_existing_file() -> Result<()> {
        let server = MockServer::start_async().await;
        let staging = TempDir::new()?;
        let artifact = artifact(&staging, b"-- dump v2")?;

        let session = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/upload/drive/v3/files/file-42")
                    .query_param("uploadType", "resumable")
                    .header("authorization", "Bearer test-token");
                then.status(200)
                    .header("Location", server.url("/sessions/update-1"));
            })
            .await;
        let upload = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/sessions/update-1")
                    .body("-- dump v2");
                then.status(200).json_body(json!({ "id": "file-42" }));
            })
            .await;

        let storage = test_storage(&server)?;
        let remote_ref = storage
            .overwrite_object(&RemoteRef::new("file-42"), &artifact)
            .await?;

        assert_eq!(remote_ref, RemoteRef::new("file-42"));
        session.assert_async().await;
        upload.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_of_missing_file_is_transfer_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let staging = TempDir::new()?;
        let artifact = artifact(&staging, b"-- dump v2")?;

        let session = server
            .mock_async(|when, then| {
                when.method(PATCH).path("/upload/drive/v3/files/gone");
                then.status(404).body("File not found: gone");
            })
            .await;

        let storage = test_storage(&server)?;
        let result = storage.overwrite_object(&RemoteRef::new("gone"), &artifact).await;

        match result {
            Err(Error::Transfer { reason }) => {
                assert!(reason.contains("404"));
                assert!(reason.contains("File not found"));
            }
            other => panic!("expected transfer error, got {other:?}"),
        }
        session.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_session_without_location_is_transfer_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let staging = TempDir::new()?;
        let artifact = artifact(&staging, b"x")?;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/upload/drive/v3/files");
                then.status(200);
            })
            .await;

        let storage = test_storage(&server)?;
        let result = storage.create_object("folder-1", "shop.sql", &artifact).await;
        assert!(matches!(result, Err(Error::Transfer { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_artifact_is_transfer_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let staging = TempDir::new()?;
        let artifact = artifact(&staging, b"x")?;
        std::fs::remove_file(artifact.path())?;

        let storage = test_storage(&server)?;
        let result = storage.send_content(&server.url("/sessions/any"), &artifact).await;
        assert!(matches!(result, Err(Error::Transfer { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_token_from_command_is_trimmed() -> Result<()> {
        let source = TokenSource::Command(vec!["echo".to_string(), "  ya29.token  ".to_string()]);
        assert_eq!(source.resolve().await?, "ya29.token");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_token_is_transfer_error() {
        let source = TokenSource::Env("DRIVESYNC_TEST_TOKEN_THAT_IS_NEVER_SET".to_string());
        assert!(matches!(source.resolve().await, Err(Error::Transfer { .. })));

        let source = TokenSource::Command(vec!["false".to_string()]);
        assert!(matches!(source.resolve().await, Err(Error::Transfer { .. })));
    }
}
