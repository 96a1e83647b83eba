//! REST implementation of `FileApi`
//!
//! One request per operation, bearer token on every call, no retries.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use url::Url;

use super::types::{DownloadLink, ErrorBody, Listing, UploadReceipt, UploadRequest};
use super::FileApi;
use crate::error::{ClientError, Result};

/// File API client over HTTP
#[derive(Debug, Clone)]
pub struct RestFileApi {
    base_url: String,
    client: reqwest::Client,
}

impl RestFileApi {
    /// Create a client for the API at `base_url` (scheme required, trailing slash optional)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_client(base_url, client)
    }

    /// Create a client reusing an existing reqwest client
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "API URL must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self {
            base_url: trimmed.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn auth_header(token: &SecretString) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| ClientError::Auth(format!("Invalid characters in id token: {}", e)))
    }

    /// Turn a non-success response into `ClientError::Api`, preferring the
    /// server's `error` text over `generic`.
    async fn api_error(response: reqwest::Response, generic: &str) -> ClientError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("{} (Status: {})", generic, status));
        debug!("API error {}: {}", status, message);
        ClientError::Api { status, message }
    }
}

#[async_trait]
impl FileApi for RestFileApi {
    async fn list(&self, token: &SecretString, prefix: &str) -> Result<Listing> {
        let query: Vec<(&str, &str)> = if prefix.is_empty() {
            vec![]
        } else {
            vec![("prefix", prefix)]
        };
        let url = self.endpoint("/files", &query)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, Self::auth_header(token)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response, "Failed to fetch list").await);
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Parse list response failed: {}", e)))?;
        info!(
            "Listed '{}': {} files, {} folders",
            prefix,
            listing.files.len(),
            listing.folders.len()
        );
        Ok(listing)
    }

    async fn download_link(&self, token: &SecretString, filename: &str) -> Result<DownloadLink> {
        // Percent-encoded (space as %20), not form-encoded
        let mut url = self.endpoint("/download", &[])?;
        url.set_query(Some(&format!("filename={}", urlencoding::encode(filename))));
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, Self::auth_header(token)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response, "Failed to get download URL").await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Parse download response failed: {}", e)))
    }

    async fn upload(&self, token: &SecretString, request: &UploadRequest) -> Result<UploadReceipt> {
        let url = self.endpoint("/upload", &[])?;
        debug!("POST {} ({} base64 bytes)", url, request.file_content.len());

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, Self::auth_header(token)?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response, "Failed to upload").await);
        }

        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Parse upload response failed: {}", e)))?;
        info!("Uploaded {}", request.filename);
        Ok(receipt)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-shot HTTP stub: answers the first request with `status` and `body`
    /// and hands back the raw request it received.
    pub(crate) async fn stub_server(status: u16, body: impl Into<String>) -> (String, JoinHandle<String>) {
        let body = body.into();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });

        (format!("http://127.0.0.1:{}", port), handle)
    }

    fn token() -> SecretString {
        SecretString::from("id-token-123".to_string())
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(RestFileApi::new("ftp://example.com").is_err());
        assert!(RestFileApi::new("not a url").is_err());
        let api = RestFileApi::new("https://api.example.com/prod/").unwrap();
        assert_eq!(api.base_url(), "https://api.example.com/prod");
    }

    #[tokio::test]
    async fn test_list_sends_bearer_and_prefix() {
        let (base, server) = stub_server(
            200,
            r#"{"files":[{"filename":"docs/a.txt","size":10,"lastModified":"2024-01-01T00:00:00Z"}],"folders":[{"prefix":"docs/old/"}]}"#,
        )
        .await;
        let api = RestFileApi::new(&base).unwrap();

        let listing = api.list(&token(), "docs/").await.unwrap();
        assert_eq!(listing.files[0].name, "docs/a.txt");
        assert_eq!(listing.folders[0].prefix, "docs/old/");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /files?prefix=docs%2F HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer id-token-123"));
    }

    #[tokio::test]
    async fn test_list_root_omits_prefix_param() {
        let (base, server) = stub_server(200, r#"{"files":[],"folders":[]}"#).await;
        let api = RestFileApi::new(&base).unwrap();
        api.list(&token(), "").await.unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /files HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_server_error_text_is_surfaced() {
        let (base, _server) = stub_server(403, r#"{"error":"Not allowed to list this folder"}"#).await;
        let api = RestFileApi::new(&base).unwrap();
        let err = api.list(&token(), "secret/").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.to_string(), "Not allowed to list this folder");
    }

    #[tokio::test]
    async fn test_generic_message_when_body_is_not_json() {
        let (base, _server) = stub_server(502, "Bad Gateway").await;
        let api = RestFileApi::new(&base).unwrap();
        let err = api.download_link(&token(), "a.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to get download URL (Status: 502)");
    }

    #[tokio::test]
    async fn test_download_link_encodes_filename() {
        let (base, server) = stub_server(200, r#"{"download_url":"https://bucket.example/a?sig=1"}"#).await;
        let api = RestFileApi::new(&base).unwrap();
        let link = api.download_link(&token(), "my docs/a b.txt").await.unwrap();
        assert_eq!(link.download_url.as_deref(), Some("https://bucket.example/a?sig=1"));
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /download?filename=my%20docs%2Fa%20b.txt HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_upload_posts_json_body() {
        let (base, server) = stub_server(200, r#"{"message":"File uploaded successfully"}"#).await;
        let api = RestFileApi::new(&base).unwrap();
        let receipt = api
            .upload(
                &token(),
                &UploadRequest {
                    filename: "docs/hello.txt".to_string(),
                    file_content: "aGVsbG8=".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.message, "File uploaded successfully");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /upload HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.contains(r#""filename":"docs/hello.txt""#));
        assert!(request.contains(r#""file_content":"aGVsbG8=""#));
    }

    #[tokio::test]
    async fn test_upload_failure_generic_message() {
        let (base, _server) = stub_server(500, r#"{"detail":"boom"}"#).await;
        let api = RestFileApi::new(&base).unwrap();
        let err = api
            .upload(
                &token(),
                &UploadRequest {
                    filename: "x".to_string(),
                    file_content: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to upload (Status: 500)");
    }
}
