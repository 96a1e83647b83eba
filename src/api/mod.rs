//! File API Module
//!
//! The backend exposes three endpoints behind a bearer token:
//!
//! ```text
//! GET  /files?prefix=<p>        -> { files: [...], folders: [...] }
//! GET  /download?filename=<f>   -> { download_url }
//! POST /upload                  <- { filename, file_content }  -> { message }
//! ```
//!
//! `FileApi` is the seam the view controller talks to; `RestFileApi` is the
//! reqwest implementation.

pub mod rest;
pub mod types;

pub use rest::RestFileApi;
pub use types::*;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;

/// Operations the file backend supports
#[async_trait]
pub trait FileApi: Send + Sync {
    /// List files and folders under `prefix` (empty = root)
    async fn list(&self, token: &SecretString, prefix: &str) -> Result<Listing>;

    /// Ask for a pre-signed URL for `filename`
    async fn download_link(&self, token: &SecretString, filename: &str) -> Result<DownloadLink>;

    /// Upload one file in a single request
    async fn upload(&self, token: &SecretString, request: &UploadRequest) -> Result<UploadReceipt>;
}
