//! Browser-level navigation for downloads
//!
//! Once the API hands out a pre-signed URL, something has to actually fetch
//! it. `SystemBrowser` gives the URL to the OS browser, which downloads it the
//! same way a clicked link would; `SaveToDirectory` fetches it directly and
//! writes the bytes next to the user.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ClientError, Result};

/// Opens a pre-signed download URL
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Navigate to `url`; `suggested_name` is the file name to save under
    async fn open(&self, url: &str, suggested_name: &str) -> Result<()>;
}

/// Hands the URL to the default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

#[async_trait]
impl Navigator for SystemBrowser {
    async fn open(&self, url: &str, suggested_name: &str) -> Result<()> {
        open::that(url).map_err(|e| ClientError::Other(format!("Could not open browser: {}", e)))?;
        info!("Opened download link for {} in browser", suggested_name);
        Ok(())
    }
}

/// Downloads the URL into a local directory
#[derive(Debug, Clone)]
pub struct SaveToDirectory {
    dir: PathBuf,
    client: reqwest::Client,
}

impl SaveToDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target path for `suggested_name`, refusing names that escape the directory
    pub fn target_path(&self, suggested_name: &str) -> Result<PathBuf> {
        let name = suggested_name.trim();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(ClientError::Other(format!("Refusing to save as '{}'", suggested_name)));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl Navigator for SaveToDirectory {
    async fn open(&self, url: &str, suggested_name: &str) -> Result<()> {
        let target = self.target_path(suggested_name)?;

        // Pre-signed URLs carry their own credentials; no bearer header here.
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Api {
                status: response.status().as_u16(),
                message: format!("Download link returned status {}", response.status().as_u16()),
            });
        }

        let bytes = response.bytes().await?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&target, &bytes).await?;
        info!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}
