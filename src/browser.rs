//! File Browser - the view controller
//!
//! Holds everything the file view shows (current folder, listing, loading
//! flag, error, status banners, search text) and turns user actions into
//! single API round trips. Every failure ends up as a user-visible string;
//! nothing is retried.
//!
//! Actions take `&mut self` and run to completion, so there is at most one
//! request in flight per browser. If the caller drives several browsers or
//! re-enters after an await, the last response simply overwrites the state.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use secrecy::SecretString;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{basename, FileApi, FileEntry, FolderEntry, Listing, UploadRequest};
use crate::auth::AuthContext;
use crate::error::{ClientError, Result};
use crate::navigator::Navigator;

/// How long an upload banner stays up
pub const UPLOAD_MESSAGE_TTL: Duration = Duration::from_secs(5);

/// A status string that may expire
#[derive(Debug, Clone)]
pub struct TransientMessage {
    text: String,
    posted_at: Instant,
    ttl: Option<Duration>,
}

impl TransientMessage {
    /// Message that stays until replaced
    pub fn sticky(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            posted_at: Instant::now(),
            ttl: None,
        }
    }

    /// Message that disappears after `ttl`
    pub fn expiring(text: impl Into<String>, ttl: Duration) -> Self {
        Self {
            text: text.into(),
            posted_at: Instant::now(),
            ttl: Some(ttl),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn posted_at(&self) -> Instant {
        self.posted_at
    }

    /// Error banners are the ones starting with "Error"
    pub fn is_error(&self) -> bool {
        self.text.starts_with("Error")
    }

    pub fn is_visible_at(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.posted_at) < ttl,
            None => true,
        }
    }
}

/// Files and folders of one successful fetch, replaced as a unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingView {
    pub current_prefix: String,
    pub files: Vec<FileEntry>,
    pub folders: Vec<FolderEntry>,
}

/// Everything the file view renders
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub listing: ListingView,
    pub loading: bool,
    pub error: Option<String>,
    pub download_message: Option<TransientMessage>,
    pub upload_message: Option<TransientMessage>,
    pub search: String,
}

impl ViewState {
    pub fn current_prefix(&self) -> &str {
        &self.listing.current_prefix
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.listing.files
    }

    pub fn folders(&self) -> &[FolderEntry] {
        &self.listing.folders
    }

    /// Files whose key contains the search text, ignoring case
    pub fn filtered_files(&self) -> Vec<&FileEntry> {
        let needle = self.search.to_lowercase();
        self.listing
            .files
            .iter()
            .filter(|f| f.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Folders whose prefix contains the search text, ignoring case
    pub fn filtered_folders(&self) -> Vec<&FolderEntry> {
        let needle = self.search.to_lowercase();
        self.listing
            .folders
            .iter()
            .filter(|f| f.prefix.to_lowercase().contains(&needle))
            .collect()
    }

    /// Key or prefix with the current folder stripped, for display
    pub fn display_name<'a>(&self, key: &'a str) -> std::borrow::Cow<'a, str> {
        let prefix = self.current_prefix();
        if prefix.is_empty() || !key.contains(prefix) {
            std::borrow::Cow::Borrowed(key)
        } else {
            std::borrow::Cow::Owned(key.replacen(prefix, "", 1))
        }
    }

    /// Upload banner text, unless it has expired
    pub fn upload_message(&self) -> Option<&TransientMessage> {
        self.upload_message
            .as_ref()
            .filter(|m| m.is_visible_at(Instant::now()))
    }

    pub fn download_message(&self) -> Option<&TransientMessage> {
        self.download_message
            .as_ref()
            .filter(|m| m.is_visible_at(Instant::now()))
    }

    fn clear_messages(&mut self) {
        self.download_message = None;
        self.upload_message = None;
    }
}

/// View controller over a file API and a download navigator
pub struct FileBrowser {
    api: Box<dyn FileApi>,
    navigator: Box<dyn Navigator>,
    state: ViewState,
    was_authenticated: bool,
}

impl FileBrowser {
    pub fn new(api: Box<dyn FileApi>, navigator: Box<dyn Navigator>) -> Self {
        Self {
            api,
            navigator,
            state: ViewState::default(),
            was_authenticated: false,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// React to a new auth snapshot. Fetches the root listing when the user
    /// has just become authenticated; drops the view when they sign out.
    /// Returns true when a fetch was issued.
    pub async fn on_auth_changed(&mut self, auth: &AuthContext) -> bool {
        let authenticated = auth.is_authenticated();
        let became_available = authenticated && !self.was_authenticated;
        self.was_authenticated = authenticated;

        if became_available {
            self.list_items(auth, "").await;
            true
        } else {
            if !authenticated {
                self.state = ViewState::default();
            }
            false
        }
    }

    /// Fetch the listing for `prefix` and make it the current view.
    ///
    /// Without a token nothing happens. On failure the view falls back to an
    /// empty root listing and `error` carries the message.
    pub async fn list_items(&mut self, auth: &AuthContext, prefix: &str) {
        let token = match auth.id_token() {
            Some(token) => token,
            None => {
                debug!("list_items skipped: not authenticated");
                return;
            }
        };

        self.state.loading = true;
        self.state.error = None;
        self.state.clear_messages();

        match self.api.list(token, prefix).await {
            Ok(Listing { files, folders }) => {
                self.state.listing = ListingView {
                    current_prefix: prefix.to_string(),
                    files,
                    folders,
                };
            }
            Err(e) => {
                warn!("Listing '{}' failed: {}", prefix, e);
                self.state.listing = ListingView::default();
                self.state.error = Some(e.to_string());
            }
        }

        self.state.loading = false;
    }

    /// Navigate into a folder
    pub async fn open_folder(&mut self, auth: &AuthContext, folder: &FolderEntry) {
        self.list_items(auth, &folder.prefix).await;
    }

    /// Go back to the top-level listing
    pub async fn back_to_root(&mut self, auth: &AuthContext) {
        self.list_items(auth, "").await;
    }

    /// Re-fetch the current folder
    pub async fn refresh(&mut self, auth: &AuthContext) {
        let prefix = self.state.current_prefix().to_string();
        self.list_items(auth, &prefix).await;
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.state.search = text.into();
    }

    /// Get a pre-signed URL for `filename` and hand it to the navigator
    pub async fn request_download(&mut self, auth: &AuthContext, filename: &str) {
        let token = match auth.id_token() {
            Some(token) => token,
            None => {
                self.state.download_message =
                    Some(TransientMessage::sticky("Authentication required to download files."));
                return;
            }
        };

        self.state.download_message =
            Some(TransientMessage::sticky(format!("Preparing download for {}...", filename)));

        let name = basename(filename).to_string();
        let text = match self.fetch_and_open(token, filename, &name).await {
            Ok(()) => {
                info!("Download started for {}", filename);
                format!("✅ Downloaded {}", name)
            }
            Err(e) => {
                warn!("Download of {} failed: {}", filename, e);
                format!("Error downloading: {}", e)
            }
        };
        self.state.download_message = Some(TransientMessage::sticky(text));
    }

    async fn fetch_and_open(&self, token: &SecretString, filename: &str, name: &str) -> Result<()> {
        let link = self.api.download_link(token, filename).await?;
        let url = link
            .download_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::Other("No download_url in response.".to_string()))?;
        self.navigator.open(&url, name).await
    }

    /// Upload a local file into the current folder
    pub async fn upload_file(&mut self, auth: &AuthContext, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !auth.is_authenticated() {
            self.post_upload_message("Authentication required to upload files.");
            return;
        }

        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => {
                self.post_upload_message("Error uploading: Failed to read file");
                return;
            }
        };

        match tokio::fs::read(path).await {
            Ok(bytes) => self.upload_bytes(auth, &name, bytes).await,
            Err(e) => {
                warn!("Reading {} failed: {}", path.display(), e);
                self.post_upload_message("Error uploading: Failed to read file");
            }
        }
    }

    /// Upload in-memory content as `name` into the current folder.
    ///
    /// On success the current folder is re-fetched exactly once, then the
    /// server's message is posted so the refresh does not wipe it.
    pub async fn upload_bytes(&mut self, auth: &AuthContext, name: &str, bytes: Vec<u8>) {
        let token = match auth.id_token() {
            Some(token) => token,
            None => {
                self.post_upload_message("Authentication required to upload files.");
                return;
            }
        };

        self.post_upload_message(format!("Uploading {}...", name));

        let prefix = self.state.current_prefix().to_string();
        let request = UploadRequest {
            filename: format!("{}{}", prefix, name),
            file_content: BASE64.encode(&bytes),
        };

        match self.api.upload(token, &request).await {
            Ok(receipt) => {
                self.list_items(auth, &prefix).await;
                self.post_upload_message(format!("✅ {}", receipt.message));
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", request.filename, e);
                self.post_upload_message(format!("Error uploading: {}", e));
            }
        }
    }

    fn post_upload_message(&mut self, text: impl Into<String>) {
        self.state.upload_message = Some(TransientMessage::expiring(text, UPLOAD_MESSAGE_TTL));
    }
}
