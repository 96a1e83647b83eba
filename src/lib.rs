//! # filegate
//!
//! Client for a file store that sits behind an OIDC-protected REST API.
//!
//! - **Sign-in**: OpenID Connect authorization-code flow with PKCE against a
//!   Cognito hosted UI; tokens are held in memory only.
//! - **Browse**: list a folder prefix, filter the listing locally.
//! - **Download**: ask the API for a pre-signed URL and open it in the browser
//!   (or save it to a directory).
//! - **Upload**: single-request base64 upload into the current folder.
//!
//! ```no_run
//! use filegate::{FileBrowser, IdentityProvider, OidcClient, OidcConfig, OidcSession, RestFileApi, SystemBrowser};
//!
//! # async fn example() -> filegate::Result<()> {
//! let oidc = OidcConfig::cognito("us-east-1", "us-east-1_Pool", "client-id", "my-domain", "http://localhost:5173");
//! let mut session = OidcSession::new(OidcClient::new(oidc)?);
//! session.sign_in().await?;
//!
//! let api = RestFileApi::new("https://abc.execute-api.us-east-1.amazonaws.com/prod")?;
//! let mut browser = FileBrowser::new(Box::new(api), Box::new(SystemBrowser));
//! let auth = session.context();
//! browser.on_auth_changed(&auth).await;
//! for file in browser.state().filtered_files() {
//!     println!("{} ({} bytes)", file.name, file.size);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod browser;
pub mod config;
pub mod error;
pub mod navigator;
pub mod render;

pub use api::{FileApi, FileEntry, FolderEntry, Listing, RestFileApi};
pub use auth::{AuthContext, AuthUser, IdentityProvider, OidcClient, OidcConfig, OidcSession, UserProfile};
pub use browser::{FileBrowser, TransientMessage, ViewState, UPLOAD_MESSAGE_TTL};
pub use config::AppConfig;
pub use error::{ClientError, Result};
pub use navigator::{Navigator, SaveToDirectory, SystemBrowser};
