//! Identity Module
//!
//! The view controller never talks to the identity provider directly. It reads
//! an `AuthContext` snapshot (loading / error / user) and pulls the id token
//! from it. `IdentityProvider` is the capability that produces that snapshot
//! and performs sign-in and sign-out; `oidc::OidcSession` is the Cognito
//! hosted-UI implementation.

pub mod callback;
pub mod oidc;

pub use oidc::{OidcClient, OidcConfig, OidcMetadata, OidcSession};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Profile claims of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Signed-in user and tokens, held in memory only
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id_token: SecretString,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Unix timestamp
    pub expires_at: Option<i64>,
    pub profile: UserProfile,
}

impl AuthUser {
    /// Check if the token is expired (with 30 s buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= chrono::Utc::now().timestamp() + 30,
            None => false,
        }
    }

    /// Name shown in the welcome line
    pub fn display_name(&self) -> &str {
        self.profile.email.as_deref().unwrap_or("User")
    }
}

/// Snapshot of the identity provider's state
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub is_loading: bool,
    /// Provider error, displayed verbatim
    pub error: Option<String>,
    pub user: Option<AuthUser>,
}

impl AuthContext {
    pub fn signed_in(user: AuthUser) -> Self {
        Self {
            is_loading: false,
            error: None,
            user: Some(user),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            is_loading: false,
            error: Some(error.into()),
            user: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.id_token().is_some()
    }

    /// Bearer token for API calls. `None` when signed out or the token is empty.
    pub fn id_token(&self) -> Option<&SecretString> {
        self.user
            .as_ref()
            .map(|u| &u.id_token)
            .filter(|t| !t.expose_secret().is_empty())
    }
}

/// "Current user / token / sign-in / sign-out" capability
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current state snapshot
    fn context(&self) -> AuthContext;

    /// Run the sign-in redirect flow
    async fn sign_in(&mut self) -> Result<()>;

    /// Forget the user and end the provider session
    async fn sign_out(&mut self) -> Result<()>;
}
