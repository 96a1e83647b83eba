//! OpenID Connect sign-in against a Cognito hosted UI
//!
//! Authorization-code flow with PKCE. The authorization URL is built with the
//! `oauth2` crate; the code exchange and userinfo calls are plain form/JSON
//! requests since Cognito returns an `id_token` that `oauth2`'s basic token
//! response does not carry. Tokens stay in memory for the life of the session.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::callback::{bind_callback_listener, wait_for_callback};
use super::{AuthContext, AuthUser, IdentityProvider, UserProfile};
use crate::error::{ClientError, Result};

/// How long to wait for the browser to come back to the redirect URI
pub const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(300);

/// Provider endpoints, given explicitly rather than discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub end_session_endpoint: String,
}

/// OIDC client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    pub authority: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default = "default_response_type")]
    pub response_type: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Ask the userinfo endpoint for the profile after the code exchange
    #[serde(default = "default_true")]
    pub load_user_info: bool,
    pub metadata: OidcMetadata,
}

fn default_response_type() -> String {
    "code".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "email".to_string()]
}

fn default_true() -> bool {
    true
}

impl OidcConfig {
    /// Configuration for a Cognito user pool with a hosted-UI domain.
    ///
    /// `app_base_url` is where the redirect lands, e.g. `http://localhost:5173`.
    pub fn cognito(
        region: &str,
        user_pool_id: &str,
        client_id: &str,
        domain_prefix: &str,
        app_base_url: &str,
    ) -> Self {
        let base = app_base_url.trim_end_matches('/');
        let issuer = format!("https://cognito-idp.{}.amazonaws.com/{}", region, user_pool_id);
        let hosted_ui = format!("https://{}.auth.{}.amazoncognito.com", domain_prefix, region);
        let logout_uri = urlencoding::encode(&format!("{}/", base)).into_owned();

        Self {
            authority: issuer.clone(),
            client_id: client_id.to_string(),
            redirect_uri: format!("{}/", base),
            response_type: default_response_type(),
            scopes: default_scopes(),
            load_user_info: true,
            metadata: OidcMetadata {
                issuer,
                authorization_endpoint: format!("{}/oauth2/authorize", hosted_ui),
                token_endpoint: format!("{}/oauth2/token", hosted_ui),
                userinfo_endpoint: format!("{}/oauth2/userInfo", hosted_ui),
                end_session_endpoint: format!(
                    "{}/logout?client_id={}&logout_uri={}",
                    hosted_ui, client_id, logout_uri
                ),
            },
        }
    }

    /// Reject configurations that cannot possibly complete a sign-in
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(ClientError::Config("OIDC client id is empty".to_string()));
        }
        if self.response_type != "code" {
            return Err(ClientError::Config(format!(
                "Unsupported response type '{}', only 'code' is supported",
                self.response_type
            )));
        }
        for (name, value) in [
            ("redirect_uri", &self.redirect_uri),
            ("authorization_endpoint", &self.metadata.authorization_endpoint),
            ("token_endpoint", &self.metadata.token_endpoint),
            ("end_session_endpoint", &self.metadata.end_session_endpoint),
        ] {
            let url = Url::parse(value)
                .map_err(|e| ClientError::Config(format!("Invalid {} '{}': {}", name, value, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ClientError::Config(format!("{} must be http(s): {}", name, value)));
            }
        }
        Ok(())
    }

    /// Port the loopback listener must bind so the redirect reaches it
    pub fn redirect_port(&self) -> Result<u16> {
        let url = Url::parse(&self.redirect_uri)?;
        url.port_or_known_default()
            .ok_or_else(|| ClientError::Config(format!("Redirect URI has no port: {}", self.redirect_uri)))
    }
}

/// Authorization URL to open plus the CSRF state tied to it
#[derive(Debug, Clone)]
pub struct SignInRequest {
    pub url: String,
    pub state: String,
}

struct PendingSignIn {
    verifier: PkceCodeVerifier,
    nonce: String,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    id_token: Option<String>,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Claims we read from the id token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT without verifying its signature.
///
/// The token came straight from the token endpoint over TLS; the API that
/// receives it as a bearer does the verification.
pub fn decode_id_token_claims(id_token: &str) -> Result<IdTokenClaims> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ClientError::Auth("Malformed id token".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClientError::Auth(format!("Malformed id token payload: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Auth(format!("Malformed id token claims: {}", e)))
}

/// Sign-in/sign-out operations against the configured provider
pub struct OidcClient {
    config: OidcConfig,
    http: reqwest::Client,
    /// Pending PKCE verifiers keyed by state
    pending: Arc<RwLock<HashMap<String, PendingSignIn>>>,
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http,
            pending: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Build the authorization URL to open in the browser
    pub async fn start_sign_in(&self) -> Result<SignInRequest> {
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(self.config.metadata.authorization_endpoint.clone())
                    .map_err(|e| ClientError::Config(format!("Invalid authorization endpoint: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(self.config.redirect_uri.clone())
                    .map_err(|e| ClientError::Config(format!("Invalid redirect URI: {}", e)))?,
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let nonce = CsrfToken::new_random().secret().clone();

        let (auth_url, csrf_token) = {
            let mut builder = client
                .authorize_url(CsrfToken::new_random)
                .set_pkce_challenge(pkce_challenge)
                .add_extra_param("nonce", nonce.clone());
            for scope in &self.config.scopes {
                builder = builder.add_scope(Scope::new(scope.clone()));
            }
            builder.url()
        };

        let state = csrf_token.secret().clone();
        self.pending.write().await.insert(
            state.clone(),
            PendingSignIn {
                verifier: pkce_verifier,
                nonce,
            },
        );

        info!("OIDC authorization URL generated for client {}", self.config.client_id);
        Ok(SignInRequest {
            url: auth_url.to_string(),
            state,
        })
    }

    /// Exchange the authorization code delivered to the redirect URI
    pub async fn complete_sign_in(&self, code: &str, state: &str) -> Result<AuthUser> {
        let pending = self.pending.write().await.remove(state).ok_or_else(|| {
            ClientError::Auth("Invalid state token - sign-in flow expired or invalid".to_string())
        })?;

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("code_verifier", pending.verifier.secret())
            .finish();

        let response = self
            .http
            .post(&self.config.metadata.token_endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Auth(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorResponse>(&text) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(desc),
                }) => format!("{}: {}", error, desc),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => format!("Status: {}", status),
            };
            return Err(ClientError::Auth(format!("Token exchange failed: {}", reason)));
        }

        let tokens: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Auth(format!("Token exchange failed: {}", e)))?;

        let id_token = tokens
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Auth("Token response has no id_token".to_string()))?;

        let claims = decode_id_token_claims(&id_token)?;
        if let Some(ref nonce) = claims.nonce {
            if *nonce != pending.nonce {
                return Err(ClientError::Auth("ID token nonce mismatch".to_string()));
            }
        }

        let access_token = SecretString::from(tokens.access_token);
        let claims_profile = UserProfile {
            sub: claims.sub.clone(),
            email: claims.email.clone(),
        };
        let profile = if self.config.load_user_info {
            match self.fetch_user_info(&access_token).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!("Userinfo request failed, using id token claims: {}", e);
                    claims_profile
                }
            }
        } else {
            claims_profile
        };

        let expires_at = tokens
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs)
            .or(claims.exp);

        info!("OIDC sign-in completed for {}", profile.email.as_deref().unwrap_or(&profile.sub));

        Ok(AuthUser {
            id_token: SecretString::from(id_token),
            access_token,
            refresh_token: tokens.refresh_token.map(SecretString::from),
            expires_at,
            profile,
        })
    }

    /// Forget a sign-in that will never complete. Returns whether it was pending.
    pub async fn cancel_sign_in(&self, state: &str) -> bool {
        self.pending.write().await.remove(state).is_some()
    }

    /// Profile from the userinfo endpoint
    pub async fn fetch_user_info(&self, access_token: &SecretString) -> Result<UserProfile> {
        let response = self
            .http
            .get(&self.config.metadata.userinfo_endpoint)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Auth(format!(
                "Userinfo request failed (Status: {})",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("Parse userinfo failed: {}", e)))
    }

    /// End-session URL that also clears the hosted UI's cookie
    pub fn sign_out_url(&self) -> &str {
        &self.config.metadata.end_session_endpoint
    }
}

/// Callback used to show the authorization URL to the user
pub type UrlAnnouncer = Box<dyn Fn(&str) + Send + Sync>;

/// Browser redirect flow holding the signed-in user in memory
pub struct OidcSession {
    client: OidcClient,
    context: AuthContext,
    open_browser: bool,
    announce: UrlAnnouncer,
}

impl OidcSession {
    pub fn new(client: OidcClient) -> Self {
        Self {
            client,
            context: AuthContext::signed_out(),
            open_browser: true,
            announce: Box::new(|_| {}),
        }
    }

    /// Do not launch the system browser; only announce the URL
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Called with every URL the session wants the user to visit
    pub fn with_announcer(mut self, announce: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.announce = Box::new(announce);
        self
    }

    pub fn client(&self) -> &OidcClient {
        &self.client
    }

    fn visit(&self, url: &str) {
        (self.announce)(url);
        if self.open_browser {
            if let Err(e) = open::that(url) {
                info!("Could not open browser automatically: {}", e);
            }
        }
    }

    async fn run_sign_in(&self) -> Result<AuthUser> {
        let port = self.client.config().redirect_port()?;
        let (listener, _) = bind_callback_listener(port).await?;
        let request = self.client.start_sign_in().await?;
        self.visit(&request.url);

        let result = self.finish_sign_in(listener).await;
        if result.is_err() && self.client.cancel_sign_in(&request.state).await {
            debug!("Dropped pending sign-in state after failure");
        }
        result
    }

    async fn finish_sign_in(&self, listener: tokio::net::TcpListener) -> Result<AuthUser> {
        let params = tokio::time::timeout(SIGN_IN_TIMEOUT, wait_for_callback(listener))
            .await
            .map_err(|_| ClientError::Auth("Timed out waiting for sign-in".to_string()))??;

        self.client.complete_sign_in(&params.code, &params.state).await
    }
}

#[async_trait::async_trait]
impl IdentityProvider for OidcSession {
    fn context(&self) -> AuthContext {
        self.context.clone()
    }

    async fn sign_in(&mut self) -> Result<()> {
        self.context = AuthContext {
            is_loading: true,
            error: None,
            user: None,
        };

        match self.run_sign_in().await {
            Ok(user) => {
                self.context = AuthContext::signed_in(user);
                Ok(())
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.context = AuthContext::failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn sign_out(&mut self) -> Result<()> {
        self.context = AuthContext::signed_out();
        let url = self.client.sign_out_url().to_string();
        info!("Signed out, ending provider session");
        self.visit(&url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::rest::tests::stub_server;

    fn cognito() -> OidcConfig {
        OidcConfig::cognito(
            "us-east-1",
            "us-east-1_AbCdEf123",
            "client123",
            "my-files",
            "http://localhost:5173/",
        )
    }

    fn fake_jwt(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    fn stub_config(base: &str) -> OidcConfig {
        let mut config = cognito();
        config.load_user_info = false;
        config.metadata.token_endpoint = format!("{}/oauth2/token", base);
        config
    }

    #[test]
    fn test_cognito_endpoints() {
        let config = cognito();
        assert_eq!(config.authority, "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_AbCdEf123");
        assert_eq!(config.metadata.issuer, config.authority);
        assert_eq!(config.redirect_uri, "http://localhost:5173/");
        assert_eq!(
            config.metadata.authorization_endpoint,
            "https://my-files.auth.us-east-1.amazoncognito.com/oauth2/authorize"
        );
        assert_eq!(
            config.metadata.token_endpoint,
            "https://my-files.auth.us-east-1.amazoncognito.com/oauth2/token"
        );
        assert_eq!(
            config.metadata.userinfo_endpoint,
            "https://my-files.auth.us-east-1.amazoncognito.com/oauth2/userInfo"
        );
        assert_eq!(
            config.metadata.end_session_endpoint,
            "https://my-files.auth.us-east-1.amazoncognito.com/logout?client_id=client123&logout_uri=http%3A%2F%2Flocalhost%3A5173%2F"
        );
        assert_eq!(config.scopes, vec!["openid", "email"]);
        assert_eq!(config.redirect_port().unwrap(), 5173);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = cognito();
        config.client_id = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = cognito();
        config.response_type = "token".to_string();
        assert!(config.validate().is_err());

        let mut config = cognito();
        config.metadata.token_endpoint = "token".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let client = OidcClient::new(cognito()).unwrap();
        let request = client.start_sign_in().await.unwrap();

        let url = Url::parse(&request.url).unwrap();
        assert_eq!(url.host_str(), Some("my-files.auth.us-east-1.amazoncognito.com"));
        assert_eq!(url.path(), "/oauth2/authorize");

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client123");
        assert_eq!(params["redirect_uri"], "http://localhost:5173/");
        assert_eq!(params["scope"], "openid email");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], request.state);
        assert!(!params["nonce"].is_empty());
        assert!(!params["code_challenge"].is_empty());
    }

    #[tokio::test]
    async fn test_unknown_state_is_rejected() {
        let client = OidcClient::new(cognito()).unwrap();
        let err = client.complete_sign_in("code", "never-issued").await.unwrap_err();
        assert!(err.to_string().contains("Invalid state token"));
    }

    #[test]
    fn test_decode_id_token_claims() {
        let token = fake_jwt(r#"{"sub":"abc","email":"ana@example.com","exp":1900000000}"#);
        let claims = decode_id_token_claims(&token).unwrap();
        assert_eq!(claims.sub, "abc");
        assert_eq!(claims.email.as_deref(), Some("ana@example.com"));
        assert_eq!(claims.exp, Some(1_900_000_000));
        assert!(decode_id_token_claims("not-a-jwt").is_err());
    }

    #[tokio::test]
    async fn test_code_exchange() {
        let body = format!(
            r#"{{"id_token":"{}","access_token":"at","refresh_token":"rt","expires_in":3600,"token_type":"Bearer"}}"#,
            fake_jwt(r#"{"sub":"abc","email":"ana@example.com"}"#)
        );
        let (base, server) = stub_server(200, body).await;
        let client = OidcClient::new(stub_config(&base)).unwrap();
        let request = client.start_sign_in().await.unwrap();

        let user = client.complete_sign_in("the-code", &request.state).await.unwrap();
        assert_eq!(user.profile.email.as_deref(), Some("ana@example.com"));
        assert_eq!(user.access_token.expose_secret(), "at");
        assert!(user.refresh_token.is_some());
        assert!(!user.is_expired());

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /oauth2/token HTTP/1.1"));
        assert!(raw.contains("grant_type=authorization_code"));
        assert!(raw.contains("code=the-code"));
        assert!(raw.contains("code_verifier="));
        assert!(raw.contains("client_id=client123"));

        // state is single-use
        assert!(client.complete_sign_in("the-code", &request.state).await.is_err());
    }

    #[tokio::test]
    async fn test_code_exchange_error_is_verbatim() {
        let (base, _server) = stub_server(400, r#"{"error":"invalid_grant","error_description":"Code expired"}"#).await;
        let client = OidcClient::new(stub_config(&base)).unwrap();
        let request = client.start_sign_in().await.unwrap();
        let err = client.complete_sign_in("old", &request.state).await.unwrap_err();
        assert_eq!(err.to_string(), "Token exchange failed: invalid_grant: Code expired");
    }

    #[tokio::test]
    async fn test_nonce_mismatch_is_rejected() {
        let body = format!(
            r#"{{"id_token":"{}","access_token":"at"}}"#,
            fake_jwt(r#"{"sub":"abc","nonce":"someone-elses"}"#)
        );
        let (base, _server) = stub_server(200, body).await;
        let client = OidcClient::new(stub_config(&base)).unwrap();
        let request = client.start_sign_in().await.unwrap();
        let err = client.complete_sign_in("c", &request.state).await.unwrap_err();
        assert_eq!(err.to_string(), "ID token nonce mismatch");
    }

    #[tokio::test]
    async fn test_cancel_sign_in_forgets_state() {
        let client = OidcClient::new(cognito()).unwrap();
        let request = client.start_sign_in().await.unwrap();
        assert_eq!(client.pending.read().await.len(), 1);

        assert!(client.cancel_sign_in(&request.state).await);
        assert!(!client.cancel_sign_in(&request.state).await);
        assert!(client.pending.read().await.is_empty());
        assert!(client.complete_sign_in("code", &request.state).await.is_err());
    }

    #[tokio::test]
    async fn test_provider_error_lands_in_context() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = cognito();
        config.redirect_uri = format!("http://localhost:{}/", port);

        // Plays the browser: the hosted UI redirects back with an error
        let mut session = OidcSession::new(OidcClient::new(config).unwrap())
            .without_browser()
            .with_announcer(move |_url| {
                tokio::spawn(async move {
                    use tokio::io::AsyncWriteExt;
                    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                    stream
                        .write_all(
                            b"GET /?error=access_denied&error_description=User+cancelled+the+login HTTP/1.1\r\nHost: localhost\r\n\r\n",
                        )
                        .await
                        .unwrap();
                });
            });

        let err = session.sign_in().await.unwrap_err();
        assert_eq!(err.to_string(), "access_denied: User cancelled the login");

        let context = session.context();
        assert_eq!(context.error.as_deref(), Some("access_denied: User cancelled the login"));
        assert!(!context.is_loading);
        assert!(!context.is_authenticated());
        assert!(session.client().pending.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_clears_user() {
        let client = OidcClient::new(cognito()).unwrap();
        let visited = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let sink = visited.clone();
        let mut session = OidcSession::new(client)
            .without_browser()
            .with_announcer(move |url| sink.lock().unwrap().push(url.to_string()));
        session.context = AuthContext::signed_in(crate::auth::tests::test_user("tok", None));
        assert!(session.context().is_authenticated());

        session.sign_out().await.unwrap();
        assert!(!session.context().is_authenticated());
        assert_eq!(visited.lock().unwrap().len(), 1);
        assert!(visited.lock().unwrap()[0].contains("/logout?client_id=client123"));
    }
}
