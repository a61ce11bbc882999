use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use oauth2::{
    basic::BasicClient, reqwest::Client as OAuth2ReqwestClient, AuthUrl, AuthorizationCode,
    ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl, RefreshToken, Scope,
    TokenResponse, TokenUrl,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

use crate::services::api::ApiError;
use crate::services::drive::models::{ClientSecrets, ClientSecretsFile, StoredToken, GOOGLE_AUTH_URI};
use crate::settings::Settings;

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// One place a stored credential can come from. Sources are consulted in
/// order; the first that yields a token wins, and a source with malformed
/// data errors out instead of silently falling through.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<Option<StoredToken>, ApiError>;
}

/// Full token blob from a deployment secret (GOOGLE_DRIVE_TOKEN_JSON).
struct EnvTokenSource {
    blob: Option<String>,
}

#[async_trait]
impl CredentialSource for EnvTokenSource {
    fn name(&self) -> &'static str {
        "GOOGLE_DRIVE_TOKEN_JSON"
    }

    async fn load(&self) -> Result<Option<StoredToken>, ApiError> {
        let Some(blob) = &self.blob else {
            return Ok(None);
        };
        let token = serde_json::from_str::<StoredToken>(blob).map_err(|e| {
            ApiError::Configuration(format!(
                "GOOGLE_DRIVE_TOKEN_JSON is set but invalid ({e}); \
                 paste the full contents of token.json from a local OAuth run"
            ))
        })?;
        Ok(Some(token))
    }
}

/// token.json persisted by a prior interactive run.
struct TokenFileSource {
    path: PathBuf,
}

#[async_trait]
impl CredentialSource for TokenFileSource {
    fn name(&self) -> &'static str {
        "token file"
    }

    async fn load(&self) -> Result<Option<StoredToken>, ApiError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ApiError::Configuration(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let token = serde_json::from_str::<StoredToken>(&raw).map_err(|e| {
            ApiError::Configuration(format!("{} is not a valid token file: {e}", self.path.display()))
        })?;
        Ok(Some(token))
    }
}

pub struct CredentialProvider {
    sources: Vec<Box<dyn CredentialSource>>,
    credentials_json: Option<String>,
    credentials_file: PathBuf,
    token_file: PathBuf,
    // Tokens obtained interactively are persisted only when the deployment
    // blob is not the configured source.
    persist_token: bool,
}

impl CredentialProvider {
    pub fn new(settings: &Settings) -> Self {
        let sources: Vec<Box<dyn CredentialSource>> = vec![
            Box::new(EnvTokenSource {
                blob: settings.token_json.clone(),
            }),
            Box::new(TokenFileSource {
                path: settings.token_file.clone(),
            }),
        ];

        CredentialProvider {
            sources,
            credentials_json: settings.credentials_json.clone(),
            credentials_file: settings.credentials_file.clone(),
            token_file: settings.token_file.clone(),
            persist_token: settings.token_json.is_none(),
        }
    }

    /// Returns a bearer token for the Drive API, refreshing or running the
    /// interactive flow as needed. Stateless across requests: the refreshed
    /// token is used in memory only, matching the persisted-state contract.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        for source in &self.sources {
            let Some(token) = source.load().await? else {
                continue;
            };
            debug!("loaded stored credential from {}", source.name());

            if token.is_fresh(Utc::now()) {
                return Ok(token.token);
            }
            if let Some(refresh_token) = token.refresh_token.clone() {
                let refreshed = refresh(&token, &refresh_token).await?;
                return Ok(refreshed.token);
            }
            warn!(
                "credential from {} is expired and has no refresh token",
                source.name()
            );
            break;
        }

        let token = self.interactive_flow().await?;
        Ok(token.token)
    }

    /// First-time OAuth: authorization-code flow with PKCE against a
    /// loopback redirect. Local runs only; a deployment without a stored
    /// credential fails with a configuration error before reaching Google.
    async fn interactive_flow(&self) -> Result<StoredToken, ApiError> {
        let secrets = self.client_secrets().await?;

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            ApiError::Configuration(format!("failed to bind authorization redirect listener: {e}"))
        })?;
        let addr = listener.local_addr().map_err(|e| {
            ApiError::Configuration(format!("failed to resolve redirect listener address: {e}"))
        })?;

        let oauth_client = BasicClient::new(ClientId::new(secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(secrets.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(secrets.auth_uri.clone())
                    .map_err(|_| ApiError::Configuration("invalid auth uri".into()))?,
            )
            .set_token_uri(
                TokenUrl::new(secrets.token_uri.clone())
                    .map_err(|_| ApiError::Configuration("invalid token uri".into()))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(format!("http://{addr}"))
                    .map_err(|_| ApiError::Configuration("invalid redirect uri".into()))?,
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_state) = oauth_client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(DRIVE_SCOPE.to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        info!("open this URL in a browser to authorize Drive access:");
        info!("{auth_url}");

        let (code, state) = wait_for_redirect(listener).await?;
        if state != *csrf_state.secret() {
            return Err(ApiError::Configuration(
                "authorization state mismatch; restart the sign-in flow".into(),
            ));
        }

        let http_client = OAuth2ReqwestClient::new();
        let result = oauth_client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client)
            .await
            .map_err(|e| ApiError::ProviderAuth(e.to_string()))?;

        let token = StoredToken {
            token: result.access_token().secret().clone(),
            refresh_token: result.refresh_token().map(|t| t.secret().clone()),
            client_id: secrets.client_id,
            client_secret: secrets.client_secret,
            token_uri: secrets.token_uri,
            scopes: vec![DRIVE_SCOPE.to_string()],
            expiry: result
                .expires_in()
                .map(|d| Utc::now() + chrono::Duration::seconds(d.as_secs() as i64)),
        };

        if self.persist_token {
            let serialized = serde_json::to_string_pretty(&token)?;
            tokio::fs::write(&self.token_file, serialized)
                .await
                .map_err(|e| {
                    ApiError::Configuration(format!(
                        "failed to persist {}: {e}",
                        self.token_file.display()
                    ))
                })?;
            info!("saved authorized token to {}", self.token_file.display());
        }

        Ok(token)
    }

    async fn client_secrets(&self) -> Result<ClientSecrets, ApiError> {
        if let Some(blob) = &self.credentials_json {
            let parsed = serde_json::from_str::<ClientSecretsFile>(blob).map_err(|e| {
                ApiError::Configuration(format!(
                    "GOOGLE_DRIVE_CREDENTIALS_JSON is set but invalid ({e}); \
                     paste the full contents of credentials.json"
                ))
            })?;
            return parsed.into_secrets().ok_or_else(|| {
                ApiError::Configuration(
                    "GOOGLE_DRIVE_CREDENTIALS_JSON has neither an \"installed\" nor a \"web\" section"
                        .into(),
                )
            });
        }

        if self.credentials_file.exists() {
            let raw = tokio::fs::read_to_string(&self.credentials_file)
                .await
                .map_err(|e| {
                    ApiError::Configuration(format!(
                        "failed to read {}: {e}",
                        self.credentials_file.display()
                    ))
                })?;
            let parsed = serde_json::from_str::<ClientSecretsFile>(&raw).map_err(|e| {
                ApiError::Configuration(format!(
                    "{} is not a valid client-secret file: {e}",
                    self.credentials_file.display()
                ))
            })?;
            return parsed.into_secrets().ok_or_else(|| {
                ApiError::Configuration(format!(
                    "{} has neither an \"installed\" nor a \"web\" section",
                    self.credentials_file.display()
                ))
            });
        }

        Err(ApiError::Configuration(
            "Google OAuth credentials not found. For deployments: set GOOGLE_DRIVE_TOKEN_JSON \
             (full token.json from a local OAuth run). For a local first run: save \
             credentials.json next to the service or set GOOGLE_DRIVE_CREDENTIALS_JSON"
                .into(),
        ))
    }
}

async fn refresh(token: &StoredToken, refresh_token: &str) -> Result<StoredToken, ApiError> {
    debug!("stored access token expired, exchanging refresh token");

    let http_client = OAuth2ReqwestClient::new();

    let oauth_client = BasicClient::new(ClientId::new(token.client_id.clone()))
        .set_client_secret(ClientSecret::new(token.client_secret.clone()))
        .set_auth_uri(
            AuthUrl::new(GOOGLE_AUTH_URI.to_string())
                .map_err(|_| ApiError::Configuration("invalid auth uri".into()))?,
        )
        .set_token_uri(
            TokenUrl::new(token.token_uri.clone())
                .map_err(|_| ApiError::Configuration("invalid token uri in stored credential".into()))?,
        );

    let result = oauth_client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(&http_client)
        .await
        .map_err(|e| ApiError::ProviderAuth(e.to_string()))?;

    Ok(StoredToken {
        token: result.access_token().secret().clone(),
        refresh_token: result
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| token.refresh_token.clone()),
        expiry: result
            .expires_in()
            .map(|d| Utc::now() + chrono::Duration::seconds(d.as_secs() as i64)),
        ..token.clone()
    })
}

/// Accepts exactly one connection on the loopback listener and pulls
/// `code` and `state` out of Google's redirect.
async fn wait_for_redirect(listener: TcpListener) -> Result<(String, String), ApiError> {
    let (stream, _) = listener.accept().await.map_err(|e| {
        ApiError::Configuration(format!("authorization redirect never arrived: {e}"))
    })?;
    let mut stream = BufReader::new(stream);

    let mut request_line = String::new();
    stream.read_line(&mut request_line).await.map_err(|e| {
        ApiError::Configuration(format!("failed to read authorization redirect: {e}"))
    })?;

    // "GET /?state=...&code=... HTTP/1.1"
    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ApiError::Configuration("malformed authorization redirect".into()))?;
    let url = Url::parse(&format!("http://localhost{path}"))
        .map_err(|_| ApiError::Configuration("malformed authorization redirect".into()))?;

    let query =
        |key: &str| url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned());

    let code = query("code").ok_or_else(|| {
        ApiError::Configuration("authorization redirect did not include a code".into())
    })?;
    let state = query("state").unwrap_or_default();

    let body = "Authorization complete. You can close this window.";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.get_mut().write_all(response.as_bytes()).await;

    Ok((code, state))
}
