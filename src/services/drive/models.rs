use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// File resource returned by the Drive API. Only the fields this service
/// asks for via the `fields` query parameter are ever populated; everything
/// beyond `id` and `name` is optional for that reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    // Drive reports sizes as decimal strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
}

/// files.list response page, passed through to callers as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedFile {
    pub id: String,
}

/// Authorized-user token in the layout Google's tooling writes to
/// token.json, also accepted verbatim from GOOGLE_DRIVE_TOKEN_JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "google_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// A token is usable as-is when it carries an access token that is not
    /// within a minute of its recorded expiry. Tokens without an expiry are
    /// trusted until the provider says otherwise.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry > now + chrono::Duration::seconds(60),
            None => true,
        }
    }
}

fn google_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

fn google_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

/// credentials.json as downloaded from the cloud console; desktop apps use
/// the `installed` key, web apps `web`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecretsFile {
    pub installed: Option<ClientSecrets>,
    pub web: Option<ClientSecrets>,
}

impl ClientSecretsFile {
    pub fn into_secrets(self) -> Option<ClientSecrets> {
        self.installed.or(self.web)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "google_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "google_token_uri")]
    pub token_uri: String,
}
