use std::env;
use std::path::{Path, PathBuf};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Folder path resolved under My Drive when DRIVE_PLAYGROUND_FOLDER_ID is not set.
pub const DEFAULT_FOLDER_PATH: [&str; 3] = ["Personal", "AI Research", "OpenClaw Playground"];

const TOKEN_FILE: &str = "token.json";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Environment-sourced configuration, built once in `main` and handed to
/// `Context::new`. Nothing here is validated; the context rejects what it
/// cannot serve with.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared secret callers must present on every request.
    pub api_key: String,
    /// Explicit scope folder, skipping path resolution entirely.
    pub folder_id: Option<String>,
    /// Folder names walked from the Drive root when no folder id is given.
    pub folder_path: Vec<String>,
    /// Full authorized-user token blob for non-interactive deployments.
    pub token_json: Option<String>,
    /// Full OAuth client-secret blob for non-interactive first runs.
    pub credentials_json: Option<String>,
    /// Token persisted by a prior interactive run.
    pub token_file: PathBuf,
    /// OAuth client secrets downloaded from the cloud console.
    pub credentials_file: PathBuf,
    pub drive_api_base: String,
    pub upload_api_base: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let dir = service_dir();

        Settings {
            api_key: env_trimmed("DRIVE_PLAYGROUND_API_KEY").unwrap_or_default(),
            folder_id: env_trimmed("DRIVE_PLAYGROUND_FOLDER_ID"),
            folder_path: env_trimmed("DRIVE_PLAYGROUND_FOLDER_PATH")
                .map(|raw| parse_folder_path(&raw))
                .unwrap_or_else(default_folder_path),
            token_json: env_trimmed("GOOGLE_DRIVE_TOKEN_JSON"),
            credentials_json: env_trimmed("GOOGLE_DRIVE_CREDENTIALS_JSON"),
            token_file: dir.join(TOKEN_FILE),
            credentials_file: env_trimmed("GOOGLE_APPLICATION_CREDENTIALS")
                .map(PathBuf::from)
                .unwrap_or_else(|| dir.join(CREDENTIALS_FILE)),
            drive_api_base: DRIVE_API_BASE.to_string(),
            upload_api_base: UPLOAD_API_BASE.to_string(),
        }
    }
}

pub fn default_folder_path() -> Vec<String> {
    DEFAULT_FOLDER_PATH.iter().map(|s| s.to_string()).collect()
}

/// "Personal / AI Research / OpenClaw Playground" style, separated by `/`.
pub fn parse_folder_path(raw: &str) -> Vec<String> {
    raw.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_trimmed(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Local state (token.json, credentials.json) lives next to the binary,
/// falling back to the working directory.
fn service_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
