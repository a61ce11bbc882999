use tracing::{error, info};

use crate::services::api::ApiError;
use crate::services::drive::DriveClient;
use crate::settings::Settings;

/// Everything a request handler needs, built once at startup and shared
/// behind an Arc. Construction fails fast on configuration the service
/// cannot run without; credential problems surface on first use instead,
/// since the interactive flow may still satisfy them.
pub struct Context {
    pub settings: Settings,
    pub drive: DriveClient,
}

impl Context {
    pub fn new(settings: Settings) -> Result<Self, ApiError> {
        if settings.api_key.is_empty() {
            error!("DRIVE_PLAYGROUND_API_KEY missing");
            return Err(ApiError::Configuration(
                "Set DRIVE_PLAYGROUND_API_KEY in the environment".to_string(),
            ));
        }

        match &settings.folder_id {
            Some(folder_id) => info!("scope folder pinned to id {folder_id}"),
            None => info!(
                "scope folder will be resolved by path: {}",
                settings.folder_path.join(" / ")
            ),
        }

        let drive = DriveClient::new(&settings);

        Ok(Context { settings, drive })
    }
}
