use tracing::debug;

use crate::services::api::ApiError;
use crate::services::drive::models::DriveFileList;
use crate::services::drive::{escape_query, expect_json, DriveClient};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

impl DriveClient {
    /// Canonical id of the folder all operations are scoped to. An explicit
    /// configured id short-circuits; otherwise the configured path is walked
    /// name by name from the Drive root. Resolution runs on every request,
    /// so a moved or renamed folder is picked up without restarts.
    pub async fn resolve_scope_folder(&self, token: &str) -> Result<String, ApiError> {
        if let Some(folder_id) = &self.folder_id {
            return Ok(folder_id.clone());
        }

        let mut parent_id = "root".to_string();
        for name in &self.folder_path {
            let query = format!(
                "'{}' in parents and name = '{}' and mimeType = '{}' and trashed = false",
                escape_query(&parent_id),
                escape_query(name),
                FOLDER_MIME_TYPE
            );

            let res = self
                .http
                .get(format!("{}/files", self.api_base))
                .bearer_auth(token)
                .query(&[
                    ("q", query),
                    ("spaces", "drive".to_string()),
                    ("fields", "files(id, name)".to_string()),
                    ("pageSize", "1".to_string()),
                ])
                .send()
                .await?;

            let found = expect_json::<DriveFileList>(res, "resolve folder").await?;
            match found.files.into_iter().next() {
                Some(folder) => parent_id = folder.id,
                None => return Err(folder_not_found(&self.folder_path, name)),
            }
        }

        debug!("resolved scope folder to {parent_id}");
        Ok(parent_id)
    }
}

fn folder_not_found(path: &[String], missing: &str) -> ApiError {
    ApiError::NotFound(format!(
        "Folder not found: {} (missing at '{missing}'). Create the folder in Drive \
         or set DRIVE_PLAYGROUND_FOLDER_ID to the folder ID.",
        path.join(" / ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_folder_error_names_path_and_step() {
        let path = vec![
            "Personal".to_string(),
            "AI Research".to_string(),
            "OpenClaw Playground".to_string(),
        ];
        let err = folder_not_found(&path, "AI Research");
        let message = err.to_string();
        assert!(message.contains("Personal / AI Research / OpenClaw Playground"));
        assert!(message.contains("missing at 'AI Research'"));
        assert!(message.contains("DRIVE_PLAYGROUND_FOLDER_ID"));
    }
}
