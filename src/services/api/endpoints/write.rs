use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::context::Context;
use crate::services::api::auth::require_api_key;
use crate::services::api::ApiError;

#[derive(Debug, Deserialize)]
pub struct WriteBody {
    pub name: String,
    pub content: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub id: String,
    pub action: WriteAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Created,
    Updated,
}

/// Create-or-replace by name within the scope folder. Matching is exact and
/// first-match-wins; two racing writers for a new name may both create,
/// which the remote provider permits.
pub async fn handler(
    State(ctx): State<Arc<Context>>,
    headers: HeaderMap,
    Json(body): Json<WriteBody>,
) -> Result<Json<WriteResponse>, ApiError> {
    require_api_key(&ctx.settings, &headers)?;

    let token = ctx.drive.access_token().await?;
    let folder_id = ctx.drive.resolve_scope_folder(&token).await?;

    let existing = ctx
        .drive
        .find_child_by_name(&token, &folder_id, &body.name)
        .await?;

    match existing {
        Some(file_id) => {
            ctx.drive
                .update_file(&token, &file_id, &body.name, &body.mime_type, &body.content)
                .await?;
            info!("updated '{}' ({file_id})", body.name);
            Ok(Json(WriteResponse {
                id: file_id,
                action: WriteAction::Updated,
            }))
        }
        None => {
            let file_id = ctx
                .drive
                .create_file(&token, &folder_id, &body.name, &body.mime_type, &body.content)
                .await?;
            info!("created '{}' ({file_id})", body.name);
            Ok(Json(WriteResponse {
                id: file_id,
                action: WriteAction::Created,
            }))
        }
    }
}
