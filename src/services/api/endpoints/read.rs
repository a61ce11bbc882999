use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;

use crate::core::context::Context;
use crate::services::api::auth::require_api_key;
use crate::services::api::ApiError;

/// Returns the file's content as text. Only direct children of the scope
/// folder are readable; knowing an id from elsewhere in the account is not
/// enough.
pub async fn handler(
    State(ctx): State<Arc<Context>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> Result<String, ApiError> {
    require_api_key(&ctx.settings, &headers)?;

    let token = ctx.drive.access_token().await?;
    let folder_id = ctx.drive.resolve_scope_folder(&token).await?;

    let meta = ctx.drive.file_metadata(&token, &file_id).await?;
    let parents = meta.parents.unwrap_or_default();
    if !parents.iter().any(|p| p == &folder_id) {
        return Err(ApiError::Forbidden(
            "File is not a direct child of the playground folder. Use /list to get file IDs."
                .to_string(),
        ));
    }

    ctx.drive.download_text(&token, &file_id).await
}
