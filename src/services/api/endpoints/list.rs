use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::Deserialize;

use crate::core::context::Context;
use crate::services::api::auth::require_api_key;
use crate::services::api::ApiError;
use crate::services::drive::models::DriveFileList;

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page_token: Option<String>,
    pub page_size: Option<u32>,
}

pub async fn handler(
    State(ctx): State<Arc<Context>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<DriveFileList>, ApiError> {
    require_api_key(&ctx.settings, &headers)?;

    let page_size = validate_page_size(params.page_size)?;

    let token = ctx.drive.access_token().await?;
    let folder_id = ctx.drive.resolve_scope_folder(&token).await?;
    let page = ctx
        .drive
        .list_children(&token, &folder_id, page_size, params.page_token)
        .await?;

    Ok(Json(page))
}

/// Bounds are enforced before any provider call is made.
fn validate_page_size(requested: Option<u32>) -> Result<u32, ApiError> {
    let page_size = requested.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=100).contains(&page_size) {
        return Err(ApiError::Validation(format!(
            "page_size must be between 1 and 100, got {page_size}"
        )));
    }
    Ok(page_size)
}
