pub mod credentials;
pub mod folder;
pub mod models;

use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::services::api::ApiError;
use crate::services::drive::credentials::CredentialProvider;
use crate::services::drive::models::{CreatedFile, DriveFile, DriveFileList};
use crate::settings::Settings;

/// Thin client over the Drive v3 REST API, scoped to what the playground
/// needs: child listing, metadata, text download, and name-addressed writes.
pub struct DriveClient {
    http: reqwest::Client,
    credentials: CredentialProvider,
    api_base: String,
    upload_base: String,
    folder_id: Option<String>,
    folder_path: Vec<String>,
}

impl DriveClient {
    pub fn new(settings: &Settings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build http client");

        DriveClient {
            http,
            credentials: CredentialProvider::new(settings),
            api_base: settings.drive_api_base.clone(),
            upload_base: settings.upload_api_base.clone(),
            folder_id: settings.folder_id.clone(),
            folder_path: settings.folder_path.clone(),
        }
    }

    pub async fn access_token(&self) -> Result<String, ApiError> {
        self.credentials.access_token().await
    }

    /// Non-trashed children of the scope folder, one provider page per call.
    pub async fn list_children(
        &self,
        token: &str,
        folder_id: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<DriveFileList, ApiError> {
        let query = format!("'{}' in parents and trashed = false", escape_query(folder_id));

        let mut params = vec![
            ("q".to_string(), query),
            ("spaces".to_string(), "drive".to_string()),
            (
                "fields".to_string(),
                "nextPageToken, files(id, name, mimeType, modifiedTime, size)".to_string(),
            ),
            ("pageSize".to_string(), page_size.to_string()),
        ];
        if let Some(page_token) = page_token {
            params.push(("pageToken".to_string(), page_token));
        }

        let res = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;

        expect_json::<DriveFileList>(res, "list files").await
    }

    pub async fn file_metadata(&self, token: &str, file_id: &str) -> Result<DriveFile, ApiError> {
        let res = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("fields", "id, name, mimeType, parents")])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await.unwrap_or_default();

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("file not found: {file_id}")));
        }
        if !status.is_success() {
            return Err(provider_error("get file metadata", status, body));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Full content download, decoded as text. Undecodable byte sequences
    /// are replaced rather than failing the request.
    pub async fn download_text(&self, token: &str, file_id: &str) -> Result<String, ApiError> {
        let res = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::NotFound(format!(
                "failed to retrieve file {file_id}: status={status}, body={body}"
            )));
        }

        let bytes = res.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Exact-name lookup among non-trashed children; first match wins when
    /// duplicates exist.
    pub async fn find_child_by_name(
        &self,
        token: &str,
        folder_id: &str,
        name: &str,
    ) -> Result<Option<String>, ApiError> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            escape_query(folder_id),
            escape_query(name)
        );

        let res = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query),
                ("fields", "files(id, name)".to_string()),
                ("pageSize", "1".to_string()),
            ])
            .send()
            .await?;

        let list = expect_json::<DriveFileList>(res, "find file by name").await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    pub async fn create_file(
        &self,
        token: &str,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        content: &str,
    ) -> Result<String, ApiError> {
        let metadata = json!({
            "name": name,
            "mimeType": mime_type,
            "parents": [folder_id],
        });
        let (boundary, body) = multipart_related(&metadata, mime_type, content)?;

        let res = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;

        let created = expect_json::<CreatedFile>(res, "create file").await?;
        Ok(created.id)
    }

    /// Name and content travel in one multipart call so a failure cannot
    /// leave the file renamed but stale.
    pub async fn update_file(
        &self,
        token: &str,
        file_id: &str,
        name: &str,
        mime_type: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        let metadata = json!({ "name": name });
        let (boundary, body) = multipart_related(&metadata, mime_type, content)?;

        let res = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;

        expect_json::<CreatedFile>(res, "update file").await?;
        Ok(())
    }
}

/// Metadata part plus media part, framed as multipart/related the way the
/// upload endpoint expects.
fn multipart_related(
    metadata: &serde_json::Value,
    mime_type: &str,
    content: &str,
) -> Result<(String, String), ApiError> {
    let boundary = format!("playground-{}", Uuid::new_v4());
    let metadata = serde_json::to_string(metadata)?;
    let body = format!(
        "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{boundary}\r\nContent-Type: {mime_type}\r\n\r\n{content}\r\n--{boundary}--\r\n"
    );
    Ok((boundary, body))
}

/// Single quotes and backslashes must be escaped inside q= string literals.
pub(crate) fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub(crate) async fn expect_json<T: DeserializeOwned>(
    res: reqwest::Response,
    op: &str,
) -> Result<T, ApiError> {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(provider_error(op, status, body));
    }

    Ok(serde_json::from_str::<T>(&body)?)
}

fn provider_error(op: &str, status: StatusCode, body: String) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        ApiError::ProviderAuth(format!("{op}: drive rejected the access token"))
    } else {
        ApiError::Provider { status, body }
    }
}
