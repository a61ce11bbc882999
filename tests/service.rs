//! End-to-end tests: the real router and Drive client pointed at an
//! in-process stand-in for the Drive v3 API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use serde_json::{json, Value};

use drive_playground::core::context::Context;
use drive_playground::services::api;
use drive_playground::settings::Settings;

#[derive(Debug, Clone)]
struct FakeFile {
    id: String,
    name: String,
    mime_type: String,
    parents: Vec<String>,
    content: String,
}

#[derive(Debug, Default)]
struct Inner {
    files: Vec<FakeFile>,
    counter: u64,
    requests: u64,
    last_list_params: Option<HashMap<String, String>>,
}

/// In-memory Drive backend shared between the fake router and the test.
#[derive(Clone, Default)]
struct FakeDrive(Arc<Mutex<Inner>>);

impl FakeDrive {
    fn add_folder(&self, id: &str, name: &str, parent: &str) {
        self.add(id, name, "application/vnd.google-apps.folder", parent, "");
    }

    fn add_file(&self, id: &str, name: &str, parent: &str, content: &str) {
        self.add(id, name, "text/plain", parent, content);
    }

    fn add(&self, id: &str, name: &str, mime_type: &str, parent: &str, content: &str) {
        self.0.lock().unwrap().files.push(FakeFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parents: vec![parent.to_string()],
            content: content.to_string(),
        });
    }

    fn requests(&self) -> u64 {
        self.0.lock().unwrap().requests
    }

    fn last_list_params(&self) -> HashMap<String, String> {
        self.0.lock().unwrap().last_list_params.clone().unwrap_or_default()
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/drive/v3/files", get(fake_list))
            .route("/drive/v3/files/{id}", get(fake_get))
            .route("/upload/drive/v3/files", post(fake_create))
            .route("/upload/drive/v3/files/{id}", patch(fake_update))
            .with_state(self.clone())
    }
}

/// The q= filters the service issues, reduced to what the tests need.
#[derive(Debug, Default)]
struct QueryFilter {
    parent: Option<String>,
    name: Option<String>,
    folders_only: bool,
}

fn parse_q(q: &str) -> QueryFilter {
    let mut filter = QueryFilter::default();
    for clause in q.split(" and ") {
        let clause = clause.trim();
        if let Some(rest) = clause.strip_suffix(" in parents") {
            filter.parent = Some(unquote(rest));
        } else if let Some(rest) = clause.strip_prefix("name = ") {
            filter.name = Some(unquote(rest));
        } else if clause.starts_with("mimeType = ") {
            filter.folders_only = clause.contains("folder");
        }
    }
    filter
}

fn unquote(raw: &str) -> String {
    raw.trim()
        .trim_matches('\'')
        .replace("\\'", "'")
        .replace("\\\\", "\\")
}

async fn fake_list(
    State(state): State<FakeDrive>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut inner = state.0.lock().unwrap();
    inner.requests += 1;
    inner.last_list_params = Some(params.clone());

    let filter = parse_q(params.get("q").map(String::as_str).unwrap_or(""));
    let files: Vec<Value> = inner
        .files
        .iter()
        .filter(|f| filter.parent.as_ref().map_or(true, |p| f.parents.contains(p)))
        .filter(|f| filter.name.as_ref().map_or(true, |n| &f.name == n))
        .filter(|f| !filter.folders_only || f.mime_type.contains("folder"))
        .map(|f| {
            json!({
                "id": f.id,
                "name": f.name,
                "mimeType": f.mime_type,
                "modifiedTime": "2026-01-01T00:00:00.000Z",
                "size": f.content.len().to_string(),
            })
        })
        .collect();

    Json(json!({ "files": files, "nextPageToken": null }))
}

async fn fake_get(
    State(state): State<FakeDrive>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = state.0.lock().unwrap();
    inner.requests += 1;

    let Some(file) = inner.files.iter().find(|f| f.id == id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "File not found" } })),
        )
            .into_response();
    };

    if params.get("alt").map(String::as_str) == Some("media") {
        return file.content.clone().into_response();
    }

    Json(json!({
        "id": file.id,
        "name": file.name,
        "mimeType": file.mime_type,
        "parents": file.parents,
    }))
    .into_response()
}

async fn fake_create(
    State(state): State<FakeDrive>,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let (metadata, content) = parse_multipart(&headers, &body);

    let mut inner = state.0.lock().unwrap();
    inner.requests += 1;
    inner.counter += 1;
    let id = format!("file-{}", inner.counter);

    inner.files.push(FakeFile {
        id: id.clone(),
        name: metadata["name"].as_str().unwrap_or_default().to_string(),
        mime_type: metadata["mimeType"].as_str().unwrap_or("text/plain").to_string(),
        parents: metadata["parents"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        content,
    });

    Json(json!({ "id": id }))
}

async fn fake_update(
    State(state): State<FakeDrive>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let (metadata, content) = parse_multipart(&headers, &body);

    let mut inner = state.0.lock().unwrap();
    inner.requests += 1;

    let Some(file) = inner.files.iter_mut().find(|f| f.id == id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "File not found" } })),
        )
            .into_response();
    };

    if let Some(name) = metadata["name"].as_str() {
        file.name = name.to_string();
    }
    file.content = content;

    Json(json!({ "id": id })).into_response()
}

/// Splits a multipart/related upload into its JSON metadata and media parts.
fn parse_multipart(headers: &HeaderMap, body: &str) -> (Value, String) {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .expect("upload without content-type");
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .expect("upload without boundary")
        .trim();

    let delimiter = format!("--{boundary}");
    let parts: Vec<&str> = body
        .split(delimiter.as_str())
        .filter(|p| !p.is_empty() && !p.starts_with("--"))
        .collect();
    assert_eq!(parts.len(), 2, "expected metadata and media parts");

    let section = |part: &str| {
        part.split_once("\r\n\r\n")
            .map(|(_, v)| v.trim_end_matches("\r\n").to_string())
            .expect("malformed multipart section")
    };

    let metadata: Value = serde_json::from_str(&section(parts[0])).expect("metadata is not JSON");
    (metadata, section(parts[1]))
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

const API_KEY: &str = "test-key";
const PLAYGROUND: &str = "playground";

fn token_blob() -> String {
    json!({
        "token": "test-access-token",
        "refresh_token": "test-refresh-token",
        "client_id": "client",
        "client_secret": "secret",
        "expiry": "2031-01-01T00:00:00Z",
    })
    .to_string()
}

fn settings(drive: SocketAddr, folder_id: Option<&str>, folder_path: &[&str]) -> Settings {
    let dir = tempfile::tempdir().unwrap().keep();
    Settings {
        api_key: API_KEY.to_string(),
        folder_id: folder_id.map(str::to_string),
        folder_path: folder_path.iter().map(|s| s.to_string()).collect(),
        token_json: Some(token_blob()),
        credentials_json: None,
        token_file: dir.join("token.json"),
        credentials_file: dir.join("credentials.json"),
        drive_api_base: format!("http://{drive}/drive/v3"),
        upload_api_base: format!("http://{drive}/upload/drive/v3"),
    }
}

/// Fake Drive plus the service under test, scoped to an explicit folder id.
async fn start_scoped() -> (FakeDrive, SocketAddr) {
    let drive = FakeDrive::default();
    let drive_addr = spawn(drive.router()).await;
    let ctx = Arc::new(Context::new(settings(drive_addr, Some(PLAYGROUND), &[])).unwrap());
    let service = spawn(api::router(ctx)).await;
    (drive, service)
}

#[tokio::test]
async fn health_needs_no_api_key() {
    let (_drive, service) = start_scoped().await;

    let res = reqwest::get(format!("http://{service}/health")).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "status": "ok" }));
}

#[tokio::test]
async fn missing_or_wrong_key_is_rejected_without_provider_calls() {
    let (drive, service) = start_scoped().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("http://{service}/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    let body = res.json::<Value>().await.unwrap();
    assert_eq!(body["detail"], "Invalid or missing API key");

    let res = client
        .get(format!("http://{service}/list"))
        .header("X-Api-Key", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .post(format!("http://{service}/write"))
        .header("Authorization", "Bearer wrong")
        .json(&json!({ "name": "x", "content": "y" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    assert_eq!(drive.requests(), 0);
}

#[tokio::test]
async fn write_creates_then_updates_and_reads_back() {
    let (_drive, service) = start_scoped().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("http://{service}/write"))
        .header("X-Api-Key", API_KEY)
        .json(&json!({ "name": "note.txt", "content": "hi", "mime_type": "text/plain" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let created = res.json::<Value>().await.unwrap();
    assert_eq!(created["action"], "created");
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("http://{service}/write"))
        .header("X-Api-Key", API_KEY)
        .json(&json!({ "name": "note.txt", "content": "hi again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let updated = res.json::<Value>().await.unwrap();
    assert_eq!(updated["action"], "updated");
    assert_eq!(updated["id"], id.as_str());

    let res = client
        .get(format!("http://{service}/files/{id}/content"))
        .header("X-Api-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "hi again");
}

#[tokio::test]
async fn read_outside_scope_folder_is_forbidden() {
    let (drive, service) = start_scoped().await;
    drive.add_file("foreign", "secrets.txt", "elsewhere", "classified");

    let res = reqwest::Client::new()
        .get(format!("http://{service}/files/foreign/content"))
        .header("X-Api-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    let body = res.json::<Value>().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("not a direct child"));
}

#[tokio::test]
async fn read_unknown_id_is_not_found() {
    let (_drive, service) = start_scoped().await;

    let res = reqwest::Client::new()
        .get(format!("http://{service}/files/no-such-id/content"))
        .header("Authorization", format!("Bearer {API_KEY}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn list_returns_only_scope_folder_children() {
    let (drive, service) = start_scoped().await;
    drive.add_file("a", "alpha.txt", PLAYGROUND, "aaa");
    drive.add_file("b", "beta.txt", PLAYGROUND, "bbb");
    drive.add_file("c", "gamma.txt", "elsewhere", "ccc");

    let res = reqwest::Client::new()
        .get(format!("http://{service}/list"))
        .header("Authorization", format!("Bearer {API_KEY}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body = res.json::<Value>().await.unwrap();

    let names: Vec<&str> = body["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha.txt", "beta.txt"]);
    assert!(body["nextPageToken"].is_null());
    assert_eq!(drive.last_list_params().get("pageSize").unwrap(), "50");
}

#[tokio::test]
async fn page_size_is_validated_before_any_provider_call() {
    let (drive, service) = start_scoped().await;
    let client = reqwest::Client::new();

    for bad in ["0", "101"] {
        let res = client
            .get(format!("http://{service}/list?page_size={bad}"))
            .header("X-Api-Key", API_KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
    }
    assert_eq!(drive.requests(), 0);

    let res = client
        .get(format!("http://{service}/list?page_size=7"))
        .header("X-Api-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(drive.last_list_params().get("pageSize").unwrap(), "7");
}

#[tokio::test]
async fn folder_path_resolution_walks_names_and_is_idempotent() {
    let drive = FakeDrive::default();
    drive.add_folder("p1", "Personal", "root");
    drive.add_folder("p2", "AI Research", "p1");
    drive.add_folder("p3", "OpenClaw Playground", "p2");
    drive.add_file("doc", "doc.txt", "p3", "scoped");
    let drive_addr = spawn(drive.router()).await;

    let ctx = Arc::new(
        Context::new(settings(
            drive_addr,
            None,
            &["Personal", "AI Research", "OpenClaw Playground"],
        ))
        .unwrap(),
    );
    let service = spawn(api::router(ctx)).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let res = client
            .get(format!("http://{service}/list"))
            .header("X-Api-Key", API_KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body = res.json::<Value>().await.unwrap();
        assert_eq!(body["files"][0]["name"], "doc.txt");
    }
}

#[tokio::test]
async fn unresolvable_folder_path_names_the_missing_step() {
    let drive = FakeDrive::default();
    drive.add_folder("p1", "Personal", "root");
    let drive_addr = spawn(drive.router()).await;

    let ctx = Arc::new(
        Context::new(settings(drive_addr, None, &["Personal", "AI Research"])).unwrap(),
    );
    let service = spawn(api::router(ctx)).await;

    let res = reqwest::Client::new()
        .get(format!("http://{service}/list"))
        .header("X-Api-Key", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    let detail = res.json::<Value>().await.unwrap()["detail"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(detail.contains("Personal / AI Research"));
    assert!(detail.contains("missing at 'AI Research'"));
}

#[tokio::test]
async fn write_with_quoted_name_matches_exactly() {
    let (drive, service) = start_scoped().await;
    drive.add_file("q1", "it's a note.txt", PLAYGROUND, "old");

    let res = reqwest::Client::new()
        .post(format!("http://{service}/write"))
        .header("X-Api-Key", API_KEY)
        .json(&json!({ "name": "it's a note.txt", "content": "new" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body = res.json::<Value>().await.unwrap();
    assert_eq!(body["action"], "updated");
    assert_eq!(body["id"], "q1");
}
