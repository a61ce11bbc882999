use axum::response::Json;
use serde_json::{json, Value};

/// Liveness probe; the only route outside the access gate.
pub async fn handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
