//! `<path>.json` adapter mapping HTTP verbs straight onto the store.
//! No rules are applied.

use crate::rtdb_logic::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use lib_rtdb::Store;
use serde_json::{Map, Value};

/// Larger request bodies are refused with 413.
pub const MAX_BODY_BYTES: usize = 1_000_000;

#[derive(Debug, PartialEq)]
pub enum RestReply {
    Json(Value),
    NotFound,
    BadRequest(String),
    Failed(String),
}

impl IntoResponse for RestReply {
    fn into_response(self) -> Response {
        match self {
            RestReply::Json(value) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                ],
                value.to_string(),
            )
                .into_response(),
            RestReply::NotFound => StatusCode::NOT_FOUND.into_response(),
            RestReply::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            RestReply::Failed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

pub async fn rest_handler(State(state): State<AppState>, method: Method, uri: Uri, body: Bytes) -> RestReply {
    let store = state.server.store();
    execute(store.as_ref(), &method, &uri, &body).await
}

/// Runs one REST request against `store`.
pub async fn execute(store: &dyn Store, method: &Method, uri: &Uri, body: &[u8]) -> RestReply {
    let Some(path) = store_path(uri.path()) else {
        return RestReply::NotFound;
    };
    log::debug!("REST {} /{}", method, path);

    let result = match *method {
        Method::GET => read(store, path, wants_shallow(uri.query())).await,
        Method::PUT => match parse_body(body) {
            Ok(payload) => store.set(path, payload.clone()).await.map(|_| payload),
            Err(reply) => return reply,
        },
        Method::PATCH => match parse_body(body) {
            Ok(Value::Object(partial)) => match store.update(path, partial).await {
                Ok(()) => store.read(path).await,
                Err(e) => Err(e),
            },
            Ok(_) => return RestReply::BadRequest("PATCH body must be an object".into()),
            Err(reply) => return reply,
        },
        Method::DELETE => store.remove(path).await.map(|_| Value::Null),
        _ => return RestReply::BadRequest(format!("Unsupported method {method}")),
    };

    match result {
        Ok(value) => RestReply::Json(value),
        Err(e) => {
            log::error!("REST {} /{} failed: {}", method, path, e);
            RestReply::Failed(e.to_string())
        }
    }
}

/// `/a/b.json` → `a/b`. `None` for paths without the `.json` suffix.
fn store_path(uri_path: &str) -> Option<&str> {
    uri_path
        .strip_suffix(".json")
        .map(|p| p.trim_matches('/'))
}

fn wants_shallow(query: Option<&str>) -> bool {
    query
        .unwrap_or_default()
        .split('&')
        .any(|pair| pair == "shallow=true")
}

fn parse_body(body: &[u8]) -> Result<Value, RestReply> {
    serde_json::from_slice(body).map_err(|e| RestReply::BadRequest(format!("Invalid JSON body: {e}")))
}

async fn read(store: &dyn Store, path: &str, shallow: bool) -> Result<Value, lib_rtdb::error::StoreError> {
    let value = store.read(path).await?;
    if is_falsy(&value) {
        return Ok(Value::Object(Map::new()));
    }
    Ok(if shallow { shallow_view(value) } else { value })
}

/// Object children collapse to `true`; primitive children are kept.
fn shallow_view(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| match child {
                    Value::Object(_) | Value::Array(_) => (key, Value::Bool(true)),
                    other => (key, other),
                })
                .collect(),
        ),
        other => other,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
