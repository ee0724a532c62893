//! In-process gotify server used by tests

use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use url::Url;

pub(crate) const APP_TOKEN: &str = "AppToken";
pub(crate) const CLIENT_TOKEN: &str = "ClientToken";
pub(crate) const APP_ID: u64 = 3;

#[derive(Debug, Default)]
pub(crate) struct StubState {
    /// (id, extras), oldest first
    pub(crate) messages: Mutex<Vec<(u64, Value)>>,
    pub(crate) requests: Mutex<Vec<String>>,
}

impl StubState {
    pub(crate) fn insert(&self, extras: Value) -> u64 {
        let mut messages = self.messages.lock().unwrap();
        let id = messages.last().map_or(1, |(id, _)| id + 1);
        messages.push((id, extras));
        id
    }

    pub(crate) fn ids(&self) -> Vec<u64> {
        self.messages.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    fn log(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }
}

pub(crate) struct StubGotify {
    pub(crate) url: Url,
    pub(crate) state: Arc<StubState>,
}

impl StubGotify {
    pub(crate) async fn spawn() -> Self {
        let state = Arc::new(StubState::default());

        let app = Router::new()
            .route("/version", get(version))
            .route("/message", post(create_message))
            .route("/message/:id", delete(delete_message))
            .route("/application", get(list_applications))
            .route("/application/:id/message", get(list_messages))
            .layer(Extension(state.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();

        tokio::spawn(axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service()));

        Self { url, state }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "errorCode": 401,
            "errorDescription": "you need to provide a valid access token or user credentials to access this api",
        })),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap, token: &str) -> bool {
    headers.get("X-Gotify-Key").map_or(false, |key| key == token)
}

async fn version() -> Json<Value> {
    Json(json!({"version": "2.1.4", "commit": "8e4a3b2", "buildDate": "2022-05-01T10:00:00Z"}))
}

async fn create_message(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers, APP_TOKEN) {
        return unauthorized();
    }
    state.log(format!("create {}", body["title"].as_str().unwrap_or_default()));

    let id = state.insert(body["extras"].clone());
    Json(json!({"id": id, "appid": APP_ID, "message": body["message"], "title": body["title"]}))
        .into_response()
}

async fn delete_message(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if !authorized(&headers, CLIENT_TOKEN) {
        return unauthorized();
    }
    state.log(format!("delete {id}"));

    let mut messages = state.messages.lock().unwrap();
    match messages.iter().position(|(other, _)| *other == id) {
        Some(pos) => {
            messages.remove(pos);
            StatusCode::OK.into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Not Found", "errorCode": 404, "errorDescription": "message does not exist"})),
        )
            .into_response(),
    }
}

async fn list_applications(headers: HeaderMap) -> Response {
    if !authorized(&headers, CLIENT_TOKEN) {
        return unauthorized();
    }

    Json(json!([
        {"id": 1, "token": "OtherToken", "name": "backup", "description": "", "internal": false},
        {"id": APP_ID, "token": APP_TOKEN, "name": "alertmanager", "description": "", "internal": false},
    ]))
    .into_response()
}

async fn list_messages(
    Extension(state): Extension<Arc<StubState>>,
    headers: HeaderMap,
    Path(app_id): Path<u64>,
    Query(params): Query<HashMap<String, u64>>,
) -> Response {
    if !authorized(&headers, CLIENT_TOKEN) {
        return unauthorized();
    }
    if app_id != APP_ID {
        return StatusCode::NOT_FOUND.into_response();
    }

    let limit = params.get("limit").copied().unwrap_or(100) as usize;
    let since = params.get("since").copied().unwrap_or(u64::MAX);
    state.log(format!("list since={since}"));

    let messages = state.messages.lock().unwrap();
    let newer_first: Vec<&(u64, Value)> =
        messages.iter().rev().filter(|(id, _)| *id < since).collect();

    let page: Vec<Value> = newer_first
        .iter()
        .take(limit)
        .map(|(id, extras)| json!({"id": id, "appid": APP_ID, "message": "", "extras": extras}))
        .collect();
    let last = newer_first.iter().take(limit).last().map_or(0, |(id, _)| *id);

    let mut paging = json!({"size": page.len(), "limit": limit, "since": last});
    if newer_first.len() > limit {
        paging["next"] = json!(format!("/application/{APP_ID}/message?limit={limit}&since={last}"));
    }

    Json(json!({"messages": page, "paging": paging})).into_response()
}
