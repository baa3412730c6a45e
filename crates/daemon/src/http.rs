//! axum glue: routes, extractor error mapping and envelope encoding.
//!
//! Every handler takes the store lock for the duration of one synchronous
//! core call and releases it before anything is awaited.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        FromRequest, Multipart, Path, Query, Request, State,
    },
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use snapmock_core::handlers::{
    apps, changes, conf, connections, find, icons, interfaces, snaps, system,
};
use snapmock_core::{ApiError, Envelope, Params, Reply, Store};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, warn};

pub type SharedStore = Arc<Mutex<Store>>;

#[derive(Clone)]
pub struct AppState {
    store: SharedStore,
}

impl AppState {
    /// Recovers the guard from a poisoned lock.
    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn router(store: SharedStore) -> Router {
    let state = AppState { store };
    let v2 = Router::new()
        .route("/system-info", get(system_info))
        .route("/snaps", get(list_snaps).post(post_snaps))
        .route("/snaps/{name}", get(get_snap).post(post_snap))
        .route("/snaps/{name}/conf", get(get_conf).put(put_conf))
        .route("/icons/{name}/icon", get(get_icon))
        .route("/interfaces", get(get_interfaces).post(post_interfaces))
        .route("/connections", get(get_connections))
        .route("/changes", get(list_changes))
        .route("/changes/{id}", get(get_change).post(post_change))
        .route("/find", get(find_snaps))
        .route("/sections", get(sections))
        .route("/apps", get(list_apps).post(post_apps))
        .method_not_allowed_fallback(method_not_allowed);

    Router::new()
        .nest("/v2", v2)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Protocol error rendered as an error envelope.
#[derive(Debug)]
pub struct AppError(ApiError);

impl From<ApiError> for AppError {
    fn from(value: ApiError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            debug!(status = status.as_u16(), kind = ?self.0.kind, message = %self.0, "request rejected");
        }
        let envelope = Envelope::error(&self.0, status.canonical_reason().unwrap_or_default());
        (status, Json(envelope)).into_response()
    }
}

async fn respond(result: Result<Reply, ApiError>) -> Response {
    let reply = match result {
        Ok(reply) => reply,
        Err(err) => return AppError(err).into_response(),
    };
    match reply {
        Reply::Sync {
            result,
            suggested_currency,
        } => {
            let envelope = Envelope::Sync {
                status_code: 200,
                status: "OK".into(),
                result,
                suggested_currency,
            };
            (StatusCode::OK, Json(envelope)).into_response()
        }
        Reply::Async { change } => {
            let envelope = Envelope::Async {
                status_code: 202,
                status: "Accepted".into(),
                change: change.to_string(),
            };
            (StatusCode::ACCEPTED, Json(envelope)).into_response()
        }
        Reply::Raw { content_type, body } => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Reply::Stall => {
            warn!("stalling request until the connection goes away");
            std::future::pending::<Response>().await
        }
    }
}

fn params(
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Result<Params, ApiError> {
    query
        .map(|Query(map)| Params::from(map))
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn json_body(body: Result<Bytes, BytesRejection>) -> Result<Value, ApiError> {
    let bytes = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::bad_request(format!("cannot decode request body: {e}")))
}

async fn method_not_allowed(method: Method) -> AppError {
    ApiError::method_not_allowed(method.as_str()).into()
}

async fn not_found(uri: Uri) -> AppError {
    ApiError::not_found(format!("not found: {}", uri.path())).into()
}

async fn system_info(State(st): State<AppState>) -> Response {
    let reply = system::system_info(&st.lock());
    respond(Ok(reply)).await
}

async fn list_snaps(
    State(st): State<AppState>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Response {
    let result = params(query).and_then(|p| snaps::list(&st.lock(), &p));
    respond(result).await
}

/// JSON bodies carry a multi-snap action; multipart bodies a sideload.
async fn post_snaps(State(st): State<AppState>, request: Request) -> Response {
    let multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if multipart {
        let sideload = match Multipart::from_request(request, &st).await {
            Ok(form) => read_sideload(form).await,
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        };
        let result = sideload.and_then(|s| snaps::sideload(&mut st.lock(), s));
        return respond(result).await;
    }

    let body = Bytes::from_request(request, &st).await;
    let result = json_body(body).and_then(|body| snaps::post_many(&mut st.lock(), &body));
    respond(result).await
}

async fn read_sideload(mut form: Multipart) -> Result<snaps::SideloadRequest, ApiError> {
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        ApiError::bad_request(format!("cannot read multipart form: {}", e.body_text()))
    };
    let mut request = snaps::SideloadRequest::default();
    while let Some(field) = form.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "snap" {
            request.filename = Some(field.file_name().unwrap_or("snap").to_string());
            request.size = field.bytes().await.map_err(bad_form)?.len();
            continue;
        }
        let value = field.text().await.map_err(bad_form)?;
        let flag = value == "true";
        match name.as_str() {
            "action" => request.action = Some(value),
            "name" => request.name = Some(value),
            "snap-path" => request.snap_path = Some(value),
            "classic" => request.classic = flag,
            "dangerous" => request.dangerous = flag,
            "devmode" => request.devmode = flag,
            "jailmode" => request.jailmode = flag,
            other => debug!(field = other, "ignoring multipart field"),
        }
    }
    Ok(request)
}

async fn get_snap(State(st): State<AppState>, Path(name): Path<String>) -> Response {
    let result = snaps::get(&st.lock(), &name);
    respond(result).await
}

async fn post_snap(
    State(st): State<AppState>,
    Path(name): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = json_body(body).and_then(|body| snaps::post(&mut st.lock(), &name, &body));
    respond(result).await
}

async fn get_conf(
    State(st): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Response {
    let result = params(query).and_then(|p| conf::get(&st.lock(), &name, &p));
    respond(result).await
}

async fn put_conf(
    State(st): State<AppState>,
    Path(name): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = json_body(body).and_then(|body| conf::put(&mut st.lock(), &name, &body));
    respond(result).await
}

async fn get_icon(State(st): State<AppState>, Path(name): Path<String>) -> Response {
    let result = icons::get(&st.lock(), &name);
    respond(result).await
}

async fn get_interfaces(
    State(st): State<AppState>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Response {
    let result = params(query).and_then(|p| interfaces::get(&st.lock(), &p));
    respond(result).await
}

async fn post_interfaces(
    State(st): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = json_body(body).and_then(|body| interfaces::post(&mut st.lock(), &body));
    respond(result).await
}

async fn get_connections(
    State(st): State<AppState>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Response {
    let result = params(query).and_then(|p| connections::get(&st.lock(), &p));
    respond(result).await
}

async fn list_changes(
    State(st): State<AppState>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Response {
    let result = params(query).and_then(|p| changes::list(&st.lock(), &p));
    respond(result).await
}

async fn get_change(State(st): State<AppState>, Path(id): Path<String>) -> Response {
    let result = changes::get(&mut st.lock(), &id);
    respond(result).await
}

async fn post_change(
    State(st): State<AppState>,
    Path(id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let result = json_body(body).and_then(|body| changes::post(&mut st.lock(), &id, &body));
    respond(result).await
}

async fn find_snaps(
    State(st): State<AppState>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Response {
    let result = params(query).and_then(|p| find::find(&st.lock(), &p));
    respond(result).await
}

async fn sections(State(st): State<AppState>) -> Response {
    let reply = find::sections(&st.lock());
    respond(Ok(reply)).await
}

async fn list_apps(
    State(st): State<AppState>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Response {
    let result = params(query).and_then(|p| apps::list(&st.lock(), &p));
    respond(result).await
}

async fn post_apps(State(st): State<AppState>, body: Result<Bytes, BytesRejection>) -> Response {
    let result = json_body(body).and_then(|body| apps::post(&mut st.lock(), &body));
    respond(result).await
}
