//! SFTP HTTP handlers under `/api/v1/cmdb/sftp/{host_id}`

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use super::response::{ApiError, ok};
use crate::error::BridgeError;
use crate::files::upload_target;
use crate::ports::SshConnector;

type ApiResult = std::result::Result<Response, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MkdirBody {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub old_path: String,
    pub new_path: String,
}

/// A missing or blank directory means the configured default
fn directory_or_default<C: SshConnector>(state: &AppState<C>, path: Option<String>) -> String {
    path.filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| state.files.default_list_path().to_string())
}

/// `GET /list?path=`
pub async fn list<C: SshConnector>(
    State(state): State<AppState<C>>,
    Path(host_id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult {
    state.authorize(&headers, query.token.as_deref())?;
    let path = directory_or_default(&state, query.path);
    let listing = state.files.list(host_id, &path).await?;
    Ok(ok(listing))
}

/// `POST /upload?path=` with multipart field `file`
pub async fn upload<C: SshConnector>(
    State(state): State<AppState<C>>,
    Path(host_id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> ApiResult {
    state.authorize(&headers, query.token.as_deref())?;
    let dir = directory_or_default(&state, query.path);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BridgeError::Config(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let remote = upload_target(&dir, field.file_name().unwrap_or_default())?;
        let size = state
            .files
            .upload_from(host_id, &remote, Box::pin(field))
            .await?;
        return Ok(ok(json!({ "path": remote, "size": size })));
    }

    Err(BridgeError::Config("multipart field 'file' is missing".to_string()).into())
}

/// Name offered to the browser: the last path component, printable ASCII only.
fn attachment_name(remote: &str) -> String {
    let name: String = remote
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| (c.is_ascii_graphic() || *c == ' ') && *c != '"' && *c != '\\')
        .collect();
    if name.trim().is_empty() {
        "download".to_string()
    } else {
        name
    }
}

/// `GET /download?path=`
pub async fn download<C: SshConnector>(
    State(state): State<AppState<C>>,
    Path(host_id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult {
    state.authorize(&headers, query.token.as_deref())?;
    let remote = query.path.unwrap_or_default();
    let staged = state.files.download_staged(host_id, &remote).await?;
    let size = staged.size;
    let body = Body::from_stream(staged.into_stream().await?);

    let disposition = format!("attachment; filename=\"{}\"", attachment_name(&remote));
    let mut response = Response::new(body);
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `DELETE /delete?path=`
pub async fn remove<C: SshConnector>(
    State(state): State<AppState<C>>,
    Path(host_id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult {
    state.authorize(&headers, query.token.as_deref())?;
    state
        .files
        .delete(host_id, &query.path.unwrap_or_default())
        .await?;
    Ok(ok(serde_json::Value::Null))
}

/// `POST /mkdir` with `{"path": ...}`
pub async fn mkdir<C: SshConnector>(
    State(state): State<AppState<C>>,
    Path(host_id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    Json(body): Json<MkdirBody>,
) -> ApiResult {
    state.authorize(&headers, query.token.as_deref())?;
    state.files.mkdir(host_id, &body.path).await?;
    Ok(ok(serde_json::Value::Null))
}

/// `POST /rename` with `{"old_path": ..., "new_path": ...}`
pub async fn rename<C: SshConnector>(
    State(state): State<AppState<C>>,
    Path(host_id): Path<u64>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    Json(body): Json<RenameBody>,
) -> ApiResult {
    state.authorize(&headers, query.token.as_deref())?;
    state
        .files
        .rename(host_id, &body.old_path, &body.new_path)
        .await?;
    Ok(ok(serde_json::Value::Null))
}
