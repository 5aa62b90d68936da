use crate::icons::{IconDir, IconResolver};
use crate::page;
use crate::ports::PortScanner;
use axum::{
    async_trait,
    body::Bytes,
    extract::{multipart::MultipartRejection, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tiles_proto::platform::{self, DEFAULT_ICON, STATIC_PREFIX};
use tiles_proto::protocol::{PortReport, Tile};
use tiles_proto::store::TileStore;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TileStore>,
    pub resolver: Arc<IconResolver>,
    pub ports: Arc<PortScanner>,
}

impl AppState {
    fn icons(&self) -> &IconDir {
        self.resolver.icons()
    }

    /// Fetch a user-supplied icon URL and store it as `custom_<ts>.png`.
    /// `None` when the fetch or the write fails.
    async fn custom_icon(&self, icon_url: &str) -> Option<String> {
        let bytes = self.resolver.fetch(icon_url).await?;
        let filename = format!("custom_{}.png", unix_now());
        match self.icons().store(bytes, filename).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to store icon from {}: {:#}", icon_url, e);
                None
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
        };
        if status.is_server_error() {
            warn!("HTTP API: {}", message);
        }
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

/// POST body accepted either as JSON or as a urlencoded form. A body that
/// fails to parse yields `T::default()`, so handlers see missing fields.
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Payload(decode_body(&body, is_form)))
    }
}

fn decode_body<T: DeserializeOwned + Default>(body: &[u8], is_form: bool) -> T {
    let parsed = if is_form {
        let mut fields = serde_json::Map::new();
        for (key, value) in url::form_urlencoded::parse(body).into_owned() {
            fields.entry(key).or_insert(Value::String(value));
        }
        serde_json::from_value(Value::Object(fields))
    } else {
        serde_json::from_slice(body)
    };
    parsed.unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
pub struct AddTileRequest {
    label: Option<String>,
    url: Option<String>,
    icon: Option<String>,
    icon_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveTileRequest {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EditTileRequest {
    original_url: Option<String>,
    label: Option<String>,
    url: Option<String>,
    icon: Option<String>,
    icon_url: Option<String>,
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

/// `icon`, or `icon_url` when `icon` is blank.
fn icon_field<'a>(icon: &'a Option<String>, icon_url: &'a Option<String>) -> &'a str {
    match trimmed(icon) {
        "" => trimmed(icon_url),
        value => value,
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Uploaded filename reduced to ASCII letters, digits, `-`, `_` and `.`, with
/// whitespace runs turned into `_` and no leading or trailing `.`/`_`.
pub fn sanitize_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload_icon", post(upload_icon))
        .route("/add", post(add_tile))
        .route("/remove", post(remove_tile))
        .route("/edit", post(edit_tile))
        .route("/ports", get(list_ports))
        .nest_service(STATIC_PREFIX, ServeDir::new(static_dir))
        .with_state(state)
}

pub async fn serve(bind_address: &str, port: u16, app: Router) -> anyhow::Result<()> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP server to {}: {}", addr, e))?;

    info!("Dashboard listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let mut tiles = state.store.load().await;
    for tile in tiles.iter_mut().filter(|t| t.icon.is_empty()) {
        tile.icon = DEFAULT_ICON.to_string();
    }
    Html(page::render_index(&tiles))
}

async fn upload_icon(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let no_file = || ApiError::BadRequest("no file".to_string());
    let mut multipart = multipart.map_err(|_| no_file())?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.filter(|(name, _)| !name.is_empty()).ok_or_else(no_file)?;
    let stored_name = format!("{}_{}.png", file_stem(&sanitize_filename(&filename)), unix_now());
    let icon = state.icons().store(bytes.to_vec(), stored_name).await?;

    info!("HTTP API: Uploaded icon {:?} -> {}", filename, icon);
    Ok(Json(json!({ "success": true, "icon": icon })))
}

async fn add_tile(
    State(state): State<AppState>,
    Payload(req): Payload<AddTileRequest>,
) -> Result<Json<Value>, ApiError> {
    let label = trimmed(&req.label);
    let url = trimmed(&req.url);
    if label.is_empty() || url.is_empty() {
        return Err(ApiError::BadRequest("label and url required".to_string()));
    }

    let icon_value = icon_field(&req.icon, &req.icon_url);
    let icon = if platform::is_local_icon(icon_value) {
        icon_value.to_string()
    } else if !icon_value.is_empty() {
        match state.custom_icon(icon_value).await {
            Some(path) => path,
            None => state.resolver.resolve(url).await,
        }
    } else {
        state.resolver.resolve(url).await
    };

    info!("HTTP API: Add tile {:?} -> {} ({})", label, url, icon);
    state.store.append(Tile::new(label, url, icon)).await?;
    Ok(Json(json!({ "success": true })))
}

async fn remove_tile(
    State(state): State<AppState>,
    Payload(req): Payload<RemoveTileRequest>,
) -> Result<Json<Value>, ApiError> {
    let url = trimmed(&req.url);
    let removed = state.store.remove_url(url).await?;
    info!("HTTP API: Remove {} ({} tiles)", url, removed);
    Ok(Json(json!({ "success": true })))
}

async fn edit_tile(
    State(state): State<AppState>,
    Payload(req): Payload<EditTileRequest>,
) -> Result<Json<Value>, ApiError> {
    let original_url = trimmed(&req.original_url);
    let label = trimmed(&req.label).to_string();
    let url = trimmed(&req.url).to_string();
    let icon_value = icon_field(&req.icon, &req.icon_url);

    // Only go to the network when there is a tile to put the icon on
    let exists = state.store.load().await.iter().any(|t| t.url == original_url);
    let new_icon = if !exists || icon_value.is_empty() {
        None
    } else if platform::is_local_icon(icon_value) {
        Some(icon_value.to_string())
    } else {
        // A failed fetch keeps the current icon
        state.custom_icon(icon_value).await
    };

    let matched = state
        .store
        .edit_first(original_url, |tile| {
            if !label.is_empty() {
                tile.label = label;
            }
            if !url.is_empty() {
                tile.url = url;
            }
            if let Some(icon) = new_icon {
                tile.icon = icon;
            }
        })
        .await?;

    info!("HTTP API: Edit {} (matched: {})", original_url, matched);
    Ok(Json(json!({ "success": true })))
}

async fn list_ports(State(state): State<AppState>) -> Json<PortReport> {
    Json(state.ports.report().await)
}
