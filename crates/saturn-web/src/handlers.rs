//! Route handlers for the control plane

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::assets::INDEX_HTML;
use crate::state::AppState;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

// ============== Config ==============

/// Node configuration document
pub async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
        state.config_json(),
    )
}

// ============== Dashboard ==============

/// Bare `/webui` - send the browser to this node's address page
pub async fn webui_root(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&state.address_page())
}

/// `/webui/` - the app shell
pub async fn webui_index(State(state): State<Arc<AppState>>) -> Response {
    serve_index(&state).await
}

/// Any path below `/webui/`. Existing assets are served as-is, everything
/// else gets the app shell so client-side routes resolve.
pub async fn webui_asset(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Response {
    let path = path.trim_start_matches('/');

    if !state.assets.exists(path).await {
        return serve_index(&state).await;
    }

    match state.assets.read(path).await {
        Ok(data) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], data).into_response()
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to read dashboard asset");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn serve_index(state: &AppState) -> Response {
    match state.assets.read(INDEX_HTML).await {
        Ok(index) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
            index,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read dashboard index");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
