//! HTTP front-end for `veil serve`.
//!
//! Everything under the proxy prefix goes to [`ProxyEngine::handle`] on the
//! blocking pool; other paths are recovered from the `Referer` or get a 404.

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use veil_core::headers::HeaderList;
use veil_core::proxy::{InboundRequest, ProxyEngine, ProxyResponse};

/// Connection-level headers that never cross the proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

#[derive(Clone)]
struct AppState {
    engine: Arc<ProxyEngine>,
}

#[derive(Debug, Deserialize)]
struct EntryRequest {
    url: String,
}

pub fn router(engine: ProxyEngine) -> Router {
    let state = AppState {
        engine: Arc::new(engine),
    };
    Router::new()
        .route("/api/proxy", post(entry))
        .route("/api/cache/clear", post(clear_cache))
        .route("/api/cache/stats", get(cache_stats))
        .fallback(proxy)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(engine: ProxyEngine, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("veil listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("received Ctrl+C, shutting down");
}

/// Origin the browser used to reach us, from `Host` and `X-Forwarded-Proto`.
fn proxy_origin(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|s| *s == "https")
        .unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}

fn header_list(headers: &HeaderMap) -> HeaderList {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn to_response(resp: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in &resp.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(n), Ok(v)) => {
                headers.append(n, v);
            }
            _ => tracing::debug!("dropping unrepresentable header {}", name),
        }
    }
    let mut response = Response::new(Body::from(resp.body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn recover(engine: &ProxyEngine, uri: &Uri, headers: &HeaderMap) -> Response {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok());
    match engine.recover_from_referer(path_and_query, referer) {
        Some(location) => {
            tracing::debug!("recovered {} -> {}", path_and_query, location);
            Redirect::temporary(&location).into_response()
        }
        None => (StatusCode::NOT_FOUND, "not a proxy path").into_response(),
    }
}

async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !uri.path().starts_with(state.engine.codec().prefix()) {
        return recover(&state.engine, &uri, &headers);
    }
    let request = InboundRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        proxy_origin: proxy_origin(&headers),
        headers: header_list(&headers),
        body: body.to_vec(),
    };
    let engine = Arc::clone(&state.engine);
    match tokio::task::spawn_blocking(move || engine.handle(&request)).await {
        Ok(Ok(resp)) => to_response(resp),
        Ok(Err(e)) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!("proxy task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn entry(
    State(state): State<AppState>,
    payload: Result<Json<EntryRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!("rejected entry body: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": "URL is required" })),
            )
                .into_response();
        }
    };
    match state.engine.entry(&req.url) {
        Ok(link) => Json(link).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn clear_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.engine.clear_cache();
    Json(json!({ "success": true }))
}

async fn cache_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.engine.cache_stats() {
        Some(stats) => Json(json!({ "enabled": true, "stats": stats })),
        None => Json(json!({ "enabled": false })),
    }
}
