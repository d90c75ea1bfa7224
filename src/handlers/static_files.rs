use crate::app::AppContext;
use crate::error::{AppError, AppResult};
use crate::models::HealthResponse;
use crate::utils::responses::ResponseBuilder;
use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use log::{debug, warn};
use std::path::{Component, Path, PathBuf};

/// Health check endpoint
///
/// Answers 503 when the session store does not respond.
pub async fn health(ctx: web::Data<AppContext>) -> HttpResponse {
    match ctx.stores.sessions.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "ok".to_string(),
            message: "tutehub is running".to_string(),
        }),
        Err(e) => {
            warn!("Health check failed: {e}");
            HttpResponse::build(StatusCode::SERVICE_UNAVAILABLE).json(HealthResponse {
                status: "unavailable".to_string(),
                message: "Database is not reachable".to_string(),
            })
        }
    }
}

/// Resolve a request path under `root`, refusing anything that could leave it
#[must_use]
pub fn resolve_static_path(root: &Path, requested: &str) -> Option<PathBuf> {
    if requested.is_empty() || requested.contains('\\') || requested.contains('\0') {
        return None;
    }
    let relative = Path::new(requested);
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !safe {
        return None;
    }
    Some(root.join(relative))
}

/// Content type by file extension
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("mp4") => "video/mp4",
        Some("zip") => "application/zip",
        Some("txt" | "md") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Serve tutorial files from the configured folder
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown files and rejected paths
pub async fn serve_static(
    path: web::Path<String>,
    ctx: web::Data<AppContext>,
) -> AppResult<HttpResponse> {
    let requested = path.into_inner();
    let root = PathBuf::from(&ctx.settings.static_files.folder);

    let Some(file_path) = resolve_static_path(&root, &requested) else {
        warn!("Rejected static path {requested:?}");
        return Err(AppError::NotFound(format!("file {requested}")));
    };

    debug!("Attempting to serve static file: {}", file_path.display());
    match tokio::fs::read(&file_path).await {
        Ok(contents) => Ok(HttpResponse::Ok()
            .content_type(content_type_for(&file_path))
            .body(contents)),
        Err(_) => {
            debug!("Static file not found: {}", file_path.display());
            Err(AppError::NotFound(format!("file {requested}")))
        }
    }
}

/// Fallback for paths no handler is registered for
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    ResponseBuilder::not_found()
        .with_error_code("not_found")
        .with_message(&format!("Not found: {} {}", req.method(), req.path()))
        .build()
}
