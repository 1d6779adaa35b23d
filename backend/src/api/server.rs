//! HTTP Server for the sheetdash API.
//!
//! Stateless: every request parses its own upload and builds its own report.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                    |
//! |--------|------------------------------------|--------------------------------|
//! | GET    | `/health`                          | Health check                   |
//! | GET    | `/api/dashboards`                  | List built-in dashboards       |
//! | GET    | `/api/dashboards/{name}`           | Dashboard configuration        |
//! | GET    | `/api/dashboards/{name}/template`  | CSV template download          |
//! | POST   | `/api/dashboards/{name}/report`    | Upload CSV/xlsx, get report    |
//! | GET    | `/api/logs`                        | SSE stream for real-time logs  |
//!
//! # Configuration
//!
//! | Variable                  | Default |
//! |---------------------------|---------|
//! | `SHEETDASH_PORT`          | 3000    |
//! | `SHEETDASH_MAX_UPLOAD_MB` | 25      |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_warning, LOG_BROADCASTER};
use super::types::{error_response, DashboardSummary, ReportResponse};
use crate::dashboard::{presets, DashboardConfig};
use crate::error::{ConfigError, PipelineError, ServerError, ServerResult};
use crate::export::write_template;
use crate::transform::{build_report, FilterSelection};

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_MAX_UPLOAD_MB: usize = 25;

    /// Read `SHEETDASH_PORT` and `SHEETDASH_MAX_UPLOAD_MB`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = setting(&lookup, "SHEETDASH_PORT", Self::DEFAULT_PORT);
        let max_mb = setting(&lookup, "SHEETDASH_MAX_UPLOAD_MB", Self::DEFAULT_MAX_UPLOAD_MB);
        Self {
            port,
            max_upload_bytes: max_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            max_upload_bytes: Self::DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

fn setting<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log_warning(format!("Ignoring invalid {}={}", key, raw));
            default
        }),
        None => default,
    }
}

// =============================================================================
// Server
// =============================================================================

pub fn router(config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/dashboards", get(list_dashboards))
        .route("/api/dashboards/{name}", get(show_dashboard))
        .route("/api/dashboards/{name}/template", get(download_template))
        .route("/api/dashboards/{name}/report", post(upload_report))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(&config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 Sheetdash server running on http://localhost:{}", config.port);
    println!("   GET  /api/dashboards                 - List dashboards");
    println!("   GET  /api/dashboards/{{name}}/template - Download CSV template");
    println!("   POST /api/dashboards/{{name}}/report   - Upload CSV/xlsx");
    println!("   GET  /api/logs                       - SSE log stream");
    println!("   GET  /health                         - Health check");
    println!();
    println!("📦 Max upload: {} MB", config.max_upload_bytes / (1024 * 1024));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sheetdash",
        "version": env!("CARGO_PKG_VERSION"),
        "dashboards": presets::NAMES,
        "endpoints": {
            "report": "POST /api/dashboards/{name}/report",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn list_dashboards() -> Json<Vec<DashboardSummary>> {
    Json(presets::all().iter().map(DashboardSummary::from).collect())
}

async fn show_dashboard(Path(name): Path<String>) -> ServerResult<Json<DashboardConfig>> {
    Ok(Json(find_dashboard(&name)?))
}

async fn download_template(Path(name): Path<String>) -> ServerResult<impl IntoResponse> {
    let config = find_dashboard(&name)?;
    let mut body = Vec::new();
    write_template(&config, &mut body).map_err(|e| ServerError::Internal(e.to_string()))?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}_template.csv\"", config.name),
        ),
    ];
    Ok((headers, body))
}

/// Multipart fields: `file` (required) and `filters`, a JSON
/// [`FilterSelection`] (optional).
async fn upload_report(
    Path(name): Path<String>,
    mut multipart: Multipart,
) -> ServerResult<Json<ReportResponse>> {
    let config = find_dashboard(&name)?;

    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut selection = FilterSelection::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file_data = Some(bytes.to_vec());
            }
            "filters" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                selection = serde_json::from_str(&text)
                    .map_err(|e| ServerError::BadRequest(format!("Invalid filters: {}", e)))?;
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;

    log_info(format!(
        "📄 New upload for '{}': {} ({} bytes)",
        config.name,
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let response = report_response(bytes, file_name, config, selection).await?;
    Ok(Json(response))
}

/// Run the pipeline off the async executor.
async fn report_response(
    bytes: Vec<u8>,
    file_name: Option<String>,
    config: DashboardConfig,
    selection: FilterSelection,
) -> ServerResult<ReportResponse> {
    let report = tokio::task::spawn_blocking(move || {
        build_report(&bytes, file_name.as_deref(), &config, &selection)
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(ReportResponse::from(report))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Only built-in dashboards are served; config files stay a CLI feature.
fn find_dashboard(name: &str) -> ServerResult<DashboardConfig> {
    DashboardConfig::preset(name).map_err(|e| ServerError::NotFound(e.to_string()))
}

// =============================================================================
// Error responses
// =============================================================================

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(e) => match e {
                PipelineError::FatalParse(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::MissingRequiredColumn { .. } => StatusCode::BAD_REQUEST,
                PipelineError::Config(ConfigError::UnknownDashboard(_)) => StatusCode::NOT_FOUND,
                PipelineError::Config(_) | PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        log_error(&message);
        (self.status(), Json(error_response(&message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;

    #[test]
    fn test_config_from_lookup() {
        let config = ServerConfig::from_lookup(|key| match key {
            "SHEETDASH_PORT" => Some("8080".into()),
            "SHEETDASH_MAX_UPLOAD_MB" => Some("2".into()),
            _ => None,
        });
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_config_defaults_on_bad_values() {
        let config = ServerConfig::from_lookup(|key| match key {
            "SHEETDASH_PORT" => Some("not-a-port".into()),
            _ => None,
        });
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.with_port(9000).port, 9000);
    }

    #[test]
    fn test_router_builds() {
        let _ = router(&ServerConfig::default());
    }

    #[test]
    fn test_error_status_codes() {
        let parse: ServerError = PipelineError::from(IngestError::EmptyInput).into();
        assert_eq!(parse.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let filter: ServerError = PipelineError::missing_column("Region", "filter").into();
        assert_eq!(filter.status(), StatusCode::BAD_REQUEST);

        let response = find_dashboard("payroll").unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_dashboards() {
        let Json(list) = list_dashboards().await;
        let names: Vec<&str> = list.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, presets::NAMES.to_vec());
    }

    #[tokio::test]
    async fn test_template_download() {
        let response = download_template(Path("hr".to_string())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/csv; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_report_response() {
        let csv = b"Region,Sales\nEast,10\nWest,5\n".to_vec();
        let selection = FilterSelection::new().allow("Region", ["East"]);
        let response = report_response(csv, Some("s.csv".into()), presets::sales(), selection)
            .await
            .unwrap();
        assert_eq!(response.report.kpi("Total Sales"), Some(10.0));
        assert_eq!(response.status, "warning");
    }

    #[tokio::test]
    async fn test_report_response_fatal_parse() {
        let err = report_response(Vec::new(), None, presets::hr(), FilterSelection::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
