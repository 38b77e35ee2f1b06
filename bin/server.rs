// Fluxo Gráfico - Web Server
// Upload a workbook, pick sheets, get daily/weekly charts and tables

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use fluxo_grafico::{
    analyze_selection, analyze_sheet, content_hash, AggregateOptions, FormatError, Selection,
    ServerConfig, SheetReport, SpreadsheetLoader, UserInputError, WeekGrouping, Workbook,
    WorkbookCache, XlsxLoader,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    cache: Arc<Mutex<WorkbookCache>>,
    loader: Arc<XlsxLoader>,
    options: AggregateOptions,
}

impl AppState {
    fn new(options: AggregateOptions) -> Self {
        Self {
            cache: Arc::new(Mutex::new(WorkbookCache::new())),
            loader: Arc::new(XlsxLoader::new()),
            options,
        }
    }

    /// The cache is only read or extended, so a poisoned lock still holds
    /// consistent entries.
    fn cache(&self) -> MutexGuard<'_, WorkbookCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn workbook(&self, id: &str) -> Option<Arc<Workbook>> {
        self.cache().get(id)
    }

    /// Parse outside the lock; it is taken only to look up and to insert.
    fn load(&self, bytes: &[u8]) -> Result<(String, Arc<Workbook>), FormatError> {
        let hash = content_hash(bytes);
        if let Some(workbook) = self.workbook(&hash) {
            return Ok((hash, workbook));
        }

        let parsed = self.loader.load(bytes)?;
        let workbook = self.cache().insert(hash.clone(), parsed);
        Ok((hash, workbook))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
            warning: None,
        }
    }

    fn warning(data: T, warning: String) -> Self {
        Self {
            success: true,
            data,
            error: None,
            warning: Some(warning),
        }
    }
}

impl ApiResponse<()> {
    fn err(error: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(error),
            warning: None,
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::err(message))).into_response()
}

fn not_found(id: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("workbook '{}' not found", id))
}

/// Workbook summary response
#[derive(Serialize)]
struct WorkbookResponse {
    id: String,
    sheets: Vec<String>,
}

#[derive(Deserialize)]
struct AnalysisRequest {
    #[serde(default)]
    sheets: Vec<String>,
    #[serde(default)]
    week_grouping: Option<WeekGrouping>,
    #[serde(default)]
    day_first: Option<bool>,
}

impl AnalysisRequest {
    fn options(&self, defaults: &AggregateOptions) -> AggregateOptions {
        let mut options = defaults.clone();
        if let Some(grouping) = self.week_grouping {
            options.week_grouping = grouping;
        }
        if let Some(day_first) = self.day_first {
            options.day_first = day_first;
        }
        options
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/workbooks - Upload raw .xlsx bytes
async fn upload_workbook(State(state): State<AppState>, body: Bytes) -> Response {
    match state.load(&body) {
        Ok((id, workbook)) => {
            info!(id = %id, sheets = workbook.sheet_names.len(), "workbook uploaded");
            let response = WorkbookResponse {
                id,
                sheets: workbook.sheet_names.clone(),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            warn!(error = %e, "upload rejected");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

/// GET /api/workbooks/:id - Sheet names of an uploaded workbook
async fn get_workbook(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.workbook(&id) {
        Some(workbook) => {
            let response = WorkbookResponse {
                id,
                sheets: workbook.sheet_names.clone(),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        None => not_found(&id),
    }
}

/// POST /api/workbooks/:id/analysis - Analyze the selected sheets
async fn analyze_workbook(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AnalysisRequest>,
) -> Response {
    let Some(workbook) = state.workbook(&id) else {
        return not_found(&id);
    };

    let options = request.options(&state.options);
    let selection = Selection::new(request.sheets);

    match analyze_selection(&workbook, &selection, &options) {
        Ok(reports) => (StatusCode::OK, Json(ApiResponse::ok(reports))).into_response(),
        Err(e) => user_input_response(e),
    }
}

/// GET /api/workbooks/:id/sheets/:name - Analyze a single sheet
async fn get_sheet_report(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Response {
    let Some(workbook) = state.workbook(&id) else {
        return not_found(&id);
    };

    // Path already percent-decodes the sheet name
    match analyze_sheet(&workbook, &name, &state.options) {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::ok(report))).into_response(),
        Err(e) => user_input_response(e),
    }
}

fn user_input_response(e: UserInputError) -> Response {
    if e.is_warning() {
        let empty: Vec<SheetReport> = Vec::new();
        (StatusCode::OK, Json(ApiResponse::warning(empty, e.to_string()))).into_response()
    } else {
        error_response(StatusCode::BAD_REQUEST, e.to_string())
    }
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

fn app(state: AppState, max_upload_bytes: usize) -> Router {
    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/workbooks", post(upload_workbook))
        .route("/workbooks/:id", get(get_workbook))
        .route("/workbooks/:id/analysis", post(analyze_workbook))
        .route("/workbooks/:id/sheets/:name", get(get_sheet_report))
        .with_state(state);

    // Build main router
    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🌐 Fluxo Gráfico - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = ServerConfig::from_env()?;
    let state = AppState::new(config.aggregate.clone());
    let router = app(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    println!("\n🚀 Server running on http://{}", config.addr);
    println!("   API: http://{}/api/health", config.addr);
    println!("   UI:  http://{}", config.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use rust_xlsxwriter::Workbook as XlsxWriter;
    use serde_json::Value;
    use tower::ServiceExt;

    fn sample_xlsx() -> Vec<u8> {
        let mut writer = XlsxWriter::new();
        let rows = [
            ("2024-01-01", 100.0, 40.0),
            ("2024-01-01", 50.0, 10.0),
            ("2024-01-08", 20.0, 5.0),
        ];

        let sheet = writer.add_worksheet();
        sheet.set_name("Janeiro").unwrap();
        for (col, title) in ["Data", "Receita", "Despesa"].iter().enumerate() {
            sheet.write_string(0, col as u16, *title).unwrap();
        }
        for (i, (date, revenue, expense)) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, *date).unwrap();
            sheet.write_number(row, 1, *revenue).unwrap();
            sheet.write_number(row, 2, *expense).unwrap();
        }

        let sheet = writer.add_worksheet();
        sheet.set_name("Fevereiro").unwrap();
        sheet.write_string(0, 0, "Data").unwrap();

        writer.save_to_buffer().unwrap()
    }

    fn test_app() -> Router {
        app(AppState::new(AggregateOptions::default()), 1024 * 1024)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn upload(router: &Router) -> String {
        let request = Request::post("/api/workbooks")
            .body(Body::from(sample_xlsx()))
            .unwrap();
        let (status, json) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        json["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let router = test_app();
        let (status, json) = send(&router, Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"], "OK");
    }

    #[tokio::test]
    async fn test_upload_lists_sheets() {
        let router = test_app();
        let id = upload(&router).await;

        let uri = format!("/api/workbooks/{}", id);
        let (status, json) = send(&router, Request::get(uri).body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["sheets"], serde_json::json!(["Janeiro", "Fevereiro"]));
        assert_eq!(id, fluxo_grafico::content_hash(&sample_xlsx()));
    }

    #[tokio::test]
    async fn test_upload_rejects_garbage() {
        let router = test_app();
        let request = Request::post("/api/workbooks")
            .body(Body::from("not a workbook"))
            .unwrap();

        let (status, json) = send(&router, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["success"], false);
    }

    #[test]
    fn test_state_load_caches_only_parsed_workbooks() {
        let state = AppState::new(AggregateOptions::default());

        assert!(state.load(b"not a workbook").is_err());
        assert!(state.cache().is_empty());

        let bytes = sample_xlsx();
        let (id, first) = state.load(&bytes).unwrap();
        let (_, second) = state.load(&bytes).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.cache().len(), 1);
        assert!(state.workbook(&id).is_some());
    }

    #[tokio::test]
    async fn test_sheet_name_decoded_once() {
        let mut writer = XlsxWriter::new();
        let sheet = writer.add_worksheet();
        sheet.set_name("Caixa %41").unwrap();
        for (col, title) in ["Data", "Receita", "Despesa"].iter().enumerate() {
            sheet.write_string(0, col as u16, *title).unwrap();
        }
        sheet.write_string(1, 0, "2024-01-01").unwrap();
        sheet.write_number(1, 1, 7.0).unwrap();
        let bytes = writer.save_to_buffer().unwrap();

        let router = test_app();
        let request = Request::post("/api/workbooks").body(Body::from(bytes)).unwrap();
        let (_, json) = send(&router, request).await;
        let id = json["data"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/workbooks/{}/sheets/Caixa%20%2541", id);
        let (status, json) = send(&router, Request::get(uri).body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["sheet"], "Caixa %41");
        assert_eq!(json["data"]["totals"]["revenue"], 7.0);
    }

    #[tokio::test]
    async fn test_analysis_round_trip() {
        let router = test_app();
        let id = upload(&router).await;

        let uri = format!("/api/workbooks/{}/analysis", id);
        let (status, json) = send(
            &router,
            json_post(&uri, serde_json::json!({ "sheets": ["Janeiro", "Fevereiro"] })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let reports = json["data"].as_array().unwrap();
        assert_eq!(reports[0]["status"], "ready");
        assert_eq!(reports[0]["weekly"][0]["label"], "Semana 1");
        assert_eq!(reports[0]["weekly"][0]["revenue"], 150.0);
        assert_eq!(reports[0]["daily_chart"]["title"], "Receita e Despesa Diária - Janeiro");
        assert_eq!(reports[1]["status"], "failed");
    }

    #[tokio::test]
    async fn test_empty_selection_warns() {
        let router = test_app();
        let id = upload(&router).await;

        let uri = format!("/api/workbooks/{}/analysis", id);
        let (status, json) = send(&router, json_post(&uri, serde_json::json!({ "sheets": [] }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["warning"], "Por favor, selecione ao menos um mês para visualizar.");
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unknown_sheet_and_workbook() {
        let router = test_app();
        let id = upload(&router).await;

        let uri = format!("/api/workbooks/{}/analysis", id);
        let (status, _) = send(&router, json_post(&uri, serde_json::json!({ "sheets": ["Maio"] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            Request::get("/api/workbooks/deadbeef").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_single_sheet_report() {
        let router = test_app();
        let id = upload(&router).await;

        let uri = format!("/api/workbooks/{}/sheets/Janeiro", id);
        let (status, json) = send(&router, Request::get(uri).body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["sheet"], "Janeiro");
        assert_eq!(json["data"]["totals"]["revenue"], 170.0);
    }
}
