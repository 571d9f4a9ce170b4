//! HTTP Server for the datamend API.
//!
//! Stateless: the configuration document is re-read on every request and
//! every validation/export request carries its own rows and mapping.
//!
//! # API Endpoints
//!
//! | Method | Path                  | Description                            |
//! |--------|-----------------------|----------------------------------------|
//! | GET    | `/health`             | Health check                           |
//! | GET    | `/api/entities`       | Export configuration                   |
//! | PUT    | `/api/entities`       | Replace the export configuration       |
//! | POST   | `/api/upload`         | Upload CSV, get headers + rows         |
//! | POST   | `/api/mapping/auto`   | Deterministic name-based mapping       |
//! | POST   | `/api/mapping/suggest`| AI mapping suggestions                 |
//! | POST   | `/api/validate`       | Validate rows against an entity        |
//! | POST   | `/api/export/csv`     | Download the payload as CSV            |
//! | POST   | `/api/export/submit`  | POST the payload to the target API     |
//! | GET    | `/api/logs`           | SSE stream for real-time logs          |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, log_info_indent, LOG_BROADCASTER};
use super::types::{
    blocked_response, ConfigResponse, ExportRequest, MappingRequest, MappingResponse, SubmitResponse,
    UploadResponse, ValidateResponse,
};
use crate::ai::AiClient;
use crate::config::{self, ConfigStore, Settings};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::export::{self, ApiExporter};
use crate::mapping::{auto_map, FieldMapping};
use crate::models::{ExportConfig, TargetEntitySpec, TargetRecord};
use crate::parser;
use crate::transform::prepare_export;
use crate::validation::{validate_dataset, ValidationOptions};

/// Shared, read-only server settings
#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self { settings: Arc::new(settings) }
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::open(&self.settings.config_path)
    }

    fn entity(&self, id: &str) -> ServerResult<(ExportConfig, TargetEntitySpec)> {
        let store = self.store();
        let entity = store.entity(id)?.clone();
        Ok((store.config().clone(), entity))
    }
}

/// Build the application router
pub fn router(settings: Settings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/entities", get(get_entities).put(put_entities))
        .route("/api/upload", post(upload_csv))
        .route("/api/mapping/auto", post(mapping_auto))
        .route("/api/mapping/suggest", post(mapping_suggest))
        .route("/api/validate", post(validate))
        .route("/api/export/csv", post(export_csv))
        .route("/api/export/submit", post(export_submit))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(AppState::new(settings))
}

/// Start the HTTP server
pub async fn start_server(port: u16, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = settings.config_path.clone();
    let app = router(settings);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, config = %config_path.display(), "datamend server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "datamend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // Lagged receivers just skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn get_entities(State(state): State<AppState>) -> Json<ConfigResponse> {
    let store = state.store();
    let warnings = config::lint(store.config());
    Json(ConfigResponse::new(store.config(), store.notice().map(String::from), warnings))
}

async fn put_entities(State(state): State<AppState>, Json(body): Json<Value>) -> ServerResult<Json<ConfigResponse>> {
    let next = config::config_from_value(body)?;
    let mut store = state.store();
    let warnings = store.replace(next)?;

    log_info(format!("Export configuration saved ({} entities)", store.entities().len()));
    Ok(Json(ConfigResponse::new(store.config(), None, warnings)))
}

/// Upload CSV endpoint
async fn upload_csv(mut multipart: Multipart) -> ServerResult<Json<UploadResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".to_string()))?;
    let upload_id = Uuid::new_v4().to_string();

    log_info(format!(
        "Upload {}: {} ({} bytes)",
        upload_id,
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let parsed = parser::parse_bytes_auto(&bytes)?;
    log_info_indent(
        format!(
            "{} rows, {} columns (encoding {}, delimiter '{}')",
            parsed.dataset.len(),
            parsed.dataset.headers.len(),
            parsed.encoding,
            parsed.delimiter
        ),
        1,
    );

    Ok(Json(UploadResponse::new(upload_id, file_name, parsed)))
}

async fn mapping_auto(State(state): State<AppState>, Json(req): Json<MappingRequest>) -> ServerResult<Json<MappingResponse>> {
    let (_, entity) = state.entity(&req.entity_id)?;
    let mapping = auto_map(&req.headers, &entity.fields);
    Ok(Json(mapping_response(&entity, mapping, Vec::new())))
}

async fn mapping_suggest(
    State(state): State<AppState>,
    Json(req): Json<MappingRequest>,
) -> ServerResult<Json<MappingResponse>> {
    let (_, entity) = state.entity(&req.entity_id)?;

    let client = AiClient::from_env()?;
    let suggestions = client.suggest_mapping(&req.headers, &entity.fields).await?;
    let mapping = FieldMapping::from_suggestions(
        &suggestions,
        &entity.fields,
        &req.headers,
        req.min_confidence.unwrap_or(0),
    );

    Ok(Json(mapping_response(&entity, mapping, suggestions)))
}

fn mapping_response(
    entity: &TargetEntitySpec,
    mapping: FieldMapping,
    suggestions: Vec<crate::models::MappingSuggestion>,
) -> MappingResponse {
    MappingResponse {
        entity_id: entity.id.clone(),
        mapped_count: mapping.mapped_count(),
        missing_required: mapping
            .missing_required(&entity.fields)
            .into_iter()
            .map(String::from)
            .collect(),
        mapping,
        suggestions,
    }
}

async fn validate(State(state): State<AppState>, Json(req): Json<ExportRequest>) -> ServerResult<Json<ValidateResponse>> {
    let (_, entity) = state.entity(&req.entity_id)?;
    let dataset = req.dataset();
    let mapping = req.mapping.checked(&entity.fields, &dataset.headers)?;

    let options = ValidationOptions { max_errors: req.max_errors.unwrap_or(state.settings.max_errors) };
    let report = validate_dataset(&dataset.rows, &entity.fields, &mapping, &options);

    Ok(Json(ValidateResponse::new(&entity.id, report)))
}

/// A payload that passed validation, or the response explaining why not.
struct Prepared {
    config: ExportConfig,
    entity: TargetEntitySpec,
    records: Vec<TargetRecord>,
}

fn prepare(state: &AppState, req: &ExportRequest) -> ServerResult<Result<Prepared, Response>> {
    let (config, entity) = state.entity(&req.entity_id)?;
    let dataset = req.dataset();
    if dataset.is_empty() {
        return Err(PipelineError::EmptyInput.into());
    }
    let mapping = req.mapping.checked(&entity.fields, &dataset.headers)?;
    let options = ValidationOptions { max_errors: req.max_errors.unwrap_or(state.settings.max_errors) };

    Ok(match prepare_export(&dataset, &entity, &mapping, &options) {
        Ok(records) => Ok(Prepared { config, entity, records }),
        Err(report) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(blocked_response(&entity.id, report)),
        )
            .into_response()),
    })
}

async fn export_csv(State(state): State<AppState>, Json(req): Json<ExportRequest>) -> ServerResult<Response> {
    let prepared = match prepare(&state, &req)? {
        Ok(prepared) => prepared,
        Err(blocked) => return Ok(blocked),
    };

    let csv = export::to_csv(&prepared.records, &prepared.entity.fields)?;
    let disposition = format!("attachment; filename=\"{}.csv\"", prepared.entity.id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

async fn export_submit(State(state): State<AppState>, Json(req): Json<ExportRequest>) -> ServerResult<Response> {
    let prepared = match prepare(&state, &req)? {
        Ok(prepared) => prepared,
        Err(blocked) => return Ok(blocked),
    };

    let exporter = ApiExporter::new(prepared.config.base_url.clone())
        .with_token(state.settings.api_token.clone())
        .with_dry_run(state.settings.dry_run);
    let receipt = exporter.submit(&prepared.entity, &prepared.records).await?;

    Ok(Json(SubmitResponse { entity_id: prepared.entity.id, receipt }).into_response())
}
