use crate::dataset::DatasetName;
use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::reconcile::Reconciler;
use crate::storage::Storage;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderValue, Method},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub const MAPPING_COMPLETE: &str = "Postal code mapping complete";
pub const HELP_PLACEHOLDER: &str = "Placeholder";

/// Shared handles every request works with.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub primary: DatasetName,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, primary: DatasetName, mapping: DatasetName) -> Self {
        let reconciler = Arc::new(Reconciler::new(storage.clone(), primary.clone(), mapping));
        Self {
            storage,
            primary,
            reconciler,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CsvQuery {
    /// Dataset identifier inside the data directory, e.g. `data` or `data.csv`.
    #[serde(rename = "csvFilePath")]
    pub csv_file_path: String,
}

fn failed(route: &'static str, err: ServiceError) -> ServiceError {
    metrics::http::request_error(route, err.status_code().as_u16());
    err
}

/// Pretty JSON with a 4-space indent, the layout `/data` clients expect.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| ServiceError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Primary dataset, returned as a JSON string holding the encoded document.
async fn primary_data(State(state): State<AppState>) -> Result<Json<String>> {
    const ROUTE: &str = "/data";
    metrics::http::request(ROUTE);

    let table = state.storage.load(&state.primary).await.map_err(|e| failed(ROUTE, e))?;
    metrics::http::rows_served(ROUTE, table.len());
    let encoded = to_pretty_json(&table.to_body()).map_err(|e| failed(ROUTE, e))?;
    Ok(Json(encoded))
}

/// Any dataset in the data directory, returned as a `{"data": [...]}` object.
async fn dataset(
    State(state): State<AppState>,
    query: std::result::Result<Query<CsvQuery>, QueryRejection>,
) -> Result<Response> {
    const ROUTE: &str = "/csv";
    metrics::http::request(ROUTE);

    let Query(query) = query.map_err(|e| failed(ROUTE, ServiceError::InvalidQuery(e.body_text())))?;

    let name = DatasetName::parse(&query.csv_file_path).map_err(|e| failed(ROUTE, e))?;
    let table = state.storage.load(&name).await.map_err(|e| failed(ROUTE, e))?;
    metrics::http::rows_served(ROUTE, table.len());
    Ok(Json(table.to_body()).into_response())
}

async fn postal_code_mapper(State(state): State<AppState>) -> Result<Json<&'static str>> {
    const ROUTE: &str = "/postalCodeMapper";
    metrics::http::request(ROUTE);

    state.reconciler.run().await.map_err(|e| failed(ROUTE, e))?;
    Ok(Json(MAPPING_COMPLETE))
}

async fn help() -> Json<&'static str> {
    metrics::http::request("/help");
    Json(HELP_PLACEHOLDER)
}

/// GET-only CORS restricted to `allowed_origins`.
pub fn cors_layer(allowed_origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET])
        .allow_credentials(true)
        .allow_headers(AllowHeaders::mirror_request())
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState, allowed_origins: Vec<HeaderValue>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/data", get(primary_data))
        .route("/csv", get(dataset))
        .route("/postalCodeMapper", get(postal_code_mapper))
        .route("/help", get(help))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
}

/// Start the HTTP server on `addr`; returns after Ctrl-C.
pub async fn start_server(
    state: AppState,
    allowed_origins: Vec<HeaderValue>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let app = create_server(state, allowed_origins);

    info!("HTTP server running on http://{addr}");
    info!("Health check: http://{addr}/health");

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
