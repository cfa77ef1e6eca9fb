//! HTTP server for canvassing lookups.
//!
//! Exposes the access gate and the submission pipeline as JSON endpoints.
//! Drawing the form, table and map is left to the client, which renders the
//! returned `RenderModel`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use canvass::access::{AllowListCache, AllowListSource, GateState, SheetSource, StaticSource};
use canvass::config::{Config, ALLOWLIST_URL_ENV};
use canvass::dataset::load_parcels_csv;
use canvass::elasticsearch::EsClient;
use canvass::geocoder::{Geocoder, NominatimClient};
use canvass::search::{MemoryWarehouse, SearchPolicy, Warehouse};
use canvass::{handle_submission, RenderModel, SearchContext, Submission};

mod sessions;
use sessions::SessionStore;

const SHEET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Canvassing address lookup server")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Serve parcels from this CSV instead of Elasticsearch
    #[arg(long)]
    parcels_csv: Option<PathBuf>,

    /// Run without an allow-list, admitting every session
    #[arg(long)]
    no_gate: bool,
}

/// Application state shared across handlers
struct AppState {
    geocoder: Arc<dyn Geocoder>,
    warehouse: Arc<dyn Warehouse>,
    policy: SearchPolicy,
    state_code: String,
    /// `None` disables the access gate
    allowlist: Option<AllowListCache>,
    sessions: SessionStore,
}

impl AppState {
    fn context(&self) -> SearchContext<'_> {
        SearchContext {
            geocoder: self.geocoder.as_ref(),
            warehouse: self.warehouse.as_ref(),
            policy: &self.policy,
            state: &self.state_code,
        }
    }

    fn gate_enabled(&self) -> bool {
        self.allowlist.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Canvass Server");

    let warehouse: Arc<dyn Warehouse> = match &args.parcels_csv {
        Some(path) => {
            let load = load_parcels_csv(path)?;
            Arc::new(MemoryWarehouse::build(load.parcels))
        }
        None => {
            info!("Connecting to Elasticsearch at {}", config.elasticsearch.url);
            let es_client = EsClient::new(&config.elasticsearch.url, &config.elasticsearch.index)?;

            if !es_client.health_check().await? {
                anyhow::bail!("Elasticsearch cluster is not healthy");
            }

            let doc_count = es_client.doc_count().await?;
            info!(
                "Connected to index '{}' with {} parcels",
                config.elasticsearch.index, doc_count
            );
            Arc::new(es_client)
        }
    };

    let geocoder = NominatimClient::new(
        &config.geocoder.endpoint,
        &config.geocoder.user_agent,
        config.geocoder.min_interval(),
        config.geocoder.timeout(),
    )?;

    let allowlist = build_allowlist(&config, args.no_gate)?;

    let policy = config.search.to_policy()?;
    info!(
        "Search bound {}m, fallback {:?}, limit {}",
        policy.bound_m, policy.fallback_bound_m, policy.limit
    );

    let state = Arc::new(AppState {
        geocoder: Arc::new(geocoder),
        warehouse,
        policy,
        state_code: config.geocoder.state.clone(),
        allowlist,
        sessions: SessionStore::new(
            chrono::Duration::hours(12),
            config.server.max_sessions,
        ),
    });

    let app = router(state);

    info!("Starting server on {}", config.server.listen);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Allow-list cache from config. Missing configuration is an error unless
/// the gate was explicitly turned off.
fn build_allowlist(config: &Config, no_gate: bool) -> Result<Option<AllowListCache>> {
    if no_gate {
        warn!("Access gate disabled by --no-gate; every session is admitted");
        return Ok(None);
    }

    let Some(al) = config.allowlist.as_ref() else {
        anyhow::bail!(
            "No allow-list configured: set [allowlist] or {}, or pass --no-gate",
            ALLOWLIST_URL_ENV
        );
    };

    let source: Arc<dyn AllowListSource> = match &al.url {
        Some(url) => Arc::new(SheetSource::new(url, al.has_headers, SHEET_TIMEOUT)?),
        None => Arc::new(StaticSource::new(al.members.clone())),
    };
    Ok(Some(AllowListCache::new(source, al.ttl())))
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/sessions", post(create_session_handler))
        .route("/v1/sessions/{id}/admit", post(admit_handler))
        .route("/v1/canvass", post(canvass_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
    gate_enabled: bool,
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let healthy = state.warehouse.is_healthy().await;

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        backend: state.warehouse.name(),
        gate_enabled: state.gate_enabled(),
    })
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: Uuid,
    state: GateState,
}

/// Open a session
async fn create_session_handler(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let (session_id, gate_state) = state.sessions.create();
    debug!("Opened session {} ({} open)", session_id, state.sessions.len());

    Json(SessionResponse {
        session_id,
        state: if state.gate_enabled() {
            gate_state
        } else {
            GateState::Admitted
        },
    })
}

#[derive(Deserialize)]
struct AdmitRequest {
    identifier: String,
}

/// Check an identifier against the allow-list
async fn admit_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AdmitRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Some(cache) = state.allowlist.as_ref() else {
        return Ok(Json(SessionResponse {
            session_id,
            state: GateState::Admitted,
        }));
    };

    state
        .sessions
        .with_gate(&session_id, |gate| gate.begin())
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "unknown session"))?;

    match cache.snapshot().await {
        Ok(list) => {
            let identifier = request.identifier;
            let gate_state = state
                .sessions
                .with_gate(&session_id, move |gate| gate.resolve(identifier, &list))
                .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "unknown session"))?;

            info!("Session {} admission: {:?}", session_id, gate_state);
            Ok(Json(SessionResponse {
                session_id,
                state: gate_state,
            }))
        }
        Err(err) => {
            state.sessions.with_gate(&session_id, |gate| gate.abort());
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))
        }
    }
}

#[derive(Deserialize)]
struct CanvassRequest {
    session_id: Option<Uuid>,
    #[serde(flatten)]
    submission: Submission,
}

/// Geocode the submitted address and return nearby addresses
async fn canvass_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CanvassRequest>,
) -> Result<Response, ApiError> {
    if state.gate_enabled() {
        let admitted = request
            .session_id
            .and_then(|id| state.sessions.with_gate(&id, |gate| gate.is_admitted()))
            .unwrap_or(false);
        if !admitted {
            return Err(api_error(StatusCode::FORBIDDEN, "session is not admitted"));
        }
    }

    let model = handle_submission(&state.context(), request.submission).await;

    let status = match &model {
        RenderModel::Results { .. } | RenderModel::NoResults { .. } => StatusCode::OK,
        RenderModel::InputError { .. } => StatusCode::BAD_REQUEST,
        RenderModel::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };

    Ok((status, Json(model)).into_response())
}
