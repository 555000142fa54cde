//! Axum routes for the atom build service.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::atoms::UpsertAtomInput;
use crate::error::KernelError;
use crate::pipeline::BuildOutcome;
use crate::rollback::RollbackOutcome;
use crate::store::{AtomStore, PostgresAtomStore};
use crate::types::{
    AtomFull, AtomName, AtomSummary, AtomType, BuildId, BuildSummary, ExternalDetail, Game,
    GameId, InstalledExternal, RegistryEntry, SearchHit,
};

use super::state::ServiceState;

/// Type alias for the service state with PostgresAtomStore.
pub type AppState = ServiceState<PostgresAtomStore>;

/// Handler result: either a JSON body or a structured error.
type HandlerResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    /// Game name; used in artifact paths.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// A game joined with its active build summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameWithBuild {
    /// The game record.
    #[serde(flatten)]
    pub game: Game,
    /// Summary of the active build, when one exists.
    pub active_build: Option<BuildSummary>,
}

/// Request to read full atom records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAtomsRequest {
    /// Atom names to read.
    pub names: Vec<String>,
}

/// Request to search atoms by meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchAtomsRequest {
    /// Natural-language query.
    pub query: String,
    /// Maximum hits (default 5).
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    5
}

/// Request body for the rebuild trigger transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildRequest {
    /// Game to rebuild.
    pub game_id: GameId,
}

/// Request to roll a game back to a prior build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    /// Target build id.
    pub build_id: BuildId,
}

/// Request to install an external library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallExternalRequest {
    /// Registry name of the library.
    pub name: String,
}

/// Request to read external library details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadExternalsRequest {
    /// Registry names to read.
    pub names: Vec<String>,
}

/// Query parameters for the structure listing.
#[derive(Debug, Clone, Deserialize)]
pub struct StructureQuery {
    /// Optional atom type filter.
    #[serde(rename = "type")]
    pub type_filter: Option<String>,
}

/// Query parameters for the builds listing.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildsQuery {
    /// Maximum builds to return (default 20).
    pub limit: Option<usize>,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded".
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
}

/// Database health information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealth {
    /// Whether the database answered a probe query.
    pub connected: bool,
    /// Current pool size.
    pub pool_size: u32,
    /// Idle connections.
    pub pool_idle: usize,
    /// Maximum pool size.
    pub pool_max: u32,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always "alive".
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the service can accept traffic.
    pub ready: bool,
    /// Whether the database is reachable.
    pub database: bool,
    /// Optional detail.
    pub details: Option<String>,
}

/// Structured error response with correlation ID for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Correlation ID for request tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            correlation_id: None,
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        tracing::warn!(
            code = %self.code,
            error = %self.error,
            correlation_id = ?self.correlation_id,
            "Request error"
        );
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Map a kernel error to a transport status + structured body.
fn error_response(err: KernelError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        KernelError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        KernelError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        KernelError::Cycle(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CYCLE"),
        KernelError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE"),
        KernelError::Embedding(_) => (StatusCode::BAD_GATEWAY, "EMBEDDING"),
        KernelError::Blob(_) => (StatusCode::BAD_GATEWAY, "BLOB"),
    };
    tracing::warn!(code = code, error = %err, "request failed");
    (status, Json(ErrorResponse::new(code, err.to_string())))
}

/// Resolve a game by name or fail with 404.
async fn resolve_game(
    state: &AppState,
    name: &str,
) -> Result<Game, (StatusCode, Json<ErrorResponse>)> {
    match state.store.get_game_by_name(name).await {
        Ok(Some(game)) => Ok(game),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("NOT_FOUND", format!("Game not found: \"{name}\""))),
        )),
        Err(err) => Err(error_response(err.into())),
    }
}

async fn with_active_build(
    state: &AppState,
    game: Game,
) -> Result<GameWithBuild, (StatusCode, Json<ErrorResponse>)> {
    let active_build = match game.active_build_id {
        Some(build_id) => state
            .store
            .get_build(game.id, build_id)
            .await
            .map_err(|e| error_response(e.into()))?
            .map(|record| BuildSummary {
                id: record.id,
                status: record.status,
                bundle_url: record.bundle_url,
                atom_count: record.atom_count,
                error_message: record.error_message,
                created_at: record.created_at,
            }),
        None => None,
    };
    Ok(GameWithBuild { game, active_build })
}

// ============================================================================
// Game Handlers
// ============================================================================

/// Create a new game.
async fn create_game_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateGameRequest>,
) -> HandlerResult<Game> {
    let game = state
        .store
        .create_game(&request.name, request.description.as_deref())
        .await
        .map_err(|e| error_response(e.into()))?;
    tracing::info!(name = %game.name, id = %game.id, "game created");
    Ok(Json(game))
}

/// List all games with their active build summaries.
async fn list_games_handler(
    State(state): State<Arc<AppState>>,
) -> HandlerResult<Vec<GameWithBuild>> {
    let games = state
        .store
        .list_games()
        .await
        .map_err(|e| error_response(e.into()))?;
    let mut out = Vec::with_capacity(games.len());
    for game in games {
        out.push(with_active_build(&state, game).await?);
    }
    Ok(Json(out))
}

/// Get a single game by name.
async fn get_game_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> HandlerResult<GameWithBuild> {
    let game = resolve_game(&state, &name).await?;
    Ok(Json(with_active_build(&state, game).await?))
}

// ============================================================================
// Atom Handlers
// ============================================================================

/// Get the code structure (atom map) for a game.
async fn list_structure_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<StructureQuery>,
) -> HandlerResult<Vec<AtomSummary>> {
    let game = resolve_game(&state, &name).await?;
    let type_filter = match query.type_filter.as_deref() {
        Some(s) => Some(AtomType::from_str(s).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("VALIDATION", format!("Unknown atom type: \"{s}\""))),
            )
        })?),
        None => None,
    };
    state
        .atom_service()
        .list_structure(game.id, type_filter)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Read full atom records.
async fn read_atoms_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<ReadAtomsRequest>,
) -> HandlerResult<Vec<AtomFull>> {
    let game = resolve_game(&state, &name).await?;
    // Malformed names cannot exist; partially-missing names are not an error.
    let names: Vec<AtomName> = request
        .names
        .into_iter()
        .filter_map(|n| AtomName::parse(n).ok())
        .collect();
    state
        .atom_service()
        .read_atoms(game.id, &names)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Create or update an atom.
async fn upsert_atom_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(input): Json<UpsertAtomInput>,
) -> HandlerResult<crate::atoms::UpsertReceipt> {
    let game = resolve_game(&state, &name).await?;
    state
        .atom_service()
        .upsert(game.id, input)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Delete an atom.
async fn delete_atom_handler(
    State(state): State<Arc<AppState>>,
    Path((name, atom)): Path<(String, String)>,
) -> HandlerResult<serde_json::Value> {
    let game = resolve_game(&state, &name).await?;
    let atom_name = AtomName::parse(atom).map_err(|e| error_response(e.into()))?;
    state
        .atom_service()
        .delete(game.id, &atom_name)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "deleted": atom_name })))
}

/// Semantic search for atoms.
async fn search_atoms_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<SearchAtomsRequest>,
) -> HandlerResult<Vec<SearchHit>> {
    let game = resolve_game(&state, &name).await?;
    state
        .atom_service()
        .search(game.id, &request.query, request.limit)
        .await
        .map(Json)
        .map_err(error_response)
}

// ============================================================================
// Build Handlers
// ============================================================================

/// Trigger a build for a game by name.
async fn build_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> HandlerResult<BuildOutcome> {
    let game = resolve_game(&state, &name).await?;
    state
        .pipeline()
        .run(game.id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Rebuild trigger transport entry point: accepts a raw game id.
async fn rebuild_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RebuildRequest>,
) -> HandlerResult<BuildOutcome> {
    state
        .pipeline()
        .run(request.game_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// List builds for a game, newest first.
async fn list_builds_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<BuildsQuery>,
) -> HandlerResult<Vec<BuildSummary>> {
    let game = resolve_game(&state, &name).await?;
    state
        .store
        .list_builds(game.id, query.limit.unwrap_or(20))
        .await
        .map(Json)
        .map_err(|e| error_response(e.into()))
}

/// Roll a game back to a prior build's snapshot.
async fn rollback_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<RollbackRequest>,
) -> HandlerResult<RollbackOutcome> {
    let game = resolve_game(&state, &name).await?;
    state
        .rollback_engine()
        .run(game.id, request.build_id)
        .await
        .map(Json)
        .map_err(error_response)
}

// ============================================================================
// External Library Handlers
// ============================================================================

/// List the curated external registry.
async fn list_registry_handler(
    State(state): State<Arc<AppState>>,
) -> HandlerResult<Vec<RegistryEntry>> {
    state
        .external_service()
        .list_registry()
        .await
        .map(Json)
        .map_err(error_response)
}

/// List externals installed into a game.
async fn installed_externals_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> HandlerResult<Vec<InstalledExternal>> {
    let game = resolve_game(&state, &name).await?;
    state
        .external_service()
        .installed(game.id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Install an external library into a game.
async fn install_external_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<InstallExternalRequest>,
) -> HandlerResult<InstalledExternal> {
    let game = resolve_game(&state, &name).await?;
    state
        .external_service()
        .install(game.id, &request.name)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Uninstall an external library from a game.
async fn uninstall_external_handler(
    State(state): State<Arc<AppState>>,
    Path((name, external)): Path<(String, String)>,
) -> HandlerResult<serde_json::Value> {
    let game = resolve_game(&state, &name).await?;
    state
        .external_service()
        .uninstall(game.id, &external)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "uninstalled": external })))
}

/// Read full detail for installed externals.
async fn read_externals_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<ReadExternalsRequest>,
) -> HandlerResult<Vec<ExternalDetail>> {
    let game = resolve_game(&state, &name).await?;
    state
        .external_service()
        .read(game.id, &request.names)
        .await
        .map(Json)
        .map_err(error_response)
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint (detailed).
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_healthy = state.store.is_healthy().await;
    let pool_stats = state.store.pool_stats();

    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: Some(DatabaseHealth {
            connected: db_healthy,
            pool_size: pool_stats.size,
            pool_idle: pool_stats.idle,
            pool_max: pool_stats.max,
        }),
    })
}

/// Liveness probe endpoint. Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint: 200 when the database is connected, 503
/// otherwise.
async fn readiness_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let db_healthy = state.store.is_healthy().await;

    if db_healthy {
        Ok(Json(ReadinessResponse {
            ready: true,
            database: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                database: false,
                details: Some("Database connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the atom build service.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Games
        .route("/api/games", get(list_games_handler))
        .route("/api/games", post(create_game_handler))
        .route("/api/games/:name", get(get_game_handler))
        // Atoms
        .route("/api/games/:name/atoms", get(list_structure_handler))
        .route("/api/games/:name/atoms", put(upsert_atom_handler))
        .route("/api/games/:name/atoms/read", post(read_atoms_handler))
        .route("/api/games/:name/atoms/search", post(search_atoms_handler))
        .route("/api/games/:name/atoms/:atom", delete(delete_atom_handler))
        // Builds
        .route("/api/games/:name/build", post(build_handler))
        .route("/api/games/:name/builds", get(list_builds_handler))
        .route("/api/games/:name/rollback", post(rollback_handler))
        .route("/api/rebuild", post(rebuild_handler))
        // Externals
        .route("/api/registry/externals", get(list_registry_handler))
        .route("/api/games/:name/externals", get(installed_externals_handler))
        .route("/api/games/:name/externals", post(install_external_handler))
        .route("/api/games/:name/externals/read", post(read_externals_handler))
        .route("/api/games/:name/externals/:external", delete(uninstall_external_handler))
        // Health checks
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}
