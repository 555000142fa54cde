//! Atom Build REST Service
//!
//! Exposes the build core as a REST API for agent and UI transports.
//!
//! ## Endpoints
//!
//! - `GET  /api/games` - List games with active build summaries
//! - `POST /api/games` - Create a game
//! - `GET  /api/games/:name` - Get one game
//! - `GET  /api/games/:name/atoms` - Code structure (no bodies), `?type=` filter
//! - `PUT  /api/games/:name/atoms` - Upsert an atom
//! - `POST /api/games/:name/atoms/read` - Read full atom records
//! - `POST /api/games/:name/atoms/search` - Semantic search
//! - `DELETE /api/games/:name/atoms/:atom` - Delete an atom
//! - `POST /api/games/:name/build` - Run the build pipeline
//! - `GET  /api/games/:name/builds` - List builds, newest first
//! - `POST /api/games/:name/rollback` - Roll back to a prior build
//! - `POST /api/rebuild` - Rebuild trigger transport (raw game id)
//! - `GET  /api/registry/externals` - List the external registry
//! - `GET/POST /api/games/:name/externals` - Installed externals / install
//! - `POST /api/games/:name/externals/read` - External detail with API surface
//! - `DELETE /api/games/:name/externals/:external` - Uninstall
//! - `GET  /health` - Detailed service health check
//! - `GET  /health/live` - Liveness probe
//! - `GET  /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::metrics_middleware;
pub use routes::{create_router, AppState, ErrorResponse};
pub use state::ServiceState;
