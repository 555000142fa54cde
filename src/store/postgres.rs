//! PostgreSQL atom store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! Vector search relies on the pgvector extension; embeddings are bound as
//! text literals and cast with `::vector`, so no driver-side vector type is
//! needed.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    Atom, AtomName, AtomSnapshot, AtomType, BuildId, BuildRecord, BuildStatus, BuildSummary,
    DependencyEdge, ExternalDetail, Game, GameId, InstalledExternal, NewBuild, Port,
    RegistryEntry,
};

use super::{AtomStore, AtomUpsert, RestoredAtom};

/// Reference schema the store expects (pgvector extension required).
pub const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS games (
    id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name            TEXT NOT NULL UNIQUE,
    description     TEXT,
    active_build_id UUID,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS atoms (
    game_id     UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    type        TEXT NOT NULL,
    code        TEXT NOT NULL,
    description TEXT,
    inputs      JSONB NOT NULL DEFAULT '[]',
    outputs     JSONB NOT NULL DEFAULT '[]',
    version     INTEGER NOT NULL DEFAULT 1,
    embedding   vector(1536),
    PRIMARY KEY (game_id, name)
);

CREATE TABLE IF NOT EXISTS atom_dependencies (
    id         BIGSERIAL PRIMARY KEY,
    game_id    UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    atom_name  TEXT NOT NULL,
    depends_on TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS builds (
    id            UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    game_id       UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    status        TEXT NOT NULL,
    bundle_url    TEXT,
    atom_count    INTEGER,
    error_message TEXT,
    build_log     JSONB NOT NULL DEFAULT '[]',
    atom_snapshot JSONB,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS external_registry (
    id             UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name           TEXT NOT NULL UNIQUE,
    display_name   TEXT NOT NULL,
    package_name   TEXT NOT NULL,
    version        TEXT NOT NULL,
    cdn_url        TEXT NOT NULL,
    global_name    TEXT NOT NULL,
    description    TEXT,
    api_surface    TEXT NOT NULL DEFAULT '',
    load_type      TEXT NOT NULL DEFAULT 'script',
    module_imports JSONB
);

CREATE TABLE IF NOT EXISTS game_externals (
    game_id      UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    registry_id  UUID NOT NULL REFERENCES external_registry(id) ON DELETE CASCADE,
    installed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (game_id, registry_id)
);
"#;

/// Configuration for PostgreSQL connection pool.
///
/// Production defaults balance concurrency with connection limits; timeouts
/// are aggressive to fail fast, and max lifetime forces periodic
/// reconnection.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/atomforge".to_string()),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            max_lifetime_secs: std::env::var("DB_MAX_LIFETIME_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// PostgreSQL atom store.
///
/// Uses connection pooling with production-tuned settings.
pub struct PostgresAtomStore {
    pool: PgPool,
}

impl PostgresAtomStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    fn parse_game_row(row: &PgRow) -> Result<Game, StoreError> {
        let id: Uuid = row.try_get("id").map_err(StoreError::from)?;
        let active_build_id: Option<Uuid> =
            row.try_get("active_build_id").map_err(StoreError::from)?;
        Ok(Game {
            id: GameId::new(id),
            name: row.try_get("name").map_err(StoreError::from)?,
            description: row.try_get("description").map_err(StoreError::from)?,
            active_build_id: active_build_id.map(BuildId::new),
            created_at: row.try_get("created_at").map_err(StoreError::from)?,
            updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
        })
    }

    fn parse_atom_row(row: &PgRow) -> Result<Atom, StoreError> {
        let name: String = row.try_get("name").map_err(StoreError::from)?;
        let type_str: String = row.try_get("type").map_err(StoreError::from)?;
        Ok(Atom {
            name: parse_name(&name)?,
            atom_type: parse_type(&type_str)?,
            code: row.try_get("code").map_err(StoreError::from)?,
            description: row.try_get("description").map_err(StoreError::from)?,
            inputs: ports_from_json(row.try_get("inputs").map_err(StoreError::from)?)?,
            outputs: ports_from_json(row.try_get("outputs").map_err(StoreError::from)?)?,
            version: row.try_get("version").map_err(StoreError::from)?,
        })
    }

    fn parse_build_row(row: &PgRow) -> Result<BuildRecord, StoreError> {
        let id: Uuid = row.try_get("id").map_err(StoreError::from)?;
        let game_id: Uuid = row.try_get("game_id").map_err(StoreError::from)?;
        let status_str: String = row.try_get("status").map_err(StoreError::from)?;
        let build_log: serde_json::Value = row.try_get("build_log").map_err(StoreError::from)?;
        let snapshot: Option<serde_json::Value> =
            row.try_get("atom_snapshot").map_err(StoreError::from)?;
        Ok(BuildRecord {
            id: BuildId::new(id),
            game_id: GameId::new(game_id),
            status: BuildStatus::from_str(&status_str)
                .ok_or_else(|| StoreError::Backend(format!("bad build status: {status_str}")))?,
            bundle_url: row.try_get("bundle_url").map_err(StoreError::from)?,
            atom_count: row
                .try_get::<Option<i32>, _>("atom_count")
                .map_err(StoreError::from)?
                .map(|n| n as u32),
            error_message: row.try_get("error_message").map_err(StoreError::from)?,
            build_log: serde_json::from_value(build_log)
                .map_err(|e| StoreError::Backend(format!("bad build_log: {e}")))?,
            atom_snapshot: snapshot
                .map(serde_json::from_value::<AtomSnapshot>)
                .transpose()
                .map_err(|e| StoreError::Backend(format!("bad atom_snapshot: {e}")))?,
            created_at: row.try_get("created_at").map_err(StoreError::from)?,
        })
    }

    fn parse_installed_row(row: &PgRow) -> Result<InstalledExternal, StoreError> {
        let module_imports: Option<serde_json::Value> =
            row.try_get("module_imports").map_err(StoreError::from)?;
        Ok(InstalledExternal {
            name: row.try_get("name").map_err(StoreError::from)?,
            display_name: row.try_get("display_name").map_err(StoreError::from)?,
            package_name: row.try_get("package_name").map_err(StoreError::from)?,
            version: row.try_get("version").map_err(StoreError::from)?,
            cdn_url: row.try_get("cdn_url").map_err(StoreError::from)?,
            global_name: row.try_get("global_name").map_err(StoreError::from)?,
            description: row.try_get("description").map_err(StoreError::from)?,
            load_type: row.try_get("load_type").map_err(StoreError::from)?,
            module_imports: module_imports
                .map(serde_json::from_value::<BTreeMap<String, String>>)
                .transpose()
                .map_err(|e| StoreError::Backend(format!("bad module_imports: {e}")))?,
            installed_at: row.try_get("installed_at").map_err(StoreError::from)?,
        })
    }

    fn parse_registry_row(row: &PgRow) -> Result<RegistryEntry, StoreError> {
        let id: Uuid = row.try_get("id").map_err(StoreError::from)?;
        Ok(RegistryEntry {
            id,
            name: row.try_get("name").map_err(StoreError::from)?,
            display_name: row.try_get("display_name").map_err(StoreError::from)?,
            package_name: row.try_get("package_name").map_err(StoreError::from)?,
            version: row.try_get("version").map_err(StoreError::from)?,
            cdn_url: row.try_get("cdn_url").map_err(StoreError::from)?,
            global_name: row.try_get("global_name").map_err(StoreError::from)?,
            description: row.try_get("description").map_err(StoreError::from)?,
        })
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

fn parse_name(name: &str) -> Result<AtomName, StoreError> {
    AtomName::parse(name).map_err(|e| StoreError::Backend(e.to_string()))
}

fn parse_type(s: &str) -> Result<AtomType, StoreError> {
    AtomType::from_str(s).ok_or_else(|| StoreError::Backend(format!("bad atom type: {s}")))
}

fn ports_from_json(value: serde_json::Value) -> Result<Vec<Port>, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Backend(format!("bad ports: {e}")))
}

fn ports_to_json(ports: &[Port]) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(ports).map_err(|e| StoreError::Backend(e.to_string()))
}

/// Render an embedding as a pgvector text literal: `[0.1,0.2,...]`.
fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[async_trait]
impl AtomStore for PostgresAtomStore {
    async fn create_game(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Game, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO games (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, active_build_id, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Self::parse_game_row(&row)
    }

    async fn get_game(&self, id: GameId) -> Result<Option<Game>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, active_build_id, created_at, updated_at
            FROM games
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_game_row).transpose()
    }

    async fn get_game_by_name(&self, name: &str) -> Result<Option<Game>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, active_build_id, created_at, updated_at
            FROM games
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_game_row).transpose()
    }

    async fn list_games(&self) -> Result<Vec<Game>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, active_build_id, created_at, updated_at
            FROM games
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_game_row).collect()
    }

    async fn set_active_build(&self, game: GameId, build: BuildId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE games SET active_build_id = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(game.as_uuid())
        .bind(build.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_atoms(
        &self,
        game: GameId,
        type_filter: Option<AtomType>,
    ) -> Result<Vec<Atom>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT name, type, code, description, inputs, outputs, version
            FROM atoms
            WHERE game_id = $1 AND ($2::text IS NULL OR type = $2)
            ORDER BY name
            "#,
        )
        .bind(game.as_uuid())
        .bind(type_filter.map(|t| t.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_atom_row).collect()
    }

    async fn get_atoms(&self, game: GameId, names: &[AtomName]) -> Result<Vec<Atom>, StoreError> {
        let name_strings: Vec<String> = names.iter().map(|n| n.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT name, type, code, description, inputs, outputs, version
            FROM atoms
            WHERE game_id = $1 AND name = ANY($2)
            ORDER BY name
            "#,
        )
        .bind(game.as_uuid())
        .bind(&name_strings)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_atom_row).collect()
    }

    async fn upsert_atom(&self, game: GameId, row: AtomUpsert) -> Result<Atom, StoreError> {
        let inputs = ports_to_json(&row.inputs)?;
        let outputs = ports_to_json(&row.outputs)?;
        let fetched = sqlx::query(
            r#"
            INSERT INTO atoms (game_id, name, type, code, description, inputs, outputs, version, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8::vector)
            ON CONFLICT (game_id, name) DO UPDATE SET
                type = EXCLUDED.type,
                code = EXCLUDED.code,
                description = EXCLUDED.description,
                inputs = EXCLUDED.inputs,
                outputs = EXCLUDED.outputs,
                version = atoms.version + 1,
                embedding = EXCLUDED.embedding
            RETURNING name, type, code, description, inputs, outputs, version
            "#,
        )
        .bind(game.as_uuid())
        .bind(row.name.as_str())
        .bind(row.atom_type.to_string())
        .bind(&row.code)
        .bind(&row.description)
        .bind(inputs)
        .bind(outputs)
        .bind(vector_literal(&row.embedding))
        .fetch_one(&self.pool)
        .await?;

        Self::parse_atom_row(&fetched)
    }

    async fn delete_atom(&self, game: GameId, name: &AtomName) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM atom_dependencies WHERE game_id = $1 AND atom_name = $2")
            .bind(game.as_uuid())
            .bind(name.as_str())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM atoms WHERE game_id = $1 AND name = $2")
            .bind(game.as_uuid())
            .bind(name.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_edges(&self, game: GameId) -> Result<Vec<DependencyEdge>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT atom_name, depends_on
            FROM atom_dependencies
            WHERE game_id = $1
            ORDER BY id
            "#,
        )
        .bind(game.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let dependent: String = row.try_get("atom_name")?;
                let depends_on: String = row.try_get("depends_on")?;
                Ok::<_, sqlx::Error>((dependent, depends_on))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(dependent, depends_on)| {
                Ok(DependencyEdge::new(
                    parse_name(&dependent)?,
                    parse_name(&depends_on)?,
                ))
            })
            .collect()
    }

    async fn edges_for(
        &self,
        game: GameId,
        names: &[AtomName],
    ) -> Result<Vec<DependencyEdge>, StoreError> {
        let name_strings: Vec<String> = names.iter().map(|n| n.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT atom_name, depends_on
            FROM atom_dependencies
            WHERE game_id = $1 AND atom_name = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(game.as_uuid())
        .bind(&name_strings)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let dependent: String = row.try_get("atom_name").map_err(StoreError::from)?;
                let depends_on: String = row.try_get("depends_on").map_err(StoreError::from)?;
                Ok(DependencyEdge::new(
                    parse_name(&dependent)?,
                    parse_name(&depends_on)?,
                ))
            })
            .collect()
    }

    async fn dependents_of(
        &self,
        game: GameId,
        name: &AtomName,
    ) -> Result<Vec<AtomName>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT atom_name
            FROM atom_dependencies
            WHERE game_id = $1 AND depends_on = $2 AND atom_name != $2
            ORDER BY atom_name
            "#,
        )
        .bind(game.as_uuid())
        .bind(name.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let dependent: String = row.try_get("atom_name").map_err(StoreError::from)?;
                parse_name(&dependent)
            })
            .collect()
    }

    async fn replace_edges(
        &self,
        game: GameId,
        dependent: &AtomName,
        depends_on: &[AtomName],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM atom_dependencies WHERE game_id = $1 AND atom_name = $2")
            .bind(game.as_uuid())
            .bind(dependent.as_str())
            .execute(&mut *tx)
            .await?;
        for target in depends_on {
            sqlx::query(
                "INSERT INTO atom_dependencies (game_id, atom_name, depends_on) VALUES ($1, $2, $3)",
            )
            .bind(game.as_uuid())
            .bind(dependent.as_str())
            .bind(target.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create_build(&self, game: GameId) -> Result<BuildId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO builds (game_id, status)
            VALUES ($1, 'building')
            RETURNING id
            "#,
        )
        .bind(game.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let id: Uuid = row.try_get("id")?;
        Ok(BuildId::new(id))
    }

    async fn attach_snapshot(
        &self,
        game: GameId,
        build: BuildId,
        snapshot: &AtomSnapshot,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(snapshot).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            UPDATE builds SET atom_snapshot = $3
            WHERE id = $2 AND game_id = $1
            "#,
        )
        .bind(game.as_uuid())
        .bind(build.as_uuid())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_build_success(
        &self,
        game: GameId,
        build: BuildId,
        atom_count: u32,
        build_log: &[String],
        bundle_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let log = serde_json::to_value(build_log).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            UPDATE builds
            SET status = 'success', atom_count = $3, build_log = $4, bundle_url = $5
            WHERE id = $2 AND game_id = $1
            "#,
        )
        .bind(game.as_uuid())
        .bind(build.as_uuid())
        .bind(atom_count as i32)
        .bind(log)
        .bind(bundle_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_build_error(
        &self,
        game: GameId,
        build: BuildId,
        message: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE builds SET status = 'error', error_message = $3
            WHERE id = $2 AND game_id = $1
            "#,
        )
        .bind(game.as_uuid())
        .bind(build.as_uuid())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_build(&self, game: GameId, build: NewBuild) -> Result<BuildId, StoreError> {
        let log =
            serde_json::to_value(&build.build_log).map_err(|e| StoreError::Backend(e.to_string()))?;
        let snapshot = build
            .atom_snapshot
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let row = sqlx::query(
            r#"
            INSERT INTO builds (game_id, status, atom_count, build_log, atom_snapshot)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(game.as_uuid())
        .bind(build.status.to_string())
        .bind(build.atom_count as i32)
        .bind(log)
        .bind(snapshot)
        .fetch_one(&self.pool)
        .await?;

        let id: Uuid = row.try_get("id")?;
        Ok(BuildId::new(id))
    }

    async fn get_build(
        &self,
        game: GameId,
        build: BuildId,
    ) -> Result<Option<BuildRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, game_id, status, bundle_url, atom_count, error_message,
                   build_log, atom_snapshot, created_at
            FROM builds
            WHERE id = $2 AND game_id = $1
            "#,
        )
        .bind(game.as_uuid())
        .bind(build.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_build_row).transpose()
    }

    async fn list_builds(
        &self,
        game: GameId,
        limit: usize,
    ) -> Result<Vec<BuildSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, bundle_url, atom_count, error_message, created_at
            FROM builds
            WHERE game_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(game.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").map_err(StoreError::from)?;
                let status_str: String = row.try_get("status").map_err(StoreError::from)?;
                Ok(BuildSummary {
                    id: BuildId::new(id),
                    status: BuildStatus::from_str(&status_str).ok_or_else(|| {
                        StoreError::Backend(format!("bad build status: {status_str}"))
                    })?,
                    bundle_url: row.try_get("bundle_url").map_err(StoreError::from)?,
                    atom_count: row
                        .try_get::<Option<i32>, _>("atom_count")
                        .map_err(StoreError::from)?
                        .map(|n| n as u32),
                    error_message: row.try_get("error_message").map_err(StoreError::from)?,
                    created_at: row.try_get("created_at").map_err(StoreError::from)?,
                })
            })
            .collect()
    }

    async fn restore_atoms(
        &self,
        game: GameId,
        atoms: &[RestoredAtom],
        edges: &[DependencyEdge],
    ) -> Result<(), StoreError> {
        // One transaction: either the whole restore lands or none of it.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM atom_dependencies WHERE game_id = $1")
            .bind(game.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM atoms WHERE game_id = $1")
            .bind(game.as_uuid())
            .execute(&mut *tx)
            .await?;

        for restored in atoms {
            let atom = &restored.atom;
            sqlx::query(
                r#"
                INSERT INTO atoms (game_id, name, type, code, description, inputs, outputs, version, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8::vector)
                "#,
            )
            .bind(game.as_uuid())
            .bind(atom.name.as_str())
            .bind(atom.atom_type.to_string())
            .bind(&atom.code)
            .bind(&atom.description)
            .bind(ports_to_json(&atom.inputs)?)
            .bind(ports_to_json(&atom.outputs)?)
            .bind(vector_literal(&restored.embedding))
            .execute(&mut *tx)
            .await?;
        }

        for edge in edges {
            sqlx::query(
                "INSERT INTO atom_dependencies (game_id, atom_name, depends_on) VALUES ($1, $2, $3)",
            )
            .bind(game.as_uuid())
            .bind(edge.dependent.as_str())
            .bind(edge.depends_on.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search_by_embedding(
        &self,
        game: GameId,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(Atom, f32)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT name, type, code, description, inputs, outputs, version,
                   1 - (embedding <=> $2::vector) AS similarity
            FROM atoms
            WHERE game_id = $1
              AND embedding IS NOT NULL
              AND 1 - (embedding <=> $2::vector) >= $3
            ORDER BY embedding <=> $2::vector, name
            LIMIT $4
            "#,
        )
        .bind(game.as_uuid())
        .bind(vector_literal(query))
        .bind(threshold as f64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let atom = Self::parse_atom_row(row)?;
                let similarity: f64 = row.try_get("similarity").map_err(StoreError::from)?;
                Ok((atom, similarity as f32))
            })
            .collect()
    }

    async fn list_registry(&self) -> Result<Vec<RegistryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, display_name, package_name, version, cdn_url, global_name, description
            FROM external_registry
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_registry_row).collect()
    }

    async fn get_registry_entry(&self, name: &str) -> Result<Option<RegistryEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, display_name, package_name, version, cdn_url, global_name, description
            FROM external_registry
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_registry_row).transpose()
    }

    async fn install_external(
        &self,
        game: GameId,
        registry_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO game_externals (game_id, registry_id)
            VALUES ($1, $2)
            ON CONFLICT (game_id, registry_id) DO NOTHING
            "#,
        )
        .bind(game.as_uuid())
        .bind(registry_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn uninstall_external(
        &self,
        game: GameId,
        registry_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM game_externals WHERE game_id = $1 AND registry_id = $2",
        )
        .bind(game.as_uuid())
        .bind(registry_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn installed_externals(
        &self,
        game: GameId,
    ) -> Result<Vec<InstalledExternal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.name, r.display_name, r.package_name, r.version, r.cdn_url,
                   r.global_name, r.description, r.load_type, r.module_imports,
                   ge.installed_at
            FROM game_externals ge
            JOIN external_registry r ON r.id = ge.registry_id
            WHERE ge.game_id = $1
            ORDER BY ge.installed_at
            "#,
        )
        .bind(game.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_installed_row).collect()
    }

    async fn read_externals(
        &self,
        game: GameId,
        names: &[String],
    ) -> Result<Vec<ExternalDetail>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.name, r.display_name, r.package_name, r.version, r.cdn_url,
                   r.global_name, r.description, r.api_surface, r.load_type,
                   r.module_imports, ge.installed_at
            FROM game_externals ge
            JOIN external_registry r ON r.id = ge.registry_id
            WHERE ge.game_id = $1 AND r.name = ANY($2)
            ORDER BY ge.installed_at
            "#,
        )
        .bind(game.as_uuid())
        .bind(names)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ExternalDetail {
                    external: Self::parse_installed_row(row)?,
                    api_surface: row.try_get("api_surface").map_err(StoreError::from)?,
                })
            })
            .collect()
    }
}
