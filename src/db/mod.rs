//! Database layer for Trellis.
//!
//! Provides SQLite connection pooling and query modules for the project
//! hierarchy, the relation graph and derived-field definitions.

mod entities;
mod fields;
mod pool;
mod relations;

pub use entities::*;
pub use fields::*;
pub use pool::{create_pool_with_config, health_check, PoolConfig};
pub use relations::*;

use crate::Result;
use tracing::info;

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Initialize the database connection pool.
///
/// Creates parent directories if needed and configures SQLite for
/// concurrent access. In-memory paths get a single pinned connection.
pub async fn init_pool(path: &str) -> Result<DbPool> {
    let pool = create_pool_with_config(path, PoolConfig::for_path(path)).await?;

    info!("Database pool initialized: {}", path);

    Ok(pool)
}

/// Initialize the database schema.
///
/// Applies the complete schema from schema.sql. Uses IF NOT EXISTS
/// clauses so it's safe to run multiple times.
pub async fn initialize_schema(pool: &DbPool) -> Result<()> {
    let schema = include_str!("../../schema.sql");

    info!("Initializing database schema");

    // Execute schema SQL (contains multiple statements)
    for statement in schema.split(';') {
        // Strip comment lines, keeping only actual SQL
        let clean_stmt: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let clean_stmt = clean_stmt.trim();
        if clean_stmt.is_empty() {
            continue;
        }
        sqlx::query(clean_stmt).execute(pool).await?;
    }

    info!("Database schema initialized successfully");

    Ok(())
}

/// Open an in-memory database with the schema applied.
pub async fn init_memory() -> Result<DbPool> {
    let pool = init_pool(":memory:").await?;
    initialize_schema(&pool).await?;
    Ok(pool)
}
