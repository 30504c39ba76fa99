//! Postgres connection pool setup.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a connection pool for the given database URL.
///
/// The pool size is intentionally small and fixed: this subsystem's
/// query volume is dominated by the Scheduler's admission limit, not by
/// concurrent HTTP requests.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}
