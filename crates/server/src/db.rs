use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

/// Create a PostgreSQL connection pool and run migrations.
/// Returns None if PG_USERNAME is not configured or the database is unreachable.
pub async fn init_pg_pool(config: &bsn_core::config::PostgresConfig) -> Option<PgPool> {
    if !config.is_configured() {
        warn!("PG_USERNAME not configured, using in-memory campaign store");
        return None;
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await;

    match pool {
        Ok(pool) => {
            info!("PostgreSQL connected: {}", config.host);
            match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(_) => {
                    info!("Database migrations applied successfully");
                    Some(pool)
                }
                Err(e) => {
                    warn!("Failed to run migrations: {}, using in-memory campaign store", e);
                    None
                }
            }
        }
        Err(e) => {
            warn!("Failed to connect to PostgreSQL: {}, using in-memory campaign store", e);
            None
        }
    }
}
