use crate::config::DatabaseSettings;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub type DbPool = DatabaseConnection;

fn connect_options(settings: &DatabaseSettings) -> ConnectOptions {
    let mut opt = ConnectOptions::new(settings.url.clone());
    opt.max_connections(settings.max_connections)
        .min_connections(settings.min_connections.min(settings.max_connections))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
        .sqlx_logging(false);
    opt
}

/// Opens the connection pool described by `settings`.
pub async fn connect(settings: &DatabaseSettings) -> Result<DbPool, DbErr> {
    if settings.min_connections > settings.max_connections {
        warn!(
            min = settings.min_connections,
            max = settings.max_connections,
            "min_connections exceeds max_connections; clamping"
        );
    }

    let pool = Database::connect(connect_options(settings)).await?;
    gauge!("careflow_db_max_connections", settings.max_connections as f64);
    info!(
        backend = ?pool.get_database_backend(),
        max_connections = settings.max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Applies every pending migration.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbErr> {
    let started = Instant::now();
    crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| {
            error!(error = %e, "database migrations failed");
            e
        })?;
    info!(elapsed = ?started.elapsed(), "database migrations applied");
    Ok(())
}

/// Pings the database, recording latency and failures.
pub async fn check_connection(pool: &DbPool) -> Result<(), DbErr> {
    let started = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            let elapsed = started.elapsed();
            debug!(?elapsed, "database ping ok");
            gauge!("careflow_db_ping_ms", elapsed.as_secs_f64() * 1000.0);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "database ping failed");
            counter!("careflow_db_ping_failures_total", 1);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_clamp_min_connections() {
        let settings = DatabaseSettings {
            max_connections: 2,
            min_connections: 5,
            ..DatabaseSettings::default()
        };
        let opt = connect_options(&settings);
        assert_eq!(opt.get_max_connections(), Some(2));
        assert_eq!(opt.get_min_connections(), Some(2));
    }

    #[tokio::test]
    async fn migrated_memory_database_answers_pings() {
        let pool = connect(&DatabaseSettings::in_memory())
            .await
            .expect("in-memory sqlite");
        run_migrations(&pool).await.expect("migrations");
        assert!(check_connection(&pool).await.is_ok());
    }
}
