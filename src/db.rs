use crate::config::AppConfig;
use crate::errors::ServiceError;
use anyhow::Context;
use metrics::{counter, gauge, histogram};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend,
    IsolationLevel, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_dsn.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns a `ServiceError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("petcare_db.max_connections", config.max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt)
        .await
        .map_err(ServiceError::DatabaseError)
        .context("Database connection establishment failed")?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Opens a transaction for a multi-statement write.
///
/// PostgreSQL runs it at SERIALIZABLE. SQLite has no such setting, and a
/// deferred transaction that reads first cannot upgrade to a writer while
/// another connection holds the write lock; it fails with SQLITE_BUSY
/// without waiting. So on SQLite the first statement is a write that
/// matches no rows, which takes the lock (waiting out the busy timeout)
/// before anything is read.
pub async fn begin_serializable<C>(db: &C) -> Result<DatabaseTransaction, ServiceError>
where
    C: TransactionTrait + ConnectionTrait,
{
    let backend = db.get_database_backend();
    let isolation = match backend {
        DbBackend::Postgres => Some(IsolationLevel::Serializable),
        _ => None,
    };

    let transaction_id = Uuid::new_v4();
    debug!(transaction_id = %transaction_id, ?isolation, "Starting database transaction");
    counter!("petcare_db.transaction.started", 1);

    let txn = db.begin_with_config(isolation, None).await.map_err(|e| {
        error!(transaction_id = %transaction_id, error = %e, "Failed to open transaction");
        counter!("petcare_db.transaction.begin_failed", 1);
        ServiceError::DatabaseError(e)
    })?;

    if backend == DbBackend::Sqlite {
        txn.execute(Statement::from_string(
            DbBackend::Sqlite,
            SQLITE_TAKE_WRITE_LOCK,
        ))
        .await
        .map_err(|e| {
            warn!(transaction_id = %transaction_id, error = %e, "Could not take the SQLite write lock");
            counter!("petcare_db.transaction.lock_failed", 1);
            ServiceError::DatabaseError(e)
        })?;
    }

    Ok(txn)
}

const SQLITE_TAKE_WRITE_LOCK: &str = "UPDATE services SET id = id WHERE 1 = 0";

/// Bounds for re-running a transaction that lost a lock or serialization race.
#[derive(Debug, Clone)]
pub struct ConflictRetry {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(250),
        }
    }
}

/// Runs `operation` until it succeeds, fails for a reason other than a write
/// conflict, or runs out of attempts. Each attempt must open its own
/// transaction.
pub async fn retry_on_conflict<T, F, Fut>(
    label: &'static str,
    policy: &ConflictRetry,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Err(e) if e.is_write_conflict() && attempt < policy.max_attempts => {
                counter!("petcare_db.transaction.conflict_retry", 1, "operation" => label);
                warn!(operation = label, attempt, error = %e, "Write conflict, retrying in {:?}", delay);
                sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
            Err(e) => {
                if e.is_write_conflict() {
                    counter!("petcare_db.transaction.conflict_exhausted", 1, "operation" => label);
                    warn!(operation = label, attempts = attempt, "Giving up after repeated write conflicts");
                }
                return Err(e);
            }
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = label, attempts = attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
        }
    }
}

/// Commits a transaction, recording how long the commit took.
pub async fn commit(txn: DatabaseTransaction) -> Result<(), ServiceError> {
    let start = std::time::Instant::now();
    let result = txn.commit().await;
    histogram!("petcare_db.transaction.commit_duration", start.elapsed());

    match result {
        Ok(()) => {
            counter!("petcare_db.transaction.committed", 1);
            Ok(())
        }
        Err(e) => {
            counter!("petcare_db.transaction.commit_failed", 1);
            error!(error = %e, "Transaction commit failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}

/// Runs database migrations
///
/// # Errors
/// Returns a `ServiceError` if migrations fail to execute
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("Checking database connection");
    let start = std::time::Instant::now();

    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("petcare_db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!(
                "Database connection check failed after {:?}: {}",
                elapsed, e
            );
            counter!("petcare_db.connection_failures", 1);
        }
    }

    result
}

/// Closes the database connection pool
pub async fn close_pool(pool: DbPool) -> Result<(), ServiceError> {
    info!("Closing database connection pool");

    pool.close().await.map_err(ServiceError::DatabaseError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DbConfig {
        DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn connects_and_migrates_sqlite() {
        let pool = establish_connection_with_config(&memory_config())
            .await
            .expect("sqlite connection");
        check_connection(&pool).await.expect("ping");
        run_migrations(&pool).await.expect("migrations");
        // Re-running is a no-op.
        run_migrations(&pool).await.expect("idempotent migrations");
    }

    #[tokio::test]
    async fn serializable_transaction_commits_on_sqlite() {
        let pool = establish_connection_with_config(&memory_config())
            .await
            .expect("sqlite connection");
        run_migrations(&pool).await.expect("migrations");
        let txn = begin_serializable(&pool).await.expect("begin");
        commit(txn).await.expect("commit");
    }

    #[tokio::test]
    async fn retry_stops_at_first_non_conflict_error() {
        let mut calls = 0;
        let result: Result<(), ServiceError> =
            retry_on_conflict("test", &ConflictRetry::default(), || {
                calls += 1;
                async { Err(ServiceError::FailedPrecondition("moved".into())) }
            })
            .await;

        assert!(matches!(result, Err(ServiceError::FailedPrecondition(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let mut calls = 0;
        let result = retry_on_conflict("test", &ConflictRetry::default(), || {
            calls += 1;
            async { Ok::<_, ServiceError>(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn db_config_follows_app_config() {
        let mut cfg = AppConfig::new(
            "postgres://localhost/petcare".into(),
            "127.0.0.1:50051".into(),
            "development".into(),
        );
        cfg.db_max_connections = 32;
        cfg.db_acquire_timeout_secs = 3;

        let db_cfg = DbConfig::from(&cfg);
        assert_eq!(db_cfg.url, "postgres://localhost/petcare");
        assert_eq!(db_cfg.max_connections, 32);
        assert_eq!(db_cfg.acquire_timeout, Duration::from_secs(3));
    }
}
