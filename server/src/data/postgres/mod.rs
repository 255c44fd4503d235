//! PostgreSQL warehouse backend
//!
//! One connection pool serves both the schema channel ([`SchemaStore`]) and
//! the fact channel ([`FactStore`]). Pool settings follow the usual bounds:
//! - Min connections kept warm
//! - Idle connection cleanup and lifetime cycling
//! - Statement timeout for runaway scans
//!
//! [`SchemaStore`]: crate::data::SchemaStore
//! [`FactStore`]: crate::data::FactStore

mod catalog;
pub mod error;
mod facts;
pub mod schema;

pub use sqlx::PgPool;

use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::log::LevelFilter;

use crate::core::config::PostgresConfig;
use crate::core::constants::{
    POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
    POSTGRES_DEFAULT_MIN_CONNECTIONS, POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};
use crate::data::error::DataError;

/// PostgreSQL warehouse service
///
/// Created once per process and shared behind an `Arc`.
pub struct PostgresService {
    pool: PgPool,
    /// Key of the session advisory lock that serializes migration batches
    lock_key: i64,
}

fn or_default<T: PartialOrd + Default>(value: T, default: T) -> T {
    if value > T::default() { value } else { default }
}

impl PostgresService {
    /// Connect the pool from configuration
    pub async fn init(config: &PostgresConfig, lock_key: i64) -> Result<Self, DataError> {
        let url = config.url.as_str();
        if url.is_empty() {
            return Err(DataError::Config("PostgreSQL URL is required".into()));
        }

        let max_connections = or_default(config.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS);
        let min_connections = or_default(config.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS);
        let acquire_timeout = or_default(
            config.acquire_timeout_secs,
            POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
        );
        let idle_timeout = or_default(config.idle_timeout_secs, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS);
        let max_lifetime = or_default(config.max_lifetime_secs, POSTGRES_DEFAULT_MAX_LIFETIME_SECS);
        // Zero disables the timeout; the default applies only when unset in config
        let statement_timeout = config
            .statement_timeout_secs
            .unwrap_or(POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS);

        let mut options: PgConnectOptions = url
            .parse()
            .map_err(|e| DataError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;

        options = options.log_statements(LevelFilter::Trace);

        if statement_timeout > 0 {
            options = options.options([("statement_timeout", format!("{}s", statement_timeout))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections.min(max_connections))
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .idle_timeout(Duration::from_secs(idle_timeout))
            .max_lifetime(Duration::from_secs(max_lifetime))
            .connect_with(options)
            .await
            .map_err(error::classify)?;

        tracing::debug!(
            max_connections,
            min_connections,
            acquire_timeout_secs = acquire_timeout,
            idle_timeout_secs = idle_timeout,
            max_lifetime_secs = max_lifetime,
            statement_timeout_secs = statement_timeout,
            "PostgresService initialized"
        );
        Ok(Self { pool, lock_key })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_default() {
        assert_eq!(or_default(0u32, 20), 20);
        assert_eq!(or_default(5u32, 20), 5);
        assert_eq!(or_default(0u64, 30), 30);
    }

    #[tokio::test]
    async fn test_init_rejects_empty_url() {
        let config = PostgresConfig::default();
        let result = PostgresService::init(&config, 1).await;
        assert!(matches!(result, Err(DataError::Config(_))));
    }
}
