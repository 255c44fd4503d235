use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::facts::{ConflictPolicy, DEFAULT_BATCH_SIZE, IngestSettings};
use crate::domain::partitions::DEFAULT_DUPLICATE_REPORT_LIMIT;
use crate::utils::file::expand_path;
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_FACT_TABLE, DEFAULT_FORWARD_YEARS,
    DEFAULT_HISTORY_START_YEAR, DEFAULT_MIGRATION_LOCK_KEY, MAX_FORWARD_YEARS,
    MAX_HISTORY_START_YEAR, MIN_HISTORY_START_YEAR,
};

/// Where the warehouse lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    #[default]
    Postgres,
    Memory,
}

impl fmt::Display for WarehouseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

// =============================================================================
// File Config (JSON)
// =============================================================================

/// PostgreSQL configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PostgresFileConfig {
    /// PostgreSQL connection URL (or use METRICSTORE_POSTGRES_URL env var)
    pub url: Option<String>,
    /// Maximum number of connections in the pool (default: 20)
    pub max_connections: Option<u32>,
    /// Minimum number of connections to keep warm (default: 2)
    pub min_connections: Option<u32>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Idle connection timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Max connection lifetime in seconds (default: 1800)
    pub max_lifetime_secs: Option<u64>,
    /// Statement timeout in seconds, 0 to disable (default: 60)
    pub statement_timeout_secs: Option<u64>,
}

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// postgres (default) or memory
    pub backend: Option<WarehouseBackend>,
    pub postgres: Option<PostgresFileConfig>,
}

/// Warehouse configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WarehouseFileConfig {
    pub table: Option<String>,
    pub history_start_year: Option<i32>,
    pub forward_years: Option<u32>,
}

/// Ingest configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IngestFileConfig {
    pub conflict_policy: Option<ConflictPolicy>,
    pub lazy_partitions: Option<bool>,
    pub batch_size: Option<usize>,
    pub max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
}

/// Migration configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MigrationFileConfig {
    pub lock_key: Option<i64>,
    pub duplicate_report_limit: Option<u32>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub database: Option<DatabaseFileConfig>,
    pub warehouse: Option<WarehouseFileConfig>,
    pub ingest: Option<IngestFileConfig>,
    pub migration: Option<MigrationFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite each `Some` field of `$current` with the one from `$other`
macro_rules! merge_fields {
    ($current:expr, $other:expr, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $current.$field = $other.$field;
            }
        )+
    };
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(database) = other.database {
            let current = self.database.get_or_insert_with(DatabaseFileConfig::default);
            merge_fields!(current, database, backend);
            if let Some(postgres) = database.postgres {
                let pg = current.postgres.get_or_insert_with(PostgresFileConfig::default);
                merge_fields!(
                    pg,
                    postgres,
                    url,
                    max_connections,
                    min_connections,
                    acquire_timeout_secs,
                    idle_timeout_secs,
                    max_lifetime_secs,
                    statement_timeout_secs,
                );
            }
        }

        if let Some(warehouse) = other.warehouse {
            let current = self.warehouse.get_or_insert_with(WarehouseFileConfig::default);
            merge_fields!(current, warehouse, table, history_start_year, forward_years);
        }

        if let Some(ingest) = other.ingest {
            let current = self.ingest.get_or_insert_with(IngestFileConfig::default);
            merge_fields!(
                current,
                ingest,
                conflict_policy,
                lazy_partitions,
                batch_size,
                max_attempts,
                retry_base_delay_ms,
            );
        }

        if let Some(migration) = other.migration {
            let current = self.migration.get_or_insert_with(MigrationFileConfig::default);
            merge_fields!(current, migration, lock_key, duplicate_report_limit);
        }
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

/// PostgreSQL pool settings; zero means "use the default"
#[derive(Debug, Clone, Default)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// `None` uses the default, `Some(0)` disables the timeout
    pub statement_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: WarehouseBackend,
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub table: String,
    pub history_start_year: i32,
    pub forward_years: u32,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub conflict_policy: ConflictPolicy,
    pub lazy_partitions: bool,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl IngestConfig {
    /// Job settings, with per-run overrides from the command line
    pub fn settings(
        &self,
        policy: Option<ConflictPolicy>,
        default_source: Option<String>,
    ) -> IngestSettings {
        IngestSettings {
            policy: policy.unwrap_or(self.conflict_policy),
            lazy_partitions: self.lazy_partitions,
            batch_size: self.batch_size,
            max_attempts: self.max_attempts,
            retry_base_delay_ms: self.retry_base_delay_ms,
            default_source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub lock_key: i64,
    pub duplicate_report_limit: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub warehouse: WarehouseConfig,
    pub ingest: IngestConfig,
    pub migration: MigrationConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.metricstore/metricstore.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        Self::load_with_profile(cli, get_profile_config_path())
    }

    fn load_with_profile(cli: &CliConfig, profile_path: Option<PathBuf>) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Profile dir - skip if not exists
        if let Some(profile_path) = profile_path
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        // 3. Layer: defaults -> file config -> CLI/env overrides
        let file_database = file_config.database.unwrap_or_default();
        let file_postgres = file_database.postgres.unwrap_or_default();
        let file_warehouse = file_config.warehouse.unwrap_or_default();
        let file_ingest = file_config.ingest.unwrap_or_default();
        let file_migration = file_config.migration.unwrap_or_default();

        let backend = if cli.in_memory {
            WarehouseBackend::Memory
        } else {
            file_database.backend.unwrap_or_default()
        };

        let database = DatabaseConfig {
            backend,
            postgres: PostgresConfig {
                url: cli
                    .postgres_url
                    .clone()
                    .or(file_postgres.url)
                    .unwrap_or_default(),
                max_connections: file_postgres.max_connections.unwrap_or_default(),
                min_connections: file_postgres.min_connections.unwrap_or_default(),
                acquire_timeout_secs: file_postgres.acquire_timeout_secs.unwrap_or_default(),
                idle_timeout_secs: file_postgres.idle_timeout_secs.unwrap_or_default(),
                max_lifetime_secs: file_postgres.max_lifetime_secs.unwrap_or_default(),
                statement_timeout_secs: file_postgres.statement_timeout_secs,
            },
        };

        let warehouse = WarehouseConfig {
            table: cli
                .table
                .clone()
                .or(file_warehouse.table)
                .unwrap_or_else(|| DEFAULT_FACT_TABLE.to_string()),
            history_start_year: file_warehouse
                .history_start_year
                .unwrap_or(DEFAULT_HISTORY_START_YEAR),
            forward_years: file_warehouse.forward_years.unwrap_or(DEFAULT_FORWARD_YEARS),
        };

        let ingest = IngestConfig {
            conflict_policy: file_ingest.conflict_policy.unwrap_or_default(),
            lazy_partitions: file_ingest.lazy_partitions.unwrap_or(true),
            batch_size: file_ingest.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            max_attempts: file_ingest.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            retry_base_delay_ms: file_ingest
                .retry_base_delay_ms
                .unwrap_or(DEFAULT_BASE_DELAY_MS),
        };

        let migration = MigrationConfig {
            lock_key: file_migration.lock_key.unwrap_or(DEFAULT_MIGRATION_LOCK_KEY),
            duplicate_report_limit: file_migration
                .duplicate_report_limit
                .unwrap_or(DEFAULT_DUPLICATE_REPORT_LIMIT),
        };

        let config = Self {
            database,
            warehouse,
            ingest,
            migration,
        };

        config.validate()?;

        tracing::debug!(
            backend = %config.database.backend,
            table = %config.warehouse.table,
            history_start_year = config.warehouse.history_start_year,
            forward_years = config.warehouse.forward_years,
            conflict_policy = %config.ingest.conflict_policy,
            lazy_partitions = config.ingest.lazy_partitions,
            batch_size = config.ingest.batch_size,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.database.backend == WarehouseBackend::Postgres
            && self.database.postgres.url.trim().is_empty()
        {
            anyhow::bail!(
                "Configuration error: database.postgres.url is required (or pass --in-memory)"
            );
        }

        if self.warehouse.table.trim().is_empty() {
            anyhow::bail!("Configuration error: warehouse.table must not be empty");
        }

        if !(MIN_HISTORY_START_YEAR..=MAX_HISTORY_START_YEAR)
            .contains(&self.warehouse.history_start_year)
        {
            anyhow::bail!(
                "Configuration error: warehouse.history_start_year must be between {} and {}",
                MIN_HISTORY_START_YEAR,
                MAX_HISTORY_START_YEAR
            );
        }

        if self.warehouse.forward_years > MAX_FORWARD_YEARS {
            anyhow::bail!(
                "Configuration error: warehouse.forward_years must be at most {}",
                MAX_FORWARD_YEARS
            );
        }

        if self.ingest.batch_size == 0 {
            anyhow::bail!("Configuration error: ingest.batch_size must be greater than 0");
        }

        if self.ingest.max_attempts == 0 {
            tracing::warn!("ingest.max_attempts is 0, writes will be attempted once");
        }

        Ok(())
    }
}

/// Get the profile config path (~/.metricstore/metricstore.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
