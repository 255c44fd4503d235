// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "MetricStore";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".metricstore";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "metricstore.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "METRICSTORE_CONFIG";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "METRICSTORE_LOG";

/// Environment variable for the PostgreSQL connection URL
pub const ENV_POSTGRES_URL: &str = "METRICSTORE_POSTGRES_URL";

/// Environment variable for the fact table name
pub const ENV_TABLE: &str = "METRICSTORE_TABLE";

/// Run against the in-process warehouse instead of PostgreSQL
pub const ENV_IN_MEMORY: &str = "METRICSTORE_IN_MEMORY";

/// Default log filter when neither METRICSTORE_LOG nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "info,metricstore=info";

// =============================================================================
// Warehouse
// =============================================================================

/// Fact table every collaborator writes to
pub const DEFAULT_FACT_TABLE: &str = "market_time_series";

/// First year of historical coverage
pub const DEFAULT_HISTORY_START_YEAR: i32 = 2000;

/// Years provisioned ahead of the current one
pub const DEFAULT_FORWARD_YEARS: u32 = 1;

/// Upper bound for `forward_years`
pub const MAX_FORWARD_YEARS: u32 = 10;

/// Accepted range for `history_start_year`
pub const MIN_HISTORY_START_YEAR: i32 = 1900;
pub const MAX_HISTORY_START_YEAR: i32 = 2100;

// =============================================================================
// Migration
// =============================================================================

/// Advisory lock id serializing migration batches ("mtrc" in ASCII)
pub const DEFAULT_MIGRATION_LOCK_KEY: i64 = 0x6d74_7263;

// =============================================================================
// PostgreSQL
// =============================================================================

/// Default max connections for PostgreSQL pool
pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Default min connections for PostgreSQL pool
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;

/// Default acquire timeout in seconds
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds
pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default max connection lifetime in seconds
pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Default statement timeout in seconds (0 disables)
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;
