//! Store traits
//!
//! The warehouse core talks to its database only through these traits.
//! PostgreSQL implements them for production; the in-memory warehouse
//! implements them for tests and dry environments.

use async_trait::async_trait;

use crate::data::catalog::{ColumnInfo, ConstraintInfo, DuplicateIdentity, PartitionInfo};
use crate::data::ddl::DdlStatement;
use crate::data::error::DataError;
use crate::domain::facts::{ConflictPolicy, FactIdentity, FactRow};

// ============================================================================
// Migration lock
// ============================================================================

/// Held for the duration of one migration batch; released on drop.
///
/// For PostgreSQL this owns a connection detached from the pool that holds a
/// session advisory lock. Dropping the connection ends the session, which
/// releases the lock even if the holder panics.
pub struct MigrationLock {
    _guard: LockGuard,
}

enum LockGuard {
    Postgres { _conn: sqlx::PgConnection },
    Memory { _guard: tokio::sync::OwnedMutexGuard<()> },
}

impl MigrationLock {
    pub(crate) fn postgres(conn: sqlx::PgConnection) -> Self {
        Self {
            _guard: LockGuard::Postgres { _conn: conn },
        }
    }

    pub(crate) fn memory(guard: tokio::sync::OwnedMutexGuard<()>) -> Self {
        Self {
            _guard: LockGuard::Memory { _guard: guard },
        }
    }
}

// ============================================================================
// Schema store
// ============================================================================

/// Structural access to the warehouse schema (the SQL execution channel)
///
/// Every method reads or changes live state; implementations must not cache.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Check whether a table (plain, partitioned, or partition) exists
    async fn table_exists(&self, table: &str) -> Result<bool, DataError>;

    /// Look up one column of a table
    async fn column(&self, table: &str, column: &str) -> Result<Option<ColumnInfo>, DataError>;

    /// Check whether an index with this name exists anywhere in the schema
    async fn index_exists(&self, name: &str) -> Result<bool, DataError>;

    /// Unique, primary-key and check constraints declared on a table
    async fn constraints(&self, table: &str) -> Result<Vec<ConstraintInfo>, DataError>;

    /// Child partitions of a partitioned table, ordered by name
    async fn partitions(&self, table: &str) -> Result<Vec<PartitionInfo>, DataError>;

    /// Tuples over `columns` that occur more than once, at most `limit`
    async fn duplicate_identities(
        &self,
        table: &str,
        columns: &[String],
        limit: u32,
    ) -> Result<Vec<DuplicateIdentity>, DataError>;

    /// Execute one structural statement
    async fn execute(&self, statement: &DdlStatement) -> Result<(), DataError>;

    /// Create the partitioned fact table when it does not exist yet
    async fn ensure_base_schema(&self, table: &str) -> Result<(), DataError>;

    /// Block until no other migration batch is running
    async fn acquire_migration_lock(&self) -> Result<MigrationLock, DataError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Fact store
// ============================================================================

/// Storage-level result of writing one fact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Ignored,
    Replaced,
}

/// Row-level access to the fact table
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Insert a fact, resolving an identity conflict by `policy`.
    ///
    /// The conflict target is the full identity key; the store's unique
    /// constraint is what serializes concurrent writers of one identity.
    async fn upsert(
        &self,
        table: &str,
        row: &FactRow,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, DataError>;

    /// Plain insert; any unique violation surfaces as an error
    async fn insert(&self, table: &str, row: &FactRow) -> Result<(), DataError>;

    /// Fetch the stored row for an identity
    async fn fetch(&self, table: &str, identity: &FactIdentity)
    -> Result<Option<FactRow>, DataError>;

    /// Total rows across all partitions
    async fn count(&self, table: &str) -> Result<u64, DataError>;
}
