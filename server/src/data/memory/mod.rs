//! In-process warehouse backend
//!
//! Reproduces the PostgreSQL behaviour the warehouse core relies on:
//! - range partition routing on `date`
//! - unique constraints enforced per partition
//! - parent constraints cascading to current and future partitions
//! - ON CONFLICT arbiter selection by exact column set
//! - check expressions read back in rewritten form, with their comments
//!
//! Statement and write failures can be injected to exercise partial-batch and
//! retry paths, and statements can be skipped while reporting success.
//! Nothing is persisted.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use regex::Regex;

use crate::data::catalog::{
    ColumnInfo, ConstraintInfo, DuplicateIdentity, PartitionBounds, PartitionInfo,
};
use crate::data::ddl::{ConstraintDef, DdlStatement};
use crate::data::error::DataError;
use crate::data::traits::{FactStore, MigrationLock, SchemaStore, WriteOutcome};
use crate::domain::facts::{
    ConflictPolicy, FactIdentity, FactRow, IDENTITY_COLUMNS, LEGACY_IDENTITY_COLUMNS,
    identity_constraint_name,
};

const PARTITION_KEY: &str = "date";

/// Columns every fact write supplies
const WRITE_COLUMNS: [&str; 6] = [
    "region_id",
    "date",
    "metric_name",
    "data_source",
    "metric_value",
    "attributes",
];

#[derive(Debug, Clone)]
struct MemConstraint {
    name: String,
    definition: ConstraintDef,
    /// Parent-level constraint this copy belongs to
    parent: Option<String>,
    comment: Option<String>,
}

impl MemConstraint {
    fn new(name: &str, definition: ConstraintDef, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            definition,
            parent: parent.map(str::to_string),
            comment: None,
        }
    }
}

#[derive(Debug, Clone)]
struct MemIndex {
    table: String,
    columns: Vec<String>,
    unique: bool,
}

#[derive(Debug, Default)]
struct MemTable {
    columns: Vec<ColumnInfo>,
    partitioned: bool,
    parent: Option<String>,
    bounds: Option<PartitionBounds>,
    constraints: Vec<MemConstraint>,
    rows: Vec<FactRow>,
}

impl MemTable {
    fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Injection {
    /// Return a transient error
    Fail,
    /// Report success without applying the statement
    Skip,
}

struct InjectedFailure {
    pattern: String,
    remaining: u32,
    kind: Injection,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    indexes: BTreeMap<String, MemIndex>,
    statement_failures: Vec<InjectedFailure>,
    write_failures: u32,
    executed: Vec<String>,
}

fn column(name: &str, data_type: &str, nullable: bool, default: Option<&str>) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        default: default.map(str::to_string),
    }
}

/// Values of `columns` for a row; `None` when any of them is NULL
fn key_of(row: &FactRow, columns: &[String]) -> Option<Vec<String>> {
    columns.iter().map(|c| row.column_value(c)).collect()
}

fn first_duplicate(rows: &[&FactRow], columns: &[String]) -> Option<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|r| key_of(r, columns))
        .find(|key| !seen.insert(key.clone()))
}

/// Check expression as the engine reads it back: wrapped in parentheses,
/// numeric literals parenthesized (`x >= 0` becomes `(x >= (0))`)
fn stored_check(expression: &str) -> String {
    static LITERAL: OnceLock<Regex> = OnceLock::new();
    let re = LITERAL.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("Invalid regex"));
    format!("({})", re.replace_all(expression.trim(), "($0)"))
}

fn key_detail(columns: &[String], key: &[String]) -> String {
    format!("Key ({})=({}) already exists.", columns.join(", "), key.join(", "))
}

impl State {
    fn table(&self, name: &str) -> Result<&MemTable, DataError> {
        self.tables
            .get(name)
            .ok_or_else(|| DataError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, DataError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DataError::UnknownTable(name.to_string()))
    }

    fn children(&self, parent: &str) -> Vec<String> {
        self.tables
            .iter()
            .filter(|(_, t)| t.parent.as_deref() == Some(parent))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The table followed by its partitions
    fn family(&self, table: &str) -> Vec<String> {
        let mut names = vec![table.to_string()];
        names.extend(self.children(table));
        names
    }

    fn family_rows(&self, table: &str) -> Vec<&FactRow> {
        self.family(table)
            .iter()
            .filter_map(|name| self.tables.get(name))
            .flat_map(|t| t.rows.iter())
            .collect()
    }

    fn require_columns(&self, table: &str, columns: &[String]) -> Result<(), DataError> {
        let t = self.table(table)?;
        for col in columns {
            if t.column(col).is_none() {
                return Err(DataError::UnknownColumn {
                    table: table.to_string(),
                    column: col.clone(),
                });
            }
        }
        Ok(())
    }

    fn take_statement_failure(&mut self, sql: &str) -> Option<Injection> {
        let failure = self
            .statement_failures
            .iter_mut()
            .find(|f| f.remaining > 0 && sql.contains(&f.pattern))?;
        failure.remaining -= 1;
        Some(failure.kind)
    }

    fn take_write_failure(&mut self) -> Result<(), DataError> {
        if self.write_failures > 0 {
            self.write_failures -= 1;
            return Err(DataError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    /// Unique keys enforced on `table`: its own unique constraints plus unique
    /// indexes declared on it or on its parent
    fn unique_keys(&self, table: &str) -> Vec<(String, Vec<String>)> {
        let Some(t) = self.tables.get(table) else {
            return Vec::new();
        };
        let mut keys: Vec<(String, Vec<String>)> = t
            .constraints
            .iter()
            .filter_map(|c| {
                c.definition
                    .unique_columns()
                    .map(|cols| (c.name.clone(), cols.to_vec()))
            })
            .collect();
        for (name, idx) in &self.indexes {
            if idx.unique && (idx.table == table || t.parent.as_deref() == Some(&idx.table)) {
                keys.push((name.clone(), idx.columns.clone()));
            }
        }
        keys
    }

    fn execute(&mut self, statement: &DdlStatement) -> Result<(), DataError> {
        let sql = statement.to_string();
        match self.take_statement_failure(&sql) {
            Some(Injection::Fail) => {
                return Err(DataError::Unavailable(format!(
                    "injected failure for statement: {}",
                    sql
                )));
            }
            Some(Injection::Skip) => return Ok(()),
            None => {}
        }

        match statement {
            DdlStatement::AddColumn {
                table,
                column,
                data_type,
                default,
            } => self.add_column(table, column, data_type, default.as_deref())?,
            DdlStatement::SetDefault {
                table,
                column,
                default,
            } => self.set_default(table, column, default)?,
            DdlStatement::BackfillDefault { table, column, .. } => {
                // Rows carry typed values; only the column reference is checked
                self.require_columns(table, std::slice::from_ref(column))?
            }
            DdlStatement::SetNotNull { table, column } => self.set_not_null(table, column)?,
            DdlStatement::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => self.create_index(name, table, columns, *unique)?,
            DdlStatement::AddConstraint {
                table,
                name,
                definition,
            } => self.add_constraint(table, name, definition)?,
            DdlStatement::DropConstraint { table, name } => self.drop_constraint(table, name)?,
            DdlStatement::CommentConstraint {
                table,
                name,
                comment,
            } => self.comment_constraint(table, name, comment)?,
            DdlStatement::CreatePartition {
                parent,
                name,
                from,
                to,
            } => self.create_partition(parent, name, *from, *to)?,
        }

        self.executed.push(sql);
        Ok(())
    }

    fn add_column(
        &mut self,
        table: &str,
        name: &str,
        data_type: &str,
        default: Option<&str>,
    ) -> Result<(), DataError> {
        if self.table(table)?.column(name).is_some() {
            return Err(DataError::AlreadyExists(format!(
                "column \"{}\" of relation \"{}\" already exists",
                name, table
            )));
        }
        let info = column(name, data_type, true, default);
        for member in self.family(table) {
            self.table_mut(&member)?.columns.push(info.clone());
        }
        Ok(())
    }

    fn set_default(&mut self, table: &str, name: &str, default: &str) -> Result<(), DataError> {
        self.require_columns(table, &[name.to_string()])?;
        for member in self.family(table) {
            if let Some(col) = self
                .table_mut(&member)?
                .columns
                .iter_mut()
                .find(|c| c.name == name)
            {
                col.default = Some(default.to_string());
            }
        }
        Ok(())
    }

    fn set_not_null(&mut self, table: &str, name: &str) -> Result<(), DataError> {
        self.require_columns(table, &[name.to_string()])?;
        if name == "metric_value"
            && self
                .family_rows(table)
                .iter()
                .any(|r| r.metric_value.is_none())
        {
            return Err(DataError::Rejected(format!(
                "column \"{}\" of relation \"{}\" contains null values",
                name, table
            )));
        }
        for member in self.family(table) {
            if let Some(col) = self
                .table_mut(&member)?
                .columns
                .iter_mut()
                .find(|c| c.name == name)
            {
                col.nullable = false;
            }
        }
        Ok(())
    }

    fn create_index(
        &mut self,
        name: &str,
        table: &str,
        columns: &[String],
        unique: bool,
    ) -> Result<(), DataError> {
        if self.indexes.contains_key(name) {
            return Ok(());
        }
        self.require_columns(table, columns)?;
        if unique {
            self.check_unique_definition(table, name, columns)?;
        }
        self.indexes.insert(
            name.to_string(),
            MemIndex {
                table: table.to_string(),
                columns: columns.to_vec(),
                unique,
            },
        );
        Ok(())
    }

    /// Shared checks for a new unique key: partition key present, no existing duplicates
    fn check_unique_definition(
        &self,
        table: &str,
        name: &str,
        columns: &[String],
    ) -> Result<(), DataError> {
        if columns.is_empty() {
            return Err(DataError::Rejected(format!(
                "unique key \"{}\" has no columns",
                name
            )));
        }
        if self.table(table)?.partitioned && !columns.iter().any(|c| c == PARTITION_KEY) {
            return Err(DataError::Rejected(format!(
                "unique constraint \"{}\" on partitioned table \"{}\" must include the partition key \"{}\"",
                name, table, PARTITION_KEY
            )));
        }
        if let Some(key) = first_duplicate(&self.family_rows(table), columns) {
            return Err(DataError::UniqueViolation {
                constraint: name.to_string(),
                detail: format!("Key ({})=({}) is duplicated.", columns.join(", "), key.join(", ")),
            });
        }
        Ok(())
    }

    fn add_constraint(
        &mut self,
        table: &str,
        name: &str,
        definition: &ConstraintDef,
    ) -> Result<(), DataError> {
        if self.table(table)?.constraints.iter().any(|c| c.name == name) {
            return Err(DataError::AlreadyExists(format!(
                "constraint \"{}\" for relation \"{}\" already exists",
                name, table
            )));
        }
        let definition = match definition {
            ConstraintDef::Unique { columns } => {
                self.require_columns(table, columns)?;
                self.check_unique_definition(table, name, columns)?;
                definition.clone()
            }
            ConstraintDef::Check { expression } => ConstraintDef::Check {
                expression: stored_check(expression),
            },
        };

        self.table_mut(table)?
            .constraints
            .push(MemConstraint::new(name, definition.clone(), None));
        for child in self.children(table) {
            self.cascade_constraint(&child, name, &definition)?;
        }
        Ok(())
    }

    fn comment_constraint(
        &mut self,
        table: &str,
        name: &str,
        comment: &str,
    ) -> Result<(), DataError> {
        let constraint = self
            .table_mut(table)?
            .constraints
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                DataError::UndefinedObject(format!(
                    "constraint \"{}\" for table \"{}\" does not exist",
                    name, table
                ))
            })?;
        constraint.comment = Some(comment.to_string());
        Ok(())
    }

    /// Give a partition its copy of a parent constraint
    fn cascade_constraint(
        &mut self,
        partition: &str,
        parent_constraint: &str,
        definition: &ConstraintDef,
    ) -> Result<(), DataError> {
        let part = self.table_mut(partition)?;
        let base = match definition {
            ConstraintDef::Unique { columns } => format!("{}_{}_key", partition, columns.join("_")),
            ConstraintDef::Check { .. } => parent_constraint.to_string(),
        };
        let mut name = base.clone();
        let mut n = 1;
        while part.constraints.iter().any(|c| c.name == name) {
            name = format!("{}{}", base, n);
            n += 1;
        }
        part.constraints.push(MemConstraint::new(
            &name,
            definition.clone(),
            Some(parent_constraint),
        ));
        Ok(())
    }

    fn drop_constraint(&mut self, table: &str, name: &str) -> Result<(), DataError> {
        let t = self.table(table)?;
        let Some(pos) = t.constraints.iter().position(|c| c.name == name) else {
            return Ok(());
        };
        if t.constraints[pos].parent.is_some() {
            return Err(DataError::Rejected(format!(
                "cannot drop inherited constraint \"{}\" of relation \"{}\"",
                name, table
            )));
        }

        self.table_mut(table)?.constraints.remove(pos);
        for child in self.children(table) {
            self.table_mut(&child)?
                .constraints
                .retain(|c| c.parent.as_deref() != Some(name));
        }
        Ok(())
    }

    fn create_partition(
        &mut self,
        parent: &str,
        name: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(), DataError> {
        let p = self.table(parent)?;
        if !p.partitioned {
            return Err(DataError::Rejected(format!(
                "table \"{}\" is not partitioned",
                parent
            )));
        }
        if self.tables.contains_key(name) {
            return Ok(());
        }
        if from >= to {
            return Err(DataError::Rejected(format!(
                "empty range bound specified for partition \"{}\"",
                name
            )));
        }
        let overlapping = self.children(parent).into_iter().find(|child| {
            self.tables
                .get(child)
                .and_then(|t| t.bounds)
                .is_some_and(|b| b.overlaps(from, to))
        });
        if let Some(other) = overlapping {
            return Err(DataError::Rejected(format!(
                "partition \"{}\" would overlap partition \"{}\"",
                name, other
            )));
        }

        let columns = p.columns.clone();
        let inherited: Vec<(String, ConstraintDef)> = p
            .constraints
            .iter()
            .map(|c| (c.name.clone(), c.definition.clone()))
            .collect();

        self.tables.insert(
            name.to_string(),
            MemTable {
                columns,
                partitioned: false,
                parent: Some(parent.to_string()),
                bounds: Some(PartitionBounds { from, to }),
                constraints: Vec::new(),
                rows: Vec::new(),
            },
        );
        for (constraint, definition) in inherited {
            self.cascade_constraint(name, &constraint, &definition)?;
        }
        Ok(())
    }

    fn check_write_columns(&self, table: &str) -> Result<(), DataError> {
        let t = self.table(table)?;
        match WRITE_COLUMNS.iter().find(|c| t.column(c).is_none()) {
            Some(missing) => Err(DataError::Config(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                missing, table
            ))),
            None => Ok(()),
        }
    }

    /// Table that physically stores a row written to `table`
    fn route(&self, table: &str, date: NaiveDate) -> Result<String, DataError> {
        if !self.table(table)?.partitioned {
            return Ok(table.to_string());
        }
        self.children(table)
            .into_iter()
            .find(|child| {
                self.tables
                    .get(child)
                    .and_then(|t| t.bounds)
                    .is_some_and(|b| b.contains_date(date))
            })
            .ok_or_else(|| DataError::NoPartition {
                table: table.to_string(),
                date,
            })
    }

    fn check_unique(&self, storage: &str, row: &FactRow) -> Result<(), DataError> {
        let rows = &self.table(storage)?.rows;
        for (name, columns) in self.unique_keys(storage) {
            let Some(key) = key_of(row, &columns) else {
                continue;
            };
            if rows.iter().any(|r| key_of(r, &columns).as_ref() == Some(&key)) {
                return Err(DataError::UniqueViolation {
                    detail: key_detail(&columns, &key),
                    constraint: name,
                });
            }
        }
        Ok(())
    }
}

/// In-process warehouse
pub struct MemoryWarehouse {
    state: Mutex<State>,
    migration_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            migration_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Create the pre-attributes layout: partitioned on `date`, no
    /// `data_source`/`attributes` columns, no constraints
    pub fn create_legacy_fact_table(&self, table: &str) -> Result<(), DataError> {
        let mut state = self.state.lock();
        if state.tables.contains_key(table) {
            return Err(DataError::AlreadyExists(table.to_string()));
        }
        state.tables.insert(
            table.to_string(),
            MemTable {
                columns: vec![
                    column("region_id", "text", false, None),
                    column("date", "date", false, None),
                    column("metric_name", "text", false, None),
                    column("metric_value", "double precision", true, None),
                ],
                partitioned: true,
                ..Default::default()
            },
        );
        tracing::debug!(
            table,
            legacy_key = ?LEGACY_IDENTITY_COLUMNS,
            "Created legacy fact table in memory"
        );
        Ok(())
    }

    /// Fail the next `times` statements whose SQL text contains `pattern`
    pub fn fail_statements(&self, pattern: &str, times: u32) {
        self.inject(pattern, times, Injection::Fail);
    }

    /// Report success for the next `times` matching statements without
    /// applying them, like a drop that silently missed its target
    pub fn skip_statements(&self, pattern: &str, times: u32) {
        self.inject(pattern, times, Injection::Skip);
    }

    fn inject(&self, pattern: &str, times: u32, kind: Injection) {
        self.state.lock().statement_failures.push(InjectedFailure {
            pattern: pattern.to_string(),
            remaining: times,
            kind,
        });
    }

    /// Fail the next `times` fact writes with a transient error
    pub fn fail_writes(&self, times: u32) {
        self.state.lock().write_failures += times;
    }

    /// SQL text of every statement executed successfully, in order
    pub fn executed_statements(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Whether no migration batch currently holds the lock
    pub fn migration_lock_available(&self) -> bool {
        self.migration_lock.try_lock().is_ok()
    }
}

#[async_trait]
impl SchemaStore for MemoryWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool, DataError> {
        Ok(self.state.lock().tables.contains_key(table))
    }

    async fn column(&self, table: &str, column: &str) -> Result<Option<ColumnInfo>, DataError> {
        Ok(self
            .state
            .lock()
            .tables
            .get(table)
            .and_then(|t| t.column(column).cloned()))
    }

    async fn index_exists(&self, name: &str) -> Result<bool, DataError> {
        Ok(self.state.lock().indexes.contains_key(name))
    }

    async fn constraints(&self, table: &str) -> Result<Vec<ConstraintInfo>, DataError> {
        let state = self.state.lock();
        let t = state.table(table)?;
        let mut constraints: Vec<ConstraintInfo> = t
            .constraints
            .iter()
            .map(|c| ConstraintInfo {
                table: table.to_string(),
                name: c.name.clone(),
                definition: c.definition.clone(),
                inherited: c.parent.is_some(),
                comment: c.comment.clone(),
            })
            .collect();
        constraints.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(constraints)
    }

    async fn partitions(&self, table: &str) -> Result<Vec<PartitionInfo>, DataError> {
        let state = self.state.lock();
        state.table(table)?;
        Ok(state
            .children(table)
            .into_iter()
            .map(|name| PartitionInfo {
                bounds: state.tables.get(&name).and_then(|t| t.bounds),
                name,
            })
            .collect())
    }

    async fn duplicate_identities(
        &self,
        table: &str,
        columns: &[String],
        limit: u32,
    ) -> Result<Vec<DuplicateIdentity>, DataError> {
        let state = self.state.lock();
        state.table(table)?;
        let mut groups: BTreeMap<Vec<Option<String>>, i64> = BTreeMap::new();
        for row in state.family_rows(table) {
            let key = columns.iter().map(|c| row.column_value(c)).collect();
            *groups.entry(key).or_default() += 1;
        }
        Ok(groups
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .take(limit as usize)
            .map(|(values, count)| DuplicateIdentity {
                values: columns.iter().cloned().zip(values).collect(),
                count,
            })
            .collect())
    }

    async fn execute(&self, statement: &DdlStatement) -> Result<(), DataError> {
        tracing::debug!(sql = %statement, "Executing DDL in memory");
        self.state.lock().execute(statement)
    }

    async fn ensure_base_schema(&self, table: &str) -> Result<(), DataError> {
        let mut state = self.state.lock();
        if state.tables.contains_key(table) {
            return Ok(());
        }
        state.tables.insert(
            table.to_string(),
            MemTable {
                columns: vec![
                    column("region_id", "text", false, None),
                    column("date", "date", false, None),
                    column("metric_name", "text", false, None),
                    column("data_source", "text", false, None),
                    column("metric_value", "double precision", true, None),
                    column("attributes", "jsonb", false, Some("'{}'::jsonb")),
                ],
                partitioned: true,
                constraints: vec![MemConstraint::new(
                    &identity_constraint_name(table),
                    ConstraintDef::unique(&IDENTITY_COLUMNS),
                    None,
                )],
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn acquire_migration_lock(&self) -> Result<MigrationLock, DataError> {
        let guard = Arc::clone(&self.migration_lock).lock_owned().await;
        Ok(MigrationLock::memory(guard))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl FactStore for MemoryWarehouse {
    async fn upsert(
        &self,
        table: &str,
        row: &FactRow,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, DataError> {
        let mut state = self.state.lock();
        state.take_write_failure()?;
        state.check_write_columns(table)?;

        let has_arbiter = state
            .unique_keys(table)
            .iter()
            .any(|(_, cols)| ConstraintDef::unique(cols).is_unique_on(&IDENTITY_COLUMNS));
        if !has_arbiter {
            return Err(DataError::MissingConflictTarget {
                table: table.to_string(),
                columns: IDENTITY_COLUMNS.join(", "),
            });
        }

        let storage = state.route(table, row.date)?;
        let identity = row.identity();
        let existing = state
            .table(&storage)?
            .rows
            .iter()
            .position(|r| r.identity() == identity);

        match (existing, policy) {
            (Some(_), ConflictPolicy::Ignore) => Ok(WriteOutcome::Ignored),
            (Some(pos), ConflictPolicy::Replace) => {
                state.table_mut(&storage)?.rows[pos].metric_value = row.metric_value;
                Ok(WriteOutcome::Replaced)
            }
            (None, _) => {
                state.check_unique(&storage, row)?;
                state.table_mut(&storage)?.rows.push(row.clone());
                Ok(WriteOutcome::Inserted)
            }
        }
    }

    async fn insert(&self, table: &str, row: &FactRow) -> Result<(), DataError> {
        let mut state = self.state.lock();
        state.take_write_failure()?;
        state.check_write_columns(table)?;
        let storage = state.route(table, row.date)?;
        state.check_unique(&storage, row)?;
        state.table_mut(&storage)?.rows.push(row.clone());
        Ok(())
    }

    async fn fetch(
        &self,
        table: &str,
        identity: &FactIdentity,
    ) -> Result<Option<FactRow>, DataError> {
        let state = self.state.lock();
        state.table(table)?;
        Ok(state
            .family_rows(table)
            .into_iter()
            .find(|r| &r.identity() == identity)
            .cloned())
    }

    async fn count(&self, table: &str) -> Result<u64, DataError> {
        let state = self.state.lock();
        state.table(table)?;
        Ok(state.family_rows(table).len() as u64)
    }
}

#[cfg(test)]
mod tests;
