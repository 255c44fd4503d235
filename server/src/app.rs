//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::cli::{
    self, CliConfig, Commands, ConstraintCommands, IngestArgs, MigrateArgs, PartitionCommands,
};
use crate::core::config::{AppConfig, WarehouseBackend};
use crate::core::constants::{APP_NAME, DEFAULT_LOG_FILTER, ENV_LOG};
use crate::data::{MemoryWarehouse, PostgresService, WarehouseHandles};
use crate::domain::audit::{AuditSink, TracingAuditSink};
use crate::domain::facts::{FactIngestor, IngestError, IngestReport};
use crate::domain::migration::{MigrationBatch, MigrationReport, MigrationRunner, OperationStatus};
use crate::domain::partitions::{PartitionManager, PartitionStatus, YearSpan};

pub struct CoreApp {
    pub config: AppConfig,
    pub warehouse: WarehouseHandles,
    pub audit: Arc<dyn AuditSink>,
    pub partitions: Arc<PartitionManager>,
    postgres: Option<Arc<PostgresService>>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config).await?;
        let result = app.dispatch(command).await;
        app.close().await;
        result
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

        let (warehouse, postgres) = match config.database.backend {
            WarehouseBackend::Postgres => {
                let service = Arc::new(
                    PostgresService::init(&config.database.postgres, config.migration.lock_key)
                        .await
                        .context("Failed to connect to PostgreSQL")?,
                );
                (WarehouseHandles::new(service.clone()), Some(service))
            }
            WarehouseBackend::Memory => {
                let memory = Arc::new(MemoryWarehouse::new());
                tracing::warn!("Using in-memory warehouse; nothing will be persisted");
                (WarehouseHandles::new(memory), None)
            }
        };

        let partitions = Arc::new(
            PartitionManager::new(warehouse.schema.clone(), audit.clone())
                .with_duplicate_report_limit(config.migration.duplicate_report_limit),
        );

        // A fresh in-memory warehouse has nothing to migrate without a table
        if config.database.backend == WarehouseBackend::Memory {
            partitions.ensure_base_schema(&config.warehouse.table).await?;
        }

        tracing::debug!(backend = warehouse.backend_name(), table = %config.warehouse.table, "{} initialized", APP_NAME);

        Ok(Self {
            config,
            warehouse,
            audit,
            partitions,
            postgres,
        })
    }

    fn init_logging() {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn close(&self) {
        if let Some(postgres) = &self.postgres {
            postgres.close().await;
        }
    }

    async fn dispatch(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Init => self.init_warehouse().await,
            Commands::Migrate(args) => self.migrate(args).await,
            Commands::Partitions { command } => match command {
                PartitionCommands::Ensure { from, to } => self.ensure_partitions(from, to).await,
                PartitionCommands::List => self.list_partitions().await,
            },
            Commands::Constraint { command } => match command {
                ConstraintCommands::Propagate { old, new, name } => {
                    self.propagate(&old, &new, name.as_deref()).await
                }
            },
            Commands::Ingest(args) => self.ingest(args).await,
        }
    }

    fn table(&self) -> &str {
        &self.config.warehouse.table
    }

    async fn init_warehouse(&self) -> Result<()> {
        self.partitions.ensure_base_schema(self.table()).await?;
        let report = self
            .partitions
            .ensure_history_coverage(
                self.table(),
                self.config.warehouse.history_start_year,
                self.config.warehouse.forward_years,
            )
            .await?;
        println!(
            "{}: partitions {} provisioned={} already_present={}",
            report.table,
            report.span,
            report.provisioned.len(),
            report.already_present.len()
        );
        Ok(())
    }

    async fn migrate(&self, args: MigrateArgs) -> Result<()> {
        let batch = match (&args.file, &args.builtin) {
            (Some(path), _) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
                MigrationBatch::from_json(&text)?
            }
            (None, Some(name)) => MigrationBatch::builtin(name, self.table())
                .with_context(|| format!("Unknown built-in batch: {}", name))?,
            (None, None) => anyhow::bail!("Either --file or --builtin is required"),
        };

        let runner = MigrationRunner::new(self.warehouse.schema.clone(), self.audit.clone());

        if args.dry_run {
            let statements = runner.render(&batch).await?;
            if statements.is_empty() {
                println!("{}: schema already satisfies the batch", batch.name());
            }
            for statement in statements {
                println!("{};", statement);
            }
            return Ok(());
        }

        let report = runner.execute(&batch).await?;
        print_migration_report(&report);
        if report.has_failures() {
            anyhow::bail!(
                "{} of {} operations failed in batch {}",
                report.failed(),
                report.results.len(),
                report.batch
            );
        }
        Ok(())
    }

    async fn ensure_partitions(&self, from: i32, to: i32) -> Result<()> {
        let span = YearSpan::new(from, to)?;
        let report = self
            .partitions
            .ensure_partition_coverage(self.table(), span)
            .await?;
        println!(
            "{}: partitions {} provisioned={:?} already_present={}",
            report.table,
            report.span,
            report.provisioned,
            report.already_present.len()
        );
        Ok(())
    }

    async fn list_partitions(&self) -> Result<()> {
        let statuses = self.partitions.list_partitions(self.table()).await?;
        print_partitions(self.table(), &statuses);
        Ok(())
    }

    async fn propagate(&self, old: &[String], new: &[String], name: Option<&str>) -> Result<()> {
        let report = self
            .partitions
            .propagate_constraint(self.table(), old, new, name)
            .await?;
        for dropped in &report.dropped {
            println!("dropped  {}", dropped);
        }
        match &report.added {
            Some(name) => println!("added    {}.{}", report.table, name),
            None => println!("present  {} already carries the new key", report.table),
        }
        println!("checked  {} partitions", report.partitions_checked);
        Ok(())
    }

    async fn ingest(&self, args: IngestArgs) -> Result<()> {
        let settings = self.config.ingest.settings(args.policy, args.source);
        let ingestor = FactIngestor::new(
            self.warehouse.facts.clone(),
            self.partitions.clone(),
            self.audit.clone(),
            self.table(),
            settings,
        );

        match ingestor.ingest_file(&args.file).await {
            Ok(report) => {
                print_ingest_report(&report);
                Ok(())
            }
            Err(e) => {
                if let Some(report) = e.partial_report() {
                    print_ingest_report(report);
                }
                if let IngestError::Interrupted { .. } = &e
                    && e.is_transient()
                {
                    tracing::info!("Store failure looks transient; re-running the same file is safe");
                }
                Err(e.into())
            }
        }
    }
}

// =============================================================================
// Result rendering
// =============================================================================

fn print_migration_report(report: &MigrationReport) {
    println!(
        "batch {} ({}) on {}",
        report.batch,
        &report.checksum[..report.checksum.len().min(12)],
        report.backend
    );
    for result in &report.results {
        let status = match &result.status {
            OperationStatus::Applied => "applied".to_string(),
            OperationStatus::AlreadySatisfied => "satisfied".to_string(),
            OperationStatus::Failed { reason, category } => {
                format!("FAILED [{}] {}", category, reason)
            }
        };
        println!("  #{:<3} {:<60} {}", result.index, result.operation, status);
    }
    println!(
        "applied={} satisfied={} failed={}",
        report.applied(),
        report.already_satisfied(),
        report.failed()
    );
}

fn print_partitions(table: &str, statuses: &[PartitionStatus]) {
    println!("{}: {} partitions", table, statuses.len());
    for status in statuses {
        let bounds = status
            .bounds
            .map(|b| b.to_string())
            .unwrap_or_else(|| "DEFAULT".to_string());
        let identity = if status.identity_enforced {
            "identity"
        } else {
            "NO IDENTITY KEY"
        };
        println!(
            "  {:<32} {:<28} {:<16} {}",
            status.name,
            bounds,
            identity,
            status.constraints.join(", ")
        );
    }
}

fn print_ingest_report(report: &IngestReport) {
    println!(
        "inserted={} ignored={} replaced={} rejected={}",
        report.inserted,
        report.ignored,
        report.replaced,
        report.rejected.len()
    );
    for row in &report.rejected {
        println!("  row {}: {}", row.index, row.reason);
    }
}
