use clap::{Args, Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{ENV_CONFIG, ENV_IN_MEMORY, ENV_POSTGRES_URL, ENV_TABLE};
use crate::domain::facts::ConflictPolicy;

#[derive(Parser)]
#[command(name = "metricstore")]
#[command(version, about = "Partitioned warehouse for economic and housing metrics", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// PostgreSQL connection URL
    #[arg(long, global = true, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    /// Fact table name
    #[arg(long, global = true, env = ENV_TABLE)]
    pub table: Option<String>,

    /// Use a throwaway in-process warehouse (dry environments)
    #[arg(long, global = true, env = ENV_IN_MEMORY)]
    pub in_memory: bool,
}

/// Parse conflict policy from CLI string
fn parse_conflict_policy(s: &str) -> Result<ConflictPolicy, String> {
    s.parse()
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create the partitioned fact table and provision history coverage
    Init,
    /// Run a migration batch
    Migrate(MigrateArgs),
    /// Partition maintenance
    Partitions {
        #[command(subcommand)]
        command: PartitionCommands,
    },
    /// Identity constraint maintenance
    Constraint {
        #[command(subcommand)]
        command: ConstraintCommands,
    },
    /// Load facts from a JSON Lines file
    Ingest(IngestArgs),
}

#[derive(Args, Clone, Debug)]
pub struct MigrateArgs {
    /// JSON batch file
    #[arg(long, short = 'f', conflicts_with = "builtin", required_unless_present = "builtin")]
    pub file: Option<PathBuf>,

    /// Built-in batch name (identity_v2)
    #[arg(long)]
    pub builtin: Option<String>,

    /// Print the statements that would run without executing them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PartitionCommands {
    /// Provision one partition per year in FROM..=TO
    Ensure {
        #[arg(long)]
        from: i32,
        #[arg(long)]
        to: i32,
    },
    /// Show partitions, bounds and identity constraint status
    List,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConstraintCommands {
    /// Move the unique key from OLD to NEW columns on the table and every partition
    Propagate {
        /// Old key columns, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        old: Vec<String>,

        /// New key columns, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        new: Vec<String>,

        /// Name for the new parent constraint
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct IngestArgs {
    /// JSON Lines file, one fact per line
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// data_source for rows that omit it
    #[arg(long)]
    pub source: Option<String>,

    /// Conflict policy (ignore or replace)
    #[arg(long, value_parser = parse_conflict_policy)]
    pub policy: Option<ConflictPolicy>,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub postgres_url: Option<String>,
    pub table: Option<String>,
    pub in_memory: bool,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        postgres_url: cli.postgres_url,
        table: cli.table,
        in_memory: cli.in_memory,
    };
    (config, cli.command)
}
