//! Command-line interface for partition-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and precedence (arguments over environment over file)
//! - Local subcommands that need no connection (version, completion, config)

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::connection::redact_endpoint;
use crate::domain::FieldKind;
use crate::error::Result;

pub mod completion;

/// Extract database name from MongoDB connection URI
///
/// # Arguments
/// * `uri` - MongoDB connection URI
///
/// # Returns
/// * `Option<String>` - Database name if found in URI
fn extract_database_from_uri(uri: &str) -> Option<String> {
    // Format: mongodb://[username:password@]host[:port][/database][?options]
    let after_scheme = uri.split("://").nth(1)?;
    let path_part = after_scheme.split('/').nth(1)?;
    let db_name = path_part.split('?').next().unwrap_or("");
    if db_name.is_empty() {
        None
    } else {
        Some(db_name.to_string())
    }
}

/// Partitioned export of large MongoDB-backed search indexes
#[derive(Parser, Debug)]
#[command(
    name = "partition-export",
    version,
    about = "Export a large index in count-bounded partitions",
    long_about = "Discovers the value range of an ordering field, splits it into partitions
small enough for the service's result window, and exports them concurrently."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Service endpoint (mongodb:// or mongodb+srv:// URI)
    #[arg(long, value_name = "URI", global = true)]
    pub endpoint: Option<String>,

    /// Database holding the index
    #[arg(long, value_name = "NAME", global = true)]
    pub database: Option<String>,

    /// Index (collection) name
    #[arg(long = "index", value_name = "NAME", global = true)]
    pub index_name: Option<String>,

    /// Ordering field used as the partition key
    #[arg(long = "field", value_name = "FIELD", global = true)]
    pub field_name: Option<String>,

    /// Kind of the ordering field (integer, float, timestamp, string)
    #[arg(long, value_name = "KIND", global = true)]
    pub field_kind: Option<FieldKind>,

    /// Directory for the manifest and exported files
    #[arg(long = "export-dir", value_name = "DIR", global = true)]
    pub export_dir: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for partition-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the smallest and largest value of the ordering field
    Bounds,

    /// Generate the partition manifest
    Partition(PartitionArgs),

    /// Export the partitions of a manifest
    Export(ExportArgs),

    /// Generate the manifest, then export it
    Run {
        #[command(flatten)]
        partition: PartitionArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration
        #[arg(long)]
        validate: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// Options of partition generation
#[derive(Args, Debug, Clone, Default)]
pub struct PartitionArgs {
    /// Maximum documents per partition
    #[arg(long, value_name = "N")]
    pub max_partition_size: Option<u64>,
}

/// Options of the export job
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// Manifest file (defaults to {export-dir}/{index}-partitions.json)
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Partitions exported in parallel
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Documents per result page
    #[arg(long, value_name = "N")]
    pub page_size: Option<u32>,

    /// Only export these partition ids
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub include_partitions: Vec<usize>,

    /// Skip these partition ids
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub exclude_partitions: Vec<usize>,

    /// Only request these fields
    #[arg(long, value_name = "FIELDS", value_delimiter = ',')]
    pub include_fields: Vec<String>,

    /// Do not request these fields
    #[arg(long, value_name = "FIELDS", value_delimiter = ',')]
    pub exclude_fields: Vec<String>,

    /// Display a progress bar
    #[arg(long)]
    pub progress: bool,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file, environment and arguments
    ///
    /// Validation is left to the commands that contact the index, so local
    /// subcommands work with an incomplete configuration.
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env();
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    /// Get the configuration
    ///
    /// # Returns
    /// * `&Config` - Reference to configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    ///
    /// # Returns
    /// * `&CliArgs` - Reference to arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Manifest file used by `export`
    pub fn manifest_path(&self) -> PathBuf {
        let explicit = match &self.args.command {
            Commands::Export(export) | Commands::Run { export, .. } => export.manifest.clone(),
            _ => None,
        };
        explicit.unwrap_or_else(|| self.config.manifest_path())
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    ///
    /// # Arguments
    /// * `config` - Configuration to modify
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_source_args(config, args);
        Self::apply_logging_args(config, args);

        match &args.command {
            Commands::Partition(partition) => Self::apply_partition_args(config, partition),
            Commands::Export(export) => Self::apply_export_args(config, export),
            Commands::Run { partition, export } => {
                Self::apply_partition_args(config, partition);
                Self::apply_export_args(config, export);
            }
            _ => {}
        }
    }

    /// Apply source and field arguments to configuration
    fn apply_source_args(config: &mut Config, args: &CliArgs) {
        if let Some(endpoint) = &args.endpoint {
            config.source.endpoint = endpoint.clone();
        }
        if let Some(database) = &args.database {
            config.source.database = database.clone();
        }
        if config.source.database.is_empty() {
            if let Some(db) = extract_database_from_uri(&config.source.endpoint) {
                config.source.database = db;
            }
        }
        if let Some(index) = &args.index_name {
            config.source.index_name = index.clone();
        }
        if let Some(field) = &args.field_name {
            config.partition.field_name = field.clone();
        }
        if let Some(kind) = args.field_kind {
            config.partition.field_kind = kind;
        }
        if let Some(dir) = &args.export_dir {
            config.export.directory = dir.clone();
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_partition_args(config: &mut Config, args: &PartitionArgs) {
        if let Some(size) = args.max_partition_size {
            config.partition.max_partition_size = size;
        }
    }

    fn apply_export_args(config: &mut Config, args: &ExportArgs) {
        if let Some(concurrency) = args.concurrency {
            config.export.concurrency = concurrency;
        }
        if let Some(page_size) = args.page_size {
            config.export.page_size = page_size;
        }
        if !args.include_partitions.is_empty() {
            config.export.include_partitions = args.include_partitions.clone();
        }
        if !args.exclude_partitions.is_empty() {
            config.export.exclude_partitions = args.exclude_partitions.clone();
        }
        if !args.include_fields.is_empty() {
            config.export.include_fields = args.include_fields.clone();
        }
        if !args.exclude_fields.is_empty() {
            config.export.exclude_fields = args.exclude_fields.clone();
        }
        if args.progress {
            config.export.show_progress = true;
        }
    }

    /// Handle subcommands that need no connection
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_local_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Commands::Version => {
                self.show_version();
                Ok(true)
            }
            Commands::Completion { shell } => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Commands::Config { show, validate } => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("partition-export version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or the validation error
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if show || !validate {
            self.show_config()?;
        }

        if validate {
            self.config.validate()?;
            println!("Configuration is valid");
            if self.config.partitions_exceed_window() {
                println!(
                    "Warning: max_partition_size {} exceeds max_result_window {}",
                    self.config.partition.max_partition_size, self.config.source.max_result_window
                );
            }
        }

        Ok(())
    }

    /// Show effective configuration with credentials masked
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.get_config_path().display());
        println!();

        let mut shown = self.config.clone();
        shown.source.endpoint = redact_endpoint(&shown.source.endpoint);
        if shown.source.password.is_some() {
            shown.source.password = Some("***".to_string());
        }
        println!("{}", shown.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}
