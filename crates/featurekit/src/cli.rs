//! CLI argument parsing and dispatch

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

use crate::commands::cache::{execute_cache, CacheArgs};
use crate::commands::list::{execute_list, ListArgs};
use crate::commands::resolved::{execute_resolved, ResolvedArgs};
use crate::commands::show::{execute_show, ShowArgs};
use crate::commands::RepositoryOptions;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

/// Feature repository subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List installed features
    List {
        /// Only show public features
        #[arg(long)]
        public: bool,
        /// Print one JSON document instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one feature, looked up by feature name or symbolic name
    Show {
        /// Feature name (e.g. `servlet-4.0`, `usr:myFeature-1.0`) or symbolic name
        name: String,
    },
    /// Show or record the last resolved feature sets
    Resolved {
        /// Record these names as both the resolved and the configured set
        #[arg(long, num_args = 1..)]
        set: Vec<String>,
        /// Platforms to record alongside `--set`
        #[arg(long, action = clap::ArgAction::Append)]
        platform: Vec<String>,
    },
    /// Inspect or clear the feature cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// Cache subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommands {
    /// Print cache location, version and contents summary
    Info,
    /// Delete the cache file
    Clear,
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Feature repository inspection tool",
    long_about = "Feature repository inspection tool\n\nScans feature manifests of an install, maintains the binary feature cache and prints what a resolver would see.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Repository configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Install root containing lib/features and lib/platform
    #[arg(long, global = true)]
    pub install_root: Option<PathBuf>,

    /// Root of the `usr` extension repository
    #[arg(long, global = true)]
    pub usr_root: Option<PathBuf>,

    /// Binary cache file location
    #[arg(long, global = true)]
    pub cache_file: Option<PathBuf>,

    /// Enable platform tracking (cache version 4)
    #[arg(long, global = true)]
    pub platform_support: bool,

    /// Log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        let log_level = match self.log_level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        if std::env::var_os("FEATUREKIT_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("featurekit={},featurekit_core={}", log_level, log_level),
            );
        }
        featurekit_core::logging::init(log_format)?;

        let options = RepositoryOptions {
            config: self.config,
            install_root: self.install_root,
            usr_root: self.usr_root,
            cache_file: self.cache_file,
            platform_support: self.platform_support,
        };
        debug!(?options, "Dispatching command");

        match self.command {
            Commands::List { public, json } => execute_list(ListArgs {
                options,
                public_only: public,
                json,
            }),
            Commands::Show { name } => execute_show(ShowArgs { options, name }),
            Commands::Resolved { set, platform } => execute_resolved(ResolvedArgs {
                options,
                set: if set.is_empty() { None } else { Some(set) },
                platforms: platform,
            }),
            Commands::Cache { command } => execute_cache(CacheArgs { options, command }),
        }
    }
}
