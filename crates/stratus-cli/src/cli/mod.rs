//! CLI for the stratus storage engine.

mod commands;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use stratus_core::config;
use stratus_core::LocationMode;

use commands::{run_config, run_get, run_head, run_md5, run_put};
use session::Session;

/// Top-level CLI: drives single storage operations against a primary/secondary
/// endpoint pair.
#[derive(Debug, Parser)]
#[command(name = "stratus")]
#[command(about = "Stratus: retrying storage client with primary/secondary failover", long_about = None)]
pub struct Cli {
    /// Primary endpoint URL (overrides `primary_endpoint` in config.toml).
    #[arg(long, global = true, value_name = "URL")]
    pub primary: Option<String>,

    /// Read-only secondary endpoint URL (overrides `secondary_endpoint`).
    #[arg(long, global = true, value_name = "URL")]
    pub secondary: Option<String>,

    /// Which endpoints reads may use.
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ModeArg>,

    /// Budget for a whole operation including retries, in seconds.
    #[arg(long = "max-time", global = true, value_name = "SECS")]
    pub max_time: Option<u64>,

    /// Print the result record of every attempt to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a blob to stdout or a file.
    Get {
        /// Resource path relative to the endpoint, e.g. `container/blob`.
        path: String,

        /// Write the blob to this file instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Show a blob's properties, or report that it does not exist.
    Head {
        /// Resource path relative to the endpoint.
        path: String,
    },

    /// Upload a file (always sent to the primary endpoint).
    Put {
        /// Resource path relative to the endpoint.
        path: String,

        /// Local file to upload.
        file: PathBuf,
    },

    /// Print the base64 Content-MD5 of a local file.
    Md5 {
        /// Path to the file.
        file: PathBuf,
    },

    /// Show the config file location and the effective settings.
    Config,
}

/// Command-line spelling of `LocationMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    PrimaryOnly,
    PrimaryThenSecondary,
    SecondaryOnly,
    SecondaryThenPrimary,
}

impl From<ModeArg> for LocationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PrimaryOnly => LocationMode::PrimaryOnly,
            ModeArg::PrimaryThenSecondary => LocationMode::PrimaryThenSecondary,
            ModeArg::SecondaryOnly => LocationMode::SecondaryOnly,
            ModeArg::SecondaryThenPrimary => LocationMode::SecondaryThenPrimary,
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!(
            primary = cfg.primary_endpoint.as_deref().unwrap_or("-"),
            secondary = cfg.secondary_endpoint.as_deref().unwrap_or("-"),
            mode = ?cfg.location_mode,
            "loaded config"
        );

        match &cli.command {
            CliCommand::Get { path, out } => {
                let session = Session::new(&cli, &cfg)?;
                run_get(&session, path, out.as_deref()).await?;
            }
            CliCommand::Head { path } => {
                let session = Session::new(&cli, &cfg)?;
                run_head(&session, path).await?;
            }
            CliCommand::Put { path, file } => {
                let session = Session::new(&cli, &cfg)?;
                run_put(&session, path, file).await?;
            }
            CliCommand::Md5 { file } => run_md5(file).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
