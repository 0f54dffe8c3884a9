//! pasta: record an interactive terminal session as a sequence of shell
//! command Actions.
//!
//! Usage:
//!   pasta wrap -- bash -l
//!   pasta config

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use pasta::config::Config;
use pasta::handlers;
use pasta::logging;
use pasta::spool::{self, Options};

#[derive(Parser, Debug)]
#[command(name = "pasta")]
#[command(about = "Record an interactive terminal session as a sequence of shell command Actions")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file, overriding discovery.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for rotated log files; logs go to stderr if unset.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Rotate log files once they exceed this many megabytes.
    #[arg(long, global = true)]
    log_max_size: Option<u64>,

    /// Number of rotated log files to retain.
    #[arg(long, global = true)]
    log_backups: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wrap a command in a pty and record it as a sequence of Actions.
    Wrap {
        /// Disable slave echo mode (by default keystrokes are redrawn by
        /// the terminal, matching an interactive shell).
        #[arg(long)]
        no_echo: bool,

        /// Run the child with this working directory.
        #[arg(long)]
        chdir: Option<PathBuf>,

        /// Abandon the child after this many seconds once it is asked to exit.
        #[arg(long)]
        timeout: Option<u64>,

        /// The command and its arguments.
        #[arg(trailing_var_arg = true, required = true)]
        argv: Vec<String>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load(p).with_context(|| format!("loading config from {}", p.display())),
        None => Config::discover().context("discovering configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let mut logging_config = config.logging.clone();
    if let Some(max_size) = cli.log_max_size {
        logging_config.max_size = max_size;
    }
    if let Some(backups) = cli.log_backups {
        logging_config.backups = backups;
    }

    logging::init(
        &logging_config,
        cli.log_level.as_deref(),
        cli.log_dir.as_deref(),
    )
    .context("initializing logging")?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.render().context("rendering configuration")?);
            Ok(())
        }
        Commands::Wrap {
            no_echo,
            chdir,
            timeout,
            argv,
        } => run_wrap(!no_echo, chdir, timeout, argv).await,
    }
}

async fn run_wrap(
    echo: bool,
    chdir: Option<PathBuf>,
    timeout: Option<u64>,
    argv: Vec<String>,
) -> Result<()> {
    let mut options = Options {
        echo,
        cwd: chdir,
        handlers: handlers::default_registry(),
        ..Options::default()
    };
    if let Some(seconds) = timeout {
        options.timeout = std::time::Duration::from_secs(seconds);
    }

    let outcome = spool::spool(&argv, options)
        .await
        .with_context(|| format!("running {}", argv.join(" ")))?;

    for action in outcome.history.iter() {
        info!(
            id = %action.id,
            elapsed = action.time_elapsed,
            "pasta.action completed"
        );
        tracing::debug!(summary = %action.summary_json(), "pasta.action summary");
    }

    std::process::exit(outcome.exit_code);
}
