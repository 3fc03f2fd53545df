//! Command-line interface: call remote methods and check client configuration.

mod commands;
mod utils;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::*;
pub use utils::*;

#[derive(Parser)]
#[command(name = "reactrpc")]
#[command(about = "Call methods on remote objects over the reactrpc binary protocol")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// How `call` waits for its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CallMode {
    /// Await the call as a task
    Await,
    /// Block a worker thread until the result arrives
    Sync,
    /// Return immediately and print from the completion callback
    Callback,
}

/// Connection options; each overrides the file and environment
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long, short = 'p')]
    pub port: Option<String>,

    /// Unix domain socket path
    #[arg(long, short = 's')]
    pub socket: Option<String>,

    #[arg(long)]
    pub token: Option<String>,

    /// json or msgpack
    #[arg(long)]
    pub serializer: Option<String>,

    #[arg(long)]
    pub fallback_serializer: Option<String>,

    #[arg(long)]
    pub max_retries: Option<String>,

    #[arg(long)]
    pub retry_delay_ms: Option<String>,

    #[arg(long)]
    pub timeout_ms: Option<String>,

    /// CA certificate bundle (PEM)
    #[arg(long)]
    pub ssl_ca: Option<String>,

    /// Client private key (PEM), requires --ssl-cert
    #[arg(long)]
    pub ssl_pkey: Option<String>,

    /// Client certificate (PEM), requires --ssl-pkey
    #[arg(long)]
    pub ssl_cert: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Call `object.method` with the given arguments
    Call {
        /// Dotted target, e.g. `test.foo`
        message: String,

        /// Arguments; each is parsed as JSON, or taken as a string
        args: Vec<String>,

        #[arg(long, value_enum, default_value = "await")]
        mode: CallMode,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Validate the effective configuration without connecting
    CheckConfig {
        /// Fail on warnings too
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Call {
                message,
                args,
                mode,
                connection,
            } => call(self.config, connection, message, args, mode).await,

            Commands::CheckConfig { strict, connection } => {
                check_config(self.config, connection, strict).await
            }

            Commands::Version => version().await,
        }
    }
}
