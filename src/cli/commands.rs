//! CLI command implementations.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::utils::{load_connection_config, parse_call_args, print_result};
use super::{CallMode, ConnectionArgs};
use crate::client::Client;
use crate::config::ConfigurationValidator;

/// Call a remote method and print its result
pub async fn call(
    config_path: Option<PathBuf>,
    connection: ConnectionArgs,
    message: String,
    args: Vec<String>,
    mode: CallMode,
) -> Result<()> {
    let config = load_connection_config(config_path, &connection)?;
    let client = Arc::new(Client::new(config)?);
    let args = parse_call_args(&args);

    info!("Calling {} with {} argument(s)", message, args.len());

    let result = match mode {
        CallMode::Await => client.call(&message, args).await,
        CallMode::Sync => {
            let client = Arc::clone(&client);
            tokio::task::spawn_blocking(move || client.call_sync(&message, args)).await?
        }
        CallMode::Callback => {
            let (tx, rx) = oneshot::channel();
            client.call_with(&message, args, move |result| {
                let _ = tx.send(result);
            });
            rx.await
                .map_err(|_| anyhow::anyhow!("call was dropped before completing"))?
        }
    };

    match result {
        Ok(value) => print_result(&value),
        Err(e) => anyhow::bail!("{}: {}", e.kind(), e.user_message()),
    }
}

/// Validate the effective configuration, including TLS material, without connecting
pub async fn check_config(
    config_path: Option<PathBuf>,
    connection: ConnectionArgs,
    strict: bool,
) -> Result<()> {
    let config = load_connection_config(config_path, &connection)?;

    let mut validator = ConfigurationValidator::new(strict);
    let outcome = validator.validate_connection(&config);

    for warning in validator.warnings() {
        warn!("{}", warning);
        println!("warning: {}", warning);
    }
    outcome?;

    config.tls().connector()?;
    let endpoint = config.endpoint()?;

    println!("✓ Configuration is valid");
    println!("  Endpoint: {}", endpoint);
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

/// Show version information
pub async fn version() -> Result<()> {
    println!("reactrpc {}", env!("CARGO_PKG_VERSION"));
    println!("Binary RPC client with a single-reactor connection model");
    Ok(())
}
