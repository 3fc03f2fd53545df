//! CLI utility functions.

use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use super::ConnectionArgs;
use crate::config::ConnectionConfig;

/// Load configuration with hierarchy (CLI flags > environment > file > defaults)
pub fn load_connection_config(
    config_path: Option<PathBuf>,
    overrides: &ConnectionArgs,
) -> Result<ConnectionConfig> {
    match &config_path {
        Some(path) => info!("Using config file: {}", path.display()),
        None => {
            let path = ConnectionConfig::config_path();
            if path.exists() {
                info!("Using default config file: {}", path.display());
            } else {
                info!("No config file found at {}, using defaults", path.display());
            }
        }
    }

    let mut config = ConnectionConfig::load(config_path.as_deref())?;

    let flags = [
        ("host", &overrides.host),
        ("port", &overrides.port),
        ("socket_path", &overrides.socket),
        ("token", &overrides.token),
        ("serializer", &overrides.serializer),
        ("fallback_serializer", &overrides.fallback_serializer),
        ("max_retries", &overrides.max_retries),
        ("retry_delay_ms", &overrides.retry_delay_ms),
        ("timeout_ms", &overrides.timeout_ms),
        ("ssl_ca", &overrides.ssl_ca),
        ("ssl_pkey", &overrides.ssl_pkey),
        ("ssl_cert", &overrides.ssl_cert),
    ];
    for (key, value) in flags {
        if let Some(value) = value {
            config.set(key, value)?;
        }
    }

    Ok(config)
}

/// Parse positional call arguments: JSON when it parses, a plain string otherwise
pub fn parse_call_args(args: &[String]) -> Vec<Value> {
    args.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}

/// Print a call result as pretty JSON
pub fn print_result(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
