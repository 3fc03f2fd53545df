//! Connection configuration validation
//!
//! Runs before any connection attempt. Errors make client construction fail;
//! warnings are logged and only fail in strict mode.

use std::path::Path;
use tracing::{error, info, warn};
use validator::Validate;

use crate::config::settings::{describe_validation_errors, ConnectionConfig};
use crate::{RpcError, RpcResult};

/// Retry counts above this get a warning
const HIGH_RETRY_COUNT: u32 = 100;

pub struct ConfigurationValidator {
    /// Whether to perform strict validation (fails on warnings)
    strict_mode: bool,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigurationValidator {
    pub fn new(strict_mode: bool) -> Self {
        Self {
            strict_mode,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Validate a complete connection configuration
    pub fn validate_connection(&mut self, config: &ConnectionConfig) -> RpcResult<()> {
        if let Err(errors) = config.validate() {
            self.errors.push(describe_validation_errors(&errors));
        }

        self.validate_socket_path(config);
        self.validate_tls(config);
        self.validate_retries(config);
        self.validate_timeout(config);

        self.log_summary();

        if !self.errors.is_empty() {
            return Err(RpcError::configuration(self.errors.join("; ")));
        }

        if self.strict_mode && !self.warnings.is_empty() {
            return Err(RpcError::configuration(format!(
                "strict mode: {}",
                self.warnings.join("; ")
            )));
        }

        Ok(())
    }

    fn validate_socket_path(&mut self, config: &ConnectionConfig) {
        let Some(path) = &config.socket_path else {
            return;
        };

        if path.as_os_str().is_empty() {
            self.errors.push("socket_path is empty".to_string());
            return;
        }

        if !path.is_absolute() {
            self.errors.push(format!(
                "socket_path must be absolute: {}",
                path.display()
            ));
            return;
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                self.errors.push(format!(
                    "socket directory does not exist: {}",
                    parent.display()
                ));
            }
        }
    }

    fn validate_tls(&mut self, config: &ConnectionConfig) {
        let tls = config.tls();
        if let Err(e) = tls.mode() {
            self.errors.push(e.to_string());
            return;
        }

        for (name, path) in [
            ("ssl_ca", &tls.ca),
            ("ssl_pkey", &tls.private_key),
            ("ssl_cert", &tls.certificate),
        ] {
            if let Some(path) = path {
                if !Path::new(path).is_file() {
                    self.errors.push(format!("{} file not found: {}", name, path.display()));
                }
            }
        }

        if tls.ca.is_some() && config.socket_path.is_some() {
            self.warnings.push(
                "TLS over a Unix socket verifies the server as 'localhost'".to_string(),
            );
        }
    }

    fn validate_retries(&mut self, config: &ConnectionConfig) {
        if config.max_retries > HIGH_RETRY_COUNT {
            self.warnings.push(format!(
                "max_retries is very high ({}). Refused connections will be retried for a long time",
                config.max_retries
            ));
        }

        if config.retry_delay_ms == 0 && config.max_retries > 0 {
            self.warnings.push("retry_delay_ms is 0; retries will hammer the server".to_string());
        }
    }

    fn validate_timeout(&mut self, config: &ConnectionConfig) {
        match config.timeout_ms {
            None => self.warnings.push(
                "no timeout_ms set; calls to an unresponsive server wait indefinitely".to_string(),
            ),
            Some(0) => self.errors.push("timeout_ms must be greater than 0".to_string()),
            Some(_) => {}
        }
    }

    fn log_summary(&self) {
        for warning in &self.warnings {
            warn!("Configuration warning: {}", warning);
        }
        for error in &self.errors {
            error!("Configuration error: {}", error);
        }

        if self.warnings.is_empty() && self.errors.is_empty() {
            info!("Connection configuration validated with no issues");
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Quick validation function for use at client construction
pub fn validate_configuration(config: &ConnectionConfig, strict: bool) -> RpcResult<()> {
    let mut validator = ConfigurationValidator::new(strict);
    validator.validate_connection(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    fn tcp_config() -> ConnectionConfig {
        ConnectionConfig::tcp("localhost", 7331).with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_valid_configuration() {
        let mut validator = ConfigurationValidator::new(true);
        assert!(validator.validate_connection(&tcp_config()).is_ok());
        assert!(validator.warnings().is_empty());
    }

    #[test]
    fn test_relative_socket_path() {
        let config = ConnectionConfig::unix("blah");
        let err = validate_configuration(&config, false).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_socket_in_missing_directory() {
        let config = ConnectionConfig::unix("/non/existent/dir/rpc.sock");
        assert!(validate_configuration(&config, false).is_err());
    }

    #[test]
    fn test_socket_in_existing_directory() {
        let dir = tempdir().unwrap();
        let config = ConnectionConfig::unix(dir.path().join("rpc.sock"));
        assert!(validate_configuration(&config, false).is_ok());
    }

    #[test]
    fn test_root_socket_path_passes_validation() {
        // "/" has no parent; it is only rejected when connecting
        let config = ConnectionConfig::unix("/");
        assert!(validate_configuration(&config, false).is_ok());
    }

    #[test]
    fn test_partial_tls_material() {
        let mut config = tcp_config();
        config.ssl_pkey = Some(PathBuf::from("/tmp/key.pem"));

        let mut validator = ConfigurationValidator::new(false);
        assert!(validator.validate_connection(&config).is_err());
        assert!(!validator.errors().is_empty());
    }

    #[test]
    fn test_missing_tls_file() {
        let config = tcp_config().with_tls("/nonexistent/ca.pem", None);
        let err = validate_configuration(&config, false).unwrap_err();
        assert!(err.to_string().contains("ssl_ca file not found"));
    }

    #[test]
    fn test_strict_mode_warnings() {
        let config = ConnectionConfig::tcp("localhost", 7331);

        let mut lenient = ConfigurationValidator::new(false);
        assert!(lenient.validate_connection(&config).is_ok());
        assert!(!lenient.warnings().is_empty(), "missing timeout should warn");

        let mut strict = ConfigurationValidator::new(true);
        assert!(strict.validate_connection(&config).is_err());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ConnectionConfig::unix("relative.sock");
        config.ssl_cert = Some(PathBuf::from("/tmp/cert.pem"));
        config.timeout_ms = Some(0);

        let mut validator = ConfigurationValidator::new(false);
        assert!(validator.validate_connection(&config).is_err());
        assert_eq!(validator.errors().len(), 3);
    }
}
