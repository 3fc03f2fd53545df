use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::codec::SerializerKind;
use crate::transport::{Endpoint, TlsSettings};
use crate::{RpcError, RpcResult};

pub const DEFAULT_MAX_RETRIES: u32 = 9;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Connection options for a single client.
///
/// Exactly one addressing mode must be usable: `host` + `port` for TCP, or
/// `socket_path` for a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_addressing"))]
#[serde(default)]
pub struct ConnectionConfig {
    #[validate(length(min = 1))]
    pub host: Option<String>,

    #[serde(deserialize_with = "deserialize_port")]
    #[validate(range(min = 1))]
    pub port: Option<u16>,

    #[serde(alias = "socket")]
    pub socket_path: Option<PathBuf>,

    /// Forwarded with every request for server-side authentication
    pub token: Option<String>,

    pub serializer: SerializerKind,

    /// Tried when a response cannot be decoded with `serializer`
    pub fallback_serializer: Option<SerializerKind>,

    /// Additional connection attempts after a refused connection
    pub max_retries: u32,

    pub retry_delay_ms: u64,

    /// Per-call deadline covering every attempt; none waits indefinitely
    pub timeout_ms: Option<u64>,

    pub ssl_ca: Option<PathBuf>,
    pub ssl_pkey: Option<PathBuf>,
    pub ssl_cert: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            socket_path: None,
            token: None,
            serializer: SerializerKind::Json,
            fallback_serializer: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            timeout_ms: None,
            ssl_ca: None,
            ssl_pkey: None,
            ssl_cert: None,
        }
    }
}

impl ConnectionConfig {
    /// TCP configuration for `host:port`
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Unix domain socket configuration
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_fallback_serializer(mut self, serializer: SerializerKind) -> Self {
        self.fallback_serializer = Some(serializer);
        self
    }

    pub fn with_tls(
        mut self,
        ca: impl Into<PathBuf>,
        client_identity: Option<(PathBuf, PathBuf)>,
    ) -> Self {
        self.ssl_ca = Some(ca.into());
        if let Some((pkey, cert)) = client_identity {
            self.ssl_pkey = Some(pkey);
            self.ssl_cert = Some(cert);
        }
        self
    }

    /// Set an option from its textual form, as given on a command line or in the environment
    pub fn set(&mut self, key: &str, value: &str) -> RpcResult<()> {
        match key {
            "host" => self.host = Some(value.to_string()),
            "port" => self.port = Some(parse_port(value)?),
            "socket" | "socket_path" => self.socket_path = Some(PathBuf::from(value)),
            "token" => self.token = Some(value.to_string()),
            "serializer" => self.serializer = value.parse()?,
            "fallback_serializer" => self.fallback_serializer = Some(value.parse()?),
            "max_retries" => self.max_retries = parse_number(key, value)?,
            "retry_delay_ms" => self.retry_delay_ms = parse_number(key, value)?,
            "timeout_ms" => self.timeout_ms = Some(parse_number(key, value)?),
            "ssl_ca" => self.ssl_ca = Some(PathBuf::from(value)),
            "ssl_pkey" => self.ssl_pkey = Some(PathBuf::from(value)),
            "ssl_cert" => self.ssl_cert = Some(PathBuf::from(value)),
            other => {
                return Err(RpcError::configuration(format!("Unknown option: {}", other)));
            }
        }
        Ok(())
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> RpcResult<Self> {
        toml::from_str(content)
            .map_err(|e| RpcError::configuration(format!("Failed to parse configuration: {}", e)))
    }

    /// Load from a TOML file (default location if `path` is `None` and the
    /// file exists), then apply `REACTRPC_*` environment overrides
    pub fn load(path: Option<&Path>) -> RpcResult<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(RpcError::configuration(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => Some(Self::config_path()).filter(|path| path.exists()),
        };

        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    RpcError::configuration(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        if let Ok(custom_path) = std::env::var("REACTRPC_CONFIG_PATH") {
            PathBuf::from(custom_path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("reactrpc")
                .join("client.toml")
        }
    }

    pub fn apply_env_overrides(&mut self) -> RpcResult<()> {
        for key in OPTION_NAMES {
            let var = format!("REACTRPC_{}", key.to_uppercase());
            if let Ok(value) = std::env::var(&var) {
                self.set(key, &value)?;
            }
        }
        Ok(())
    }

    /// Resolve the addressing mode. Call after validation.
    pub fn endpoint(&self) -> RpcResult<Endpoint> {
        match (&self.host, self.port, &self.socket_path) {
            (Some(host), Some(port), None) => Ok(Endpoint::Tcp {
                host: host.clone(),
                port,
            }),
            (None, None, Some(path)) => Ok(Endpoint::Unix { path: path.clone() }),
            _ => Err(RpcError::configuration(
                "exactly one of host+port or socket_path must be given",
            )),
        }
    }

    pub fn tls(&self) -> TlsSettings {
        TlsSettings {
            ca: self.ssl_ca.clone(),
            private_key: self.ssl_pkey.clone(),
            certificate: self.ssl_cert.clone(),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Option names accepted by [`ConnectionConfig::set`] and the environment
pub const OPTION_NAMES: [&str; 12] = [
    "host",
    "port",
    "socket_path",
    "token",
    "serializer",
    "fallback_serializer",
    "max_retries",
    "retry_delay_ms",
    "timeout_ms",
    "ssl_ca",
    "ssl_pkey",
    "ssl_cert",
];

/// Parse a port given as text
pub fn parse_port(value: &str) -> RpcResult<u16> {
    let port: u16 = value
        .trim()
        .parse()
        .map_err(|_| RpcError::configuration(format!("invalid port '{}': expected 1-65535", value)))?;
    if port == 0 {
        return Err(RpcError::configuration("invalid port '0': expected 1-65535"));
    }
    Ok(port)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> RpcResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RpcError::configuration(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

/// Accept the port as a TOML integer or string
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(i64),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port {}: expected 1-65535", n))),
        Some(PortValue::Text(text)) => parse_port(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn address_error(message: &'static str) -> ValidationError {
    let mut error = ValidationError::new("address");
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Cross-field rule: exactly one usable addressing mode
fn validate_addressing(config: &ConnectionConfig) -> Result<(), ValidationError> {
    match (&config.host, config.port, &config.socket_path) {
        (Some(_), Some(_), None) | (None, None, Some(_)) => Ok(()),
        (None, None, None) => Err(address_error(
            "no connection information: give host and port, or socket_path",
        )),
        (Some(_), None, _) => Err(address_error("host given without a port")),
        (None, Some(_), _) => Err(address_error("port given without a host")),
        (Some(_), Some(_), Some(_)) => Err(address_error(
            "host/port and socket_path are mutually exclusive",
        )),
    }
}

/// Flatten validator output into one readable line
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| match &error.message {
                Some(message) => message.to_string(),
                None => format!("{}: failed '{}' check", field, error.code),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}
