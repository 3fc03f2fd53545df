//! TLS client setup
//!
//! Material comes in two shapes: a CA bundle alone (verify the server only) or
//! CA bundle + certificate + private key (mutual TLS).

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::BoxedStream;
use crate::{RpcError, RpcResult};

/// TLS material paths as given in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub ca: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub certificate: Option<PathBuf>,
}

/// Which TLS flavor a set of material selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Disabled,
    ServerVerification,
    Mutual,
}

impl TlsSettings {
    /// Classify the material. Any combination other than none, CA only, or all
    /// three is a configuration error.
    pub fn mode(&self) -> RpcResult<TlsMode> {
        match (&self.ca, &self.private_key, &self.certificate) {
            (None, None, None) => Ok(TlsMode::Disabled),
            (Some(_), None, None) => Ok(TlsMode::ServerVerification),
            (Some(_), Some(_), Some(_)) => Ok(TlsMode::Mutual),
            (None, _, _) => Err(RpcError::configuration(
                "ssl_pkey/ssl_cert require ssl_ca to verify the server",
            )),
            _ => Err(RpcError::configuration(
                "mutual TLS needs both ssl_pkey and ssl_cert",
            )),
        }
    }

    /// Load the PEM files and build a connector, or `None` when TLS is off
    pub fn connector(&self) -> RpcResult<Option<TlsConnector>> {
        let mode = self.mode()?;
        let ca = match (&self.ca, mode) {
            (Some(ca), TlsMode::ServerVerification | TlsMode::Mutual) => ca,
            _ => return Ok(None),
        };

        let mut roots = RootCertStore::empty();
        let ca_certs = load_certs(ca)?;
        let (added, ignored) = roots.add_parsable_certificates(ca_certs);
        if added == 0 {
            return Err(RpcError::configuration(format!(
                "no usable CA certificates in {}",
                ca.display()
            )));
        }
        debug!("Loaded {} CA certificates ({} ignored)", added, ignored);

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| RpcError::configuration(format!("TLS setup failed: {}", e)))?
            .with_root_certificates(roots);

        let config = match (&self.certificate, &self.private_key) {
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)
                .map_err(|e| RpcError::configuration(format!("invalid client certificate/key: {}", e)))?,
            _ => builder.with_no_client_auth(),
        };

        Ok(Some(TlsConnector::from(Arc::new(config))))
    }
}

/// Perform the client side of the handshake on an established stream
pub async fn handshake(
    connector: &TlsConnector,
    server_name: &str,
    stream: BoxedStream,
) -> io::Result<BoxedStream> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let tls_stream = connector.connect(name, stream).await?;
    Ok(Box::new(tls_stream))
}

fn load_certs(path: &Path) -> RpcResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        RpcError::configuration(format!("cannot read certificate {}: {}", path.display(), e))
    })?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RpcError::configuration(format!("invalid PEM in {}: {}", path.display(), e)))
}

fn load_private_key(path: &Path) -> RpcResult<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        RpcError::configuration(format!("cannot read private key {}: {}", path.display(), e))
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| RpcError::configuration(format!("invalid PEM in {}: {}", path.display(), e)))?
        .ok_or_else(|| RpcError::configuration(format!("no private key found in {}", path.display())))
}
