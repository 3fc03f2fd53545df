//! In-process test server speaking the wire protocol
//!
//! Exposes one object, `test`:
//! - `test.foo(x)` echoes `x`; `test.foo()` raises a remote exception
//! - `test.echo_all(..)` returns all arguments as an array
//! - `test.bar` is not public
//! - any other namespace is an invalid object

#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Runtime;
use tokio_rustls::TlsAcceptor;

use reactrpc::codec::{Codec, JsonCodec, MessagePackCodec, SerializerKind};
use reactrpc::config::init_test_logging;
use reactrpc::models::{ErrorPayload, RequestFrame, ResponseFrame};
use reactrpc::transport::frame;
use reactrpc::ConnectionConfig;

/// What the server does after reading a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Reply,
    /// Never answer
    Hang,
    /// Close the connection without answering
    Close,
    /// Answer with a frame no codec can decode
    Garbage,
}

#[derive(Clone)]
pub struct ServerOptions {
    pub token: Option<String>,
    pub reply_with: SerializerKind,
    pub behavior: Behavior,
    pub tls: Option<TlsAcceptor>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            token: None,
            reply_with: SerializerKind::Json,
            behavior: Behavior::Reply,
            tls: None,
        }
    }
}

enum Address {
    Tcp(u16),
    Unix(PathBuf),
}

pub struct TestServer {
    address: Address,
    connections: Arc<AtomicUsize>,
    runtime: Option<Runtime>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(ServerOptions::default())
    }

    pub fn start_with(options: ServerOptions) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test server");
        Self::serve_tcp(listener, options)
    }

    /// Start on a specific port, e.g. one a client is already retrying against
    pub fn start_on(port: u16, options: ServerOptions) -> Self {
        let listener =
            std::net::TcpListener::bind(("127.0.0.1", port)).expect("bind test server port");
        Self::serve_tcp(listener, options)
    }

    #[cfg(unix)]
    pub fn start_unix(path: &Path, options: ServerOptions) -> Self {
        let listener = std::os::unix::net::UnixListener::bind(path).expect("bind unix socket");
        listener.set_nonblocking(true).unwrap();

        let runtime = server_runtime();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        runtime.spawn(async move {
            let listener = tokio::net::UnixListener::from_std(listener).unwrap();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(stream, options.clone()));
            }
        });

        Self {
            address: Address::Unix(path.to_path_buf()),
            connections,
            runtime: Some(runtime),
        }
    }

    fn serve_tcp(listener: std::net::TcpListener, options: ServerOptions) -> Self {
        let _ = init_test_logging();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();

        let runtime = server_runtime();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        runtime.spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let options = options.clone();
                tokio::spawn(async move {
                    match options.tls.clone() {
                        Some(acceptor) => {
                            // Handshake failures are the client's to report
                            if let Ok(stream) = acceptor.accept(stream).await {
                                serve_connection(stream, options).await;
                            }
                        }
                        None => serve_connection(stream, options).await,
                    }
                });
            }
        });

        Self {
            address: Address::Tcp(port),
            connections,
            runtime: Some(runtime),
        }
    }

    pub fn port(&self) -> u16 {
        match self.address {
            Address::Tcp(port) => port,
            Address::Unix(_) => panic!("unix test server has no port"),
        }
    }

    /// Client configuration pointing at this server, with fast retries
    pub fn config(&self) -> ConnectionConfig {
        let config = match &self.address {
            Address::Tcp(port) => ConnectionConfig::tcp("127.0.0.1", *port),
            Address::Unix(path) => ConnectionConfig::unix(path.clone()),
        };
        config.with_retry_delay(Duration::from_millis(10))
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn server_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("build test server runtime")
}

/// A port nothing is listening on
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn tls_data(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data/tls")
        .join(name)
}

/// Server-side TLS; with `require_client_cert` the client must present a
/// certificate signed by the test CA
pub fn tls_acceptor(require_client_cert: bool) -> TlsAcceptor {
    use rustls::pki_types::{CertificateDer, PrivateKeyDer};
    use rustls::server::WebPkiClientVerifier;
    use rustls::{RootCertStore, ServerConfig};
    use std::io::BufReader;

    let read_certs = |name: &str| -> Vec<CertificateDer<'static>> {
        let file = std::fs::File::open(tls_data(name)).unwrap();
        rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<_, _>>()
            .unwrap()
    };
    let key: PrivateKeyDer<'static> = {
        let file = std::fs::File::open(tls_data("server.key")).unwrap();
        rustls_pemfile::private_key(&mut BufReader::new(file))
            .unwrap()
            .unwrap()
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap();

    let builder = if require_client_cert {
        let mut roots = RootCertStore::empty();
        roots.add_parsable_certificates(read_certs("ca.pem"));
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .unwrap();
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    let config = builder
        .with_single_cert(read_certs("server.pem"), key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

async fn serve_connection<S>(mut stream: S, options: ServerOptions)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Ok(body) = frame::read(&mut stream).await else {
        return;
    };

    match options.behavior {
        Behavior::Reply => {}
        Behavior::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
        Behavior::Close => return,
        Behavior::Garbage => {
            let _ = frame::write(&mut stream, b"\xc1\xc1 not a response").await;
            return;
        }
    }

    let Some(request) = decode_request(&body) else {
        return;
    };
    let reply = ResponseFrame::new(respond(&request, options.token.as_deref()));
    let body = options
        .reply_with
        .codec()
        .encode_response(&reply)
        .expect("encode test reply");
    let _ = frame::write(&mut stream, &body).await;
}

/// The client may send either format
fn decode_request(body: &[u8]) -> Option<RequestFrame> {
    JsonCodec
        .decode_request(body)
        .or_else(|_| MessagePackCodec.decode_request(body))
        .ok()
}

fn respond(request: &RequestFrame, token: Option<&str>) -> Value {
    if let Some(expected) = token {
        if request.token.as_deref() != Some(expected) {
            return error("InvalidToken", "invalid token");
        }
    }

    let Some((object, method)) = request.message.rsplit_once('.') else {
        return error("InvalidObject", &format!("{} is not a valid target", request.message));
    };
    if object != "test" {
        return error("InvalidObject", &format!("no object registered as '{}'", object));
    }

    match (method, request.args.as_slice()) {
        ("foo", [arg]) => arg.clone(),
        ("foo", args) => {
            let mut payload = ErrorPayload::new(
                "ArgumentError",
                &format!("wrong number of arguments (given {}, expected 1)", args.len()),
            );
            payload.backtrace = vec!["common/mod.rs:12:in foo".to_string()];
            serde_json::to_value(payload).unwrap()
        }
        ("echo_all", args) => Value::Array(args.to_vec()),
        ("bar", _) => error("InvalidMethod", "test.bar is not public"),
        (other, _) => error("InvalidMethod", &format!("undefined method '{}' for test", other)),
    }
}

fn error(kind: &str, message: &str) -> Value {
    json!({
        "exception": true,
        "type": kind,
        "message": message,
    })
}
