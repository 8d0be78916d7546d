//! In-process scripted mail server for integration testing
//!
//! Unlike a full protocol implementation, the fake server replays a
//! script: it sends greeting bytes, waits for client lines matching
//! an expected needle, and answers with canned replies. Because the
//! client under test allocates tags deterministically (`a0`, `a1`,
//! ...), scripts can spell out exact tagged responses.
//!
//! A script step can also upgrade the connection to TLS mid-session
//! (STARTTLS/STLS testing) using a self-signed certificate generated
//! with `rcgen` at startup.

use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// One step of a server script.
#[derive(Debug, Clone)]
pub enum Step {
    /// Send these bytes immediately (greetings, unsolicited pushes).
    Send(&'static str),
    /// Read client lines until one contains `needle`, then send
    /// `reply`.
    Expect {
        needle: &'static str,
        reply: &'static str,
    },
    /// Perform the server side of a TLS handshake; the rest of the
    /// script runs over TLS. At most one upgrade per script.
    UpgradeTls,
}

/// Convenience constructor for the common expect/reply step.
pub fn step(needle: &'static str, reply: &'static str) -> Step {
    Step::Expect { needle, reply }
}

/// A scripted server on an OS-assigned localhost port.
pub struct ScriptServer {
    port: u16,
    /// Handle to the background task so it lives as long as the
    /// server.
    _handle: tokio::task::JoinHandle<()>,
}

impl ScriptServer {
    /// Start the server and serve the script to the first connection.
    pub async fn start(script: Vec<Step>) -> Self {
        // Ensure the ring crypto provider is installed process-wide.
        // Multiple tests may race to install it, so we ignore the
        // error if it's already set.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let acceptor = tls_acceptor();
        let handle = tokio::spawn(async move {
            let Ok((stream, _addr)) = listener.accept().await else {
                return;
            };
            serve(stream, script, &acceptor).await;
        });

        Self {
            port,
            _handle: handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }
}

/// Build a TLS acceptor with a fresh self-signed certificate for
/// 127.0.0.1.
fn tls_acceptor() -> TlsAcceptor {
    let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
        .expect("generate self-signed cert");

    let cert_der = cert.cert.der().clone();
    let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der.into())
        .expect("build server TLS config");

    TlsAcceptor::from(Arc::new(tls_config))
}

/// Replay the plaintext phase; on [`Step::UpgradeTls`] hand the
/// remaining steps to a TLS-wrapped continuation.
async fn serve(stream: tokio::net::TcpStream, script: Vec<Step>, acceptor: &TlsAcceptor) {
    let mut reader = BufReader::new(stream);
    let mut steps = script.into_iter();
    while let Some(current) = steps.next() {
        match current {
            Step::UpgradeTls => {
                let tcp = reader.into_inner();
                let Ok(tls_stream) = acceptor.accept(tcp).await else {
                    return;
                };
                run_steps(BufReader::new(tls_stream), steps).await;
                return;
            }
            other => {
                if run_step(&mut reader, &other).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Replay steps over an established stream. A second upgrade is not
/// supported and ends the script.
async fn run_steps<S: AsyncRead + AsyncWrite + Unpin>(
    mut reader: BufReader<S>,
    steps: std::vec::IntoIter<Step>,
) {
    for current in steps {
        match current {
            Step::UpgradeTls => return,
            other => {
                if run_step(&mut reader, &other).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn run_step<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    current: &Step,
) -> std::io::Result<()> {
    match current {
        Step::Send(text) => write_all(reader, text).await,
        Step::Expect { needle, reply } => {
            loop {
                let mut line = String::new();
                let n = reader.read_line(&mut line).await?;
                if n == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "client closed before the expected line",
                    ));
                }
                if line.contains(needle) {
                    break;
                }
            }
            write_all(reader, reply).await
        }
        Step::UpgradeTls => Ok(()),
    }
}

async fn write_all<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    text: &str,
) -> std::io::Result<()> {
    reader.get_mut().write_all(text.as_bytes()).await?;
    reader.get_mut().flush().await
}
