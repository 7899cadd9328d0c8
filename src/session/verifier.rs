use crate::metrics::record_session_verified;
use crate::node::{NodeApi, Protocol, Route, Session, SessionOpenRequest, SessionPath, SessionTarget};
use crate::scope::{Release, ResourceScope};
use crate::session::error::{SessionError, SessionResult};
use crate::session::state_machine::SessionStateMachine;
use crate::session::types::{
    first_difference, padded_message, SessionEvent, SessionVerifierConfig, VerificationReport,
};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Opens a session across a route and checks that everything written into
/// it comes back unchanged.
pub struct SessionVerifier {
    config: SessionVerifierConfig,
}

impl SessionVerifier {
    pub fn new(config: SessionVerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionVerifierConfig {
        &self.config
    }

    /// The full byte sequence written into the session.
    pub fn payload(&self) -> Vec<u8> {
        (0..self.config.message_count)
            .flat_map(|i| padded_message(i, self.config.message_size).into_bytes())
            .collect()
    }

    /// Run one round trip from the route's source to `target` through the
    /// route's relays.
    ///
    /// The opened session is registered in `scope` so it is closed even when
    /// this call fails midway. Transport failures are reported in the
    /// returned report; lifecycle failures (open, listing, close) are errors.
    pub async fn verify(
        &self,
        scope: &mut ResourceScope,
        route: &Route,
        target: SocketAddr,
    ) -> SessionResult<VerificationReport> {
        let machine = SessionStateMachine::new();
        let source = route.source();
        let protocol = self.config.protocol;

        machine.transition(SessionEvent::Open)?;
        let request = SessionOpenRequest {
            destination: route.destination().peer_id.clone(),
            path: SessionPath::IntermediatePath(route.intermediate_path()),
            target: SessionTarget::Plain(target.to_string()),
            capabilities: self.config.capabilities.to_list(),
            listen_host: self.config.listen_host.clone(),
        };

        let session = match source.api.session_open(protocol, &request).await {
            Ok(session) => session,
            Err(e) => {
                machine.transition(SessionEvent::OpenFailed {
                    error: e.to_string(),
                })?;
                record_session_verified("open_failed");
                return Err(SessionError::OpenFailed(e.to_string()));
            }
        };
        let guard = scope.adopt(SessionGuard::new(source.api.clone(), session.clone()));
        machine.transition(SessionEvent::Opened { port: session.port })?;
        info!(
            route = %route.describe(),
            %protocol,
            port = session.port,
            "session opened"
        );

        expect_listed(source.api.as_ref(), protocol, 1).await?;

        let payload = self.payload();
        let addr = session_addr(&session)?;
        let started = Instant::now();
        let exchange = match protocol {
            Protocol::Tcp => exchange_tcp(addr, &payload, self.config.io_timeout).await,
            Protocol::Udp => {
                exchange_udp(addr, &payload, self.config.message_size, self.config.io_timeout).await
            }
        };
        let elapsed = started.elapsed();

        if let Some(error) = &exchange.error {
            warn!(
                port = session.port,
                received = exchange.received.len(),
                expected = payload.len(),
                "session transport failed: {error}"
            );
            machine.transition(SessionEvent::TransportError {
                error: error.clone(),
            })?;
        }
        let state_at_close = machine.current_state();

        machine.transition(SessionEvent::Close)?;
        if !guard.close().await? {
            return Err(SessionError::CloseRejected(session.port));
        }
        machine.transition(SessionEvent::Closed)?;
        expect_listed(source.api.as_ref(), protocol, 0).await?;

        let first_difference = first_difference(&payload, &exchange.received);
        let report = VerificationReport {
            port: session.port,
            bytes_sent: payload.len(),
            bytes_received: exchange.received.len(),
            matched: first_difference.is_none(),
            first_difference,
            transport_error: exchange.error,
            elapsed,
            state_at_close,
        };

        record_session_verified(if report.passed() { "matched" } else { "mismatched" });
        info!(
            port = report.port,
            bytes = report.bytes_received,
            matched = report.matched,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "session verification finished"
        );
        Ok(report)
    }
}

/// Node-side session registered in a [`ResourceScope`].
pub struct SessionGuard {
    api: Arc<dyn NodeApi>,
    session: Session,
    closed: AtomicBool,
}

impl SessionGuard {
    pub fn new(api: Arc<dyn NodeApi>, session: Session) -> Self {
        Self {
            api,
            session,
            closed: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ask the node to close the session. Returns the node's answer; a
    /// session already closed through this guard is not closed again.
    pub async fn close(&self) -> SessionResult<bool> {
        if self.is_closed() {
            return Ok(true);
        }
        let closed = self.api.session_close(&self.session).await?;
        if closed {
            self.closed.store(true, Ordering::SeqCst);
        }
        Ok(closed)
    }
}

#[async_trait]
impl Release for SessionGuard {
    fn label(&self) -> String {
        format!(
            "{} session {}:{}",
            self.session.protocol, self.session.ip, self.session.port
        )
    }

    async fn release(&self) -> anyhow::Result<()> {
        if !self.close().await? {
            anyhow::bail!("node refused to close session on port {}", self.session.port);
        }
        Ok(())
    }
}

async fn expect_listed(api: &dyn NodeApi, protocol: Protocol, expected: usize) -> SessionResult<()> {
    let found = api.session_list(protocol).await?.len();
    if found != expected {
        return Err(SessionError::SessionCountMismatch { expected, found });
    }
    Ok(())
}

fn session_addr(session: &Session) -> SessionResult<SocketAddr> {
    let ip: IpAddr = session
        .ip
        .parse()
        .map_err(|_| SessionError::Transport(format!("invalid session address {}", session.ip)))?;
    // A wildcard bind is reached over loopback
    let ip = if ip.is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        ip
    };
    Ok(SocketAddr::new(ip, session.port))
}

struct Exchange {
    received: Vec<u8>,
    error: Option<String>,
}

impl Exchange {
    fn failed(error: String) -> Self {
        Self {
            received: Vec::new(),
            error: Some(error),
        }
    }
}

async fn exchange_tcp(addr: SocketAddr, payload: &[u8], io_timeout: Duration) -> Exchange {
    let stream = match timeout(io_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Exchange::failed(format!("connect to {addr}: {e}")),
        Err(_) => return Exchange::failed(format!("connect to {addr} timed out")),
    };
    let (mut reader, mut writer) = stream.into_split();

    // Reads run alongside the write so a full echo path never stalls it
    let write = async {
        match timeout(io_timeout, writer.write_all(payload)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("write failed: {e}")),
            Err(_) => Some("write timed out".to_string()),
        }
    };
    let read = async {
        let mut received = Vec::with_capacity(payload.len());
        let mut buf = vec![0u8; 8192];
        while received.len() < payload.len() {
            match timeout(io_timeout, reader.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    return (received, Some("session closed before all bytes arrived".to_string()))
                }
                Ok(Ok(n)) => {
                    received.extend_from_slice(&buf[..n]);
                    debug!(chunk = n, total = received.len(), "session chunk received");
                }
                Ok(Err(e)) => return (received, Some(format!("read failed: {e}"))),
                Err(_) => return (received, Some(format!("no data within {io_timeout:?}"))),
            }
        }
        (received, None)
    };

    let (write_error, (received, read_error)) = tokio::join!(write, read);
    Exchange {
        received,
        error: read_error.or(write_error),
    }
}

async fn exchange_udp(
    addr: SocketAddr,
    payload: &[u8],
    datagram_len: usize,
    io_timeout: Duration,
) -> Exchange {
    let socket = match UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await {
        Ok(socket) => socket,
        Err(e) => return Exchange::failed(format!("bind failed: {e}")),
    };
    if let Err(e) = socket.connect(addr).await {
        return Exchange::failed(format!("connect to {addr}: {e}"));
    }

    let write = async {
        for datagram in payload.chunks(datagram_len) {
            match timeout(io_timeout, socket.send(datagram)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Some(format!("send failed: {e}")),
                Err(_) => return Some("send timed out".to_string()),
            }
        }
        None
    };
    let read = async {
        let mut received = Vec::with_capacity(payload.len());
        let mut buf = vec![0u8; datagram_len.max(crate::echo::STANDARD_MTU_SIZE)];
        while received.len() < payload.len() {
            match timeout(io_timeout, socket.recv(&mut buf)).await {
                Ok(Ok(n)) => received.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return (received, Some(format!("receive failed: {e}"))),
                Err(_) => return (received, Some(format!("no datagram within {io_timeout:?}"))),
            }
        }
        (received, None)
    };

    let (write_error, (received, read_error)) = tokio::join!(write, read);
    Exchange {
        received,
        error: read_error.or(write_error),
    }
}
