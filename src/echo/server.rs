//! Loopback echo endpoint used as the session target.

use crate::echo::capture::PacketCapture;
use crate::echo::error::{EchoError, EchoResult};
use crate::node::Protocol;
use crate::scope::Release;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

/// Standard Ethernet MTU, the default echo read size.
pub const STANDARD_MTU_SIZE: usize = 1500;

#[derive(Debug, Clone)]
pub struct EchoConfig {
    pub protocol: Protocol,
    /// Size of a single read from the socket
    pub recv_buf_len: usize,
    /// Capture loopback traffic into this directory when set
    pub capture_dir: Option<PathBuf>,
}

impl EchoConfig {
    pub fn tcp() -> Self {
        Self {
            protocol: Protocol::Tcp,
            recv_buf_len: STANDARD_MTU_SIZE,
            capture_dir: None,
        }
    }

    pub fn udp() -> Self {
        Self {
            protocol: Protocol::Udp,
            ..Self::tcp()
        }
    }

    pub fn with_recv_buf_len(mut self, len: usize) -> Self {
        self.recv_buf_len = len.max(1);
        self
    }

    pub fn with_capture(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = Some(dir.into());
        self
    }
}

/// An echo server whose worker task owns nothing but its socket.
///
/// A hang or panic in the worker is only visible to the harness as a stalled
/// or truncated transfer on that socket.
pub struct EchoServer {
    protocol: Protocol,
    port: u16,
    worker: Mutex<Option<JoinHandle<()>>>,
    capture: Mutex<Option<PacketCapture>>,
}

impl EchoServer {
    /// Bind an ephemeral loopback port and start echoing.
    pub async fn start(config: EchoConfig) -> EchoResult<Self> {
        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let buf_len = config.recv_buf_len.max(1);

        let (port, worker) = match config.protocol {
            Protocol::Tcp => {
                let listener = TcpListener::bind(bind_addr)
                    .await
                    .map_err(EchoError::BindFailed)?;
                let port = listener.local_addr()?.port();
                (port, tokio::spawn(tcp_echo(listener, buf_len)))
            }
            Protocol::Udp => {
                let socket = UdpSocket::bind(bind_addr)
                    .await
                    .map_err(EchoError::BindFailed)?;
                let port = socket.local_addr()?.port();
                (port, tokio::spawn(udp_echo(socket, buf_len)))
            }
        };

        tracing::info!(protocol = %config.protocol, port, "echo server listening");

        let capture = config
            .capture_dir
            .as_deref()
            .and_then(|dir| PacketCapture::start(dir, port));

        Ok(Self {
            protocol: config.protocol,
            port,
            worker: Mutex::new(Some(worker)),
            capture: Mutex::new(capture),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Terminate the worker and release the socket. Safe to call repeatedly.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.abort();
            match worker.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!(port = self.port, "echo worker crashed: {e}"),
            }
            tracing::info!(protocol = %self.protocol, port = self.port, "echo server stopped");
        }

        let capture = self.capture.lock().take();
        if let Some(capture) = capture {
            tracing::info!("killing tcp dump");
            capture.stop().await;
        }
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}

#[async_trait]
impl Release for EchoServer {
    fn label(&self) -> String {
        format!("echo-server/{}:{}", self.protocol, self.port)
    }

    async fn release(&self) -> anyhow::Result<()> {
        self.stop().await;
        Ok(())
    }
}

async fn tcp_echo(listener: TcpListener, buf_len: usize) {
    let (mut conn, peer) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::warn!("echo accept failed: {e}");
            return;
        }
    };
    // Exactly one connection is served.
    drop(listener);
    tracing::debug!(%peer, "echo connection accepted");

    let mut buf = vec![0u8; buf_len];
    loop {
        match conn.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = conn.write_all(&buf[..n]).await {
                    tracing::warn!(%peer, "echo write failed: {e}");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(%peer, "echo read failed: {e}");
                break;
            }
        }
    }
    tracing::debug!(%peer, "echo connection finished");
}

async fn udp_echo(socket: UdpSocket, buf_len: usize) {
    let mut buf = vec![0u8; buf_len];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => {
                if let Err(e) = socket.send_to(&buf[..n], from).await {
                    tracing::warn!(%from, "echo send failed: {e}");
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset) => {
                tracing::debug!("echo peer went away: {e}");
            }
            Err(e) => {
                tracing::warn!("echo receive failed: {e}");
                break;
            }
        }
    }
}
