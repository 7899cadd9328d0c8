//! Socket bridges behind simulated sessions.
//!
//! Bytes entering a session are cut into packets, each packet crosses the
//! leg (picking up mixer delay and paying tickets) and is written out at its
//! delivery deadline. Deadlines never move backwards, so a stream keeps its
//! order. A leg failure tears the whole session down.

use crate::node::{Capabilities, Protocol};
use crate::simulation::network::{Leg, LegFailure};
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

const READ_BUFFER_LEN: usize = 64 * 1024;

#[derive(Error, Debug)]
pub(crate) enum BridgeBreak {
    #[error(transparent)]
    Leg(#[from] LegFailure),

    #[error("{len} byte write needs segmentation, packets carry {max}")]
    Oversized { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) struct BridgeSpec {
    pub forward: Leg,
    pub backward: Leg,
    pub capabilities: Capabilities,
    pub max_payload: usize,
}

impl BridgeSpec {
    /// Packets needed for `data`. Without segmentation anything larger than
    /// one packet is refused.
    fn packets<'a>(&self, data: &'a [u8]) -> Result<Vec<&'a [u8]>, BridgeBreak> {
        if data.len() > self.max_payload && !self.capabilities.segmentation {
            return Err(BridgeBreak::Oversized {
                len: data.len(),
                max: self.max_payload,
            });
        }
        Ok(data.chunks(self.max_payload.max(1)).collect())
    }
}

/// Monotonic delivery deadlines.
#[derive(Default)]
struct Schedule {
    last: Option<Instant>,
}

impl Schedule {
    fn next(&mut self, delay: Duration) -> Instant {
        let deadline = Instant::now() + delay;
        let deadline = match self.last {
            Some(last) if last > deadline => last,
            _ => deadline,
        };
        self.last = Some(deadline);
        deadline
    }
}

/// Bind the session's local end and start bridging it to `target`.
pub(crate) async fn spawn(
    protocol: Protocol,
    host: &str,
    target: SocketAddr,
    spec: BridgeSpec,
) -> std::io::Result<(u16, JoinHandle<()>)> {
    match protocol {
        Protocol::Tcp => {
            let listener = TcpListener::bind((host, 0)).await?;
            let port = listener.local_addr()?.port();
            let worker = tokio::spawn(async move {
                if let Err(e) = run_tcp(listener, target, spec).await {
                    warn!(port, "tcp session broken: {}", e);
                }
            });
            Ok((port, worker))
        }
        Protocol::Udp => {
            let socket = UdpSocket::bind((host, 0)).await?;
            let port = socket.local_addr()?.port();
            let worker = tokio::spawn(async move {
                if let Err(e) = run_udp(socket, target, spec).await {
                    warn!(port, "udp session broken: {}", e);
                }
            });
            Ok((port, worker))
        }
    }
}

async fn run_tcp(listener: TcpListener, target: SocketAddr, spec: BridgeSpec) -> Result<(), BridgeBreak> {
    let (client, peer) = listener.accept().await?;
    drop(listener);
    let upstream = TcpStream::connect(target).await?;
    debug!(%peer, %target, "tcp session connected");

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    tokio::try_join!(
        pump_stream(client_read, upstream_write, &spec.forward, &spec),
        pump_stream(upstream_read, client_write, &spec.backward, &spec),
    )?;
    Ok(())
}

async fn pump_stream<R, W>(
    mut reader: R,
    mut writer: W,
    leg: &Leg,
    spec: &BridgeSpec,
) -> Result<(), BridgeBreak>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Bytes)>();

    let read = async move {
        let mut buf = vec![0u8; READ_BUFFER_LEN];
        let mut schedule = Schedule::default();
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok::<(), BridgeBreak>(());
            }
            for packet in spec.packets(&buf[..n])? {
                let deadline = schedule.next(leg.traverse(1, true)?);
                if tx.send((deadline, Bytes::copy_from_slice(packet))).is_err() {
                    return Ok(());
                }
            }
        }
    };

    let write = async move {
        while let Some((deadline, packet)) = rx.recv().await {
            sleep_until(deadline).await;
            writer.write_all(&packet).await?;
        }
        // Pass the half-close on once everything queued is out
        let _ = writer.shutdown().await;
        Ok::<(), BridgeBreak>(())
    };

    tokio::try_join!(read, write)?;
    Ok(())
}

async fn run_udp(socket: UdpSocket, target: SocketAddr, spec: BridgeSpec) -> Result<(), BridgeBreak> {
    let upstream = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    upstream.connect(target).await?;

    // The first sender owns the session
    let mut buf = vec![0u8; READ_BUFFER_LEN];
    let (n, client) = socket.recv_from(&mut buf).await?;
    let first = Bytes::copy_from_slice(&buf[..n]);
    debug!(%client, %target, "udp session connected");

    let socket = &socket;
    let upstream = &upstream;
    let spec = &spec;
    let (forward_tx, mut forward_rx) = mpsc::unbounded_channel::<(Instant, Bytes)>();
    let (backward_tx, mut backward_rx) = mpsc::unbounded_channel::<(Instant, Bytes)>();

    let forward_read = async move {
        let mut buf = vec![0u8; READ_BUFFER_LEN];
        let mut schedule = Schedule::default();
        let mut pending = Some(first);
        loop {
            let datagram = match pending.take() {
                Some(datagram) => datagram,
                None => {
                    let (n, from) = socket.recv_from(&mut buf).await?;
                    if from != client {
                        continue;
                    }
                    Bytes::copy_from_slice(&buf[..n])
                }
            };
            let packets = spec.packets(&datagram)?.len() as u64;
            let deadline = schedule.next(spec.forward.traverse(packets, true)?);
            if forward_tx.send((deadline, datagram)).is_err() {
                return Ok::<(), BridgeBreak>(());
            }
        }
    };

    let forward_write = async move {
        while let Some((deadline, datagram)) = forward_rx.recv().await {
            sleep_until(deadline).await;
            upstream.send(&datagram).await?;
        }
        Ok::<(), BridgeBreak>(())
    };

    let backward_read = async move {
        let mut buf = vec![0u8; READ_BUFFER_LEN];
        let mut schedule = Schedule::default();
        loop {
            let n = match upstream.recv(&mut buf).await {
                Ok(n) => n,
                // Target not (yet) listening
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => continue,
                Err(e) => return Err(e.into()),
            };
            let datagram = Bytes::copy_from_slice(&buf[..n]);
            let packets = spec.packets(&datagram)?.len() as u64;
            let deadline = schedule.next(spec.backward.traverse(packets, true)?);
            if backward_tx.send((deadline, datagram)).is_err() {
                return Ok::<(), BridgeBreak>(());
            }
        }
    };

    let backward_write = async move {
        while let Some((deadline, datagram)) = backward_rx.recv().await {
            sleep_until(deadline).await;
            socket.send_to(&datagram, client).await?;
        }
        Ok::<(), BridgeBreak>(())
    };

    tokio::try_join!(forward_read, forward_write, backward_read, backward_write)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_schedule_never_moves_backwards() {
        let mut schedule = Schedule::default();
        let slow = schedule.next(Duration::from_millis(500));
        let fast = schedule.next(Duration::from_millis(10));
        assert_eq!(fast, slow);

        tokio::time::advance(Duration::from_secs(1)).await;
        let later = schedule.next(Duration::ZERO);
        assert!(later > slow);
    }
}
