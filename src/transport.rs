//! Network transport for RTP packets
//!
//! One RTP packet per UDP datagram. The trait seam exists so the
//! sender can be driven over an in-memory transport in tests.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::Error;
use crate::packet::RtpPacket;
use crate::Result;

/// Trait for RTP transport implementations
#[async_trait]
pub trait RtpTransport: Send + Sync {
    /// Get the local address of the transport
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Send one packet to the configured destination
    async fn send_packet(&self, packet: &RtpPacket) -> Result<()>;
}

/// UDP transport bound to a local address with a fixed destination
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    remote_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind a local socket and aim it at `remote_addr`
    pub async fn connect(local_addr: SocketAddr, remote_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| Error::BindFailed(e.to_string()))?;

        Ok(Self {
            socket: Arc::new(socket),
            remote_addr,
        })
    }

    /// Destination address packets are sent to
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

#[async_trait]
impl RtpTransport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn send_packet(&self, packet: &RtpPacket) -> Result<()> {
        let data = packet.serialize();
        self.socket
            .send_to(&data, self.remote_addr)
            .await
            .map_err(|e| Error::SendFailed(e.to_string()))?;

        trace!(
            seq = packet.header.sequence_number,
            bytes = data.len(),
            "sent packet"
        );
        Ok(())
    }
}
