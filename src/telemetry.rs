//! Live telemetry output
//!
//! Each logging tick during a session publishes one 20-byte
//! [`TelemetryFrame`] to a display unit. Send failures are counted and
//! logged but never interrupt the monitoring loop.

use std::net::{SocketAddr, UdpSocket};

use gearsense_core::record::TELEMETRY_FRAME_LEN;
use gearsense_core::TelemetryFrame;

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub sent: u64,
    pub failed: u64,
}

/// Destination for telemetry frames
pub trait TelemetrySink: Send {
    /// Publish one frame. Must not block the caller for long or fail loudly.
    fn publish(&mut self, frame: &TelemetryFrame);

    /// Delivery counters so far
    fn stats(&self) -> TelemetryStats;
}

/// Sends frames as UDP datagrams to one peer
pub struct UdpTelemetry {
    socket: UdpSocket,
    peer: SocketAddr,
    stats: TelemetryStats,
}

impl UdpTelemetry {
    /// Bind an ephemeral local socket for sending to `peer`
    pub fn new(peer: SocketAddr) -> std::io::Result<Self> {
        let local: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        tracing::info!(peer = %peer, "Telemetry enabled");
        Ok(Self {
            socket,
            peer,
            stats: TelemetryStats::default(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl TelemetrySink for UdpTelemetry {
    fn publish(&mut self, frame: &TelemetryFrame) {
        match self.socket.send_to(&frame.encode(), self.peer) {
            Ok(n) if n == TELEMETRY_FRAME_LEN => self.stats.sent += 1,
            Ok(n) => {
                self.stats.failed += 1;
                tracing::warn!(peer = %self.peer, written = n, "Short telemetry datagram");
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!(
                    peer = %self.peer,
                    error = %e,
                    failed = self.stats.failed,
                    "Telemetry send failed"
                );
            }
        }
    }

    fn stats(&self) -> TelemetryStats {
        self.stats
    }
}
