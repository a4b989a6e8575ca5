//! Datagram link abstraction and the blocking UDP implementation.
//!
//! The sender and receiver never touch sockets directly: the sender drives a
//! [`SenderLink`] (transmit plus one bounded ack wait at a time) and the
//! receiver loop drives a [`ReceiverLink`] (indefinite blocking receive).
//! Keeping the seams here makes both state machines testable with fakes.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::wire::AckPacket;

/// Outcome of one bounded wait for an acknowledgment.
///
/// The sender's transition table is a pure function of its phase plus this
/// value; no exception-style control flow crosses the link boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// An ack datagram arrived carrying this cumulative ackno.
    Ack(u32),
    /// The wait expired with nothing received.
    TimedOut,
    /// The socket failed. The sender recovers exactly as for a timeout.
    TransportFailure,
}

/// Send side of the link: transmit datagrams, wait for acks.
pub trait SenderLink {
    /// Transmit one encoded datagram toward the receiver.
    fn send(&mut self, datagram: &[u8]) -> Result<()>;

    /// Block for up to `timeout` for an incoming ack. A fresh wait starts
    /// the instant the previous one ends; there is no cancellation.
    fn recv_ack(&mut self, timeout: Duration) -> RecvOutcome;
}

/// Receive side of the link: block for datagrams, send acks back.
pub trait ReceiverLink {
    /// Block indefinitely for the next datagram. A socket-level failure
    /// here is fatal to the receiver loop.
    fn recv(&mut self) -> Result<(Bytes, SocketAddr)>;

    /// Send one encoded ack datagram to `peer`.
    fn send_to(&mut self, datagram: &[u8], peer: SocketAddr) -> Result<()>;
}

/// Blocking UDP socket implementing both link roles.
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
}

impl UdpLink {
    /// Sender-side construction: bind an ephemeral local port and connect
    /// to the receiver's address.
    pub fn connect(remote: SocketAddr) -> Result<Self> {
        let bind_addr: SocketAddr = if remote.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(remote)?;
        Ok(Self { socket })
    }

    /// Receiver-side construction: bind the listening address.
    pub fn bind(local: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        Ok(Self { socket })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl SenderLink for UdpLink {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.socket.send(datagram)?;
        Ok(())
    }

    fn recv_ack(&mut self, timeout: Duration) -> RecvOutcome {
        // set_read_timeout rejects a zero duration.
        let timeout = timeout.max(Duration::from_millis(1));
        if self.socket.set_read_timeout(Some(timeout)).is_err() {
            return RecvOutcome::TransportFailure;
        }

        let mut buf = [0u8; 64];
        match self.socket.recv(&mut buf) {
            Ok(n) => match AckPacket::decode(&buf[..n]) {
                Ok(ack) => RecvOutcome::Ack(ack.ackno),
                Err(_) => {
                    // A garbled ack tells us nothing; treat the wait as
                    // expired and let the retransmit path recover.
                    tracing::trace!(len = n, "dropping malformed ack datagram");
                    RecvOutcome::TimedOut
                }
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                RecvOutcome::TimedOut
            }
            Err(e) => {
                tracing::debug!(error = %e, "socket failure while waiting for ack");
                RecvOutcome::TransportFailure
            }
        }
    }
}

impl ReceiverLink for UdpLink {
    fn recv(&mut self) -> Result<(Bytes, SocketAddr)> {
        self.socket.set_read_timeout(None)?;
        // Largest payload we tolerate plus header; one datagram per read.
        let mut buf = [0u8; 65_535];
        let (n, peer) = self.socket.recv_from(&mut buf)?;
        Ok((Bytes::copy_from_slice(&buf[..n]), peer))
    }

    fn send_to(&mut self, datagram: &[u8], peer: SocketAddr) -> Result<()> {
        self.socket.send_to(datagram, peer)?;
        Ok(())
    }
}
