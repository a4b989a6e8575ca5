//! In-memory links for tests and loopback demos.
//!
//! Real networks drop, duplicate, and reorder datagrams. [`pair`] builds a
//! connected sender/receiver link pair whose data direction applies a
//! configurable fault model, driven by a seeded RNG so failures reproduce.
//! [`ScriptedLink`] is a fully deterministic sender-side fake whose ack
//! schedule is spelled out in advance, for driving the sender state machine
//! one transition at a time.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::error::{PipestreamError, Result};
use crate::link::{ReceiverLink, RecvOutcome, SenderLink};
use crate::wire::AckPacket;

/// Fault model for the simulated link. All probabilities are in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultConfig {
    /// Probability a data datagram is silently dropped.
    pub data_loss: f64,
    /// Probability a data datagram is delivered twice.
    pub data_duplicate: f64,
    /// Probability a data datagram is held back and delivered after the
    /// next transmission (reordering).
    pub data_reorder: f64,
    /// Probability an ack datagram is silently dropped.
    pub ack_loss: f64,
}

impl FaultConfig {
    fn clamped(self) -> Self {
        Self {
            data_loss: self.data_loss.clamp(0.0, 1.0),
            data_duplicate: self.data_duplicate.clamp(0.0, 1.0),
            data_reorder: self.data_reorder.clamp(0.0, 1.0),
            ack_loss: self.ack_loss.clamp(0.0, 1.0),
        }
    }
}

/// Build a connected link pair with the given fault model and RNG seed.
pub fn pair(faults: FaultConfig, seed: u64) -> (SimSenderLink, SimReceiverLink) {
    let faults = faults.clamped();
    let (data_tx, data_rx) = channel();
    let (ack_tx, ack_rx) = channel();
    (
        SimSenderLink {
            data_tx,
            ack_rx,
            faults,
            rng: StdRng::seed_from_u64(seed),
            held_back: None,
        },
        SimReceiverLink {
            data_rx,
            ack_tx,
            ack_loss: faults.ack_loss,
            rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
            peer: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        },
    )
}

/// Sender half of the simulated link.
pub struct SimSenderLink {
    data_tx: Sender<Bytes>,
    ack_rx: Receiver<Bytes>,
    faults: FaultConfig,
    rng: StdRng,
    held_back: Option<Bytes>,
}

impl SimSenderLink {
    fn deliver(&mut self, datagram: Bytes) -> Result<()> {
        self.data_tx
            .send(datagram)
            .map_err(|_| PipestreamError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "link closed")))
    }
}

impl SenderLink for SimSenderLink {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let datagram = Bytes::copy_from_slice(datagram);

        if self.rng.random_bool(self.faults.data_loss) {
            tracing::trace!("sim: data datagram lost");
        } else if self.rng.random_bool(self.faults.data_reorder) && self.held_back.is_none() {
            // Held back; it rides out behind the next transmission.
            self.held_back = Some(datagram);
        } else {
            let duplicate = self.rng.random_bool(self.faults.data_duplicate);
            self.deliver(datagram.clone())?;
            if duplicate {
                self.deliver(datagram)?;
            }
            if let Some(late) = self.held_back.take() {
                self.deliver(late)?;
            }
        }
        Ok(())
    }

    fn recv_ack(&mut self, timeout: Duration) -> RecvOutcome {
        match self.ack_rx.recv_timeout(timeout) {
            Ok(datagram) => match AckPacket::decode(&datagram) {
                Ok(ack) => RecvOutcome::Ack(ack.ackno),
                Err(_) => RecvOutcome::TimedOut,
            },
            Err(RecvTimeoutError::Timeout) => RecvOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => RecvOutcome::TransportFailure,
        }
    }
}

/// Receiver half of the simulated link.
pub struct SimReceiverLink {
    data_rx: Receiver<Bytes>,
    ack_tx: Sender<Bytes>,
    ack_loss: f64,
    rng: StdRng,
    peer: SocketAddr,
}

impl ReceiverLink for SimReceiverLink {
    fn recv(&mut self) -> Result<(Bytes, SocketAddr)> {
        let datagram = self.data_rx.recv().map_err(|_| {
            PipestreamError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "link closed"))
        })?;
        Ok((datagram, self.peer))
    }

    fn send_to(&mut self, datagram: &[u8], _peer: SocketAddr) -> Result<()> {
        if self.rng.random_bool(self.ack_loss) {
            tracing::trace!("sim: ack datagram lost");
            return Ok(());
        }
        self.ack_tx
            .send(Bytes::copy_from_slice(datagram))
            .map_err(|_| PipestreamError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "link closed")))
    }
}

/// Deterministic sender-side fake with a pre-scripted ack schedule.
///
/// Every transmitted datagram is captured in `sent`; each `recv_ack` pops
/// the next scripted outcome (an exhausted script reads as a timeout, so
/// scripts driving `Sender::run` must cover the whole run).
#[derive(Debug, Default)]
pub struct ScriptedLink {
    /// Datagrams transmitted, in order.
    pub sent: Vec<Bytes>,
    script: VecDeque<RecvOutcome>,
}

impl ScriptedLink {
    pub fn new(script: impl IntoIterator<Item = RecvOutcome>) -> Self {
        Self {
            sent: Vec::new(),
            script: script.into_iter().collect(),
        }
    }

    /// Append one more outcome to the schedule.
    pub fn push_outcome(&mut self, outcome: RecvOutcome) {
        self.script.push_back(outcome);
    }
}

impl SenderLink for ScriptedLink {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.sent.push(Bytes::copy_from_slice(datagram));
        Ok(())
    }

    fn recv_ack(&mut self, _timeout: Duration) -> RecvOutcome {
        self.script.pop_front().unwrap_or(RecvOutcome::TimedOut)
    }
}
