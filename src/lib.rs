//! pipestream -- pipelined semi-reliable chunk delivery over UDP.
//!
//! A sender pushes a sequence of fixed-origin chunks to one receiver across
//! an unreliable, unordered datagram transport. Multiple datagrams stay in
//! flight at once (bounded by a pluggable window policy); loss is recovered
//! by coarse timeout-driven retransmission, and the receiver reconstructs
//! the original order with a reorder buffer, answering every datagram with
//! a cumulative acknowledgment.
//!
//! The protocol deliberately has no connection handshake, no NACKs, no
//! checksums beyond what UDP provides, and no flow control driven by the
//! receiver.

pub mod error;
pub mod link;
pub mod outstanding;
pub mod receiver;
pub mod sender;
pub mod sim;
pub mod sink;
pub mod source;
pub mod trace;
pub mod window;
pub mod wire;

// Re-export key public types at crate root.
pub use error::{PipestreamError, Result};
pub use link::{ReceiverLink, RecvOutcome, SenderLink, UdpLink};
pub use outstanding::OutstandingSet;
pub use receiver::{Receiver, ReceiverLoop, ReorderBuffer};
pub use sender::{Phase, RetransmitPolicy, Sender, SenderConfig, SenderReport};
pub use sink::{AssemblingSink, DataSink};
pub use source::{ByteChunkSource, DataSource};
pub use trace::{CsvTrace, EventLog, NullTrace, TraceEvent};
pub use window::WindowPolicy;
pub use wire::{AckPacket, DataPacket, ACK_NONE};
