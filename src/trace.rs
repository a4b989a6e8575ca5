//! Append-only event trace for offline analysis.
//!
//! Every send, ack receipt, and packet receipt is a candidate trace event.
//! Events carry their offset from run start; the log preserves call order
//! and is flushed when dropped.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// One timestamped protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A data datagram left the sender (first transmission or retransmit).
    PacketSent { seqno: u32, offset: Duration },
    /// The sender received an acknowledgment (progress-making or stale).
    AckReceived { ackno: u32, offset: Duration },
    /// The receiver handed a datagram to the data sink.
    PacketReceived {
        seqno: u32,
        offset: Duration,
        times_seen: u64,
    },
}

/// Append-only sink for trace events, ordered by call sequence.
pub trait EventLog {
    fn record(&mut self, event: TraceEvent);
}

/// Discards every event (tracing disabled).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrace;

impl EventLog for NullTrace {
    fn record(&mut self, _event: TraceEvent) {}
}

/// In-memory recorder, handy for tests.
impl EventLog for Vec<TraceEvent> {
    fn record(&mut self, event: TraceEvent) {
        self.push(event);
    }
}

impl EventLog for Box<dyn EventLog> {
    fn record(&mut self, event: TraceEvent) {
        (**self).record(event);
    }
}

/// Writes one CSV row per event to a file.
///
/// The file opens with a `#`-prefixed description line and a column header:
/// `event,number,offset_s,times_seen`. `number` is the seqno or ackno of the
/// event; `times_seen` is only meaningful for received packets and is 0
/// otherwise.
pub struct CsvTrace {
    out: BufWriter<File>,
}

impl CsvTrace {
    pub fn create(path: impl AsRef<Path>, description: &str) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "# {description}")?;
        writeln!(out, "event,number,offset_s,times_seen")?;
        Ok(Self { out })
    }

    fn write_row(&mut self, event: &str, number: u32, offset: Duration, times_seen: u64) {
        // A failed trace write must not disturb the protocol; drop the row.
        let _ = writeln!(
            self.out,
            "{event},{number},{:.6},{times_seen}",
            offset.as_secs_f64()
        );
    }
}

impl EventLog for CsvTrace {
    fn record(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::PacketSent { seqno, offset } => {
                self.write_row("sent", seqno, offset, 0);
            }
            TraceEvent::AckReceived { ackno, offset } => {
                self.write_row("ack", ackno, offset, 0);
            }
            TraceEvent::PacketReceived {
                seqno,
                offset,
                times_seen,
            } => {
                self.write_row("received", seqno, offset, times_seen);
            }
        }
    }
}

impl Drop for CsvTrace {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_log_preserves_order() {
        let mut log: Vec<TraceEvent> = Vec::new();
        log.record(TraceEvent::PacketSent {
            seqno: 0,
            offset: Duration::ZERO,
        });
        log.record(TraceEvent::AckReceived {
            ackno: 0,
            offset: Duration::from_millis(5),
        });
        assert_eq!(log.len(), 2);
        assert!(matches!(log[0], TraceEvent::PacketSent { seqno: 0, .. }));
        assert!(matches!(log[1], TraceEvent::AckReceived { ackno: 0, .. }));
    }

    #[test]
    fn csv_trace_writes_rows() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("pipestream-trace-{}.csv", std::process::id()));

        {
            let mut trace = CsvTrace::create(&path, "test trace").unwrap();
            trace.record(TraceEvent::PacketSent {
                seqno: 3,
                offset: Duration::from_millis(1),
            });
            trace.record(TraceEvent::PacketReceived {
                seqno: 3,
                offset: Duration::from_millis(2),
                times_seen: 2,
            });
        } // dropped: flushed

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "# test trace");
        assert_eq!(lines[1], "event,number,offset_s,times_seen");
        assert!(lines[2].starts_with("sent,3,"));
        assert!(lines[3].starts_with("received,3,"));
        assert!(lines[3].ends_with(",2"));

        let _ = std::fs::remove_file(&path);
    }
}
