use thiserror::Error;

/// All errors produced by the pipestream transport.
///
/// Timeouts are deliberately absent: an expired ack wait is an expected
/// protocol event (`RecvOutcome::TimedOut`), not an error. Likewise a data
/// source running dry is signalled by `None`, not by an error value.
#[derive(Debug, Error)]
pub enum PipestreamError {
    #[error("malformed datagram: expected at least {expected} bytes, got {actual}")]
    MalformedPacket { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipestreamError>;
