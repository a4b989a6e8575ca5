//! Send a generated byte stream to a pipestream receiver.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, ValueEnum};

use pipestream::{
    ByteChunkSource, CsvTrace, EventLog, NullTrace, RetransmitPolicy, Sender, SenderConfig,
    UdpLink, WindowPolicy,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RetransmitArg {
    /// Resend every outstanding datagram on timeout.
    Burst,
    /// Resend only the oldest outstanding datagram on timeout.
    Single,
}

impl From<RetransmitArg> for RetransmitPolicy {
    fn from(arg: RetransmitArg) -> Self {
        match arg {
            RetransmitArg::Burst => RetransmitPolicy::Burst,
            RetransmitArg::Single => RetransmitPolicy::Single,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "send", about = "Pipelined semi-reliable UDP sender")]
struct Args {
    /// Receiver address, e.g. 127.0.0.1:6000.
    remote: SocketAddr,

    /// Ack wait timeout in milliseconds.
    #[arg(long, default_value_t = 30)]
    timeout_ms: u64,

    /// Fixed window size (ignored with --adaptive).
    #[arg(long, default_value_t = 50)]
    window: usize,

    /// Grow the window by one per ack, reset to one on timeout.
    #[arg(long)]
    adaptive: bool,

    /// Retransmission policy on timeout.
    #[arg(long, value_enum, default_value_t = RetransmitArg::Burst)]
    retransmit: RetransmitArg,

    /// Payload bytes per datagram.
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    /// Total number of bytes to send.
    #[arg(long, default_value_t = 1_000_000)]
    bytes: usize,

    /// Write a CSV trace of sent packets and received acks to this file.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Deterministic test payload: a repeating byte pattern long enough that
/// any reordering or corruption shows up on comparison.
fn generate_payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

fn main() -> pipestream::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let window = if args.adaptive {
        WindowPolicy::adaptive()
    } else {
        WindowPolicy::fixed(args.window)
    };
    let config = SenderConfig {
        timeout: Duration::from_millis(args.timeout_ms),
        window,
        retransmit: args.retransmit.into(),
    };

    let source = ByteChunkSource::new(generate_payload(args.bytes), args.chunk_size);
    let link = UdpLink::connect(args.remote)?;
    let log: Box<dyn EventLog> = match &args.trace {
        Some(path) => Box::new(CsvTrace::create(
            path,
            "Log of all packets sent and ACKs received by the sender",
        )?),
        None => Box::new(NullTrace),
    };

    println!(
        "Sending {} bytes to {} in {}-byte chunks ({:?}, {:?} window, timeout {} ms)",
        args.bytes,
        args.remote,
        args.chunk_size,
        config.retransmit,
        window,
        args.timeout_ms
    );

    let report = Sender::new(source, link, log, config).run()?;
    println!("Finished: {report}");
    Ok(())
}
