//! Listen for pipestream datagrams, reassemble the stream, send acks.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use pipestream::{
    AssemblingSink, CsvTrace, EventLog, NullTrace, Receiver, ReceiverLoop, UdpLink,
};

#[derive(Parser, Debug)]
#[command(name = "recv", about = "Reordering cumulative-ack UDP receiver")]
struct Args {
    /// Local listen address, e.g. 0.0.0.0:6000.
    local: SocketAddr,

    /// Write a CSV trace of received packets to this file.
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

fn main() -> pipestream::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let link = UdpLink::bind(args.local)?;
    println!("Listening for datagrams at {}", link.local_addr()?);

    let log: Box<dyn EventLog> = match &args.trace {
        Some(path) => Box::new(CsvTrace::create(
            path,
            "Log of all packets received by the receiver",
        )?),
        None => Box::new(NullTrace),
    };

    let receiver = Receiver::new(AssemblingSink::new(), log);
    let mut server = ReceiverLoop::new(receiver, link);

    // Blocks forever; only a socket-level failure ends the loop.
    let result = server.run();
    let receiver = server.receiver();
    eprintln!(
        "receive loop ended (frontier {:?}, {} bytes assembled)",
        receiver.frontier(),
        receiver.sink().assembled().len()
    );
    result
}
