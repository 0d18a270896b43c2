use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;

/// Largest datagram payload the tool sends or receives.
pub const MAX_DATAGRAM: usize = 1232;
/// Burst length used when `--count` is not given.
pub const DEFAULT_COUNT: u16 = 200;

#[derive(Parser, Debug, Clone)]
#[command(name = "udpburst", version, about = "UDP burst generator and receive logger")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Send a burst of sequence-stamped datagrams.
    Send {
        /// Destination as <addr>:<port>, or a bare port on loopback.
        #[arg(value_name = "ADDR_OR_PORT")]
        dest: String,

        /// Payload length in bytes, up to 1232.
        #[arg(value_name = "LEN")]
        data_len: usize,

        /// Nominal inter-packet delay in milliseconds.
        #[arg(value_name = "MS")]
        delay_ms: u64,

        /// Number of datagrams in the burst.
        #[arg(short, long, default_value_t = DEFAULT_COUNT)]
        count: u16,
    },
    /// Log arriving datagrams until interrupted.
    Server {
        /// Local address as <addr>:<port>, or a bare port on the wildcard address.
        #[arg(value_name = "ADDR_OR_PORT")]
        bind: String,
    },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unable to create socket: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("unable to open UDP server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("server already running")]
    AlreadyRunning,

    #[error("server not running")]
    NotRunning,
}

/// Sink for the machine-parseable event lines emitted by the transmitter and
/// the receive loop. Writes from both sides interleave; one lock is taken per
/// line.
#[derive(Clone)]
pub struct LogSink {
    target: Arc<Mutex<LogTarget>>,
}

enum LogTarget {
    Stdout,
    Capture(Vec<String>),
}

impl LogSink {
    pub fn stdout() -> Self {
        Self {
            target: Arc::new(Mutex::new(LogTarget::Stdout)),
        }
    }

    pub fn capture() -> Self {
        Self {
            target: Arc::new(Mutex::new(LogTarget::Capture(Vec::new()))),
        }
    }

    pub fn line(&self, line: &str) {
        let mut target = self.target.lock();
        match &mut *target {
            LogTarget::Stdout => println!("{line}"),
            LogTarget::Capture(lines) => lines.push(line.to_string()),
        }
    }

    /// Lines collected so far; empty for a stdout sink.
    pub fn captured(&self) -> Vec<String> {
        match &*self.target.lock() {
            LogTarget::Stdout => Vec::new(),
            LogTarget::Capture(lines) => lines.clone(),
        }
    }
}

/// Low two bytes of the peer's address, the identity logged per event line.
pub fn addr_low16(addr: IpAddr) -> [u8; 2] {
    match addr {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            [octets[2], octets[3]]
        }
        IpAddr::V6(v6) => {
            let octets = v6.octets();
            [octets[14], octets[15]]
        }
    }
}

pub fn packet_line(kind: &str, peer: IpAddr, value: u64, lead: [u8; 2]) -> String {
    let low = addr_low16(peer);
    format!(
        "{kind};{:02x}{:02x};{value};{:02x}{:02x}",
        low[0], low[1], lead[0], lead[1]
    )
}

pub fn parse_addr(value: &str, default_host: IpAddr) -> Result<SocketAddr, String> {
    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::new(default_host, port));
    }
    value
        .parse::<SocketAddr>()
        .map_err(|e| format!("invalid address '{value}': {e}"))
}
