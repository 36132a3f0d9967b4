use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Instant;

use clap::Parser;
use tracing::{debug, info, warn};

use rust_of13::engine::{Clock, Datapath, DeviceConfig, OfEngine, Transport};

/// Switch-side OpenFlow 1.3 protocol engine, one engine per controller
/// connection. The datapath is stubbed out; forwarded frames are logged.
#[derive(Parser)]
#[command(name = "rust_of13_switch", version)]
struct Args {
    /// Address to listen on for controller connections.
    #[arg(long, default_value = "127.0.0.1:6653")]
    listen: String,
}

struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) {
        if let Err(e) = self.stream.write_all(bytes) {
            warn!(error = %e, "send to controller failed");
        }
    }

    fn send_capacity(&self) -> usize {
        // no portable sndbuf probe on a std TcpStream; assume one segment
        2048
    }
}

struct LogDatapath;

impl Datapath for LogDatapath {
    fn forward_frame(&mut self, payload: &[u8], port_mask: u32) {
        debug!(len = payload.len(), port_mask, "forwarding frame");
    }
}

struct SystemClock {
    start: Instant,
}

impl Clock for SystemClock {
    fn uptime_secs(&self) -> u32 {
        self.start.elapsed().as_secs() as u32
    }
}

fn handle_connection(stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(%peer, "controller connected");
    let transport = match stream.try_clone() {
        Ok(writer) => TcpTransport { stream: writer },
        Err(e) => {
            warn!(error = %e, "failed to clone stream");
            return;
        }
    };
    let mut engine = OfEngine::new(
        DeviceConfig::default(),
        transport,
        LogDatapath,
        SystemClock {
            start: Instant::now(),
        },
    );
    let mut stream = stream;
    let mut buf = [0u8; 2048];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => engine.deliver(&buf[..n]),
            Err(e) => {
                warn!(error = %e, "read from controller failed");
                break;
            }
        }
    }
    info!(%peer, "controller disconnected");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let listener = match TcpListener::bind(&args.listen) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(listen = %args.listen, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(listen = %args.listen, "listening for controllers");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                std::thread::spawn(move || handle_connection(stream));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}
