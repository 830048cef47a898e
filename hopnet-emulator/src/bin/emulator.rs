use std::error::Error;
use std::fs::File;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;
use hopnet_emulator::EmulatorNode;
use hopnet_proto::NodeAddr;
use hopnet_proto::constants::{BUF_SIZE, PING_SLEEP};
use hopnet_routing::Topology;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

/// Overlay network emulator node.
#[derive(Parser, Debug)]
#[command(name = "emulator")]
struct Args {
    /// Port this emulator listens on.
    #[arg(short = 'p', long)]
    port: u16,

    /// Capacity of each priority queue.
    #[arg(short = 'q', long)]
    queue_size: usize,

    /// Topology file describing the overlay.
    #[arg(short = 'f', long)]
    filename: PathBuf,

    /// Log file; stderr when omitted.
    #[arg(short = 'l', long)]
    log: Option<PathBuf>,
}

extern "C" fn on_sigint(_: libc::c_int) {
    std::process::exit(1);
}

fn init_logging(log: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false);
    match log {
        Some(path) => builder.with_writer(Arc::new(File::create(path)?)).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// The emulator identifies itself in the topology by its resolved hostname
/// plus the configured port.
fn self_addr(port: u16) -> Result<NodeAddr, Box<dyn Error>> {
    let mut raw = [0u8; 256];
    let ip = if unsafe { libc::gethostname(raw.as_mut_ptr().cast(), raw.len()) } == 0 {
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let hostname = String::from_utf8_lossy(&raw[..len]).into_owned();
        hopnet_routing::topology::resolve_ipv4(&hostname)
            .unwrap_or(Ipv4Addr::LOCALHOST)
    } else {
        Ipv4Addr::LOCALHOST
    };
    Ok(NodeAddr::new(ip, port))
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.log.as_ref())?;
    let sigint_handler: extern "C" fn(libc::c_int) = on_sigint;
    unsafe {
        libc::signal(libc::SIGINT, sigint_handler as usize);
    }

    let topology = Topology::load(&args.filename)?;
    let self_addr = self_addr(args.port)?;
    let socket = UdpSocket::bind(("0.0.0.0", args.port))?;
    socket.set_nonblocking(true)?;

    let mut node = EmulatorNode::new(
        self_addr,
        &topology,
        args.queue_size,
        StdRng::from_entropy(),
        Instant::now(),
    );
    tracing::info!(%self_addr, queue_size = args.queue_size, "emulator up");

    let mut buf = [0u8; BUF_SIZE];
    loop {
        let now = Instant::now();
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => node.handle_datagram(&buf[..len], now),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Err(err.into()),
        }

        node.tick_queue(now);

        for (peer, ping) in node.ping_sweep(now) {
            if let Err(err) = socket.send_to(&ping, peer.socket()) {
                tracing::warn!(%peer, %err, "ping send failed");
            }
            thread::sleep(PING_SLEEP);
        }

        while let Some((dst, packet)) = node.poll_outbound() {
            if let Err(err) = socket.send_to(&packet, dst.socket()) {
                tracing::warn!(%dst, %err, "send failed");
            }
        }
    }
}
