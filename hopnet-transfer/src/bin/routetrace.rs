use std::error::Error;
use std::net::UdpSocket;

use clap::Parser;
use hopnet_proto::constants::{BUF_SIZE, TTL_MAX};
use hopnet_proto::{NodeAddr, PacketHeader, PacketType};
use hopnet_transfer::TraceProbe;
use hopnet_transfer::net::{local_ipv4_towards, resolve_peer};
use tracing_subscriber::EnvFilter;

/// Route trace: discovers the emulator path to a destination hop by hop.
#[derive(Parser, Debug)]
#[command(name = "routetrace")]
struct Args {
    /// Port of the route trace client.
    #[arg(short = 'a', long)]
    route_trace_port: u16,

    /// Host of the source emulator to connect through.
    #[arg(short = 'b', long)]
    src_host: String,

    /// Port of the source emulator.
    #[arg(short = 'c', long)]
    src_port: u16,

    /// Host of the destination emulator.
    #[arg(short = 'd', long)]
    dst_host: String,

    /// Port of the destination emulator.
    #[arg(short = 'e', long)]
    dst_port: u16,

    /// Print every sent and received probe when 1.
    #[arg(short = 'f', long)]
    debug: u8,
}

extern "C" fn on_sigint(_: libc::c_int) {
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
    let sigint_handler: extern "C" fn(libc::c_int) = on_sigint;
    unsafe {
        libc::signal(libc::SIGINT, sigint_handler as usize);
    }
    let debug = args.debug == 1;

    let src_emulator_socket = resolve_peer(&args.src_host, args.src_port)?;
    let src_emulator = match src_emulator_socket {
        std::net::SocketAddr::V4(v4) => NodeAddr::new(*v4.ip(), v4.port()),
        _ => return Err("source emulator must be IPv4".into()),
    };
    let dst_emulator = match resolve_peer(&args.dst_host, args.dst_port)? {
        std::net::SocketAddr::V4(v4) => NodeAddr::new(*v4.ip(), v4.port()),
        _ => return Err("destination emulator must be IPv4".into()),
    };

    let socket = UdpSocket::bind(("0.0.0.0", args.route_trace_port))?;
    let self_addr = NodeAddr::new(local_ipv4_towards(src_emulator_socket)?, args.route_trace_port);

    // Register as a client of the source emulator.
    let registration = PacketHeader {
        priority: 0,
        src: self_addr,
        dst: src_emulator,
        packet_type: PacketType::Ack,
        seq_no: 0,
        ttl: 1,
        payload_length: 0,
        wrapped: false,
    };
    socket.send_to(&registration.encode(), src_emulator.socket())?;

    let mut probe = TraceProbe::new(self_addr, dst_emulator);
    let mut buf = [0u8; BUF_SIZE];
    while !probe.is_done() && probe.next_ttl() <= TTL_MAX {
        if debug {
            println!(
                "INFO: Sent {self_addr} -> {dst_emulator} TTL={}",
                probe.next_ttl()
            );
        }
        socket.send_to(&probe.probe_packet(), src_emulator.socket())?;

        let responder = loop {
            let (len, _) = socket.recv_from(&mut buf)?;
            let Ok(header) = PacketHeader::decode(&buf[..len]) else {
                continue;
            };
            if debug {
                println!(
                    "INFO: Received {} -> {} TTL={}",
                    header.src, header.dst, header.ttl
                );
            }
            if let Some(responder) = probe.on_reply(&header) {
                break responder;
            }
        };
        println!("Responder Info {responder}");
    }
    Ok(())
}
