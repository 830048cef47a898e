use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::UdpSocket;
use std::path::Path;
use std::time::{Duration, Instant};

use clap::Parser;
use hopnet_proto::constants::{BUF_SIZE, TTL_MAX};
use hopnet_proto::{NodeAddr, PacketHeader, PacketType, TunnelHeader};
use hopnet_transfer::net::{local_ipv4_towards, resolve_peer};
use hopnet_transfer::{FileRequest, Reassembly, Tracker};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const TRACKER_FILE: &str = "tracker.txt";

/// File requester: asks every sender in the tracker for its part of a file
/// and reassembles the pieces in tracker order.
#[derive(Parser, Debug)]
#[command(name = "requester")]
struct Args {
    /// Port on which the requester waits for packets.
    #[arg(short = 'p', long)]
    port: u16,

    /// Name of the file being requested.
    #[arg(short = 'o', long)]
    file_option: String,

    /// Host name of the ingress emulator.
    #[arg(short = 'f', long)]
    f_hostname: String,

    /// Port of the ingress emulator.
    #[arg(short = 'e', long)]
    f_port: u16,

    /// Window size granted to each sender.
    #[arg(short = 'w', long)]
    window: usize,
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

    let tracker = Tracker::load(Path::new(TRACKER_FILE))?;
    let entries = tracker.lookup(&args.file_option)?;

    let emulator_socket = resolve_peer(&args.f_hostname, args.f_port)?;
    let socket = UdpSocket::bind(("0.0.0.0", args.port))?;
    let self_addr = NodeAddr::new(local_ipv4_towards(emulator_socket)?, args.port);
    let emulator = match emulator_socket {
        std::net::SocketAddr::V4(v4) => NodeAddr::new(*v4.ip(), v4.port()),
        _ => return Err("emulator must be IPv4".into()),
    };

    register(&socket, self_addr, emulator)?;

    let mut reassembly = Reassembly::default();
    let mut sender_emulators: BTreeMap<NodeAddr, NodeAddr> = BTreeMap::new();
    for entry in entries {
        reassembly.add_sender(entry.file_id, entry.sender);
        sender_emulators.insert(entry.sender, entry.sender_emulator);
    }

    // One request per sender, all up front; the pieces interleave freely.
    for entry in entries {
        let request = FileRequest {
            filename: args.file_option.clone(),
            requester_emulator: emulator,
            window_size: args.window,
        };
        let payload = request.to_payload();
        let header = PacketHeader {
            priority: 1,
            src: self_addr,
            dst: entry.sender,
            packet_type: PacketType::Request,
            seq_no: 0,
            ttl: TTL_MAX,
            payload_length: payload.len() as u32,
            wrapped: false,
        };
        let tunnel = TunnelHeader {
            dst_emulator: entry.sender_emulator,
        };
        let mut packet = header.encode().to_vec();
        packet.extend_from_slice(&tunnel.encode());
        packet.extend_from_slice(payload.as_bytes());
        socket.send_to(&packet, emulator.socket())?;
        info!(sender = %entry.sender, file_id = entry.file_id, "requested file part");
    }

    receive_file(&socket, self_addr, emulator, &mut reassembly, &sender_emulators)?;

    let file = File::create(&args.file_option)?;
    let mut writer = BufWriter::new(file);
    reassembly.write_out(&mut writer)?;
    writer.flush()?;
    info!(
        filename = %args.file_option,
        bytes = reassembly.total_stored_bytes(),
        "file written"
    );
    Ok(())
}

fn register(
    socket: &UdpSocket,
    self_addr: NodeAddr,
    emulator: NodeAddr,
) -> Result<(), Box<dyn Error>> {
    let header = PacketHeader {
        priority: 0,
        src: self_addr,
        dst: emulator,
        packet_type: PacketType::Ack,
        seq_no: 0,
        ttl: 1,
        payload_length: 0,
        wrapped: false,
    };
    socket.send_to(&header.encode(), emulator.socket())?;
    Ok(())
}

fn receive_file(
    socket: &UdpSocket,
    self_addr: NodeAddr,
    emulator: NodeAddr,
    reassembly: &mut Reassembly,
    sender_emulators: &BTreeMap<NodeAddr, NodeAddr>,
) -> Result<(), Box<dyn Error>> {
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let (len, _) = socket.recv_from(&mut buf)?;
        let now = Instant::now();
        let Ok(header) = PacketHeader::decode(&buf[..len]) else {
            continue;
        };
        if header.dst != self_addr {
            continue;
        }
        match header.packet_type {
            PacketType::Data => {
                if !reassembly.is_known_sender(header.src) {
                    warn!(sender = %header.src, "data from unknown sender");
                    continue;
                }
                let stored =
                    reassembly.handle_data(header.src, header.seq_no, &buf[PacketHeader::SIZE..len], now);
                debug!(seq_no = header.seq_no, stored, sender = %header.src, "data segment");
                // Every copy is acknowledged, stored or duplicate.
                send_ack(socket, self_addr, emulator, header.src, header.seq_no, sender_emulators)?;
            }
            PacketType::End => {
                if let Some((packets, bytes, duration)) =
                    reassembly.handle_end(header.src, header.seq_no, now)
                {
                    print_summary(header.src, packets, bytes, duration);
                }
                if reassembly.all_finished() {
                    return Ok(());
                }
            }
            _ => debug!(%header, "ignoring packet"),
        }
    }
}

fn send_ack(
    socket: &UdpSocket,
    self_addr: NodeAddr,
    emulator: NodeAddr,
    sender: NodeAddr,
    seq_no: u32,
    sender_emulators: &BTreeMap<NodeAddr, NodeAddr>,
) -> Result<(), Box<dyn Error>> {
    let Some(&sender_emulator) = sender_emulators.get(&sender) else {
        return Ok(());
    };
    let header = PacketHeader {
        priority: 1,
        src: self_addr,
        dst: sender,
        packet_type: PacketType::Ack,
        seq_no,
        ttl: TTL_MAX,
        payload_length: 0,
        wrapped: false,
    };
    let tunnel = TunnelHeader {
        dst_emulator: sender_emulator,
    };
    let mut packet = header.encode().to_vec();
    packet.extend_from_slice(&tunnel.encode());
    socket.send_to(&packet, emulator.socket())?;
    Ok(())
}

fn print_summary(sender: NodeAddr, packets: u64, bytes: u64, duration: Duration) {
    let millis = duration.as_millis();
    let per_second = if millis == 0 {
        0
    } else {
        (packets as u128 * 1000 / millis) as u64
    };
    println!();
    println!("Summary");
    println!("sender addr:             {sender}");
    println!("Total Data packets:      {packets}");
    println!("Total Data bytes:        {bytes}");
    println!("Average packets/second:  {per_second}");
    println!("Duration of the test:    {millis}  ms");
    println!();
}
