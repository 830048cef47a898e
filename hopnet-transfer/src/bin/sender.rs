use std::error::Error;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use hopnet_proto::constants::BUF_SIZE;
use hopnet_proto::{NodeAddr, PacketHeader, PacketType};
use hopnet_transfer::net::{local_ipv4_towards, resolve_peer};
use hopnet_transfer::{FileRequest, SenderWindow, WindowConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// File sender: serves requested files through the overlay with a fixed
/// retransmission window.
#[derive(Parser, Debug)]
#[command(name = "sender")]
struct Args {
    /// Port on which the sender waits for requests.
    #[arg(short = 'p', long)]
    port: u16,

    /// Port on which the requester is waiting.
    #[arg(short = 'g', long)]
    requester_port: u16,

    /// Packets per second.
    #[arg(short = 'r', long)]
    rate: f64,

    /// Initial sequence number of the packet exchange.
    #[arg(short = 'q', long)]
    seq_no: u32,

    /// Payload length per data packet, in bytes.
    #[arg(short = 'l', long)]
    length: usize,

    /// Host name of the ingress emulator.
    #[arg(short = 'f', long)]
    f_hostname: String,

    /// Port of the ingress emulator.
    #[arg(short = 'e', long)]
    f_port: u16,

    /// Priority class of the sent packets.
    #[arg(short = 'i', long)]
    priority: u8,

    /// Retransmission timeout in milliseconds.
    #[arg(short = 't', long)]
    timeout: u64,
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
    if args.rate <= 0.0 || args.length == 0 {
        return Err("rate and length must be positive".into());
    }
    if args.priority >= 128 {
        return Err("priority must be below 128".into());
    }

    let emulator_socket = resolve_peer(&args.f_hostname, args.f_port)?;
    let socket = UdpSocket::bind(("0.0.0.0", args.port))?;
    let self_addr = NodeAddr::new(local_ipv4_towards(emulator_socket)?, args.port);
    let emulator = match emulator_socket {
        std::net::SocketAddr::V4(v4) => NodeAddr::new(*v4.ip(), v4.port()),
        _ => return Err("emulator must be IPv4".into()),
    };

    register(&socket, self_addr, emulator)?;
    info!(%self_addr, %emulator, "sender registered, waiting for requests");

    loop {
        let (request, requester) = wait_for_request(&socket, self_addr)?;
        info!(filename = %request.filename, %requester, "serving request");
        serve_file(&socket, &args, self_addr, emulator, requester, &request)?;
    }
}

/// Announce ourselves to the ingress emulator so it tunnels our traffic.
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

/// Blocks until a well-formed `R` addressed to us arrives (the tunnel
/// header was consumed by our emulator, so the payload is the request
/// text).
fn wait_for_request(
    socket: &UdpSocket,
    self_addr: NodeAddr,
) -> Result<(FileRequest, NodeAddr), Box<dyn Error>> {
    socket.set_nonblocking(false)?;
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let (len, _) = socket.recv_from(&mut buf)?;
        let Ok(header) = PacketHeader::decode(&buf[..len]) else {
            continue;
        };
        if header.packet_type != PacketType::Request || header.wrapped || header.dst != self_addr {
            continue;
        }
        let Ok(payload) = std::str::from_utf8(&buf[PacketHeader::SIZE..len]) else {
            warn!(%header, "request payload is not text");
            continue;
        };
        match FileRequest::from_payload(payload) {
            Ok(request) => return Ok((request, header.src)),
            Err(err) => warn!(%err, "ignoring bad request"),
        }
    }
}

fn serve_file(
    socket: &UdpSocket,
    args: &Args,
    self_addr: NodeAddr,
    emulator: NodeAddr,
    requester: NodeAddr,
    request: &FileRequest,
) -> Result<(), Box<dyn Error>> {
    socket.set_nonblocking(true)?;
    let mut window = SenderWindow::new(
        WindowConfig {
            capacity: request.window_size.max(1),
            rate: args.rate,
            timeout: Duration::from_millis(args.timeout),
            priority: args.priority,
            src: self_addr,
            dst: requester,
            requester_emulator: request.requester_emulator,
            initial_seq: args.seq_no,
        },
        Instant::now(),
    );

    let mut file = match File::open(&request.filename) {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(filename = %request.filename, %err, "cannot open requested file");
            None
        }
    };

    let mut chunk = vec![0u8; args.length];
    if let Some(file) = file.as_mut() {
        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            wait_until_ready(socket, &mut window, emulator)?;
            let room = window.admit(&chunk[..read], Instant::now());
            flush_emissions(socket, &mut window, emulator)?;
            if !room {
                complete_window(socket, &mut window, emulator)?;
            }
        }
    }
    complete_window(socket, &mut window, emulator)?;

    // End of stream; emulators forward this around both queue and dice.
    thread::sleep(Duration::from_secs_f64(1.0 / args.rate));
    socket.send_to(&window.end_packet(), emulator.socket())?;

    let (retransmissions, first_transmissions, loss_rate) = window.loss_summary();
    info!(retransmissions, first_transmissions, "transfer finished");
    println!("Summary");
    println!("sender addr:             {self_addr}");
    println!("Average Loss Rate:       {loss_rate:.2}%");
    println!();
    Ok(())
}

/// Polls acks and retransmissions until the pacing gate opens and the
/// window has a free slot for the next first transmission.
fn wait_until_ready(
    socket: &UdpSocket,
    window: &mut SenderWindow,
    emulator: NodeAddr,
) -> Result<(), Box<dyn Error>> {
    loop {
        let now = Instant::now();
        drain_acks(socket, window)?;
        window.tick(now);
        flush_emissions(socket, window, emulator)?;
        if window.has_room() && window.ready_to_send(now) {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Runs the window to full retirement, then clears it wholesale.
fn complete_window(
    socket: &UdpSocket,
    window: &mut SenderWindow,
    emulator: NodeAddr,
) -> Result<(), Box<dyn Error>> {
    loop {
        let now = Instant::now();
        drain_acks(socket, window)?;
        let done = window.tick(now);
        flush_emissions(socket, window, emulator)?;
        if done {
            window.clear();
            return Ok(());
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn drain_acks(socket: &UdpSocket, window: &mut SenderWindow) -> Result<(), Box<dyn Error>> {
    let mut buf = [0u8; BUF_SIZE];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => {
                if let Ok(header) = PacketHeader::decode(&buf[..len])
                    && header.packet_type == PacketType::Ack
                {
                    window.on_ack(header.seq_no);
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

fn flush_emissions(
    socket: &UdpSocket,
    window: &mut SenderWindow,
    emulator: NodeAddr,
) -> Result<(), Box<dyn Error>> {
    while let Some(packet) = window.poll_emission() {
        socket.send_to(&packet, emulator.socket())?;
    }
    Ok(())
}
