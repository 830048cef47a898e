use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

/// The local IPv4 address the kernel would use to reach `peer`.
///
/// Clients bind to the wildcard address but must stamp a real source IP
/// into their headers (the wire format forbids 0.0.0.0), so we ask the
/// routing stack by connecting a throwaway socket; no packet is sent.
pub fn local_ipv4_towards(peer: SocketAddr) -> io::Result<Ipv4Addr> {
    let probe = UdpSocket::bind(("0.0.0.0", 0))?;
    probe.connect(peer)?;
    match probe.local_addr()? {
        SocketAddr::V4(addr) => Ok(*addr.ip()),
        SocketAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "peer is not reachable over IPv4",
        )),
    }
}

/// Resolves a `host` + `port` pair to an IPv4 socket address, accepting
/// either a dotted quad or a hostname.
pub fn resolve_peer(host: &str, port: u16) -> io::Result<SocketAddr> {
    use std::net::ToSocketAddrs;
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::from((ip, port)));
    }
    (host, port)
        .to_socket_addrs()?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no IPv4 address for {host:?}"),
            )
        })
}
