use std::collections::BTreeMap;
use std::fs;
use std::net::{Ipv4Addr, ToSocketAddrs};
use std::path::Path;

use hopnet_proto::NodeAddr;
use tracing::info;

use crate::error::RoutingError;

/// Emulation properties of one directed link, taken from the optional
/// trailing columns of a neighbour entry. Absent columns mean a perfect
/// link: no delay, no loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkProps {
    pub delay_ms: u64,
    /// Loss probability in percent, `0..=100`.
    pub loss_pct: u8,
}

/// A parsed topology file: one neighbour list per node, plus per-link
/// emulation properties.
///
/// File format, one node per line, `#` comments allowed:
///
/// ```text
/// host,port nbr_host,nbr_port[,delay_ms[,loss_pct]] ...
/// ```
///
/// Hostnames are resolved to IPv4 once, at load time.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub neighbours: BTreeMap<NodeAddr, Vec<(NodeAddr, LinkProps)>>,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self, RoutingError> {
        let text = fs::read_to_string(path)?;
        let topology = Self::parse(&text)?;
        info!(file = %path.display(), nodes = topology.neighbours.len(), "loaded topology");
        Ok(topology)
    }

    pub fn parse(text: &str) -> Result<Self, RoutingError> {
        let mut neighbours: BTreeMap<NodeAddr, Vec<(NodeAddr, LinkProps)>> = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else { continue };
            let node = parse_node_token(first, line)?;
            let entry = neighbours.entry(node).or_default();
            for token in tokens {
                entry.push(parse_neighbour_token(token, line)?);
            }
        }
        Ok(Self { neighbours })
    }
}

/// `host,port`, the leading token of a topology line.
fn parse_node_token(token: &str, line: &str) -> Result<NodeAddr, RoutingError> {
    let mut parts = token.split(',');
    let (Some(host), Some(port)) = (parts.next(), parts.next()) else {
        return Err(RoutingError::BadTopologyLine(line.to_owned()));
    };
    let port: u16 = port
        .parse()
        .map_err(|_| RoutingError::BadTopologyLine(line.to_owned()))?;
    Ok(NodeAddr::new(resolve_ipv4(host)?, port))
}

/// `host,port[,delay_ms[,loss_pct]]`, a neighbour entry.
fn parse_neighbour_token(token: &str, line: &str) -> Result<(NodeAddr, LinkProps), RoutingError> {
    let bad = || RoutingError::BadTopologyLine(line.to_owned());
    let mut parts = token.split(',');
    let (Some(host), Some(port)) = (parts.next(), parts.next()) else {
        return Err(bad());
    };
    let addr = NodeAddr::new(resolve_ipv4(host)?, port.parse().map_err(|_| bad())?);
    let mut props = LinkProps::default();
    if let Some(delay) = parts.next() {
        props.delay_ms = delay.parse().map_err(|_| bad())?;
    }
    if let Some(loss) = parts.next() {
        props.loss_pct = loss.parse().map_err(|_| bad())?;
        if props.loss_pct > 100 {
            return Err(bad());
        }
    }
    if parts.next().is_some() {
        return Err(bad());
    }
    Ok((addr, props))
}

/// Resolves a hostname or dotted quad to an IPv4 address.
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, RoutingError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    let candidates = (host, 0u16)
        .to_socket_addrs()
        .map_err(|_| RoutingError::Unresolvable(host.to_owned()))?;
    for candidate in candidates {
        if let std::net::SocketAddr::V4(v4) = candidate {
            return Ok(*v4.ip());
        }
    }
    Err(RoutingError::Unresolvable(host.to_owned()))
}
