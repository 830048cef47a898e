use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::constants::MAX_PRIORITY_CLASSES;
use crate::error::ProtoError;

/// An overlay node identity: an IPv4 address plus UDP port.
///
/// Printed as `ip:port`; serialized into text payloads (link-state
/// advertisements, request payloads, tracker lines) as `ip,port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parses an `ip,port` token as used in payloads and config files.
    pub fn from_token(token: &str) -> Result<Self, ProtoError> {
        let bad = || ProtoError::BadAddrToken(token.to_owned());
        let (ip, port) = token.trim().split_once(',').ok_or_else(bad)?;
        Ok(Self {
            ip: ip.parse().map_err(|_| bad())?,
            port: port.parse().map_err(|_| bad())?,
        })
    }

    /// The `ip,port` form used inside text payloads.
    pub fn token(&self) -> String {
        format!("{},{}", self.ip, self.port)
    }

    pub fn socket(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The six packet kinds carried by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// `R`: file request, requester to sender.
    Request,
    /// `D`: file data segment.
    Data,
    /// `E`: end of stream; never queued or loss-dropped by emulators.
    End,
    /// `A`: acknowledgement, or client registration when sent to an emulator.
    Ack,
    /// `L`: link-state advertisement between emulators.
    LinkState,
    /// `T`: route-trace probe and reply.
    Trace,
}

impl PacketType {
    pub fn wire_byte(self) -> u8 {
        match self {
            PacketType::Request => b'R',
            PacketType::Data => b'D',
            PacketType::End => b'E',
            PacketType::Ack => b'A',
            PacketType::LinkState => b'L',
            PacketType::Trace => b'T',
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtoError;

    fn try_from(byte: u8) -> Result<Self, ProtoError> {
        match byte {
            b'R' => Ok(PacketType::Request),
            b'D' => Ok(PacketType::Data),
            b'E' => Ok(PacketType::End),
            b'A' => Ok(PacketType::Ack),
            b'L' => Ok(PacketType::LinkState),
            b'T' => Ok(PacketType::Trace),
            other => Err(ProtoError::BadPacketType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_byte() as char)
    }
}

/// The fixed 25-byte packet header, big-endian, no padding.
///
/// The same layout serves as the outer header on every datagram and as the
/// inner header of tunnelled packets (`wrapped` is 1 only at the outer
/// level). `payload_length` counts every byte following this header,
/// including any inner or tunnel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub priority: u8,
    pub src: NodeAddr,
    pub dst: NodeAddr,
    pub packet_type: PacketType,
    pub seq_no: u32,
    pub ttl: u16,
    pub payload_length: u32,
    pub wrapped: bool,
}

impl PacketHeader {
    pub const SIZE: usize = 25;

    /// Decodes a header from the front of `bytes`; trailing bytes are the
    /// payload and are ignored here.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < Self::SIZE {
            return Err(ProtoError::Truncated {
                need: Self::SIZE,
                have: bytes.len(),
            });
        }
        let priority = bytes[0];
        if priority >= MAX_PRIORITY_CLASSES {
            return Err(ProtoError::BadPriority(priority));
        }
        let packet_type = PacketType::try_from(bytes[13])?;
        let src = NodeAddr::new(
            Ipv4Addr::from(read_u32(&bytes[1..5])),
            read_u16(&bytes[5..7]),
        );
        if src.ip.is_unspecified() {
            return Err(ProtoError::ZeroSourceIp);
        }
        let dst = NodeAddr::new(
            Ipv4Addr::from(read_u32(&bytes[7..11])),
            read_u16(&bytes[11..13]),
        );
        Ok(Self {
            priority,
            src,
            dst,
            packet_type,
            seq_no: read_u32(&bytes[14..18]),
            ttl: read_u16(&bytes[18..20]),
            payload_length: read_u32(&bytes[20..24]),
            wrapped: bytes[24] != 0,
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        debug_assert!(!self.src.ip.is_unspecified());
        debug_assert!(self.priority < MAX_PRIORITY_CLASSES);
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.priority;
        buf[1..5].copy_from_slice(&self.src.ip.octets());
        buf[5..7].copy_from_slice(&self.src.port.to_be_bytes());
        buf[7..11].copy_from_slice(&self.dst.ip.octets());
        buf[11..13].copy_from_slice(&self.dst.port.to_be_bytes());
        buf[13] = self.packet_type.wire_byte();
        buf[14..18].copy_from_slice(&self.seq_no.to_be_bytes());
        buf[18..20].copy_from_slice(&self.ttl.to_be_bytes());
        buf[20..24].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[24] = self.wrapped as u8;
        buf
    }

    /// A new header with source and destination swapped and the TTL reset
    /// to 1, ready to travel one hop back. Other fields carry over.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            ttl: 1,
            ..*self
        }
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} prio={} seq={} ttl={} len={} wrapped={}",
            self.packet_type,
            self.src,
            self.dst,
            self.priority,
            self.seq_no,
            self.ttl,
            self.payload_length,
            self.wrapped as u8,
        )
    }
}

/// The 6-byte tunnel header a client prepends to its payload, naming the
/// emulator that terminates the tunnel at the far end. Only ever present
/// on the single hop between a client and its ingress emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelHeader {
    pub dst_emulator: NodeAddr,
}

impl TunnelHeader {
    pub const SIZE: usize = 6;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < Self::SIZE {
            return Err(ProtoError::Truncated {
                need: Self::SIZE,
                have: bytes.len(),
            });
        }
        Ok(Self {
            dst_emulator: NodeAddr::new(
                Ipv4Addr::from(read_u32(&bytes[0..4])),
                read_u16(&bytes[4..6]),
            ),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.dst_emulator.ip.octets());
        buf[4..6].copy_from_slice(&self.dst_emulator.port.to_be_bytes());
        buf
    }
}

impl fmt::Display for TunnelHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dst-emulator={}", self.dst_emulator)
    }
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes(bytes.try_into().unwrap())
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(bytes.try_into().unwrap())
}
