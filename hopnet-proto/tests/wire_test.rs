use std::net::Ipv4Addr;

use hopnet_proto::{NodeAddr, PacketHeader, PacketType, ProtoError, TunnelHeader};

fn sample_header(packet_type: PacketType) -> PacketHeader {
    PacketHeader {
        priority: 3,
        src: NodeAddr::new(Ipv4Addr::new(10, 0, 0, 1), 5001),
        dst: NodeAddr::new(Ipv4Addr::new(10, 0, 0, 2), 4001),
        packet_type,
        seq_no: 0xDEAD_BEEF,
        ttl: 50,
        payload_length: 1024,
        wrapped: false,
    }
}

#[test]
fn header_roundtrip_every_type() {
    for packet_type in [
        PacketType::Request,
        PacketType::Data,
        PacketType::End,
        PacketType::Ack,
        PacketType::LinkState,
        PacketType::Trace,
    ] {
        let header = sample_header(packet_type);
        let decoded = PacketHeader::decode(&header.encode()).expect("decode");
        assert_eq!(decoded, header);
    }
}

#[test]
fn header_roundtrip_wrapped_and_extremes() {
    let header = PacketHeader {
        priority: 127,
        seq_no: u32::MAX,
        ttl: 0,
        payload_length: 0,
        wrapped: true,
        ..sample_header(PacketType::Trace)
    };
    let decoded = PacketHeader::decode(&header.encode()).expect("decode");
    assert_eq!(decoded, header);
}

#[test]
fn decode_ignores_trailing_payload() {
    let header = sample_header(PacketType::Data);
    let mut packet = header.encode().to_vec();
    packet.extend_from_slice(b"payload bytes");
    assert_eq!(PacketHeader::decode(&packet).expect("decode"), header);
}

#[test]
fn decode_rejects_truncated() {
    let header = sample_header(PacketType::Data);
    let bytes = header.encode();
    let err = PacketHeader::decode(&bytes[..PacketHeader::SIZE - 1]).unwrap_err();
    assert_eq!(
        err,
        ProtoError::Truncated {
            need: PacketHeader::SIZE,
            have: PacketHeader::SIZE - 1,
        }
    );
}

#[test]
fn decode_rejects_unknown_type() {
    let mut bytes = sample_header(PacketType::Data).encode();
    bytes[13] = b'X';
    assert_eq!(
        PacketHeader::decode(&bytes).unwrap_err(),
        ProtoError::BadPacketType(b'X')
    );
}

#[test]
fn decode_rejects_priority_out_of_range() {
    let mut bytes = sample_header(PacketType::Data).encode();
    bytes[0] = 128;
    assert_eq!(
        PacketHeader::decode(&bytes).unwrap_err(),
        ProtoError::BadPriority(128)
    );
}

#[test]
fn decode_rejects_zero_source_ip() {
    let mut bytes = sample_header(PacketType::Data).encode();
    bytes[1..5].copy_from_slice(&[0, 0, 0, 0]);
    assert_eq!(
        PacketHeader::decode(&bytes).unwrap_err(),
        ProtoError::ZeroSourceIp
    );
}

#[test]
fn reversed_swaps_endpoints_and_resets_ttl() {
    let header = sample_header(PacketType::Trace);
    let reply = header.reversed();
    assert_eq!(reply.src, header.dst);
    assert_eq!(reply.dst, header.src);
    assert_eq!(reply.ttl, 1);
    assert_eq!(reply.packet_type, header.packet_type);
    assert_eq!(reply.seq_no, header.seq_no);
}

#[test]
fn tunnel_header_roundtrip() {
    let tunnel = TunnelHeader {
        dst_emulator: NodeAddr::new(Ipv4Addr::new(192, 168, 1, 7), 6000),
    };
    assert_eq!(TunnelHeader::decode(&tunnel.encode()).expect("decode"), tunnel);
}

#[test]
fn tunnel_header_rejects_truncated() {
    let tunnel = TunnelHeader {
        dst_emulator: NodeAddr::new(Ipv4Addr::new(192, 168, 1, 7), 6000),
    };
    assert!(matches!(
        TunnelHeader::decode(&tunnel.encode()[..3]),
        Err(ProtoError::Truncated { .. })
    ));
}

#[test]
fn node_addr_token_roundtrip() {
    let addr = NodeAddr::new(Ipv4Addr::new(10, 1, 2, 3), 9000);
    assert_eq!(addr.token(), "10.1.2.3,9000");
    assert_eq!(NodeAddr::from_token(&addr.token()).expect("parse"), addr);
    assert_eq!(NodeAddr::from_token(" 10.1.2.3,9000 ").expect("parse"), addr);
    assert_eq!(addr.to_string(), "10.1.2.3:9000");
}

#[test]
fn node_addr_rejects_garbage() {
    for bad in ["10.1.2.3", "10.1.2.3:9000", "host,port", "10.1.2.3,70000"] {
        assert!(matches!(
            NodeAddr::from_token(bad),
            Err(ProtoError::BadAddrToken(_))
        ));
    }
}
