//! The whole data path in memory: a sender window and a requester
//! reassembly talking through one emulator node, no sockets involved.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use hopnet_emulator::EmulatorNode;
use hopnet_proto::constants::TTL_MAX;
use hopnet_proto::{NodeAddr, PacketHeader, PacketType, TunnelHeader};
use hopnet_routing::Topology;
use hopnet_transfer::{FileRequest, Reassembly, SenderWindow, WindowConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;

const EMULATOR: NodeAddr = NodeAddr {
    ip: Ipv4Addr::new(10, 0, 0, 1),
    port: 6000,
};
const SENDER: NodeAddr = NodeAddr {
    ip: Ipv4Addr::new(10, 0, 1, 1),
    port: 5001,
};
const REQUESTER: NodeAddr = NodeAddr {
    ip: Ipv4Addr::new(10, 0, 1, 2),
    port: 4001,
};

fn registration(who: NodeAddr) -> Vec<u8> {
    PacketHeader {
        priority: 0,
        src: who,
        dst: EMULATOR,
        packet_type: PacketType::Ack,
        seq_no: 0,
        ttl: 1,
        payload_length: 0,
        wrapped: false,
    }
    .encode()
    .to_vec()
}

fn tunneled(header: PacketHeader, payload: &[u8]) -> Vec<u8> {
    let mut packet = header.encode().to_vec();
    packet.extend_from_slice(&TunnelHeader { dst_emulator: EMULATOR }.encode());
    packet.extend_from_slice(payload);
    packet
}

/// Runs the queue until it drains, returning everything the emulator put
/// on the wire.
fn pump(emulator: &mut EmulatorNode, now: Instant) -> Vec<(NodeAddr, Vec<u8>)> {
    for _ in 0..32 {
        emulator.tick_queue(now);
    }
    std::iter::from_fn(|| emulator.poll_outbound()).collect()
}

#[test]
fn file_round_trip_through_one_emulator() {
    let t0 = Instant::now();
    // sender - emulator - requester, perfect links.
    let topology =
        Topology::parse("10.0.0.1,6000 10.0.1.1,5001,0,0 10.0.1.2,4001,0,0\n").expect("topology");
    let mut emulator = EmulatorNode::new(EMULATOR, &topology, 10, StdRng::seed_from_u64(42), t0);

    emulator.handle_datagram(&registration(SENDER), t0);
    emulator.handle_datagram(&registration(REQUESTER), t0);

    // The requester asks for the file.
    let request = FileRequest {
        filename: "hello.txt".to_owned(),
        requester_emulator: EMULATOR,
        window_size: 4,
    };
    let request_payload = request.to_payload();
    let request_header = PacketHeader {
        priority: 1,
        src: REQUESTER,
        dst: SENDER,
        packet_type: PacketType::Request,
        seq_no: 0,
        ttl: TTL_MAX,
        payload_length: request_payload.len() as u32,
        wrapped: false,
    };
    emulator.handle_datagram(&tunneled(request_header, request_payload.as_bytes()), t0);

    let delivered = pump(&mut emulator, t0);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, SENDER);
    let seen_request = PacketHeader::decode(&delivered[0].1).expect("decode");
    assert_eq!(seen_request.packet_type, PacketType::Request);
    let seen_payload =
        std::str::from_utf8(&delivered[0].1[PacketHeader::SIZE..]).expect("utf8");
    let parsed = FileRequest::from_payload(seen_payload).expect("request");
    assert_eq!(parsed, request);

    // The sender serves "hello" in 2-byte segments.
    let mut window = SenderWindow::new(
        WindowConfig {
            capacity: parsed.window_size,
            rate: 1000.0,
            timeout: Duration::from_millis(1000),
            priority: 1,
            src: SENDER,
            dst: seen_request.src,
            requester_emulator: parsed.requester_emulator,
            initial_seq: 1,
        },
        t0,
    );
    let mut reassembly = Reassembly::default();
    reassembly.add_sender(1, SENDER);

    let mut now = t0;
    for chunk in [b"he".as_slice(), b"ll", b"o"] {
        while !(window.has_room() && window.ready_to_send(now)) {
            now += Duration::from_millis(1);
        }
        window.admit(chunk, now);

        // Sender -> emulator -> requester.
        while let Some(packet) = window.poll_emission() {
            emulator.handle_datagram(&packet, now);
        }
        for (dst, packet) in pump(&mut emulator, now) {
            assert_eq!(dst, REQUESTER);
            let header = PacketHeader::decode(&packet).expect("decode");
            assert_eq!(header.packet_type, PacketType::Data);
            reassembly.handle_data(
                header.src,
                header.seq_no,
                &packet[PacketHeader::SIZE..],
                now,
            );

            // Requester acks every segment back through the overlay.
            let ack = PacketHeader {
                priority: 1,
                src: REQUESTER,
                dst: header.src,
                packet_type: PacketType::Ack,
                seq_no: header.seq_no,
                ttl: TTL_MAX,
                payload_length: 0,
                wrapped: false,
            };
            emulator.handle_datagram(&tunneled(ack, &[]), now);
        }
        for (dst, packet) in pump(&mut emulator, now) {
            assert_eq!(dst, SENDER);
            let header = PacketHeader::decode(&packet).expect("decode");
            assert_eq!(header.packet_type, PacketType::Ack);
            window.on_ack(header.seq_no);
        }
    }

    // Everything acked: the window retires cleanly with no retransmits.
    assert!(window.tick(now));
    window.clear();
    let (retransmissions, first_transmissions, loss_rate) = window.loss_summary();
    assert_eq!(retransmissions, 0);
    assert_eq!(first_transmissions, 3);
    assert_eq!(loss_rate, 0.0);

    // End of stream reaches the requester without queueing.
    emulator.handle_datagram(&window.end_packet(), now);
    let delivered: Vec<_> = std::iter::from_fn(|| emulator.poll_outbound()).collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, REQUESTER);
    let end = PacketHeader::decode(&delivered[0].1).expect("decode");
    assert_eq!(end.packet_type, PacketType::End);
    let (packets, bytes, _) = reassembly
        .handle_end(end.src, end.seq_no, now)
        .expect("known sender");
    assert_eq!(packets, 3);
    assert_eq!(bytes, 5);
    assert!(reassembly.all_finished());

    let mut file = Vec::new();
    reassembly.write_out(&mut file).expect("write");
    assert_eq!(file, b"hello");
}
