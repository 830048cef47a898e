use std::net::Ipv4Addr;

use hopnet_proto::NodeAddr;
use hopnet_transfer::{Tracker, TransferError};

#[test]
fn parses_and_orders_by_file_id() {
    let tracker = Tracker::parse(
        "# filename id sender_emulator sender\n\
         split.txt 2 10.0.0.3,6000 10.0.1.2,5001\n\
         split.txt 1 10.0.0.2,6000 10.0.1.1,5001\n\
         other.bin 1 10.0.0.2,6000 10.0.1.3,5001\n",
    )
    .expect("parse");

    let entries = tracker.lookup("split.txt").expect("lookup");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].file_id, 1);
    assert_eq!(
        entries[0].sender,
        NodeAddr::new(Ipv4Addr::new(10, 0, 1, 1), 5001)
    );
    assert_eq!(
        entries[0].sender_emulator,
        NodeAddr::new(Ipv4Addr::new(10, 0, 0, 2), 6000)
    );
    assert_eq!(entries[1].file_id, 2);

    assert_eq!(tracker.lookup("other.bin").expect("lookup").len(), 1);
}

#[test]
fn missing_filename_is_fatal() {
    let tracker = Tracker::parse("split.txt 1 10.0.0.2,6000 10.0.1.1,5001\n").expect("parse");
    assert!(matches!(
        tracker.lookup("nope.txt"),
        Err(TransferError::NotTracked(_))
    ));
}

#[test]
fn rejects_malformed_lines() {
    for bad in [
        "split.txt 1 10.0.0.2,6000",
        "split.txt one 10.0.0.2,6000 10.0.1.1,5001",
        "split.txt 1 10.0.0.2:6000 10.0.1.1,5001",
        "split.txt 1 10.0.0.2,6000 10.0.1.1,5001 extra",
    ] {
        assert!(
            matches!(Tracker::parse(bad), Err(TransferError::BadTrackerLine(_))),
            "expected rejection of {bad:?}"
        );
    }
}
