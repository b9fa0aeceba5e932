//! Transmit path, deferral and the REQ_ACK / RES_ACK handshake.

mod support;

use std::time::Duration;

use dpram_link::{ChannelId, Command, LinkConfig, LinkError, LinkMode, LinkState, SendStatus};
use support::{Harness, Recorder, test_config, wait_for};

const FMT_SEND: u16 = 0x8002;
const FMT_RES_ACK: u16 = 0x8008;
const FMT_REQ_ACK: u16 = 0x8020;
const RFS_SEND: u16 = 0x8100;
const RFS_RES_ACK: u16 = 0x8200;

#[tokio::test]
async fn message_fitting_the_queue_is_sent_with_one_send() {
    let h = Harness::online(test_config());
    let status = h.link.send(ChannelId::Rfs, b"remote fs".to_vec()).unwrap();
    assert_eq!(status, SendStatus::Sent);
    assert_eq!(h.peer.mailbox_writes(), vec![RFS_SEND]);
    assert_eq!(h.peer.drain(ChannelId::Rfs), b"remote fs");
}

#[tokio::test]
async fn message_larger_than_space_waits_for_res_ack() {
    let h = Harness::online(test_config());
    let fmt = Recorder::new();
    h.link.register(ChannelId::Fmt, fmt.clone());

    // capacity 16, head 10, tail 14: 3 bytes free.
    h.peer.set_tx_pointers(ChannelId::Fmt, 10, 14);
    let status = h.link.send(ChannelId::Fmt, b"12345".to_vec()).unwrap();
    assert_eq!(status, SendStatus::Deferred);
    assert_eq!(h.peer.tx_pointers(ChannelId::Fmt), (10, 14));
    assert_eq!(*fmt.suspends.lock(), 1);

    assert!(wait_for(|| h.peer.count_writes(FMT_REQ_ACK) >= 1).await);
    assert_eq!(h.peer.count_writes(FMT_SEND), 0);
    let diag = h.link.diagnostics();
    let ch = diag.channel(ChannelId::Fmt).unwrap();
    assert!(ch.retransmit_pending);
    assert_eq!(ch.queued, 1);

    // CP consumes what it had and acknowledges.
    h.peer.set_tx_pointers(ChannelId::Fmt, 10, 10);
    h.peer.raise(&h.link, FMT_RES_ACK);

    assert!(wait_for(|| h.peer.count_writes(FMT_SEND) >= 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.peer.count_writes(FMT_SEND), 1);
    assert_eq!(h.peer.drain(ChannelId::Fmt), b"12345");
    assert_eq!(*fmt.resumes.lock(), 1);

    let diag = h.link.diagnostics();
    let ch = diag.channel(ChannelId::Fmt).unwrap();
    assert!(!ch.retransmit_pending);
    assert!(!ch.worker_armed);
    assert_eq!(ch.queued, 0);
}

#[tokio::test]
async fn order_is_preserved_when_space_frees_one_message_at_a_time() {
    let h = Harness::online(test_config());
    let (a, b, c) = (b"AAAAAAAA", b"BBBBBBBB", b"CCCCCCCC");

    assert_eq!(h.link.send(ChannelId::Fmt, a.to_vec()).unwrap(), SendStatus::Sent);
    assert_eq!(h.link.send(ChannelId::Fmt, b.to_vec()).unwrap(), SendStatus::Deferred);
    assert_eq!(h.link.send(ChannelId::Fmt, c.to_vec()).unwrap(), SendStatus::Deferred);

    let mut received = h.peer.drain(ChannelId::Fmt);
    for _ in 0..2 {
        h.peer.raise(&h.link, FMT_RES_ACK);
        assert!(
            wait_for(|| {
                let (head, tail) = h.peer.tx_pointers(ChannelId::Fmt);
                head != tail
            })
            .await
        );
        received.extend(h.peer.drain(ChannelId::Fmt));
    }

    assert_eq!(received, [&a[..], &b[..], &c[..]].concat());
    assert_eq!(h.peer.count_writes(FMT_SEND), 3);
}

#[tokio::test]
async fn missing_res_ack_repeats_req_ack() {
    let config = LinkConfig {
        res_ack_timeout: Duration::from_millis(10),
        ..test_config()
    };
    let h = Harness::online(config);

    // tail one ahead of head: full.
    h.peer.set_tx_pointers(ChannelId::Fmt, 0, 1);
    assert_eq!(
        h.link.send(ChannelId::Fmt, b"x".to_vec()).unwrap(),
        SendStatus::Deferred
    );
    assert!(wait_for(|| h.peer.count_writes(FMT_REQ_ACK) >= 3).await);
    assert_eq!(h.peer.count_writes(FMT_SEND), 0);

    h.peer.set_tx_pointers(ChannelId::Fmt, 0, 0);
    h.peer.raise(&h.link, FMT_RES_ACK);
    assert!(wait_for(|| h.peer.count_writes(FMT_SEND) == 1).await);
    assert_eq!(h.peer.drain(ChannelId::Fmt), b"x");
}

#[tokio::test]
async fn oversized_message_is_rejected() {
    let h = Harness::online(test_config());
    let err = h.link.send(ChannelId::Fmt, vec![0u8; 16]).unwrap_err();
    assert!(matches!(
        err,
        LinkError::MessageTooLarge {
            channel: ChannelId::Fmt,
            len: 16,
            max: 15
        }
    ));
    assert_eq!(
        h.link.send(ChannelId::Fmt, vec![0u8; 15]).unwrap(),
        SendStatus::Sent
    );
}

#[tokio::test]
async fn raw_backlog_beyond_limit_is_dropped() {
    let config = LinkConfig {
        txq_max: 2,
        ..test_config()
    };
    let h = Harness::new(config);

    for _ in 0..3 {
        assert_eq!(
            h.link.send(ChannelId::Raw, b"pkt".to_vec()).unwrap(),
            SendStatus::Queued
        );
    }
    assert_eq!(
        h.link.send(ChannelId::Raw, b"pkt".to_vec()).unwrap(),
        SendStatus::Dropped
    );
    // Reliable channels are never dropped.
    for _ in 0..4 {
        assert_eq!(
            h.link.send(ChannelId::Fmt, b"cmd".to_vec()).unwrap(),
            SendStatus::Queued
        );
    }

    let diag = h.link.diagnostics();
    assert_eq!(diag.channel(ChannelId::Raw).unwrap().traffic.dropped, 1);
    assert_eq!(diag.channel(ChannelId::Raw).unwrap().queued, 3);
}

#[tokio::test]
async fn crash_exit_purges_queues_before_they_are_transmitted() {
    let h = Harness::online(test_config());
    let fmt = Recorder::new();
    h.link.register(ChannelId::Fmt, fmt.clone());

    h.peer.set_tx_pointers(ChannelId::Fmt, 0, 1);
    h.peer.set_tx_pointers(ChannelId::Rfs, 0, 1);
    assert_eq!(
        h.link.send(ChannelId::Fmt, b"f".to_vec()).unwrap(),
        SendStatus::Deferred
    );
    assert_eq!(
        h.link.send(ChannelId::Rfs, b"r".to_vec()).unwrap(),
        SendStatus::Deferred
    );

    h.peer.command(&h.link, Command::CrashExit);
    assert_eq!(h.link.mode(), LinkMode::Upload);
    assert!(h.link.wake_lock_held());
    assert_eq!(fmt.states(), vec![LinkState::CrashExit]);

    // Space frees up and RES_ACK arrives, but nothing may go out.
    h.peer.set_tx_pointers(ChannelId::Fmt, 0, 0);
    h.peer.set_tx_pointers(ChannelId::Rfs, 0, 0);
    h.peer.raise(&h.link, FMT_RES_ACK | RFS_RES_ACK);
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(h.peer.count_writes(FMT_SEND), 0);
    assert_eq!(h.peer.count_writes(RFS_SEND), 0);
    assert_eq!(h.peer.tx_pointers(ChannelId::Fmt), (0, 0));

    let diag = h.link.diagnostics();
    for id in [ChannelId::Fmt, ChannelId::Rfs] {
        let ch = diag.channel(id).unwrap();
        assert_eq!(ch.queued, 0, "{id}");
        assert_eq!(ch.traffic.dropped, 1, "{id}");
    }

    // Later submissions are held, never transmitted.
    assert_eq!(
        h.link.send(ChannelId::Fmt, b"late".to_vec()).unwrap(),
        SendStatus::Queued
    );
    assert_eq!(h.peer.count_writes(FMT_SEND), 0);
}

#[tokio::test]
async fn shutdown_stops_retry_worker() {
    let config = LinkConfig {
        res_ack_timeout: Duration::from_millis(10),
        ..test_config()
    };
    let h = Harness::online(config);
    h.peer.set_tx_pointers(ChannelId::Fmt, 0, 1);
    h.link.send(ChannelId::Fmt, b"x".to_vec()).unwrap();
    assert!(wait_for(|| h.peer.count_writes(FMT_REQ_ACK) >= 1).await);

    h.link.shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after = h.peer.count_writes(FMT_REQ_ACK);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.peer.count_writes(FMT_REQ_ACK), after);
}

#[tokio::test]
async fn direct_send_that_drains_backlog_resumes_consumer() {
    let h = Harness::online(test_config());
    let fmt = Recorder::new();
    h.link.register(ChannelId::Fmt, fmt.clone());

    h.peer.set_tx_pointers(ChannelId::Fmt, 0, 1);
    assert_eq!(
        h.link.send(ChannelId::Fmt, b"x".to_vec()).unwrap(),
        SendStatus::Deferred
    );
    assert_eq!(*fmt.suspends.lock(), 1);

    // Space appears without a RES_ACK; the next send carries both.
    h.peer.set_tx_pointers(ChannelId::Fmt, 0, 0);
    assert_eq!(
        h.link.send(ChannelId::Fmt, b"y".to_vec()).unwrap(),
        SendStatus::Sent
    );
    assert_eq!(*fmt.resumes.lock(), 1);

    let diag = h.link.diagnostics();
    let ch = diag.channel(ChannelId::Fmt).unwrap();
    assert_eq!(ch.queued, 0);
    assert!(!ch.retransmit_pending);
    assert!(!diag.format().contains("PENDING"));

    // The worker armed for "x" finds nothing left and asks for nothing.
    assert!(
        wait_for(|| {
            let diag = h.link.diagnostics();
            !diag.channel(ChannelId::Fmt).unwrap().worker_armed
        })
        .await
    );
    assert_eq!(h.peer.count_writes(FMT_REQ_ACK), 0);
    assert_eq!(h.peer.count_writes(FMT_SEND), 1);
    assert_eq!(h.peer.drain(ChannelId::Fmt), b"xy");
}
