//! Relay tests -- forwarding across and within transports.

use std::time::Duration;

use squadlink_protocol::{kind, Envelope};

use crate::harness::TestNode;

/// Stream peer and socket peer exchange an offer/answer through the hub.
#[tokio::test]
async fn test_stream_to_socket_relay() {
    let node = TestNode::start().await.unwrap();
    let mut alice = node.stream_client("alice").await.unwrap();
    let mut bob = node.socket_client("bob").await.unwrap();

    alice
        .send(Envelope::new("offer", "alice").to("bob").with("sdp", "v=0 offer"))
        .await
        .unwrap();
    let offer = bob.recv().await.unwrap();
    assert_eq!(offer.kind, "offer");
    assert_eq!(offer.from, "alice");
    assert_eq!(offer.to, "bob");
    assert_eq!(offer.payload["sdp"], "v=0 offer");

    bob.send(Envelope::new("answer", "bob").to("alice").with("sdp", "v=0 answer"))
        .await
        .unwrap();
    let answer = alice.recv().await.unwrap();
    assert_eq!(answer.kind, "answer");
    assert_eq!(answer.from, "bob");

    node.shutdown().await;
}

/// Forwarding to a peer with no session is silent: no reply, no error.
#[tokio::test]
async fn test_offline_target_is_dropped() {
    let node = TestNode::start().await.unwrap();
    let mut alice = node.socket_client("alice").await.unwrap();

    alice
        .send(Envelope::new("candidate", "alice").to("nobody"))
        .await
        .unwrap();
    assert!(alice.quiet_for(Duration::from_millis(300)).await);

    // Session still usable afterwards
    alice.send(Envelope::new(kind::LIST_PEER, "alice")).await.unwrap();
    let reply = alice.recv().await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.data.unwrap()[0], "alice");

    node.shutdown().await;
}

/// A second registration under the same id takes over delivery, and the
/// old connection closing does not evict the new one.
#[tokio::test]
async fn test_superseding_registration() {
    let node = TestNode::start().await.unwrap();
    let old = node.stream_client("alice").await.unwrap();
    let mut new = node.socket_client("alice").await.unwrap();
    let mut bob = node.stream_client("bob").await.unwrap();

    drop(old);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(node.hub.directory.get("alice").await.is_some());

    bob.send(Envelope::new("offer", "bob").to("alice")).await.unwrap();
    let got = new.recv().await.unwrap();
    assert_eq!(got.from, "bob");

    node.shutdown().await;
}

/// The acting peer is the registered id, not whatever `from` claims.
#[tokio::test]
async fn test_from_cannot_be_spoofed() {
    let node = TestNode::start().await.unwrap();
    let mut alice = node.socket_client("alice").await.unwrap();
    let mut bob = node.socket_client("bob").await.unwrap();

    alice
        .send(Envelope::new("offer", "mallory").to("bob"))
        .await
        .unwrap();
    assert_eq!(bob.recv().await.unwrap().from, "alice");

    node.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_deregisters_and_status_counts() {
    let node = TestNode::start().await.unwrap();
    let alice = node.socket_client("alice").await.unwrap();
    let _bob = node.stream_client("bob").await.unwrap();

    let status = node.api_status().await.unwrap();
    assert_eq!(status["peers_online"], 2);

    alice.close().await.unwrap();
    node.wait_offline("alice", Duration::from_secs(5)).await.unwrap();

    let status = node.api_status().await.unwrap();
    assert_eq!(status["peers_online"], 1);

    node.shutdown().await;
}

/// Undecodable socket frames get an error reply; the session survives.
#[tokio::test]
async fn test_bad_socket_frame_keeps_session() {
    let node = TestNode::start().await.unwrap();
    let mut alice = node.socket_client("alice").await.unwrap();

    alice.send_raw("{\"type\": 42}").await.unwrap();
    let reply = alice.recv().await.unwrap();
    assert!(!reply.success);

    alice.send(Envelope::new(kind::LIST_PEER, "alice")).await.unwrap();
    assert!(alice.recv().await.unwrap().success);

    node.shutdown().await;
}

/// Shutdown closes live sessions on both transports.
#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let node = TestNode::start().await.unwrap();
    let mut alice = node.stream_client("alice").await.unwrap();
    let mut bob = node.socket_client("bob").await.unwrap();

    node.shutdown().await;

    assert!(alice.recv().await.is_err());
    assert!(bob.recv().await.is_err());
}
