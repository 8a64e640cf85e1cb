//! Squad tests -- membership fan-out over live sessions, the HTTP request
//! endpoint, and the key-ownership auth flow.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use squadlink_protocol::{event, field, kind, Envelope};

use crate::harness::TestNode;

fn create_squad(from: &str, id: &str, visibility: &str, network: &str) -> Envelope {
    let env = Envelope::new(kind::CREATE_SQUAD, from)
        .with(field::SQUAD_ID, id)
        .with(field::SQUAD_NAME, format!("{id} squad"))
        .with(field::SQUAD_TYPE, visibility)
        .with(field::SQUAD_NETWORK_TYPE, network)
        .with(field::PASSWORD, "hunter2");
    if network == "hosted" {
        env.with(field::SQUAD_HOST, from)
    } else {
        env
    }
}

fn join(from: &str, id: &str, password: &str) -> Envelope {
    Envelope::new(kind::JOIN_SQUAD, from)
        .with(field::SQUAD_ID, id)
        .with(field::PASSWORD, password)
}

/// Register `peer` with a fresh RSA key and complete the challenge over
/// HTTP. Returns the bearer token.
async fn authenticate(node: &TestNode, peer: &str) -> String {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = RsaPublicKey::from(&private)
        .to_public_key_pem(LineEnding::LF)
        .unwrap();

    let (status, _) = node
        .req(
            &Envelope::new(kind::CREATE_PEER, peer)
                .with(field::PEER_ID, peer)
                .with(field::PEER_KEY, pem)
                .with(field::PEER_NAME, peer.to_uppercase()),
        )
        .await
        .unwrap();
    assert_eq!(status, 200);

    let (status, body) = node
        .req(&Envelope::new(kind::PEER_AUTH_INIT, peer).with(field::PEER_ID, peer))
        .await
        .unwrap();
    assert_eq!(status, 200);
    let sealed = BASE64
        .decode(body["payload"]["token"].as_str().unwrap())
        .unwrap();
    let nonce = String::from_utf8(private.decrypt(Pkcs1v15Encrypt, &sealed).unwrap()).unwrap();

    let (status, body) = node
        .req(
            &Envelope::new(kind::PEER_AUTH_VERIFY, peer)
                .with(field::PEER_ID, peer)
                .with(field::TOKEN, nonce.clone()),
        )
        .await
        .unwrap();
    assert_eq!(status, 200, "verify failed: {body}");
    nonce
}

/// Members on different transports see each other join and leave.
#[tokio::test]
async fn test_join_leave_notifications() {
    let node = TestNode::start().await.unwrap();
    let mut alice = node.socket_client("alice").await.unwrap();
    let mut bob = node.stream_client("bob").await.unwrap();
    let mut carol = node.socket_client("carol").await.unwrap();

    alice.send(create_squad("alice", "s1", "private", "mesh")).await.unwrap();
    assert!(alice.recv().await.unwrap().success);
    alice.send(join("alice", "s1", "hunter2")).await.unwrap();
    assert!(alice.recv().await.unwrap().success);

    bob.send(join("bob", "s1", "hunter2")).await.unwrap();
    let reply = bob.recv().await.unwrap();
    assert!(reply.success);
    assert_eq!(reply.payload[field::SQUAD_ID], "s1");

    let incoming = alice.recv().await.unwrap();
    assert_eq!(incoming.kind, event::INCOMING_MEMBER);
    assert_eq!(incoming.payload[field::ID], "bob");

    // Wrong password: denied, nobody notified
    carol.send(join("carol", "s1", "nope")).await.unwrap();
    let denied = carol.recv().await.unwrap();
    assert!(!denied.success);
    assert!(alice.quiet_for(Duration::from_millis(200)).await);

    bob.send(
        Envelope::new(kind::LEAVE_SQUAD, "bob").with(field::SQUAD_ID, "s1"),
    )
    .await
    .unwrap();
    assert!(bob.recv().await.unwrap().success);

    let leaving = alice.recv().await.unwrap();
    assert_eq!(leaving.kind, event::LEAVING_MEMBER);
    assert_eq!(leaving.payload[field::ID], "bob");
    assert!(bob.quiet_for(Duration::from_millis(200)).await);

    node.shutdown().await;
}

#[tokio::test]
async fn test_hosted_squad_events() {
    let node = TestNode::start().await.unwrap();
    let mut host = node.socket_client("host").await.unwrap();
    let mut guest = node.socket_client("guest").await.unwrap();

    host.send(create_squad("host", "h1", "public", "hosted")).await.unwrap();
    let created = host.recv().await.unwrap();
    assert!(created.success);
    assert_eq!(created.data.unwrap()["hostId"], "host");

    host.send(join("host", "h1", "")).await.unwrap();
    assert!(host.recv().await.unwrap().success);
    guest
        .send(
            join("guest", "h1", "").with(field::NETWORK_TYPE, "hosted"),
        )
        .await
        .unwrap();
    assert!(guest.recv().await.unwrap().success);

    let incoming = host.recv().await.unwrap();
    assert_eq!(incoming.kind, event::HOSTED_INCOMING_MEMBER);

    node.shutdown().await;
}

#[tokio::test]
async fn test_http_request_validation() {
    let node = TestNode::start().await.unwrap();

    let (status, body) = node.post_raw("/req", "{oops".into()).await.unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);

    let (status, body) = node
        .req(&Envelope::new(kind::CREATE_SQUAD, "alice").with(field::SQUAD_ID, "s1"))
        .await
        .unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["reason"], "no field squadName in payload");

    let (status, _) = node
        .req(&create_squad("alice", "s1", "secret", "mesh"))
        .await
        .unwrap();
    assert_eq!(status, 400);

    let (status, _) = node.req(&join("bob", "ghost", "")).await.unwrap();
    assert_eq!(status, 404);

    let (status, _) = node
        .req(&create_squad("alice", "s1", "public", "mesh"))
        .await
        .unwrap();
    assert_eq!(status, 200);
    let (status, _) = node
        .req(&create_squad("alice", "s1", "public", "mesh"))
        .await
        .unwrap();
    assert_eq!(status, 409);

    node.shutdown().await;
}

/// Full auth flow, then owner-gated operations over HTTP with the token.
#[tokio::test]
async fn test_auth_flow_and_owner_gate() {
    let node = TestNode::start().await.unwrap();
    let token = authenticate(&node, "alice").await;

    // Second challenge for an unknown peer
    let (status, _) = node
        .req(&Envelope::new(kind::PEER_AUTH_INIT, "ghost").with(field::PEER_ID, "ghost"))
        .await
        .unwrap();
    assert_eq!(status, 404);

    let (status, _) = node
        .req(&create_squad("alice", "s1", "private", "mesh"))
        .await
        .unwrap();
    assert_eq!(status, 200);

    let delete = Envelope::new(kind::DELETE_SQUAD, "alice").with(field::SQUAD_ID, "s1");
    let (status, body) = node.req(&delete).await.unwrap();
    assert_eq!(status, 403, "no token: {body}");

    let (status, _) = node.req(&delete.clone().token("forged")).await.unwrap();
    assert_eq!(status, 403);

    let (status, body) = node
        .req(
            &Envelope::new(kind::GET_SQUADS_BY_OWNER, "alice")
                .with(field::OWNER, "alice")
                .token(token.clone()),
        )
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["id"], "s1");
    assert_eq!(body["data"][0]["password"], "");

    let (status, _) = node.req(&delete.token(token)).await.unwrap();
    assert_eq!(status, 200);

    let (status, _) = node.req(&join("bob", "s1", "hunter2")).await.unwrap();
    assert_eq!(status, 404);

    node.shutdown().await;
}

/// An authorized member with a verified token joins a private squad
/// without the password.
#[tokio::test]
async fn test_authorized_member_joins_with_token() {
    let node = TestNode::start().await.unwrap();
    let alice_token = authenticate(&node, "alice").await;
    let bob_token = authenticate(&node, "bob").await;

    node.req(&create_squad("alice", "s1", "private", "mesh"))
        .await
        .unwrap();
    let (status, _) = node
        .req(
            &Envelope::new(kind::UPDATE_SQUAD_AUTHORIZED_MEMBERS, "alice")
                .with(field::SQUAD_ID, "s1")
                .with(field::AUTHORIZED_MEMBER, "bob")
                .token(alice_token),
        )
        .await
        .unwrap();
    assert_eq!(status, 200);

    let mut bob = node.stream_client("bob").await.unwrap();
    bob.send(join("bob", "s1", "").token(bob_token)).await.unwrap();
    assert!(bob.recv().await.unwrap().success);

    let (_, body) = node
        .req(
            &Envelope::new(kind::LIST_SQUADS_BY_ID, "bob")
                .with(field::NETWORK_TYPE, "mesh")
                .with(field::SQUAD_ID, "^s1$"),
        )
        .await
        .unwrap();
    assert_eq!(body["data"][0]["members"][0], "bob");

    node.shutdown().await;
}
