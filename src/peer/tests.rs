use super::*;
use crate::constants::BLOCK_SIZE;
use crate::crypto::HashService;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn source(bitfield: Bitfield) -> BitfieldSource {
    Arc::new(move || bitfield.clone())
}

async fn recv(session: &mut WireSession) -> Message {
    timeout(Duration::from_secs(1), session.recv())
        .await
        .expect("timed out waiting for message")
        .expect("session closed")
}

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<PeerEvent>) -> PeerEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[test]
fn test_bitfield_set_and_count() {
    let mut bf = Bitfield::new(10);
    assert!(bf.is_empty());
    assert_eq!(bf.as_bytes().len(), 2);

    assert!(bf.set(0));
    assert!(!bf.set(0));
    assert!(bf.set(9));
    assert!(!bf.set(10));

    assert!(bf.has(0));
    assert!(bf.has(9));
    assert!(!bf.has(10));
    assert_eq!(bf.count(), 2);
    assert_eq!(bf.len(), 10);
    assert_eq!(bf.missing(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_bitfield_full_clears_spare_bits() {
    let bf = Bitfield::full(10);
    assert!(bf.is_complete());
    assert_eq!(bf.as_bytes(), &[0xFFu8, 0xC0]);
}

#[test]
fn test_bitfield_from_bytes_normalizes_length() {
    let short = Bitfield::from_bytes(&[0x80], 12);
    assert_eq!(short.as_bytes(), &[0x80u8, 0x00]);
    assert!(short.has(0));

    let long = Bitfield::from_bytes(&[0xFF, 0xFF, 0xFF], 4);
    assert_eq!(long.as_bytes(), &[0xF0u8]);
    assert_eq!(long.count(), 4);
}

#[test]
fn test_bitfield_wanted_by() {
    let theirs = Bitfield::from_bytes(&[0b1110_0000], 4);
    let mut ours = Bitfield::new(4);
    ours.set(1);
    assert_eq!(theirs.wanted_by(&ours), vec![0, 2]);
}

#[test]
fn test_split_piece() {
    let blocks = BlockRequest::split_piece(3, BLOCK_SIZE as u64 * 2 + 100);
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0], BlockRequest::new(3, 0, BLOCK_SIZE));
    assert_eq!(blocks[2], BlockRequest::new(3, BLOCK_SIZE * 2, 100));

    assert!(BlockRequest::split_piece(0, 0).is_empty());
}

#[tokio::test]
async fn test_peer_id_generate() {
    let hashes = HashService::with_defaults();
    let a = PeerId::generate(&hashes).await.unwrap();
    let b = PeerId::generate(&hashes).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(a.to_string().len(), 40);
    assert!(PeerId::from_bytes(&[0u8; 19]).is_none());
}

#[tokio::test]
async fn test_handshake_is_answered_with_bitfield() {
    let (ours, mut remote) = WireSession::pair();
    let local_id = PeerId([1; 20]);
    let (peer, _events) = Peer::spawn(ours, local_id, source(Bitfield::full(4)));
    assert_eq!(peer.state(), PeerState::Connecting);

    match recv(&mut remote).await {
        Message::Handshake { peer_id, .. } => assert_eq!(peer_id, local_id),
        other => panic!("expected handshake, got {other:?}"),
    }

    remote
        .send(Message::Handshake {
            peer_id: PeerId([2; 20]),
            extensions: vec!["ut_test".into()],
        })
        .unwrap();

    assert_eq!(recv(&mut remote).await, Message::Bitfield(Bitfield::full(4)));
    assert_eq!(peer.state(), PeerState::Active);
    assert_eq!(peer.remote_id(), Some(PeerId([2; 20])));
    assert_eq!(peer.remote_extensions(), vec!["ut_test".to_string()]);
}

#[tokio::test]
async fn test_bitfield_and_have_update_remote_state() {
    let (ours, remote) = WireSession::pair();
    let (peer, mut events) = Peer::spawn(ours, PeerId([1; 20]), source(Bitfield::new(4)));
    assert!(peer.bitfield().is_none());
    assert!(!peer.knows_piece(0));

    remote.send(Message::Have { piece: 2 }).unwrap();
    assert_eq!(next_event(&mut events).await, PeerEvent::Have(2));
    assert!(peer.has_piece(2));
    assert!(!peer.has_piece(1));
    assert!(peer.knows_piece(1));
    assert_eq!(peer.bitfield().map(|bf| bf.len()), Some(4));

    remote.send(Message::Have { piece: 9 }).unwrap();
    remote
        .send(Message::Bitfield(Bitfield::from_bytes(&[0b1000_0000], 4)))
        .unwrap();
    match next_event(&mut events).await {
        PeerEvent::Bitfield(bf) => assert!(bf.has(0)),
        other => panic!("expected bitfield, got {other:?}"),
    }
    assert!(peer.has_piece(0));
    assert!(!peer.has_piece(2));
}

#[tokio::test]
async fn test_requests_and_pieces_are_forwarded() {
    let (ours, remote) = WireSession::pair();
    let (_peer, mut events) = Peer::spawn(ours, PeerId([1; 20]), source(Bitfield::new(1)));

    let request = BlockRequest::new(0, 0, 4);
    remote.send(Message::Request(request)).unwrap();
    assert_eq!(next_event(&mut events).await, PeerEvent::Request(request));

    let block = Block::new(0, 0, &b"data"[..]);
    remote.send(Message::Piece(block.clone())).unwrap();
    assert_eq!(next_event(&mut events).await, PeerEvent::Piece(block));
}

#[tokio::test]
async fn test_outbound_actions() {
    let (ours, mut remote) = WireSession::pair();
    let (peer, _events) = Peer::spawn(ours, PeerId([1; 20]), source(Bitfield::new(2)));
    recv(&mut remote).await;

    let request = BlockRequest::new(1, 0, 16);
    peer.request(request).unwrap();
    peer.cancel(request).unwrap();
    peer.have(1).unwrap();
    peer.set_interested().unwrap();
    assert!(peer.am_interested());
    peer.set_uninterested().unwrap();
    assert!(!peer.am_interested());

    assert_eq!(recv(&mut remote).await, Message::Request(request));
    assert_eq!(recv(&mut remote).await, Message::Cancel(request));
    assert_eq!(recv(&mut remote).await, Message::Have { piece: 1 });
    assert_eq!(recv(&mut remote).await, Message::Interested);
    assert_eq!(recv(&mut remote).await, Message::NotInterested);
}

#[tokio::test]
async fn test_actions_fail_after_close() {
    let (ours, mut remote) = WireSession::pair();
    let (peer, mut events) = Peer::spawn(ours, PeerId([1; 20]), source(Bitfield::new(2)));
    recv(&mut remote).await;

    peer.close();
    assert!(peer.is_closed());
    assert_eq!(
        peer.request(BlockRequest::new(0, 0, 1)),
        Err(PeerError::SessionClosed)
    );
    assert_eq!(peer.have(0), Err(PeerError::SessionClosed));
    assert_eq!(next_event(&mut events).await, PeerEvent::Closed);

    let closed = timeout(Duration::from_secs(1), remote.recv()).await.unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_remote_close_emits_closed_once() {
    let (ours, remote) = WireSession::pair();
    let (peer, mut events) = Peer::spawn(ours, PeerId([1; 20]), source(Bitfield::new(2)));

    drop(remote);
    assert_eq!(next_event(&mut events).await, PeerEvent::Closed);
    assert_eq!(peer.state(), PeerState::Closed);
    assert_eq!(peer.set_uninterested(), Err(PeerError::SessionClosed));

    let rest = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert!(rest.is_none());
}
