use super::*;
use crate::constants::{ED25519, SHA1, SHA256};
use crate::crypto::{CryptoError, HashAlgorithm, HashService, Sha1Hash, SigningService};
use crate::dht::{DhtService, MemoryDht, TargetKey};
use crate::discovery::{DiscoveryError, MemoryNetwork};
use crate::metainfo::{Info, SignedMetainfo, SwarmId};
use crate::peer::{Bitfield, Block, BlockRequest, Message, Peer, PeerId, WireExtension, WireSession};
use crate::piece::PieceManager;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Instant};

const PIECE_LENGTH: u64 = 20 * 1024;

fn content() -> Vec<u8> {
    (0..PIECE_LENGTH as usize * 4 - 100)
        .map(|i| (i % 251) as u8)
        .collect()
}

fn piece(data: &[u8], index: usize) -> &[u8] {
    let start = index * PIECE_LENGTH as usize;
    let end = (start + PIECE_LENGTH as usize).min(data.len());
    &data[start..end]
}

async fn signed(hashes: &HashService, data: &[u8]) -> SignedMetainfo {
    let keys = SigningService::with_defaults()
        .generate_key_pair(ED25519)
        .unwrap();
    let info = Info::from_content("content.bin", data, PIECE_LENGTH, SHA256, hashes)
        .await
        .unwrap();
    SignedMetainfo::create(info, &keys, hashes, 1).await.unwrap()
}

fn builder(hashes: &Arc<HashService>, network: &MemoryNetwork, name: &str) -> PeerManagerBuilder {
    PeerManager::builder(Arc::clone(hashes)).strategy(Arc::new(network.strategy(name)))
}

fn manager(hashes: &Arc<HashService>, network: &MemoryNetwork, name: &str) -> Arc<PeerManager> {
    builder(hashes, network, name)
        .build(Arc::new(PieceManager::new(4)))
        .unwrap()
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

async fn next_matching<T>(
    events: &mut broadcast::Receiver<PeerManagerEvent>,
    mut pick: impl FnMut(PeerManagerEvent) -> Option<T>,
) -> T {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_seed_leech_exchange_and_have_broadcast() {
    let hashes = Arc::new(HashService::with_defaults());
    let data = content();
    let metainfo = signed(&hashes, &data).await;
    let network = MemoryNetwork::new();

    let seed = Swarm::start(
        metainfo.clone(),
        Arc::new(MemoryStore::from_content(&data, PIECE_LENGTH)),
        builder(&hashes, &network, "a"),
    )
    .await
    .unwrap();
    assert!(seed.pieces().is_complete());
    let mut seed_events = seed.manager().subscribe();

    let leech_store = Arc::new(MemoryStore::new());
    let leech = Swarm::start(metainfo.clone(), leech_store.clone(), builder(&hashes, &network, "b"))
        .await
        .unwrap();
    assert_eq!(leech.pieces().bitfield().count(), 0);

    let third = manager(&hashes, &network, "c");
    third.search(&metainfo.swarm_id()).await.unwrap();

    let leech_id = leech.manager().local_peer_id().await.unwrap();
    eventually("leech to see both peers", || leech.manager().peer_count() == 2).await;
    eventually("the seed bitfield at the leech", || {
        leech.manager().peer_that_has_piece(2).is_some()
    })
    .await;
    eventually("the third peer to see the leech", || {
        third
            .peers()
            .iter()
            .any(|(_, peer)| peer.remote_id() == Some(leech_id))
    })
    .await;

    assert_eq!(leech.request_piece(2).unwrap(), 2);
    let request = next_matching(&mut seed_events, |event| match event {
        PeerManagerEvent::GotRequest { request, .. } => Some(request),
        _ => None,
    })
    .await;
    assert_eq!(request.piece, 2);

    eventually("the leech to complete piece 2", || leech.pieces().has_piece(2)).await;
    let stored = leech_store
        .read_piece(2, PIECE_LENGTH)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, piece(&data, 2));

    let (_, leech_at_third) = third
        .peers()
        .into_iter()
        .find(|(_, peer)| peer.remote_id() == Some(leech_id))
        .unwrap();
    eventually("have(2) at the third peer", || leech_at_third.has_piece(2)).await;
    assert!(!leech_at_third.has_piece(1));
}

#[tokio::test]
async fn test_request_missing_completes_download() {
    let hashes = Arc::new(HashService::with_defaults());
    let data = content();
    let metainfo = signed(&hashes, &data).await;
    let network = MemoryNetwork::new();

    let _seed = Swarm::start(
        metainfo.clone(),
        Arc::new(MemoryStore::from_content(&data, PIECE_LENGTH)),
        builder(&hashes, &network, "seed"),
    )
    .await
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let leech = Swarm::start(metainfo, store.clone(), builder(&hashes, &network, "leech"))
        .await
        .unwrap();
    eventually("the seed bitfield", || {
        leech.manager().peer_that_has_piece(0).is_some()
    })
    .await;

    assert_eq!(leech.request_missing().unwrap(), 8);
    eventually("the download to finish", || leech.pieces().is_complete()).await;
    for index in 0..4 {
        let size = piece(&data, index).len() as u64;
        let stored = store.read_piece(index as u32, size).await.unwrap().unwrap();
        assert_eq!(stored, piece(&data, index));
    }
    assert_eq!(leech.request_missing().unwrap(), 0);
}

#[tokio::test]
async fn test_start_discards_corrupt_stored_piece() {
    let hashes = Arc::new(HashService::with_defaults());
    let data = content();
    let metainfo = signed(&hashes, &data).await;
    let network = MemoryNetwork::new();

    let store = Arc::new(MemoryStore::from_content(&data, PIECE_LENGTH));
    store
        .write_block(&Block::new(1, 0, vec![0u8; PIECE_LENGTH as usize]))
        .await
        .unwrap();

    let swarm = Swarm::start(metainfo, store.clone(), builder(&hashes, &network, "s"))
        .await
        .unwrap();
    assert_eq!(swarm.pieces().missing_pieces(), vec![1]);
    assert_eq!(store.len(), 3);
    assert!(!store.has_piece(1, PIECE_LENGTH).await.unwrap());
}

#[tokio::test]
async fn test_request_piece_out_of_range() {
    let hashes = Arc::new(HashService::with_defaults());
    let data = content();
    let metainfo = signed(&hashes, &data).await;
    let network = MemoryNetwork::new();

    let swarm = Swarm::start(metainfo, Arc::new(MemoryStore::new()), builder(&hashes, &network, "s"))
        .await
        .unwrap();
    assert!(matches!(
        swarm.request_piece(4),
        Err(SwarmError::Piece(crate::piece::PieceError::IndexOutOfRange { index: 4, count: 4 }))
    ));
    assert!(matches!(
        swarm.request_piece(0),
        Err(SwarmError::NoPeerAvailable(0))
    ));
    swarm.stop().await.unwrap();
}

#[tokio::test]
async fn test_closed_peer_is_removed_once() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let swarm = SwarmId::new(Bytes::from_static(b"lifecycle"));

    let x = manager(&hashes, &network, "x");
    let y = manager(&hashes, &network, "y");
    let mut x_events = x.subscribe();
    x.search(&swarm).await.unwrap();
    y.search(&swarm).await.unwrap();

    eventually("both sides connected", || x.peer_count() == 1 && y.peer_count() == 1).await;
    let (session, peer) = x.peers().remove(0);
    assert_eq!(x.have(0), 1);

    peer.close();
    let closed = next_matching(&mut x_events, |event| match event {
        PeerManagerEvent::PeerClosed(closed) => Some(closed),
        _ => None,
    })
    .await;
    assert_eq!(closed, session);

    assert_eq!(x.peer_count(), 0);
    assert!(x.peer(session).is_none());
    assert_eq!(x.have(0), 0);
    assert_eq!(x.broadcast_bitfield(&Bitfield::full(4)), 0);
    assert!(x.peer_that_has_piece(0).is_none());
    eventually("the remote to notice", || y.peer_count() == 0).await;

    sleep(Duration::from_millis(50)).await;
    while let Ok(event) = x_events.try_recv() {
        assert!(!matches!(event, PeerManagerEvent::PeerClosed(_)), "duplicate removal");
    }
}

#[tokio::test]
async fn test_broadcasts_reach_live_peers() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let swarm = SwarmId::new(Bytes::from_static(b"broadcast"));

    let x = manager(&hashes, &network, "x");
    let y = manager(&hashes, &network, "y");
    let z = manager(&hashes, &network, "z");
    let mut y_events = y.subscribe();
    for m in [&x, &y, &z] {
        m.search(&swarm).await.unwrap();
    }
    eventually("x to see both peers", || x.peer_count() == 2).await;

    assert_eq!(x.have(3), 2);
    let (_, piece) = next_matching(&mut y_events, |event| match event {
        PeerManagerEvent::GotHave { session, piece } => Some((session, piece)),
        _ => None,
    })
    .await;
    assert_eq!(piece, 3);

    let request = BlockRequest::new(1, 0, 16);
    assert_eq!(x.cancel(request), 2);
    assert_eq!(x.set_uninterested(), 2);
    assert!(x.peers().iter().all(|(_, peer)| !peer.am_interested()));
}

#[tokio::test]
async fn test_build_requires_a_strategy() {
    let hashes = Arc::new(HashService::with_defaults());
    let err = PeerManager::builder(hashes)
        .build(Arc::new(PieceManager::new(1)))
        .unwrap_err();
    assert!(matches!(err, SwarmError::NoDiscoveryStrategy));
    assert_eq!(err.to_string(), "no peer discovery strategy registered");
}

#[tokio::test]
async fn test_build_requires_discovery_hash() {
    let hashes = Arc::new(HashService::new(vec![
        Arc::new(Sha1Hash) as Arc<dyn HashAlgorithm>
    ]));
    assert!(hashes.supports(SHA1));

    let network = MemoryNetwork::new();
    let err = builder(&hashes, &network, "x")
        .build(Arc::new(PieceManager::new(1)))
        .unwrap_err();
    assert!(matches!(
        err,
        SwarmError::Crypto(CryptoError::UnsupportedAlgorithm(ref name)) if name == SHA256
    ));
}

#[tokio::test]
async fn test_request_without_peers() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let x = manager(&hashes, &network, "x");

    let err = x.request_piece(BlockRequest::new(3, 0, 16)).unwrap_err();
    assert!(matches!(err, SwarmError::NoPeerAvailable(3)));
    assert_eq!(err.to_string(), "no peer available for piece 3");
}

async fn selector_peer(remote_bitfield: Option<Bitfield>) -> (Arc<Peer>, WireSession) {
    let (ours, theirs) = WireSession::pair();
    let (peer, _events) = Peer::spawn(ours, PeerId([1; 20]), Arc::new(|| Bitfield::new(4)));
    if let Some(bitfield) = remote_bitfield {
        theirs.send(Message::Bitfield(bitfield)).unwrap();
        eventually("the remote bitfield", || peer.bitfield().is_some()).await;
    }
    (peer, theirs)
}

#[tokio::test]
async fn test_selectors() {
    let mut holder = Bitfield::new(4);
    holder.set(1);
    let (unknown, _a) = selector_peer(None).await;
    let (empty, _b) = selector_peer(Some(Bitfield::new(4))).await;
    let (has_one, _c) = selector_peer(Some(holder)).await;

    let peers = vec![
        (SessionId(0), unknown),
        (SessionId(1), Arc::clone(&empty)),
        (SessionId(2), has_one),
    ];

    assert_eq!(PieceHolder.select(&peers, 1), Some(2));
    assert_eq!(PieceHolder.select(&peers, 0), None);
    assert_eq!(AnyKnownBitfield.select(&peers, 1), Some(1));
    assert_eq!(AnyKnownBitfield.select(&peers, 9), None);

    empty.close();
    assert_eq!(AnyKnownBitfield.select(&peers, 1), Some(2));
}

#[tokio::test]
async fn test_custom_selector_routes_requests() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let swarm = SwarmId::new(Bytes::from_static(b"selector"));

    let x = builder(&hashes, &network, "x")
        .selector(Arc::new(AnyKnownBitfield))
        .build(Arc::new(PieceManager::new(4)))
        .unwrap();
    let y = manager(&hashes, &network, "y");
    let mut y_events = y.subscribe();
    x.search(&swarm).await.unwrap();
    y.search(&swarm).await.unwrap();

    eventually("y's bitfield at x", || {
        x.peers().iter().any(|(_, peer)| peer.bitfield().is_some())
    })
    .await;
    assert!(x.peer_that_has_piece(2).is_none());

    let request = BlockRequest::new(2, 0, 16);
    x.request_piece(request).unwrap();
    let seen = next_matching(&mut y_events, |event| match event {
        PeerManagerEvent::GotRequest { request, .. } => Some(request),
        _ => None,
    })
    .await;
    assert_eq!(seen, request);
}

#[derive(Default)]
struct TagExtension {
    calls: AtomicUsize,
    saw_metainfo: AtomicBool,
}

impl WireExtension for TagExtension {
    fn name(&self) -> &str {
        "ut_tag"
    }

    fn attach(&self, session: &mut WireSession, _swarm: &SwarmId, metainfo: Option<&SignedMetainfo>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.saw_metainfo
            .store(metainfo.is_some(), Ordering::SeqCst);
        session.use_extension(self.name());
    }
}

#[tokio::test]
async fn test_extensions_attach_before_wrapping() {
    let hashes = Arc::new(HashService::with_defaults());
    let data = content();
    let metainfo = signed(&hashes, &data).await;
    let network = MemoryNetwork::new();
    let swarm = metainfo.swarm_id();
    let extension = Arc::new(TagExtension::default());

    let x = builder(&hashes, &network, "x")
        .extension(extension.clone())
        .metainfo(metainfo)
        .build(Arc::new(PieceManager::new(4)))
        .unwrap();
    let y = manager(&hashes, &network, "y");
    x.search(&swarm).await.unwrap();
    y.search(&swarm).await.unwrap();

    eventually("y to receive x's handshake", || {
        y.peers().iter().any(|(_, peer)| peer.remote_id().is_some())
    })
    .await;
    eventually("x to register y", || x.peer_count() == 1).await;
    assert_eq!(extension.calls.load(Ordering::SeqCst), 1);
    assert!(extension.saw_metainfo.load(Ordering::SeqCst));

    let (_, at_x) = x.peers().remove(0);
    assert_eq!(at_x.extensions().to_vec(), vec!["ut_tag".to_string()]);
    let (_, at_y) = y.peers().remove(0);
    assert_eq!(at_y.remote_extensions(), vec!["ut_tag".to_string()]);
    assert!(at_y.extensions().is_empty());

    assert_eq!(at_y.remote_id(), Some(x.local_peer_id().await.unwrap()));
}

#[tokio::test]
async fn test_local_peer_id_is_stable() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let x = manager(&hashes, &network, "x");
    let first = x.local_peer_id().await.unwrap();
    assert_eq!(x.local_peer_id().await.unwrap(), first);
}

#[tokio::test]
async fn test_stop_discovery_leaves_rendezvous() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let swarm = SwarmId::new(Bytes::from_static(b"stop"));
    let key = hashes.hash(swarm.as_bytes(), SHA256).await.unwrap();

    let x = manager(&hashes, &network, "x");
    x.search(&swarm).await.unwrap();
    assert_eq!(network.members(&key), 1);

    x.stop_discovery(&swarm).await.unwrap();
    assert_eq!(network.members(&key), 0);

    let y = manager(&hashes, &network, "y");
    y.search(&swarm).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(x.peer_count(), 0);
    assert_eq!(y.peer_count(), 0);
}

#[tokio::test]
async fn test_shared_strategy_serves_two_managers() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let shared = Arc::new(network.strategy("shared"));
    let old = SwarmId::new(Bytes::from_static(b"version-1"));
    let new = SwarmId::new(Bytes::from_static(b"version-2"));

    let v1 = PeerManager::builder(Arc::clone(&hashes))
        .strategy(shared.clone())
        .build(Arc::new(PieceManager::new(4)))
        .unwrap();
    let v2 = PeerManager::builder(Arc::clone(&hashes))
        .strategy(shared)
        .build(Arc::new(PieceManager::new(4)))
        .unwrap();
    v1.search(&old).await.unwrap();
    v2.search(&new).await.unwrap();

    let remote = manager(&hashes, &network, "remote");
    remote.search(&new).await.unwrap();

    eventually("v2 connects", || v2.peer_count() == 1).await;
    eventually("remote connects", || remote.peer_count() == 1).await;
    assert_eq!(v1.peer_count(), 0);
}

#[tokio::test]
async fn test_discovery_failure_is_reported() {
    let hashes = Arc::new(HashService::with_defaults());
    let network = MemoryNetwork::new();
    let swarm = SwarmId::new(Bytes::from_static(b"offline"));
    let x = manager(&hashes, &network, "x");

    network.set_offline(true);
    let err = x.search(&swarm).await.unwrap_err();
    assert!(matches!(
        err,
        SwarmError::Discovery(DiscoveryError::Unavailable { .. })
    ));
    assert!(x.stop_discovery(&swarm).await.is_err());
}

#[tokio::test]
async fn test_memory_store_assembles_blocks() {
    let store = MemoryStore::new();
    store
        .write_block(&Block::new(0, 4, Bytes::from_static(b"5678")))
        .await
        .unwrap();
    assert!(store.read_piece(0, 8).await.unwrap().is_none());
    assert!(!store.has_piece(0, 8).await.unwrap());
    assert!(store
        .read_block(&BlockRequest::new(0, 4, 4))
        .await
        .unwrap()
        .is_none());

    store
        .write_block(&Block::new(0, 0, Bytes::from_static(b"1234")))
        .await
        .unwrap();
    assert_eq!(
        store.read_piece(0, 8).await.unwrap(),
        Some(Bytes::from_static(b"12345678"))
    );
    assert_eq!(
        store.read_block(&BlockRequest::new(0, 2, 4)).await.unwrap(),
        Some(Bytes::from_static(b"3456"))
    );
    assert!(store.has_piece(0, 8).await.unwrap());
    assert!(!store.has_piece(0, 9).await.unwrap());

    store.discard_piece(0).await.unwrap();
    assert!(store.is_empty());
}

/// Store relying on the provided `has_piece`.
struct ReadBackStore(MemoryStore);

#[async_trait::async_trait]
impl PieceStore for ReadBackStore {
    async fn write_block(&self, block: &Block) -> Result<(), StoreError> {
        self.0.write_block(block).await
    }

    async fn read_block(&self, request: &BlockRequest) -> Result<Option<Bytes>, StoreError> {
        self.0.read_block(request).await
    }

    async fn read_piece(&self, piece: u32, size: u64) -> Result<Option<Bytes>, StoreError> {
        self.0.read_piece(piece, size).await
    }

    async fn discard_piece(&self, piece: u32) -> Result<(), StoreError> {
        self.0.discard_piece(piece).await
    }
}

#[tokio::test]
async fn test_store_has_piece_reads_back() {
    let store = ReadBackStore(MemoryStore::new());
    store
        .write_block(&Block::new(3, 0, Bytes::from_static(b"abcd")))
        .await
        .unwrap();
    assert!(store.has_piece(3, 4).await.unwrap());
    assert!(!store.has_piece(3, 5).await.unwrap());
    assert!(!store.has_piece(2, 1).await.unwrap());
}

async fn publish_version(
    hashes: &HashService,
    keys: &crate::crypto::KeyPair,
    body: &[u8],
    sequence: u64,
) -> SignedMetainfo {
    let info = Info::from_content("notes", body, 4, SHA256, hashes)
        .await
        .unwrap();
    SignedMetainfo::create(info, keys, hashes, sequence)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_follow_yields_verified_versions() {
    let hashes = Arc::new(HashService::with_defaults());
    let signing = Arc::new(SigningService::with_defaults());
    let dht = DhtService::new(Arc::new(MemoryDht::new()), Arc::clone(&signing));
    let keys = signing.generate_key_pair(ED25519).unwrap();
    let stranger = signing.generate_key_pair(ED25519).unwrap();

    let catalog = Arc::new(MetainfoCatalog::new());
    let v1 = catalog.insert(publish_version(&hashes, &keys, b"version one", 1).await);
    let v2 = catalog.insert(publish_version(&hashes, &keys, b"version two", 2).await);
    let forged = catalog.insert(publish_version(&hashes, &stranger, b"version evil", 3).await);
    assert_eq!(catalog.len(), 3);

    let target = TargetKey::derive(keys.public_key(), None);
    let (subscription, mut updates) = follow(
        &dht,
        target,
        Duration::from_millis(20),
        catalog.clone(),
        Arc::clone(&hashes),
    );

    dht.publish(&keys, v1.as_bytes().clone(), None, 1).await.unwrap();
    let update = timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.record.sequence, 1);
    assert_eq!(update.metainfo.swarm_id(), v1);

    dht.publish(&keys, forged.as_bytes().clone(), None, 2).await.unwrap();
    assert!(timeout(Duration::from_millis(200), updates.recv()).await.is_err());

    dht.publish(&keys, Bytes::from_static(b"unknown"), None, 3).await.unwrap();
    assert!(timeout(Duration::from_millis(200), updates.recv()).await.is_err());

    dht.publish(&keys, v2.as_bytes().clone(), None, 4).await.unwrap();
    let update = timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.record.sequence, 4);
    assert_eq!(update.metainfo.swarm_id(), v2);

    subscription.cancel();
    let end = timeout(Duration::from_secs(5), updates.recv()).await.unwrap();
    assert!(end.is_none());
}
