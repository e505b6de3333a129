use super::*;
use crate::constants::SHA256;
use crate::crypto::HashService;
use crate::metainfo::Info;
use std::sync::Arc;

#[test]
fn test_mark_complete_is_idempotent() {
    let pieces = PieceManager::new(4);
    assert_eq!(pieces.missing_pieces(), vec![0, 1, 2, 3]);

    assert!(pieces.mark_complete(2).unwrap());
    assert!(!pieces.mark_complete(2).unwrap());
    assert!(pieces.bitfield().has(2));
    assert!(pieces.has_piece(2));
    assert_eq!(pieces.missing_pieces(), vec![0, 1, 3]);
    assert!(!pieces.is_complete());
}

#[test]
fn test_mark_complete_out_of_range() {
    let pieces = PieceManager::new(4);
    let err = pieces.mark_complete(4).unwrap_err();
    assert!(matches!(err, PieceError::IndexOutOfRange { index: 4, count: 4 }));
    assert_eq!(pieces.bitfield().len(), 4);
}

#[test]
fn test_full_manager() {
    let pieces = PieceManager::full(5);
    assert!(pieces.is_complete());
    assert!(pieces.missing_pieces().is_empty());
    assert_eq!(pieces.piece_count(), 5);
}

#[test]
fn test_snapshot_is_detached() {
    let pieces = PieceManager::new(3);
    let before = pieces.bitfield();
    pieces.mark_complete(0).unwrap();
    assert!(!before.has(0));
    assert!(pieces.bitfield().has(0));
}

#[test]
fn test_concurrent_readers_see_whole_updates() {
    let pieces = Arc::new(PieceManager::new(64));
    let writer = {
        let pieces = Arc::clone(&pieces);
        std::thread::spawn(move || {
            for i in 0..64 {
                pieces.mark_complete(i).unwrap();
            }
        })
    };

    let mut last = 0;
    while last < 64 {
        let snapshot = pieces.bitfield();
        let count = snapshot.count();
        assert!(count >= last);
        assert_eq!(snapshot.missing().len(), 64 - count);
        last = count;
    }
    writer.join().unwrap();
}

#[tokio::test]
async fn test_verify_and_complete() {
    let hashes = HashService::with_defaults();
    let data = b"0123456789abcdef";
    let info = Info::from_content("x", data, 8, SHA256, &hashes).await.unwrap();
    let pieces = PieceManager::new(info.piece_count());

    assert!(pieces
        .verify_and_complete(1, &data[8..], &info, &hashes)
        .await
        .unwrap());

    let err = pieces
        .verify_and_complete(0, b"xxxxxxxx", &info, &hashes)
        .await
        .unwrap_err();
    assert!(matches!(err, PieceError::HashMismatch(0)));
    assert!(!pieces.has_piece(0));

    assert!(matches!(
        pieces.verify_and_complete(7, b"", &info, &hashes).await,
        Err(PieceError::IndexOutOfRange { index: 7, .. })
    ));
}
