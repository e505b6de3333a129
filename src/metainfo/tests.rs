use super::*;
use crate::constants::{BLAKE3, ED25519, MAX_SEQUENCE, SECP256K1, SHA1, SHA256};
use crate::crypto::{CryptoError, HashService, SigningService};
use bytes::Bytes;

const CONTENT: &[u8] = b"the quick brown fox jumps over the lazy dog";

#[tokio::test]
async fn test_info_from_content() {
    let hashes = HashService::with_defaults();
    let info = Info::from_content("fox.txt", CONTENT, 16, SHA1, &hashes)
        .await
        .unwrap();

    assert_eq!(info.length, CONTENT.len() as u64);
    assert_eq!(info.piece_count(), 3);
    assert_eq!(info.piece_size(0), Some(16));
    assert_eq!(info.piece_size(2), Some(CONTENT.len() as u64 - 32));
    assert_eq!(info.piece_size(3), None);

    let expected = hashes.hash(&CONTENT[16..32], SHA1).await.unwrap();
    assert_eq!(info.piece_hash(1), Some(&expected));
}

#[tokio::test]
async fn test_info_rejects_zero_piece_length() {
    let hashes = HashService::with_defaults();
    let err = Info::from_content("x", CONTENT, 0, SHA1, &hashes)
        .await
        .unwrap_err();
    assert!(matches!(err, MetainfoError::InvalidField("piece length")));
}

#[tokio::test]
async fn test_info_value_round_trip() {
    let hashes = HashService::with_defaults();
    let info = Info::from_content("fox.txt", CONTENT, 10, BLAKE3, &hashes)
        .await
        .unwrap();

    let decoded = Info::from_value(&info.to_value()).unwrap();
    assert_eq!(decoded, info);
}

#[tokio::test]
async fn test_signed_metainfo_create_and_verify() {
    let hashes = HashService::with_defaults();
    let signing = SigningService::with_defaults();

    for algorithm in [ED25519, SECP256K1] {
        let keys = signing.generate_key_pair(algorithm).unwrap();
        let info = Info::from_content("fox.txt", CONTENT, 8, SHA256, &hashes)
            .await
            .unwrap();

        let metainfo = SignedMetainfo::create(info, &keys, &hashes, 4).await.unwrap();
        assert_eq!(metainfo.signature_algorithm, algorithm);
        assert_eq!(metainfo.sequence, 4);
        assert_eq!(metainfo.swarm_id().as_bytes().len(), 32);
        metainfo.verify(&hashes, &signing).await.unwrap();

        let decoded = SignedMetainfo::decode(&metainfo.encode()).unwrap();
        assert_eq!(decoded, metainfo);
        decoded.verify(&hashes, &signing).await.unwrap();
    }
}

#[tokio::test]
async fn test_signed_metainfo_detects_tampering() {
    let hashes = HashService::with_defaults();
    let signing = SigningService::with_defaults();
    let keys = signing.generate_key_pair(ED25519).unwrap();
    let info = Info::from_content("fox.txt", CONTENT, 8, SHA1, &hashes)
        .await
        .unwrap();
    let metainfo = SignedMetainfo::create(info, &keys, &hashes, 0).await.unwrap();

    let mut renamed = metainfo.clone();
    renamed.info.name = "wolf.txt".into();
    assert!(matches!(
        renamed.verify(&hashes, &signing).await,
        Err(MetainfoError::InfoHashMismatch)
    ));

    let mut foreign = metainfo.clone();
    let other = signing.generate_key_pair(ED25519).unwrap();
    foreign.public_key = other.public_key().clone();
    assert!(matches!(
        foreign.verify(&hashes, &signing).await,
        Err(MetainfoError::InvalidSignature)
    ));

    let mut unknown = metainfo;
    unknown.signature_algorithm = "rsa".into();
    assert!(matches!(
        unknown.verify(&hashes, &signing).await,
        Err(MetainfoError::Crypto(CryptoError::UnsupportedAlgorithm(_)))
    ));
}

#[tokio::test]
async fn test_signed_metainfo_requires_valid_key_pair() {
    let hashes = HashService::with_defaults();
    let signing = SigningService::with_defaults();
    let keys = signing.generate_key_pair(ED25519).unwrap();
    let other = signing.generate_key_pair(ED25519).unwrap();
    let mismatched = signing
        .key_pair(ED25519, other.public_key().clone(), keys.secret_key().clone())
        .unwrap();

    let info = Info::from_content("fox.txt", CONTENT, 8, SHA1, &hashes)
        .await
        .unwrap();
    let err = SignedMetainfo::create(info, &mismatched, &hashes, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, MetainfoError::Crypto(CryptoError::InvalidKeyPair)));
}

#[tokio::test]
async fn test_signed_metainfo_sequence_limit() {
    let hashes = HashService::with_defaults();
    let signing = SigningService::with_defaults();
    let keys = signing.generate_key_pair(ED25519).unwrap();
    let info = Info::from_content("fox.txt", CONTENT, 8, SHA1, &hashes)
        .await
        .unwrap();

    let largest = SignedMetainfo::create(info.clone(), &keys, &hashes, MAX_SEQUENCE)
        .await
        .unwrap();
    let decoded = SignedMetainfo::decode(&largest.encode()).unwrap();
    assert_eq!(decoded.sequence, MAX_SEQUENCE);
    decoded.verify(&hashes, &signing).await.unwrap();

    let err = SignedMetainfo::create(info, &keys, &hashes, MAX_SEQUENCE + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, MetainfoError::SequenceOutOfRange(seq) if seq == MAX_SEQUENCE + 1));
}

#[test]
fn test_decode_rejects_bad_piece_layout() {
    let value = crate::bencode::Value::dict([
        (&b"hash"[..], crate::bencode::Value::string(SHA1)),
        (&b"length"[..], crate::bencode::Value::Integer(40)),
        (&b"name"[..], crate::bencode::Value::string("x")),
        (&b"piece length"[..], crate::bencode::Value::Integer(16)),
        (&b"pieces"[..], crate::bencode::Value::Bytes(Bytes::from(vec![0u8; 41]))),
    ]);
    assert!(matches!(
        Info::from_value(&value),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_swarm_id_hex() {
    let id = SwarmId::from_hex("00ff10").unwrap();
    assert_eq!(id.as_bytes().as_ref(), &[0x00u8, 0xff, 0x10]);
    assert_eq!(id.to_string(), "00ff10");
    assert!(SwarmId::from_hex("zz").is_err());
}
