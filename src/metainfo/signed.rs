use super::error::MetainfoError;
use super::info::Info;
use super::swarm_id::SwarmId;
use crate::bencode::{self, Value};
use crate::constants::MAX_SEQUENCE;
use crate::crypto::{CryptoError, HashService, KeyPair, SigningService};
use bytes::Bytes;

/// A torrent descriptor bound to a publisher identity.
///
/// Immutable once created; publishing a new version means creating a new
/// value with a higher `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMetainfo {
    pub info: Info,
    /// Hash of the canonical info dictionary under `info.hash_algorithm`.
    pub info_hash: Bytes,
    /// Publisher signature over `info_hash`.
    pub info_sig: Bytes,
    pub public_key: Bytes,
    pub signature_algorithm: String,
    /// Sequence number of the most recent publish of this descriptor.
    pub sequence: u64,
}

impl SignedMetainfo {
    /// Hashes and signs `info`. The key pair must pass its self-check.
    pub async fn create(
        info: Info,
        key_pair: &KeyPair,
        hashes: &HashService,
        sequence: u64,
    ) -> Result<Self, MetainfoError> {
        if !key_pair.is_valid_key_pair() {
            return Err(CryptoError::InvalidKeyPair.into());
        }
        if sequence > MAX_SEQUENCE {
            return Err(MetainfoError::SequenceOutOfRange(sequence));
        }

        let info_hash = hashes.hash(&info.encode(), &info.hash_algorithm).await?;
        let info_sig = key_pair.sign(&info_hash)?;

        Ok(Self {
            info,
            info_hash,
            info_sig,
            public_key: key_pair.public_key().clone(),
            signature_algorithm: key_pair.algorithm().to_string(),
            sequence,
        })
    }

    pub fn swarm_id(&self) -> SwarmId {
        SwarmId::new(self.info_hash.clone())
    }

    /// Recomputes the info hash and checks the publisher signature.
    pub async fn verify(
        &self,
        hashes: &HashService,
        signing: &SigningService,
    ) -> Result<(), MetainfoError> {
        if self.sequence > MAX_SEQUENCE {
            return Err(MetainfoError::SequenceOutOfRange(self.sequence));
        }
        let info_hash = hashes
            .hash(&self.info.encode(), &self.info.hash_algorithm)
            .await?;
        if info_hash != self.info_hash {
            return Err(MetainfoError::InfoHashMismatch);
        }

        let valid = signing.verify(
            &self.info_hash,
            &self.info_sig,
            &self.public_key,
            &self.signature_algorithm,
        )?;
        if !valid {
            return Err(MetainfoError::InvalidSignature);
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        bencode::encode(&Value::dict([
            (&b"info"[..], self.info.to_value()),
            (&b"infohash"[..], Value::Bytes(self.info_hash.clone())),
            (&b"infosig"[..], Value::Bytes(self.info_sig.clone())),
            (&b"pub key"[..], Value::Bytes(self.public_key.clone())),
            (&b"seq"[..], Value::Integer(self.sequence.min(MAX_SEQUENCE) as i64)),
            (&b"sig alg"[..], Value::string(&self.signature_algorithm)),
        ]))
    }

    /// Parses a descriptor. The result is not verified.
    pub fn decode(data: &[u8]) -> Result<Self, MetainfoError> {
        let value = bencode::decode(data)?;

        let info = Info::from_value(value.get(b"info").ok_or(MetainfoError::MissingField("info"))?)?;
        let field = |key: &'static [u8], name: &'static str| {
            value
                .get_bytes(key)
                .cloned()
                .ok_or(MetainfoError::MissingField(name))
        };
        let sequence = value
            .get_integer(b"seq")
            .ok_or(MetainfoError::MissingField("seq"))?;

        Ok(Self {
            info,
            info_hash: field(&b"infohash"[..], "infohash")?,
            info_sig: field(&b"infosig"[..], "infosig")?,
            public_key: field(&b"pub key"[..], "pub key")?,
            signature_algorithm: value
                .get_str(b"sig alg")
                .ok_or(MetainfoError::MissingField("sig alg"))?
                .to_string(),
            sequence: u64::try_from(sequence).map_err(|_| MetainfoError::InvalidField("seq"))?,
        })
    }
}
