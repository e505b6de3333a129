use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::error::DhtError;
use crate::bencode::{self, Value};
use crate::constants::{MAX_RECORD_SALT_SIZE, MAX_RECORD_VALUE_SIZE, MAX_SEQUENCE};
use crate::crypto::{CryptoError, KeyPair, SigningService};

/// DHT key of a mutable record: SHA-1 of the publisher key followed by the
/// salt, if any.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey(pub [u8; 20]);

impl TargetKey {
    pub fn derive(public_key: &[u8], salt: Option<&[u8]>) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(public_key);
        if let Some(salt) = salt {
            hasher.update(salt);
        }
        let mut key = [0u8; 20];
        key.copy_from_slice(&hasher.finalize());
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        <[u8; 20]>::try_from(bytes)
            .map(Self)
            .map_err(|_| DhtError::InvalidTarget)
    }

    pub fn from_hex(s: &str) -> Result<Self, DhtError> {
        let bytes = hex::decode(s).map_err(CryptoError::from)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetKey({}..)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// One signed, versioned pointer value.
///
/// The signature covers the BEP-44 payload built from salt, sequence and
/// value; the signing algorithm is carried by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableRecord {
    pub target: TargetKey,
    pub sequence: u64,
    pub value: Bytes,
    pub salt: Option<Bytes>,
    pub public_key: Bytes,
    pub signature: Bytes,
    pub algorithm: String,
}

impl MutableRecord {
    /// Builds and signs a record. Fails if the key pair does not pass its
    /// self-check, the value or salt is oversized, or the sequence is above
    /// [`MAX_SEQUENCE`].
    pub fn sign(
        key_pair: &KeyPair,
        value: Bytes,
        salt: Option<Bytes>,
        sequence: u64,
    ) -> Result<Self, DhtError> {
        check_sizes(&value, salt.as_deref())?;
        if !key_pair.is_valid_key_pair() {
            return Err(CryptoError::InvalidKeyPair.into());
        }

        let payload = Self::signing_payload(salt.as_deref(), sequence, &value)?;
        let signature = key_pair.sign(&payload)?;

        Ok(Self {
            target: TargetKey::derive(key_pair.public_key(), salt.as_deref()),
            sequence,
            value,
            salt,
            public_key: key_pair.public_key().clone(),
            signature,
            algorithm: key_pair.algorithm().to_string(),
        })
    }

    /// `4:salt<len>:<salt>` when salted, then `3:seqi<seq>e1:v<len>:<value>`.
    pub fn signing_payload(
        salt: Option<&[u8]>,
        sequence: u64,
        value: &[u8],
    ) -> Result<Vec<u8>, DhtError> {
        let sequence = sequence_value(sequence)?;
        let mut payload = Vec::with_capacity(value.len() + 32);
        if let Some(salt) = salt {
            payload.extend_from_slice(b"4:salt");
            bencode::encode_into(&Value::bytes(Bytes::copy_from_slice(salt)), &mut payload);
        }
        payload.extend_from_slice(b"3:seq");
        bencode::encode_into(&sequence, &mut payload);
        payload.extend_from_slice(b"1:v");
        bencode::encode_into(&Value::bytes(Bytes::copy_from_slice(value)), &mut payload);
        Ok(payload)
    }

    pub fn payload(&self) -> Result<Vec<u8>, DhtError> {
        Self::signing_payload(self.salt.as_deref(), self.sequence, &self.value)
    }

    /// Stateless checks: the record hashes to its target and the signature
    /// verifies against the embedded key.
    pub fn verify(&self, signing: &SigningService) -> Result<(), DhtError> {
        if TargetKey::derive(&self.public_key, self.salt.as_deref()) != self.target {
            return Err(DhtError::TargetMismatch);
        }
        let valid = signing.verify(
            &self.payload()?,
            &self.signature,
            &self.public_key,
            &self.algorithm,
        )?;
        if !valid {
            return Err(DhtError::InvalidSignature);
        }
        Ok(())
    }

    /// Writes the wire fields (`alg`, `k`, `salt`, `seq`, `sig`, `v`).
    pub(crate) fn write_fields(&self, dict: &mut BTreeMap<Bytes, Value>) {
        dict.insert(Bytes::from_static(b"alg"), Value::string(&self.algorithm));
        dict.insert(Bytes::from_static(b"k"), Value::Bytes(self.public_key.clone()));
        if let Some(salt) = &self.salt {
            dict.insert(Bytes::from_static(b"salt"), Value::Bytes(salt.clone()));
        }
        // Verified records never exceed MAX_SEQUENCE.
        dict.insert(Bytes::from_static(b"seq"), clamped_sequence(self.sequence));
        dict.insert(Bytes::from_static(b"sig"), Value::Bytes(self.signature.clone()));
        dict.insert(Bytes::from_static(b"v"), Value::Bytes(self.value.clone()));
    }

    /// Reads the wire fields back. `Ok(None)` when the dictionary carries no
    /// value. The target is derived from key and salt, not trusted.
    pub(crate) fn read_fields(dict: &BTreeMap<Bytes, Value>) -> Result<Option<Self>, DhtError> {
        let Some(value) = dict.get(b"v".as_slice()) else {
            return Ok(None);
        };
        let field = |key: &[u8], name: &str| {
            dict.get(key)
                .and_then(Value::as_bytes)
                .cloned()
                .ok_or_else(|| DhtError::InvalidMessage(format!("missing {name}")))
        };

        let value = value
            .as_bytes()
            .cloned()
            .ok_or_else(|| DhtError::InvalidMessage("v is not a string".into()))?;
        let public_key = field(&b"k"[..], "k")?;
        let signature = field(&b"sig"[..], "sig")?;
        let salt = dict.get(b"salt".as_slice()).and_then(Value::as_bytes).cloned();
        let sequence = dict
            .get(b"seq".as_slice())
            .and_then(Value::as_integer)
            .and_then(|seq| u64::try_from(seq).ok())
            .ok_or_else(|| DhtError::InvalidMessage("missing seq".into()))?;
        let algorithm = dict
            .get(b"alg".as_slice())
            .and_then(Value::as_str)
            .ok_or_else(|| DhtError::InvalidMessage("missing alg".into()))?
            .to_string();
        check_sizes(&value, salt.as_deref())?;

        Ok(Some(Self {
            target: TargetKey::derive(&public_key, salt.as_deref()),
            sequence,
            value,
            salt,
            public_key,
            signature,
            algorithm,
        }))
    }
}

fn sequence_value(sequence: u64) -> Result<Value, DhtError> {
    if sequence > MAX_SEQUENCE {
        return Err(DhtError::SequenceOutOfRange(sequence));
    }
    Ok(Value::Integer(sequence as i64))
}

/// Encodes a sequence used only for comparison (`get` and `cas`). Values
/// above [`MAX_SEQUENCE`] are sent as the maximum.
pub(crate) fn clamped_sequence(sequence: u64) -> Value {
    Value::Integer(sequence.min(MAX_SEQUENCE) as i64)
}

fn check_sizes(value: &[u8], salt: Option<&[u8]>) -> Result<(), DhtError> {
    if value.len() > MAX_RECORD_VALUE_SIZE {
        return Err(DhtError::ValueTooLarge(value.len()));
    }
    match salt {
        Some(salt) if salt.len() > MAX_RECORD_SALT_SIZE => Err(DhtError::SaltTooLarge(salt.len())),
        _ => Ok(()),
    }
}
