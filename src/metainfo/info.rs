use super::error::MetainfoError;
use crate::bencode::{self, Value};
use crate::crypto::HashService;
use bytes::{Bytes, BytesMut};

/// The hashed part of a torrent descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub name: String,
    /// Total content length in bytes.
    pub length: u64,
    pub piece_length: u64,
    /// Algorithm used for the piece hashes and the info hash.
    pub hash_algorithm: String,
    /// One digest per piece.
    pub pieces: Vec<Bytes>,
}

impl Info {
    /// Splits `data` into pieces and hashes each one.
    pub async fn from_content(
        name: &str,
        data: &[u8],
        piece_length: u64,
        hash_algorithm: &str,
        hashes: &HashService,
    ) -> Result<Self, MetainfoError> {
        if piece_length == 0 {
            return Err(MetainfoError::InvalidField("piece length"));
        }

        let mut pieces = Vec::with_capacity(data.len().div_ceil(piece_length as usize));
        for chunk in data.chunks(piece_length as usize) {
            pieces.push(hashes.hash(chunk, hash_algorithm).await?);
        }

        Ok(Self {
            name: name.to_string(),
            length: data.len() as u64,
            piece_length,
            hash_algorithm: hash_algorithm.to_string(),
            pieces,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Size of the piece at `index`; the last piece may be short.
    pub fn piece_size(&self, index: u32) -> Option<u64> {
        let index = index as u64;
        let start = index.checked_mul(self.piece_length)?;
        if start >= self.length {
            return None;
        }
        Some((self.length - start).min(self.piece_length))
    }

    pub fn piece_hash(&self, index: u32) -> Option<&Bytes> {
        self.pieces.get(index as usize)
    }

    pub fn to_value(&self) -> Value {
        let mut pieces = BytesMut::with_capacity(self.pieces.iter().map(Bytes::len).sum());
        for hash in &self.pieces {
            pieces.extend_from_slice(hash);
        }

        Value::dict([
            (&b"hash"[..], Value::string(&self.hash_algorithm)),
            (&b"length"[..], Value::Integer(self.length as i64)),
            (&b"name"[..], Value::string(&self.name)),
            (&b"piece length"[..], Value::Integer(self.piece_length as i64)),
            (&b"pieces"[..], Value::Bytes(pieces.freeze())),
        ])
    }

    /// Canonical bencoding; this is what the info hash covers.
    pub fn encode(&self) -> Vec<u8> {
        bencode::encode(&self.to_value())
    }

    pub fn from_value(value: &Value) -> Result<Self, MetainfoError> {
        let name = value
            .get_str(b"name")
            .ok_or(MetainfoError::MissingField("name"))?
            .to_string();
        let hash_algorithm = value
            .get_str(b"hash")
            .ok_or(MetainfoError::MissingField("hash"))?
            .to_string();
        let length = value
            .get_integer(b"length")
            .ok_or(MetainfoError::MissingField("length"))?;
        let piece_length = value
            .get_integer(b"piece length")
            .ok_or(MetainfoError::MissingField("piece length"))?;
        let pieces = value
            .get_bytes(b"pieces")
            .ok_or(MetainfoError::MissingField("pieces"))?;

        let length = u64::try_from(length).map_err(|_| MetainfoError::InvalidField("length"))?;
        let piece_length = u64::try_from(piece_length)
            .ok()
            .filter(|&l| l > 0)
            .ok_or(MetainfoError::InvalidField("piece length"))?;

        let count = length.div_ceil(piece_length) as usize;
        let pieces = match count {
            0 if pieces.is_empty() => Vec::new(),
            0 => return Err(MetainfoError::InvalidField("pieces")),
            _ => {
                if pieces.is_empty() || pieces.len() % count != 0 {
                    return Err(MetainfoError::InvalidField("pieces"));
                }
                let digest_len = pieces.len() / count;
                (0..count)
                    .map(|i| pieces.slice(i * digest_len..(i + 1) * digest_len))
                    .collect()
            }
        };

        Ok(Self {
            name,
            length,
            piece_length,
            hash_algorithm,
            pieces,
        })
    }
}
