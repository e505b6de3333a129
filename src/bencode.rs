//! Canonical bencode ([BEP-3]).
//!
//! Every signed structure in this crate is signed over a bencoded byte
//! string, so the encoder must be canonical: dictionary keys are emitted in
//! sorted order and integers carry no leading zeros. The decoder is strict
//! in the same way and rejects trailing data, which keeps a decoded value's
//! re-encoding byte-identical to its input.
//!
//! ```
//! use synapse::bencode::{decode, encode, Value};
//!
//! let value = Value::dict([(&b"seq"[..], Value::Integer(7)), (&b"v"[..], Value::string("ptr"))]);
//! let encoded = encode(&value);
//! assert_eq!(encoded, b"d3:seqi7e1:v3:ptre");
//! assert_eq!(decode(&encoded).unwrap(), value);
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod codec;
mod error;
mod value;

pub use codec::{decode, encode, encode_into};
pub use error::BencodeError;
pub use value::Value;
