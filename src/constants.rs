//! Protocol constants and tuning parameters.
//!
//! Algorithm names double as registry keys for [`HashService`] and
//! [`SigningService`], and as the values recorded in signed metainfo and
//! mutable records so that verification dispatches to the right algorithm.
//!
//! [`HashService`]: crate::crypto::HashService
//! [`SigningService`]: crate::crypto::SigningService

use std::time::Duration;

// ============================================================================
// Algorithm names
// ============================================================================

/// SHA-1 content hash (20 bytes). Used for DHT target keys and peer ids.
pub const SHA1: &str = "sha1";

/// SHA-256 content hash (32 bytes). Used to derive discovery keys.
pub const SHA256: &str = "sha256";

/// BLAKE3 content hash (32 bytes).
pub const BLAKE3: &str = "blake3";

/// Ed25519 signatures.
pub const ED25519: &str = "ed25519";

/// ECDSA over secp256k1 with SHA-256 message digests.
pub const SECP256K1: &str = "secp256k1";

// ============================================================================
// Piece exchange
// ============================================================================

/// Standard block size for requests (16 KiB).
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Default piece length for newly created metainfo (256 KiB).
pub const DEFAULT_PIECE_LENGTH: u64 = 256 * 1024;

/// Capacity of the swarm-level event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// ============================================================================
// DHT
// ============================================================================

/// Default interval between lookups of a subscribed mutable record.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default DHT UDP port.
pub const DEFAULT_DHT_PORT: u16 = 6881;

/// Timeout for a single DHT query.
pub const DHT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Number of parallel queries per lookup round.
pub const DHT_ALPHA: usize = 3;

/// Maximum number of lookup rounds.
pub const DHT_MAX_ITERATIONS: usize = 10;

/// Number of closest nodes a record is stored on.
pub const DHT_REPLICATION: usize = 8;

/// Maximum outstanding queries before new ones are refused.
pub const MAX_PENDING_DHT_QUERIES: usize = 1024;

/// How long a stored mutable record is kept without being republished (BEP-44: 2 hours).
pub const DHT_RECORD_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);

/// Maximum mutable records a node stores for others.
pub const DHT_MAX_RECORDS: usize = 4096;

/// Maximum size of a mutable record value (BEP-44).
pub const MAX_RECORD_VALUE_SIZE: usize = 1000;

/// Maximum size of a mutable record salt (BEP-44).
pub const MAX_RECORD_SALT_SIZE: usize = 64;

/// Largest sequence number a record or descriptor can carry. Bencoded
/// integers are signed 64-bit.
pub const MAX_SEQUENCE: u64 = i64::MAX as u64;

/// Interval between write-token secret rotations.
pub const DHT_TOKEN_ROTATION: Duration = Duration::from_secs(5 * 60);

/// Interval between routing table bucket refreshes.
pub const DHT_BUCKET_REFRESH: Duration = Duration::from_secs(15 * 60);

/// Well-known bootstrap routers.
pub const BOOTSTRAP_NODES: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
];
