use bytes::Bytes;
use tracing::info;

use super::error::DhtError;
use super::record::{MutableRecord, TargetKey};
use crate::crypto::SigningService;

/// Acceptance state for one subscribed target.
///
/// Checks run in a fixed order: the record claims the subscribed target, it
/// carries the key trusted on first use (a different key at a trusted target
/// is a hard failure), its key and salt hash to the target and its signature
/// verifies, and its sequence is strictly greater than the last accepted one.
#[derive(Debug, Clone)]
pub struct RecordVerifier {
    target: TargetKey,
    trusted_key: Option<Bytes>,
    last_sequence: Option<u64>,
}

impl RecordVerifier {
    pub fn new(target: TargetKey) -> Self {
        Self {
            target,
            trusted_key: None,
            last_sequence: None,
        }
    }

    pub fn target(&self) -> TargetKey {
        self.target
    }

    pub fn trusted_key(&self) -> Option<&Bytes> {
        self.trusted_key.as_ref()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Runs every check without changing state.
    pub fn check(&self, record: &MutableRecord, signing: &SigningService) -> Result<(), DhtError> {
        if record.target != self.target {
            return Err(DhtError::TargetMismatch);
        }
        if let Some(trusted) = &self.trusted_key {
            if trusted != &record.public_key {
                return Err(DhtError::KeyChanged);
            }
        }
        record.verify(signing)?;

        match self.last_sequence {
            Some(last) if record.sequence <= last => Err(DhtError::StaleSequence {
                sequence: record.sequence,
                last,
            }),
            _ => Ok(()),
        }
    }

    /// Checks `record` and, if it passes, adopts it as the new baseline.
    pub fn accept(&mut self, record: &MutableRecord, signing: &SigningService) -> Result<(), DhtError> {
        self.check(record, signing)?;
        if self.trusted_key.is_none() {
            info!(key = %self.target, "trusting first signer for target");
            self.trusted_key = Some(record.public_key.clone());
        }
        self.last_sequence = Some(record.sequence);
        Ok(())
    }
}
