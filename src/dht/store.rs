use async_trait::async_trait;
use dashmap::DashMap;

use super::error::DhtError;
use super::record::{MutableRecord, TargetKey};

/// Where mutable records are written to and read from.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, record: MutableRecord) -> Result<(), DhtError>;

    async fn get(&self, target: &TargetKey) -> Result<Option<MutableRecord>, DhtError>;
}

/// In-process record store. The last write for a target wins; nothing is
/// verified on write, so readers see whatever was put.
#[derive(Debug, Default)]
pub struct MemoryDht {
    records: DashMap<TargetKey, MutableRecord>,
}

impl MemoryDht {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryDht {
    async fn put(&self, record: MutableRecord) -> Result<(), DhtError> {
        self.records.insert(record.target, record);
        Ok(())
    }

    async fn get(&self, target: &TargetKey) -> Result<Option<MutableRecord>, DhtError> {
        Ok(self.records.get(target).map(|entry| entry.value().clone()))
    }
}
