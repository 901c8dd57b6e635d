use super::IndicatorStore;
use async_trait::async_trait;
use oncall_core::Result;
use oncall_metrics::IndicatorRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process store for recorder tests.
#[derive(Default)]
pub struct MemoryIndicatorStore {
    records: Mutex<Vec<IndicatorRecord>>,
    schema_calls: AtomicUsize,
}

impl MemoryIndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<IndicatorRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndicatorStore for MemoryIndicatorStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, record: &IndicatorRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
