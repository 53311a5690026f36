use indexmap::IndexMap;
use mediator_core::ResourceType;
use serde::Serialize;

/// How one item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

/// Per-resource-type counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Result of one sync run: counts keyed by resource type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub counts: IndexMap<ResourceType, TypeCounts>,
}

impl SyncSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource_type: ResourceType, outcome: SyncOutcome) {
        let counts = self.counts.entry(resource_type).or_default();
        match outcome {
            SyncOutcome::Created => counts.created += 1,
            SyncOutcome::Updated => counts.updated += 1,
            SyncOutcome::Skipped => counts.skipped += 1,
            SyncOutcome::Failed => counts.failed += 1,
        }
    }

    pub fn created(&self) -> u64 {
        self.counts.values().map(|c| c.created).sum()
    }

    pub fn updated(&self) -> u64 {
        self.counts.values().map(|c| c.updated).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.counts.values().map(|c| c.skipped).sum()
    }

    pub fn failed(&self) -> u64 {
        self.counts.values().map(|c| c.failed).sum()
    }

    pub fn total(&self) -> u64 {
        self.created() + self.updated() + self.skipped() + self.failed()
    }
}
