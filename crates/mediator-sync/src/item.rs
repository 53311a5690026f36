use mediator_core::{ResourceType, Result, resource::official_identifier};
use serde_json::Value;

/// Lifecycle of one sync item.
///
/// `Pending → Validated → Transformed → Upserted`, or `Failed(reason)` from
/// any non-terminal state. No item transitions backward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Validated,
    Transformed,
    Upserted,
    Failed(String),
}

impl SyncState {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Validated => 1,
            Self::Transformed => 2,
            Self::Upserted => 3,
            Self::Failed(_) => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Upserted | Self::Failed(_))
    }
}

/// One resource moving through the pipeline.
#[derive(Debug, Clone)]
pub struct SyncItem {
    pub resource_type: ResourceType,
    /// Official identifier, the upsert key
    pub identifier: String,
    payload: Value,
    state: SyncState,
}

impl SyncItem {
    /// Wrap a resource payload. Fails when the payload lacks its single
    /// official identifier, since without it no idempotent upsert is possible.
    pub fn new(resource_type: ResourceType, payload: Value) -> Result<Self> {
        let identifier = official_identifier(&payload)?.to_string();
        Ok(Self {
            resource_type,
            identifier,
            payload,
            state: SyncState::Pending,
        })
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn mark_validated(&mut self) {
        self.advance(SyncState::Validated);
    }

    /// Record the boundary-crossing transformation result.
    pub fn mark_transformed(&mut self, transformed: Value) {
        if self.advance(SyncState::Transformed) {
            self.payload = transformed;
        }
    }

    pub fn mark_upserted(&mut self) {
        self.advance(SyncState::Upserted);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.state.is_terminal() {
            self.state = SyncState::Failed(reason.into());
        }
    }

    fn advance(&mut self, next: SyncState) -> bool {
        if !self.state.is_terminal() && next.rank() > self.state.rank() {
            self.state = next;
            true
        } else {
            tracing::warn!(
                resource_type = %self.resource_type,
                identifier = %self.identifier,
                from = ?self.state,
                to = ?next,
                "ignoring backward sync state transition"
            );
            false
        }
    }
}
