//! Render job identity and lifecycle stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    #[default]
    Idle,
    Normalizing,
    Concatenating,
    Rasterizing,
    Compositing,
    Done,
    Cancelling,
    Cancelled,
    Failed,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Idle => "idle",
            RenderStage::Normalizing => "normalizing",
            RenderStage::Concatenating => "concatenating",
            RenderStage::Rasterizing => "rasterizing",
            RenderStage::Compositing => "compositing",
            RenderStage::Done => "done",
            RenderStage::Cancelling => "cancelling",
            RenderStage::Cancelled => "cancelled",
            RenderStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderStage::Done | RenderStage::Cancelled | RenderStage::Failed
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Work stages advance strictly in order; `Cancelling` is reachable from
    /// any non-terminal stage and `Failed` from any stage but `Done`.
    pub fn can_transition_to(&self, next: RenderStage) -> bool {
        use RenderStage::*;
        match (self, next) {
            (Idle, Normalizing)
            | (Normalizing, Concatenating)
            | (Concatenating, Rasterizing)
            | (Concatenating, Compositing)
            | (Rasterizing, Compositing)
            | (Compositing, Done)
            | (Cancelling, Cancelled) => true,
            (current, Cancelling) => !current.is_terminal() && *current != Cancelling,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert!(Uuid::parse_str(&JobId::new().to_string()).is_ok());
    }

    #[test]
    fn test_stage_order() {
        assert!(RenderStage::Idle.can_transition_to(RenderStage::Normalizing));
        assert!(RenderStage::Rasterizing.can_transition_to(RenderStage::Compositing));
        assert!(!RenderStage::Idle.can_transition_to(RenderStage::Compositing));
        assert!(!RenderStage::Compositing.can_transition_to(RenderStage::Normalizing));
    }

    #[test]
    fn test_cancel_and_fail_edges() {
        assert!(RenderStage::Normalizing.can_transition_to(RenderStage::Cancelling));
        assert!(RenderStage::Cancelling.can_transition_to(RenderStage::Cancelled));
        assert!(!RenderStage::Done.can_transition_to(RenderStage::Cancelling));
        assert!(!RenderStage::Done.can_transition_to(RenderStage::Failed));
        assert!(RenderStage::Idle.can_transition_to(RenderStage::Failed));
    }

    #[test]
    fn test_stage_serde() {
        let json = serde_json::to_string(&RenderStage::Concatenating).unwrap();
        assert_eq!(json, "\"concatenating\"");
    }
}
