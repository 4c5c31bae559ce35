//! Pipeline and deposit status records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a persisted state/action string is not recognized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

/// Implements `as_str`, `Display` and `FromStr` for a unit-only status enum.
macro_rules! status_enum_strings {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable string form, as persisted in the status store.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(ParseStatusError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Pipeline-wide state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Accepting registrations, pools pulling work.
    #[default]
    Active,
    /// Soft pause: pools paused, running deposits frozen.
    Quieted,
    /// Hard halt requested by an operator. Irreversible.
    Stopped,
    /// Process-level shutdown. Irreversible.
    Shutdown,
}

status_enum_strings!(PipelineState, "pipeline state", {
    Active => "active",
    Quieted => "quieted",
    Stopped => "stopped",
    Shutdown => "shutdown",
});

impl PipelineState {
    /// Whether no pipeline action can move the pipeline out of this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Shutdown)
    }

    /// Whether gated deposit transitions (register, resume from quiet) may apply.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Operator action against the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineAction {
    Quiet,
    Unquiet,
    Stop,
}

status_enum_strings!(PipelineAction, "pipeline action", {
    Quiet => "quiet",
    Unquiet => "unquiet",
    Stop => "stop",
});

/// The singleton pipeline status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub pending_action: Option<PipelineAction>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a single deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositState {
    /// Submitted, waiting for the registration transition.
    Unregistered,
    /// A job descriptor for this deposit is on the work queue.
    Queued,
    /// A worker has claimed the deposit's job.
    Running,
    /// Paused by an operator.
    Paused,
    /// Frozen by a pipeline-wide quiet.
    Quieted,
    /// Terminal: the job completed.
    Finished,
    /// Terminal: the job failed.
    Failed,
}

status_enum_strings!(DepositState, "deposit state", {
    Unregistered => "unregistered",
    Queued => "queued",
    Running => "running",
    Paused => "paused",
    Quieted => "quieted",
    Finished => "finished",
    Failed => "failed",
});

impl DepositState {
    /// Terminal states are outside the monitoring task's working set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// All non-terminal states.
    pub fn working_set() -> [DepositState; 5] {
        [
            Self::Unregistered,
            Self::Queued,
            Self::Running,
            Self::Paused,
            Self::Quieted,
        ]
    }
}

/// Operator (or pipeline) action against a single deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositAction {
    Register,
    Pause,
    Resume,
}

status_enum_strings!(DepositAction, "deposit action", {
    Register => "register",
    Pause => "pause",
    Resume => "resume",
});

/// Submission metadata carried on a deposit record.
///
/// The orchestrator stores these fields but never interprets them, apart from
/// `packaging_type`, which selects the job type at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMetadata {
    /// Principal that submitted the deposit.
    pub submitted_by: String,
    /// Permission groups of the submitter.
    #[serde(default)]
    pub permission_groups: Vec<String>,
    /// Packaging type of the submitted content (e.g. "bagit", "simple").
    pub packaging_type: String,
    /// Priority, higher is more urgent.
    #[serde(default)]
    pub priority: u16,
    /// Human readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DepositMetadata {
    pub fn new(submitted_by: impl Into<String>, packaging_type: impl Into<String>) -> Self {
        Self {
            submitted_by: submitted_by.into(),
            permission_groups: Vec::new(),
            packaging_type: packaging_type.into(),
            priority: 0,
            label: None,
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_permission_groups(mut self, groups: Vec<String>) -> Self {
        self.permission_groups = groups;
        self
    }
}

/// Status record of one deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositStatus {
    pub id: String,
    pub state: DepositState,
    pub pending_action: Option<DepositAction>,
    /// Container the deposit lands in.
    pub destination: String,
    /// Job type that processes this deposit.
    pub job_type: String,
    /// Job id of the most recent dispatch, if any.
    pub current_job_id: Option<String>,
    pub metadata: DepositMetadata,
    /// Failure message written by a failed job.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single writable field of a deposit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositField {
    State(DepositState),
    PendingAction(Option<DepositAction>),
    CurrentJobId(Option<String>),
    Error(Option<String>),
}

impl DepositField {
    /// Column backing this field.
    pub fn column(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::PendingAction(_) => "pending_action",
            Self::CurrentJobId(_) => "current_job_id",
            Self::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_strings_round_trip() {
        for state in DepositState::working_set() {
            assert_eq!(state.as_str().parse::<DepositState>().unwrap(), state);
        }
        assert_eq!("finished".parse::<DepositState>().unwrap(), DepositState::Finished);
        assert_eq!(PipelineState::Quieted.to_string(), "quieted");
        assert_eq!("stop".parse::<PipelineAction>().unwrap(), PipelineAction::Stop);
    }

    #[test]
    fn test_unknown_value_rejected() {
        let err = "paused".parse::<PipelineState>().unwrap_err();
        assert_eq!(err.to_string(), "unknown pipeline state value: paused");
        assert!("unpause".parse::<DepositAction>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Stopped.is_terminal());
        assert!(PipelineState::Shutdown.is_terminal());
        assert!(!PipelineState::Quieted.is_terminal());
        assert!(DepositState::Failed.is_terminal());
        assert!(!DepositState::working_set().iter().any(|s| s.is_terminal()));
    }

    #[test]
    fn test_metadata_serialization_uses_defaults() {
        let json = r#"{"submitted_by":"alice","packaging_type":"bagit"}"#;
        let metadata: DepositMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata, DepositMetadata::new("alice", "bagit"));

        let json = serde_json::to_string(&metadata.with_label("Box 12")).unwrap();
        assert!(json.contains("\"label\":\"Box 12\""));
    }

    #[test]
    fn test_enum_serde_is_snake_case() {
        let json = serde_json::to_string(&DepositState::Unregistered).unwrap();
        assert_eq!(json, "\"unregistered\"");
        let action: PipelineAction = serde_json::from_str("\"unquiet\"").unwrap();
        assert_eq!(action, PipelineAction::Unquiet);
    }
}
