use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle phase of a compute group (and of the metadata tier).
///
/// The machine is level-triggered: every phase is re-evaluated on every
/// reconciliation cycle and none of them is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    #[default]
    Reconciling,
    Scaling,
    Ready,
    Suspended,
    SuspendFailed,
    ResumeFailed,
    ScaleDownFailed,
}

impl Phase {
    /// All phases, in declaration order.
    pub const ALL: [Phase; 7] = [
        Phase::Reconciling,
        Phase::Scaling,
        Phase::Ready,
        Phase::Suspended,
        Phase::SuspendFailed,
        Phase::ResumeFailed,
        Phase::ScaleDownFailed,
    ];

    /// Sticky phases survive re-initialization at the start of a cycle until
    /// the condition behind them is resolved.
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            Phase::ScaleDownFailed | Phase::Suspended | Phase::SuspendFailed | Phase::ResumeFailed
        )
    }

    /// Failure phases are the human-visible signals an operator must resolve.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Phase::ScaleDownFailed | Phase::SuspendFailed | Phase::ResumeFailed
        )
    }

    /// Phase a group starts a cycle with, given what was persisted last cycle.
    pub fn reinitialize(previous: Option<Phase>) -> Phase {
        match previous {
            Some(phase) if phase.is_sticky() => phase,
            _ => Phase::Reconciling,
        }
    }

    /// Suspension is a deliberate pause: storage must be kept intact.
    pub fn retains_storage(&self) -> bool {
        matches!(self, Phase::Suspended | Phase::SuspendFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Reconciling => "Reconciling",
            Phase::Scaling => "Scaling",
            Phase::Ready => "Ready",
            Phase::Suspended => "Suspended",
            Phase::SuspendFailed => "SuspendFailed",
            Phase::ResumeFailed => "ResumeFailed",
            Phase::ScaleDownFailed => "ScaleDownFailed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("Invalid Phase: {}", s))
    }
}
