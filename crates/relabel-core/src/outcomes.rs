use serde::Serialize;

use crate::ids::RunId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    /// Original and replacement are both running.
    Failed { reason: String },
}

/// What one interception did. Every variant is terminal for its event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// Raised by our own replacement start; suppressed.
    Bypassed,
    NotPipeline { kind: String },
    UnresolvableRun,
    /// The run does not support replay.
    ReplayUnsupported { run_id: RunId },
    SourceUnavailable { run_id: RunId, reason: String },
    MissingScriptSource { run_id: RunId },
    Unchanged { run_id: RunId },
    ReplayFailed { run_id: RunId, reason: String },
    Replaced { run_id: RunId, stop: StopOutcome },
}

impl Disposition {
    /// Whether a replacement execution was started.
    pub fn replaced(&self) -> bool {
        matches!(self, Disposition::Replaced { .. })
    }
}
