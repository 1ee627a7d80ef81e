use relabel_core::{GuardScope, PlaceholderTask, QueueEvent, RunRef, ScriptBundle};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("internal host error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// What the interception core needs from the build host. Calls are synchronous
/// and made on the thread that delivered the queue event.
pub trait PipelineHost: Send + Sync {
    /// The run behind a placeholder task, if it still exists.
    fn resolve_run(&self, task: &PlaceholderTask) -> HostResult<Option<RunRef>>;

    /// Recorded scripts of a run. `Ok(None)` when the run does not support replay.
    fn replay_source(&self, run: &RunRef) -> HostResult<Option<ScriptBundle>>;

    /// Schedule a new execution of the run's job using `scripts` in place of the
    /// recorded ones. The host may deliver the resulting queue event before
    /// returning; `scope` marks that suppression is in effect for this thread.
    fn start_replacement(&self, run: &RunRef, scripts: &ScriptBundle, scope: &GuardScope) -> HostResult<()>;

    fn stop_run(&self, run: &RunRef) -> HostResult<()>;
}

/// Entry point the queue subsystem notifies. Fire and forget.
pub trait QueueListener: Send + Sync {
    fn on_enter_buildable(&self, event: &QueueEvent);
}
