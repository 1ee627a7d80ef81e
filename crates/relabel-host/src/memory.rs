use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relabel_core::{GuardScope, InterceptionGuard, PlaceholderTask, QueueEvent, RunId, RunRef, ScriptBundle, Task};
use tracing::debug;

use crate::traits::{HostError, HostResult, PipelineHost};

/// Called with the queue event of each replacement run, from inside
/// `start_replacement`, the way a real queue would notify listeners.
pub type RequeueHook = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// One call made into the host, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostCall {
    ResolveRun { task: String },
    ReplaySource { run_id: RunId },
    StartReplacement { run_id: RunId, scripts: ScriptBundle, guard_engaged: bool },
    StopRun { run_id: RunId },
}

#[derive(Clone, Debug)]
pub struct RunRecord {
    pub run: RunRef,
    /// `None` when the run cannot be replayed.
    pub source: Option<ScriptBundle>,
    pub stopped: bool,
    pub replaced_by: Option<RunId>,
}

/// In-memory host for tests and simulation. Records every call.
#[derive(Default)]
pub struct InMemoryHost {
    inner: Mutex<Inner>,
    requeue: Mutex<Option<RequeueHook>>,
}

#[derive(Default)]
struct Inner {
    // keyed by placeholder task name
    runs: HashMap<String, RunRecord>,
    calls: Vec<HostCall>,
    fail_resolve: Option<HostError>,
    fail_source: Option<HostError>,
    fail_replay: Option<HostError>,
    fail_stop: Option<HostError>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a run reachable through the placeholder task `task`.
    pub fn add_run(&self, task: &str, job: &str, source: Option<ScriptBundle>) -> RunRef {
        let run = RunRef { id: RunId::new(), job: job.to_string() };
        self.lock().runs.insert(
            task.to_string(),
            RunRecord { run: run.clone(), source, stopped: false, replaced_by: None },
        );
        run
    }

    pub fn fail_resolve_with(&self, err: HostError) {
        self.lock().fail_resolve = Some(err);
    }

    pub fn fail_source_with(&self, err: HostError) {
        self.lock().fail_source = Some(err);
    }

    pub fn fail_replay_with(&self, err: HostError) {
        self.lock().fail_replay = Some(err);
    }

    pub fn fail_stop_with(&self, err: HostError) {
        self.lock().fail_stop = Some(err);
    }

    pub fn on_requeue(&self, hook: RequeueHook) {
        *self.requeue.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }

    pub fn run(&self, id: &RunId) -> Option<RunRecord> {
        self.lock().runs.values().find(|r| &r.run.id == id).cloned()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock().runs.values().cloned().collect()
    }

    fn record(&self, call: HostCall) {
        self.lock().calls.push(call);
    }
}

impl PipelineHost for InMemoryHost {
    fn resolve_run(&self, task: &PlaceholderTask) -> HostResult<Option<RunRef>> {
        let mut inner = self.lock();
        inner.calls.push(HostCall::ResolveRun { task: task.name.clone() });
        if let Some(err) = inner.fail_resolve.clone() {
            return Err(err);
        }
        Ok(inner.runs.get(&task.name).map(|r| r.run.clone()))
    }

    fn replay_source(&self, run: &RunRef) -> HostResult<Option<ScriptBundle>> {
        let mut inner = self.lock();
        inner.calls.push(HostCall::ReplaySource { run_id: run.id.clone() });
        if let Some(err) = inner.fail_source.clone() {
            return Err(err);
        }
        let record = inner
            .runs
            .values()
            .find(|r| r.run.id == run.id)
            .ok_or_else(|| HostError::Rejected(format!("unknown run {}", run.id)))?;
        Ok(record.source.clone())
    }

    fn start_replacement(&self, run: &RunRef, scripts: &ScriptBundle, _scope: &GuardScope) -> HostResult<()> {
        self.record(HostCall::StartReplacement {
            run_id: run.id.clone(),
            scripts: scripts.clone(),
            guard_engaged: InterceptionGuard::is_engaged(),
        });

        let event = {
            let mut inner = self.lock();
            if let Some(err) = inner.fail_replay.clone() {
                return Err(err);
            }
            let replacement = RunRef { id: RunId::new(), job: run.job.clone() };
            let task = format!("{}#{}", replacement.job, replacement.id);
            if let Some(original) = inner.runs.values_mut().find(|r| r.run.id == run.id) {
                original.replaced_by = Some(replacement.id.clone());
            }
            debug!(original = %run.id, replacement = %replacement.id, "scheduled replacement run");
            inner.runs.insert(
                task.clone(),
                RunRecord { run: replacement, source: Some(scripts.clone()), stopped: false, replaced_by: None },
            );
            QueueEvent::new(Task::Placeholder(PlaceholderTask { name: task }))
                .with_cause("ReplayCause", format!("Replayed #{}", run.id))
        };

        let hook = self.requeue.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(hook) = hook {
            hook(&event);
        }
        Ok(())
    }

    fn stop_run(&self, run: &RunRef) -> HostResult<()> {
        let mut inner = self.lock();
        inner.calls.push(HostCall::StopRun { run_id: run.id.clone() });
        if let Some(err) = inner.fail_stop.clone() {
            return Err(err);
        }
        match inner.runs.values_mut().find(|r| r.run.id == run.id) {
            Some(record) => {
                record.stopped = true;
                Ok(())
            }
            None => Err(HostError::Rejected(format!("unknown run {}", run.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder(name: &str) -> PlaceholderTask {
        PlaceholderTask { name: name.to_string() }
    }

    #[test]
    fn test_resolve_registered_run() {
        let host = InMemoryHost::new();
        let run = host.add_run("job#1", "job", None);
        assert_eq!(host.resolve_run(&placeholder("job#1")).unwrap(), Some(run));
        assert_eq!(host.resolve_run(&placeholder("missing")).unwrap(), None);
    }

    #[test]
    fn test_replay_source_none_when_unsupported() {
        let host = InMemoryHost::new();
        let run = host.add_run("job#1", "job", None);
        assert_eq!(host.replay_source(&run).unwrap(), None);
    }

    #[test]
    fn test_start_replacement_registers_new_run() {
        let host = InMemoryHost::new();
        let run = host.add_run("job#1", "job", Some(ScriptBundle::new(Some("a".into()), None)));
        let scripts = ScriptBundle::new(Some("b".into()), None);
        {
            let scope = InterceptionGuard::engage();
            host.start_replacement(&run, &scripts, &scope).unwrap();
        }
        let original = host.run(&run.id).unwrap();
        let replacement = host.run(original.replaced_by.as_ref().unwrap()).unwrap();
        assert_eq!(replacement.source, Some(scripts.clone()));
        assert_eq!(replacement.run.job, "job");
        assert!(matches!(
            host.calls().last(),
            Some(HostCall::StartReplacement { guard_engaged: true, .. })
        ));
    }

    #[test]
    fn test_requeue_hook_sees_replacement_event() {
        let host = InMemoryHost::new();
        let run = host.add_run("job#1", "job", None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        host.on_requeue(Arc::new(move |event: &QueueEvent| {
            sink.lock().unwrap().push((event.task.name().to_string(), InterceptionGuard::is_engaged()));
        }));
        let scope = InterceptionGuard::engage();
        host.start_replacement(&run, &ScriptBundle::default(), &scope).unwrap();
        drop(scope);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with("job#"));
        assert!(seen[0].1);
    }

    #[test]
    fn test_failures_are_reported() {
        let host = InMemoryHost::new();
        let run = host.add_run("job#1", "job", None);
        host.fail_replay_with(HostError::Rejected("no".into()));
        host.fail_stop_with(HostError::Internal("boom".into()));
        let scope = InterceptionGuard::engage();
        assert!(host.start_replacement(&run, &ScriptBundle::default(), &scope).is_err());
        drop(scope);
        assert_eq!(host.stop_run(&run), Err(HostError::Internal("boom".into())));
        assert!(!host.run(&run.id).unwrap().stopped);
        assert_eq!(host.runs().len(), 1);
    }

    #[test]
    fn test_stop_marks_run() {
        let host = InMemoryHost::new();
        let run = host.add_run("job#1", "job", None);
        host.stop_run(&run).unwrap();
        assert!(host.run(&run.id).unwrap().stopped);
        assert_eq!(
            host.calls(),
            vec![HostCall::StopRun { run_id: run.id.clone() }]
        );
    }
}
