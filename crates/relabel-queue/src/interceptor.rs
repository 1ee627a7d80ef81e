use std::sync::Arc;

use relabel_core::{Disposition, InterceptionGuard, QueueEvent};
use relabel_host::{PipelineHost, QueueListener};
use tracing::{debug, info_span};

use crate::config::InterceptorConfig;
use crate::journal::{Journal, LogSink};
use crate::orchestrator::ReplayOrchestrator;

/// Queue listener that rewrites container agents of runs entering the queue.
pub struct QueueInterceptor {
    host: Arc<dyn PipelineHost>,
    orchestrator: ReplayOrchestrator,
    sink: Option<Arc<dyn LogSink>>,
}

impl QueueInterceptor {
    pub fn new(host: Arc<dyn PipelineHost>, config: InterceptorConfig) -> Self {
        Self { orchestrator: ReplayOrchestrator::new(host.clone(), config), host, sink: None }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &InterceptorConfig {
        self.orchestrator.config()
    }

    pub fn intercept(&self, event: &QueueEvent) -> Disposition {
        let span = info_span!("intercept", item = %event.id, task = %event.task.name());
        let _enter = span.enter();
        let journal = Journal::new(self.sink.clone());

        if InterceptionGuard::is_engaged() {
            journal.info(&format!("Bypassing listener for item: {}", event.task.name()));
            return Disposition::Bypassed;
        }

        journal.info(&format!("Triggered for item: {}", event.task.name()));
        journal.info(&format!("Task kind: {}", event.task.kind()));
        for cause in &event.causes {
            journal.info(&format!("Build cause: {} - {}", cause.kind, cause.description));
        }

        let Some(placeholder) = event.task.as_placeholder() else {
            journal.info(&format!("Not a pipeline placeholder task: {}", event.task.kind()));
            return Disposition::NotPipeline { kind: event.task.kind().to_string() };
        };

        let run = match self.host.resolve_run(placeholder) {
            Ok(Some(run)) => run,
            Ok(None) => {
                journal.warning(&format!("Failed to retrieve run from placeholder task: {}", placeholder.name));
                return Disposition::UnresolvableRun;
            }
            Err(e) => {
                journal.warning(&format!("Failed to retrieve run from placeholder task {}: {e}", placeholder.name));
                return Disposition::UnresolvableRun;
            }
        };

        journal.info(&format!("Handling pipeline job: {} (run {})", run.job, run.id));
        let disposition = self.orchestrator.handle(&run, &journal);
        debug!(?disposition, "interception finished");
        disposition
    }
}

impl QueueListener for QueueInterceptor {
    fn on_enter_buildable(&self, event: &QueueEvent) {
        self.intercept(event);
    }
}
