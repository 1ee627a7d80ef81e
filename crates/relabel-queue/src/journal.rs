use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Severe,
}

/// Host-provided destination for progress messages (e.g. a build console).
pub trait LogSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Writes every entry to `tracing` and mirrors it to the sink when one is set.
#[derive(Clone, Default)]
pub struct Journal {
    sink: Option<Arc<dyn LogSink>>,
}

impl Journal {
    pub fn new(sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { sink }
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{message}");
        self.forward(Severity::Info, message);
    }

    pub fn warning(&self, message: &str) {
        tracing::warn!("{message}");
        self.forward(Severity::Warning, message);
    }

    pub fn severe(&self, message: &str) {
        tracing::error!("{message}");
        self.forward(Severity::Severe, message);
    }

    /// Severe entry for the case where two executions of one job are left running.
    pub fn duplicate_execution(&self, message: &str) {
        tracing::error!(two_runs_active = true, "{message}");
        self.forward(Severity::Severe, message);
    }

    fn forward(&self, severity: Severity, message: &str) {
        if let Some(sink) = &self.sink {
            sink.log(severity, message);
        }
    }
}
