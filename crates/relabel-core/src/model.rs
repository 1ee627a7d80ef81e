use serde::{Deserialize, Serialize};

use crate::ids::*;

/// Why a queue item was scheduled. Informational only; logged on entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    pub kind: String,
    pub description: String,
}

/// The queue-side stand-in for a pipeline run waiting for an executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderTask {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    Placeholder(PlaceholderTask),
    Other { name: String, kind: String },
}

impl Task {
    pub fn name(&self) -> &str {
        match self {
            Task::Placeholder(p) => &p.name,
            Task::Other { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Task::Placeholder(_) => "placeholder",
            Task::Other { kind, .. } => kind,
        }
    }

    pub fn as_placeholder(&self) -> Option<&PlaceholderTask> {
        match self {
            Task::Placeholder(p) => Some(p),
            Task::Other { .. } => None,
        }
    }
}

/// "A job has become runnable."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub id: QueueItemId,
    pub task: Task,
    pub causes: Vec<Cause>,
}

impl QueueEvent {
    pub fn new(task: Task) -> Self {
        Self { id: QueueItemId::new(), task, causes: vec![] }
    }

    pub fn with_cause(mut self, kind: impl Into<String>, description: impl Into<String>) -> Self {
        self.causes.push(Cause { kind: kind.into(), description: description.into() });
        self
    }
}

/// One execution attempt of a job, as resolved by the host.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunRef {
    pub id: RunId,
    pub job: String,
}

/// Which scripts are eligible for rewriting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteMode {
    /// Any script containing a container agent block.
    #[default]
    AnyScript,
    /// Only scripts with a line-anchored `pipeline {` opening.
    DeclarativeOnly,
}
