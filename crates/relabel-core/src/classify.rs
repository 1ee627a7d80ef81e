use serde::{Deserialize, Serialize};

use crate::scan::container_agent_at;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
    Declarative,
    Scripted,
}

/// True iff some line opens with `pipeline {`.
pub fn is_declarative(script: &str) -> bool {
    script.lines().any(|line| {
        line.trim_start()
            .strip_prefix("pipeline")
            .is_some_and(|rest| rest.trim_start().starts_with('{'))
    })
}

pub fn classify(script: &str) -> ScriptKind {
    if is_declarative(script) {
        ScriptKind::Declarative
    } else {
        ScriptKind::Scripted
    }
}

/// True iff an `agent {` block opens directly onto a `docker {` block,
/// whitespace and newlines allowed in between.
pub fn has_container_agent(script: &str) -> bool {
    let src = script.as_bytes();
    script
        .match_indices("agent")
        .any(|(at, _)| container_agent_at(src, at).is_some())
}
