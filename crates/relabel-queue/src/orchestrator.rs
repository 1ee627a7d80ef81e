use std::sync::Arc;

use relabel_core::{Disposition, InterceptionGuard, RunRef, ScriptBundle, ScriptOutcome, StopOutcome};
use relabel_host::{HostResult, PipelineHost};
use tracing::{debug, info_span};

use crate::config::InterceptorConfig;
use crate::journal::Journal;

/// Progress of one interception. Every path ends back at `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Extracting,
    Rewriting,
    NoChange,
    ReplayPending,
    ReplaySucceeded,
    ReplayFailed,
    Stopped,
}

fn advance(phase: &mut Phase, next: Phase) {
    debug!(from = ?*phase, to = ?next, "phase");
    *phase = next;
}

/// Rewrites a run's scripts and, when anything changed, swaps the run for a
/// replacement execution. The original is stopped only after the replacement
/// was confirmed started.
pub struct ReplayOrchestrator {
    host: Arc<dyn PipelineHost>,
    config: InterceptorConfig,
}

impl ReplayOrchestrator {
    pub fn new(host: Arc<dyn PipelineHost>, config: InterceptorConfig) -> Self {
        Self { host, config }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn handle(&self, run: &RunRef, journal: &Journal) -> Disposition {
        let span = info_span!("replay", run_id = %run.id, job = %run.job);
        let _enter = span.enter();

        let mut phase = Phase::Idle;
        let disposition = self.drive(run, journal, &mut phase);
        advance(&mut phase, Phase::Idle);
        disposition
    }

    fn drive(&self, run: &RunRef, journal: &Journal, phase: &mut Phase) -> Disposition {
        advance(phase, Phase::Extracting);
        let bundle = match self.host.replay_source(run) {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                journal.severe(&format!("Run {} does not support replay; leaving it untouched", run.id));
                return Disposition::ReplayUnsupported { run_id: run.id.clone() };
            }
            Err(e) => {
                journal.severe(&format!("Unable to read scripts of run {}: {e}", run.id));
                return Disposition::SourceUnavailable { run_id: run.id.clone(), reason: e.to_string() };
            }
        };
        if bundle.is_empty() {
            journal.severe(&format!("No pipeline script found for run {}", run.id));
            return Disposition::MissingScriptSource { run_id: run.id.clone() };
        }
        journal.info("Retrieved pipeline and/or loaded scripts");
        self.echo(journal, "Original", &bundle);

        advance(phase, Phase::Rewriting);
        let rewrite = bundle.rewrite(self.config.rewrite.mode);
        for (key, outcome) in &rewrite.outcomes {
            journal.info(&format!("Processing script {key}"));
            match outcome {
                ScriptOutcome::Rewritten { labels } => {
                    let labels: Vec<_> = labels.iter().map(|l| l.as_str()).collect();
                    journal.info(&format!("Script {key}: container agents replaced by labels {}", labels.join(", ")));
                }
                ScriptOutcome::SkippedScripted => {
                    journal.info(&format!("Script {key}: scripted pipeline detected, ignoring"));
                }
                ScriptOutcome::Unchanged => {
                    journal.info(&format!("Script {key}: no container agent with an image"));
                }
                ScriptOutcome::Failed(e) => {
                    journal.warning(&format!("Script {key} could not be scanned ({e}); keeping it unmodified"));
                }
            }
        }
        if !rewrite.changed {
            advance(phase, Phase::NoChange);
            journal.info("No container agent found; running the script unmodified");
            return Disposition::Unchanged { run_id: run.id.clone() };
        }
        self.echo(journal, "Modified", &rewrite.bundle);

        advance(phase, Phase::ReplayPending);
        journal.info("Replaying build with modified scripts");
        if let Err(e) = self.start_replacement(run, &rewrite.bundle) {
            advance(phase, Phase::ReplayFailed);
            journal.severe(&format!(
                "Failed to replay run {} with modified scripts: {e}; the original keeps running unmodified",
                run.id
            ));
            return Disposition::ReplayFailed { run_id: run.id.clone(), reason: e.to_string() };
        }
        advance(phase, Phase::ReplaySucceeded);
        journal.info("Successfully replayed build with modified scripts");

        let stop = self.stop_original(run, journal);
        if stop == StopOutcome::Stopped {
            advance(phase, Phase::Stopped);
        }
        Disposition::Replaced { run_id: run.id.clone(), stop }
    }

    fn start_replacement(&self, run: &RunRef, scripts: &ScriptBundle) -> HostResult<()> {
        let scope = InterceptionGuard::engage();
        let started = self.host.start_replacement(run, scripts, &scope);
        drop(scope);
        started
    }

    fn stop_original(&self, run: &RunRef, journal: &Journal) -> StopOutcome {
        journal.info(&format!("Stopping original run {}", run.id));
        match self.host.stop_run(run) {
            Ok(()) => {
                journal.info("Original run stopped");
                StopOutcome::Stopped
            }
            Err(e) => {
                journal.duplicate_execution(&format!(
                    "Failed to stop original run {} after its replacement started: {e}. \
                     Both the original and the replacement of job {} are running",
                    run.id, run.job
                ));
                StopOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    fn echo(&self, journal: &Journal, what: &str, bundle: &ScriptBundle) {
        if !self.config.logging.echo_scripts {
            return;
        }
        if let Some(primary) = &bundle.primary {
            journal.info(&format!("{what} pipeline script:\n{primary}"));
        }
        for (name, script) in bundle.loaded.iter().flatten() {
            journal.info(&format!("{what} loaded script {name}:\n{script}"));
        }
    }
}
