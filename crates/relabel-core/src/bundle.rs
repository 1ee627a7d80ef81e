use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classify::is_declarative;
use crate::label::Label;
use crate::model::RewriteMode;
use crate::rewrite::rewrite_all;
use crate::scan::ScanError;

/// A run's primary script plus the scripts it loaded, keyed by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBundle {
    pub primary: Option<String>,
    pub loaded: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScriptKey {
    Primary,
    Loaded(String),
}

impl std::fmt::Display for ScriptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptKey::Primary => f.write_str("<primary>"),
            ScriptKey::Loaded(name) => f.write_str(name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptOutcome {
    Unchanged,
    Rewritten { labels: Vec<Label> },
    /// Not declarative while running in declarative-only mode.
    SkippedScripted,
    Failed(ScanError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleRewrite {
    pub bundle: ScriptBundle,
    pub changed: bool,
    pub outcomes: Vec<(ScriptKey, ScriptOutcome)>,
}

impl ScriptBundle {
    pub fn new(primary: Option<String>, loaded: Option<BTreeMap<String, String>>) -> Self {
        Self { primary, loaded }
    }

    /// Neither a primary script nor a loaded-script map is recorded.
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.loaded.is_none()
    }

    /// Rewrites every script independently. A failure on one script is
    /// logged and counts as unchanged; siblings are still processed.
    pub fn rewrite(&self, mode: RewriteMode) -> BundleRewrite {
        let mut outcomes = Vec::new();

        let primary = self.primary.as_ref().map(|script| {
            let (text, outcome) = rewrite_one(&ScriptKey::Primary, script, mode);
            outcomes.push((ScriptKey::Primary, outcome));
            text
        });

        let loaded = self.loaded.as_ref().map(|scripts| {
            scripts
                .iter()
                .map(|(name, script)| {
                    let key = ScriptKey::Loaded(name.clone());
                    let (text, outcome) = rewrite_one(&key, script, mode);
                    outcomes.push((key, outcome));
                    (name.clone(), text)
                })
                .collect::<BTreeMap<_, _>>()
        });

        let changed = outcomes
            .iter()
            .any(|(_, o)| matches!(o, ScriptOutcome::Rewritten { .. }));

        BundleRewrite { bundle: ScriptBundle { primary, loaded }, changed, outcomes }
    }
}

fn rewrite_one(key: &ScriptKey, script: &str, mode: RewriteMode) -> (String, ScriptOutcome) {
    info!(script = %key, "processing script");
    if mode == RewriteMode::DeclarativeOnly && !is_declarative(script) {
        info!(script = %key, "scripted pipeline detected, ignoring");
        return (script.to_string(), ScriptOutcome::SkippedScripted);
    }
    match rewrite_all(script) {
        Ok(r) if r.changed() => {
            info!(script = %key, blocks = r.labels.len(), skipped = r.skipped, "rewrote container agents");
            (r.script, ScriptOutcome::Rewritten { labels: r.labels })
        }
        Ok(_) => {
            info!(script = %key, "no container agent with an image");
            (script.to_string(), ScriptOutcome::Unchanged)
        }
        Err(e) => {
            warn!(script = %key, error = %e, "scan failed; keeping script unchanged");
            (script.to_string(), ScriptOutcome::Failed(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(entries: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn empty_bundle_is_detected() {
        assert!(ScriptBundle::default().is_empty());
        assert!(!ScriptBundle::new(None, Some(BTreeMap::new())).is_empty());
    }

    #[test]
    fn changed_is_or_across_components() {
        let bundle = ScriptBundle::new(
            Some("pipeline {\n  agent any\n}".into()),
            loaded(&[("lib.groovy", "agent { docker { image 'r/x/y:1' } }")]),
        );
        let out = bundle.rewrite(RewriteMode::AnyScript);
        assert!(out.changed);
        assert_eq!(out.bundle.primary, bundle.primary);
        assert_eq!(out.bundle.loaded.unwrap()["lib.groovy"], "agent { label 'GFS_y_1' }");
        assert_eq!(out.outcomes[0], (ScriptKey::Primary, ScriptOutcome::Unchanged));
    }

    #[test]
    fn failing_script_does_not_block_siblings() {
        let bundle = ScriptBundle::new(
            Some("agent { docker { image 'a:1'".into()),
            loaded(&[("ok", "agent { docker { image 'b:2' } }")]),
        );
        let out = bundle.rewrite(RewriteMode::AnyScript);
        assert!(out.changed);
        assert_eq!(out.bundle.primary, bundle.primary);
        assert!(matches!(out.outcomes[0].1, ScriptOutcome::Failed(_)));
        assert_eq!(out.bundle.loaded.unwrap()["ok"], "agent { label 'GFS_b_2' }");
    }

    #[test]
    fn declarative_only_skips_scripted_sources() {
        let scripted = "node {\n  agent { docker { image 'a:1' } }\n}";
        let bundle = ScriptBundle::new(Some(scripted.into()), None);

        let strict = bundle.rewrite(RewriteMode::DeclarativeOnly);
        assert!(!strict.changed);
        assert_eq!(strict.outcomes[0].1, ScriptOutcome::SkippedScripted);

        let broad = bundle.rewrite(RewriteMode::AnyScript);
        assert!(broad.changed);
    }

    #[test]
    fn no_container_agents_means_no_change() {
        let bundle = ScriptBundle::new(Some("pipeline { agent any }".into()), loaded(&[]));
        let out = bundle.rewrite(RewriteMode::AnyScript);
        assert!(!out.changed);
        assert_eq!(out.bundle, bundle);
    }
}
