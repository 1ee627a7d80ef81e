use relabel_core::{
    derive_label, extract_image_reference, has_container_agent, is_declarative, rewrite_all, ImageRef,
    QueueEvent, RewriteMode, RunId, ScriptBundle, ScriptKey, ScriptOutcome, Task,
};

const DECLARATIVE: &str = "pipeline {
  agent {
    docker {
      image 'registry.example.com/team/build-tools:1.4'
      args '-v $HOME/.m2:/root/.m2'
    }
  }
  stages {
    stage('build') {
      steps { sh 'make' }
    }
  }
}
";

#[test]
fn test_label_matches_rewritten_block() {
    let image = extract_image_reference(DECLARATIVE).unwrap().unwrap();
    let label = derive_label(&image);
    assert_eq!(label.as_str(), "GFS_build-tools_1.4");

    let rewrite = rewrite_all(DECLARATIVE).unwrap();
    assert!(rewrite.script.contains(&format!("agent {{ label '{label}' }}")));
    assert!(!has_container_agent(&rewrite.script));
    assert!(is_declarative(&rewrite.script));
}

#[test]
fn test_rewrite_keeps_line_structure_outside_block() {
    let rewrite = rewrite_all(DECLARATIVE).unwrap();
    let before: Vec<_> = DECLARATIVE.lines().collect();
    let after: Vec<_> = rewrite.script.lines().collect();
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], "  agent { label 'GFS_build-tools_1.4' }");
    assert_eq!(&after[2..], &before[7..]);
}

#[test]
fn test_bundle_rewrites_primary_and_loaded() {
    let mut loaded = std::collections::BTreeMap::new();
    loaded.insert("ci/lib.groovy".to_string(), "def x() { 1 }".to_string());
    loaded.insert(
        "ci/deploy.groovy".to_string(),
        "pipeline {\n  agent { docker { image 'ops/kubectl:1.29' } }\n}".to_string(),
    );
    let bundle = ScriptBundle::new(Some(DECLARATIVE.to_string()), Some(loaded));

    let out = bundle.rewrite(RewriteMode::DeclarativeOnly);
    assert!(out.changed);
    let keys: Vec<_> = out.outcomes.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(
        keys,
        [
            ScriptKey::Primary,
            ScriptKey::Loaded("ci/deploy.groovy".into()),
            ScriptKey::Loaded("ci/lib.groovy".into()),
        ]
    );
    assert_eq!(out.outcomes[2].1, ScriptOutcome::SkippedScripted);
    let loaded = out.bundle.loaded.unwrap();
    assert_eq!(loaded["ci/deploy.groovy"], "pipeline {\n  agent { label 'GFS_kubectl_1.29' }\n}");
    assert_eq!(loaded["ci/lib.groovy"], "def x() { 1 }");
}

#[test]
fn test_image_ref_basename() {
    let image = ImageRef::new("a/b/c:d").unwrap();
    assert_eq!(image.basename(), "c:d");
}

#[test]
fn test_queue_event_builder() {
    let event = QueueEvent::new(Task::Other { name: "freestyle".into(), kind: "project".into() })
        .with_cause("UserIdCause", "Started by user admin");
    assert_eq!(event.causes.len(), 1);
    assert_eq!(event.task.kind(), "project");
    assert!(event.task.as_placeholder().is_none());
}

#[test]
fn test_run_id_new() {
    assert_ne!(RunId::new(), RunId::new());
}
