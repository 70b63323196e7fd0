//! End-to-end workflow runs with the shell executor, recorded signals and
//! the filesystem archive

use serial_test::serial;

use phasegate::commands::common::find_project_root;
use phasegate::models::UnitStatus;
use phasegate::workflow::{ArchiveSink, Progress, StateStore};

use super::helpers::*;

const EXECUTOR_CONFIG: &str = r#"
[executor]
command = 'echo "deliverable: $PHASEGATE_UNIT.out"'
timeout_secs = 30
"#;

#[test]
fn test_lite_workflow_runs_to_archive() {
    let project = init_project();
    write_config(project.path(), EXECUTOR_CONFIG);
    let workspace = open(project.path());
    let engine = workspace.engine().unwrap();

    let mut state = engine.initialize("feature", Some("lite")).unwrap();
    let id = state.id.clone();
    let signals = workspace.recorded_signals();
    for name in ["build", "test", "lint", "coverage"] {
        signals.record(&id, name, true).unwrap();
    }

    let mut steps = Vec::new();
    while !state.is_terminal() {
        assert!(steps.len() < 20, "workflow did not finish: {steps:?}");
        let (next, progress) = engine.continue_workflow(&state).unwrap();
        steps.push(progress);
        state = next;
    }

    assert!(steps.contains(&Progress::RanUnit {
        unit: "code".into(),
        status: UnitStatus::Complete,
        reason: None
    }));
    assert!(!engine.store().exists(&id));

    let archive = workspace.archive();
    let snapshots = archive.list().unwrap();
    assert_eq!(snapshots.len(), 1);
    let (path, manifest) = &snapshots[0];
    assert_eq!(manifest.instance, id);
    assert!(manifest
        .deliverables
        .iter()
        .any(|d| d.unit == "code" && d.produced == vec!["code.out".to_string()]));
    assert!(archive.verify(path).unwrap());

    // archiving the same completion again reuses the snapshot
    let again = archive.archive(&state).unwrap();
    assert_eq!(again.sha256, manifest.state_sha256);
    assert_eq!(archive.list().unwrap().len(), 1);
}

#[test]
fn test_failing_unit_command_fails_unit() {
    let project = init_project();
    write_config(
        project.path(),
        r#"
[executor]
command = 'echo "compile error" >&2; exit 3'
"#,
    );
    let engine = open(project.path()).engine().unwrap();
    let state = engine.initialize("bugfix", Some("hotfix")).unwrap();

    let (state, progress) = engine.continue_workflow(&state).unwrap();
    match progress {
        Progress::RanUnit {
            unit,
            status: UnitStatus::Failed,
            reason: Some(reason),
        } => {
            assert_eq!(unit, "patch");
            assert!(reason.contains("exit code 3"), "{reason}");
            assert!(reason.contains("compile error"), "{reason}");
        }
        other => panic!("unexpected progress {other:?}"),
    }
    assert_eq!(
        state.phases[0].unit("patch").unwrap().status,
        UnitStatus::Failed
    );
}

#[test]
fn test_signal_commands_feed_auto_gate() {
    let project = init_project();
    write_config(
        project.path(),
        r#"
[signals.commands]
build = "true"
test = "exit 1"
"#,
    );
    let engine = open(project.path()).engine().unwrap();
    let state = engine.initialize("feature", Some("lite")).unwrap();
    let state = engine
        .record_unit_status(&state, "code", UnitStatus::Complete, None, vec![])
        .unwrap();
    let state = engine
        .record_unit_status(&state, "tests", UnitStatus::Complete, None, vec![])
        .unwrap();

    let (_, progress) = engine.continue_workflow(&state).unwrap();
    assert_eq!(
        progress,
        Progress::AwaitingSignals {
            gate: "ci".into(),
            unmet: vec!["test".into()]
        }
    );
}

#[test]
fn test_recorded_signal_overrides_command() {
    let project = init_project();
    write_config(
        project.path(),
        r#"
[signals.commands]
build = "true"
test = "exit 1"
"#,
    );
    let workspace = open(project.path());
    let engine = workspace.engine().unwrap();
    let state = engine.initialize("feature", Some("lite")).unwrap();
    workspace
        .recorded_signals()
        .record(&state.id, "test", true)
        .unwrap();
    let state = engine
        .record_unit_status(&state, "code", UnitStatus::Complete, None, vec![])
        .unwrap();
    let state = engine
        .record_unit_status(&state, "tests", UnitStatus::Complete, None, vec![])
        .unwrap();

    let (state, progress) = engine.continue_workflow(&state).unwrap();
    assert_eq!(
        progress,
        Progress::Advanced {
            from: "implement".into(),
            to: Some("verify".into())
        }
    );
    assert_eq!(engine.load(&state.id).unwrap(), state);
}

#[test]
fn test_user_template_overrides_builtin() {
    let project = init_project();
    write_file(
        &project.path().join(".phasegate").join("templates"),
        "bugfix.yaml",
        r#"
id: bugfix
version: 2.0.0
phases:
  - id: fix
    units:
      - id: patch
"#,
    );
    let engine = open(project.path()).engine().unwrap();
    let state = engine.initialize("bugfix", None).unwrap();
    assert_eq!(state.template_version, "2.0.0");
    assert_eq!(state.phases.len(), 1);
}

#[test]
#[serial]
fn test_project_root_found_from_subdirectory() {
    let project = init_project();
    let nested = project.path().join("src").join("deep");
    std::fs::create_dir_all(&nested).unwrap();

    let _cwd = CwdGuard::enter(&nested);
    let root = find_project_root().unwrap();
    assert_eq!(
        root.canonicalize().unwrap(),
        project.path().canonicalize().unwrap()
    );
}
