//! Directive streams applied against a stored instance

use std::io::Cursor;

use phasegate::commands::directive::apply_stream;
use phasegate::directive::{Interpreter, Outcome};
use phasegate::models::{GateStatus, UnitStatus};

use super::helpers::*;

#[test]
fn test_stream_applies_in_order_and_skips_bad_lines() {
    let project = init_project();
    let engine = open(project.path()).engine().unwrap();
    let state = engine.initialize("feature", None).unwrap();

    let script = "\
# scope review
skip-unit survey 'reused Q3 survey'
launch the rockets
request-changes capture accessibility risks
add-unit a11y-review a11y.md

status
";
    let failed = apply_stream(&engine, &state.id, Cursor::new(script)).unwrap();
    assert_eq!(failed, 1);

    let state = engine.load(&state.id).unwrap();
    let phase = &state.phases[0];
    assert_eq!(phase.unit("survey").unwrap().status, UnitStatus::Skipped);
    assert_eq!(
        phase.unit("a11y-review").unwrap().deliverables,
        vec!["a11y.md".to_string()]
    );
    let gate = phase.gate.as_ref().unwrap();
    assert_eq!(gate.status, GateStatus::Pending);
    assert_eq!(
        gate.feedback.as_deref(),
        Some("capture accessibility risks")
    );
}

#[test]
fn test_stream_counts_lines_for_missing_instance() {
    let project = init_project();
    let engine = open(project.path()).engine().unwrap();

    // unknown instances are recoverable, so every line is counted
    let failed =
        apply_stream(&engine, "feature-nope", Cursor::new("continue\nstatus\n")).unwrap();
    assert_eq!(failed, 2);
}

#[test]
fn test_interpreters_on_two_handles_serialize() {
    let project = init_project();
    let first = open(project.path()).engine().unwrap();
    let second = open(project.path()).engine().unwrap();
    let state = first.initialize("feature", None).unwrap();

    Interpreter::new(&first)
        .apply_line(&state.id, "skip-unit survey not needed")
        .unwrap();
    // the second handle reloads under the lock and sees the first commit
    let applied = Interpreter::new(&second)
        .apply_line(&state.id, "skip-gate sponsor waived --override")
        .unwrap();
    assert!(matches!(
        applied.outcome,
        Outcome::GateSkipped {
            overridden: true,
            ..
        }
    ));
    assert_eq!(applied.state.revision, state.revision + 2);
}
