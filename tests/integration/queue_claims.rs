//! Cross-handle queue claims and blocker handling through the queue file

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{Duration, Utc};
use serial_test::serial;

use phasegate::commands::queue;
use phasegate::error::EngineError;
use phasegate::models::Candidate;
use phasegate::planning::{QueueBuilder, QueueOp, QueueStore, WeightTable};

use super::helpers::*;

fn candidates(count: usize) -> Vec<Candidate> {
    (0..count)
        .map(|i| {
            let mut c = Candidate::new(format!("c{i:02}"), format!("target-{i}"));
            c.subscores.insert("impact".into(), (i % 10) as f64);
            c.effort = (i % 4) as f64;
            c
        })
        .collect()
}

fn builder(limit: usize) -> QueueBuilder {
    QueueBuilder::new(
        WeightTable::new(WeightTable::default_criteria()).unwrap(),
        limit,
        Duration::hours(1),
    )
}

#[test]
fn test_concurrent_claims_hand_out_each_entry_once() {
    let project = init_project();
    let workspace = open(project.path());
    let path = workspace.queue_store().path().to_path_buf();

    let report = builder(50)
        .build(candidates(30), &BTreeSet::<String>::new())
        .unwrap();
    QueueStore::new(&path).save(&report.queue).unwrap();

    let claimed = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let path = path.clone();
            let claimed = Arc::clone(&claimed);
            thread::spawn(move || {
                // each thread opens its own handle, like separate processes would
                let store = QueueStore::new(path);
                let resolved = BTreeSet::<String>::new();
                while let Some(candidate) = store.claim(&resolved, Utc::now()).unwrap().claimed {
                    claimed.lock().unwrap().push(candidate.id);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let claimed = claimed.lock().unwrap();
    assert_eq!(claimed.len(), 30);
    let unique: HashSet<_> = claimed.iter().collect();
    assert_eq!(unique.len(), 30);
    assert!(QueueStore::new(&path).load().unwrap().unwrap().is_empty());
}

#[test]
fn test_expired_queue_file_is_rejected() {
    let project = init_project();
    let store = open(project.path()).queue_store();

    let report = builder(5)
        .build_at(
            candidates(3),
            &BTreeSet::<String>::new(),
            Utc::now() - Duration::hours(2),
        )
        .unwrap();
    store.save(&report.queue).unwrap();

    let err = store
        .claim(&BTreeSet::<String>::new(), Utc::now())
        .unwrap_err();
    assert!(matches!(err, EngineError::StaleQueue(_)));
    // nothing was consumed
    assert_eq!(store.load().unwrap().unwrap().len(), 3);
}

#[test]
fn test_unresolving_a_target_evicts_on_claim() {
    let project = init_project();
    let workspace = open(project.path());
    let resolved_set = workspace.resolved_set();
    resolved_set.add(&["schema".to_string()]).unwrap();

    let mut migrate = Candidate::new("migrate", "db");
    migrate.subscores.insert("impact".into(), 10.0);
    migrate.blocked_by.insert("schema".into());
    let mut docs = Candidate::new("docs", "handbook");
    docs.subscores.insert("impact".into(), 1.0);

    let report = builder(5)
        .build(vec![migrate, docs], &resolved_set.load().unwrap())
        .unwrap();
    assert_eq!(report.queue.ids(), vec!["migrate", "docs"]);
    let store = workspace.queue_store();
    store.save(&report.queue).unwrap();

    resolved_set.remove(&["schema".to_string()]).unwrap();
    let report = store
        .claim(&resolved_set.load().unwrap(), Utc::now())
        .unwrap();
    assert_eq!(report.claimed.unwrap().id, "docs");
    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].id, "migrate");
    assert!(store.load().unwrap().unwrap().is_empty());
}

#[test]
fn test_blocked_insert_rejected_through_store() {
    let project = init_project();
    let workspace = open(project.path());
    let store = workspace.queue_store();

    let report = builder(5)
        .build(candidates(2), &BTreeSet::<String>::new())
        .unwrap();
    store.save(&report.queue).unwrap();

    let mut blocked = Candidate::new("deploy", "prod");
    blocked.blocked_by.insert("c00".into());
    let err = store
        .mutate(
            QueueOp::Insert {
                candidate: blocked,
                position: 1,
            },
            &BTreeSet::<String>::new(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::CandidateBlocked { .. }));
    assert_eq!(store.load().unwrap().unwrap().len(), 2);
}

#[test]
fn test_mutating_missing_queue_is_not_found() {
    let project = init_project();
    let store = open(project.path()).queue_store();

    let err = store
        .mutate(QueueOp::Remove { rank: 1 }, &BTreeSet::<String>::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

fn queue_one(project: &std::path::Path, category: Option<&str>) -> QueueStore {
    let mut candidate = Candidate::new("fix-login", "auth");
    candidate.subscores.insert("impact".into(), 5.0);
    candidate.category = category.map(str::to_string);
    let report = builder(5)
        .build(vec![candidate], &BTreeSet::<String>::new())
        .unwrap();
    let store = open(project).queue_store();
    store.save(&report.queue).unwrap();
    store
}

#[test]
#[serial]
fn test_claim_start_with_unknown_category_keeps_entry() {
    let project = init_project();
    let store = queue_one(project.path(), Some("nosuch"));
    let _cwd = CwdGuard::enter(project.path());

    assert!(queue::claim(true, None).is_err());
    assert_eq!(store.load().unwrap().unwrap().ids(), vec!["fix-login"]);
    assert!(open(project.path()).engine().unwrap().store().list().unwrap().is_empty());
}

#[test]
#[serial]
fn test_claim_start_with_unknown_mode_keeps_entry() {
    let project = init_project();
    let store = queue_one(project.path(), Some("bugfix"));
    let _cwd = CwdGuard::enter(project.path());

    assert!(queue::claim(true, Some("turbo".into())).is_err());
    assert_eq!(store.load().unwrap().unwrap().ids(), vec!["fix-login"]);

    let store = queue_one(project.path(), None);
    assert!(queue::claim(true, None).is_err());
    assert_eq!(store.load().unwrap().unwrap().ids(), vec!["fix-login"]);
}

#[test]
#[serial]
fn test_claim_start_consumes_entry_and_starts_workflow() {
    let project = init_project();
    let store = queue_one(project.path(), Some("bugfix"));
    let _cwd = CwdGuard::enter(project.path());

    queue::claim(true, None).unwrap();
    assert!(store.load().unwrap().unwrap().is_empty());
    let states = open(project.path()).engine().unwrap().store().list().unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].loop_id, "bugfix");
}
