//! End-to-end scheduler runs with scripted workers.
//!
//! These tests drive `run_scheduler` over on-disk quest documents to verify
//! dispatch ordering, slot accounting, crash recovery, and signal handling.

use std::time::Duration;

use questline::core::signal::Signal;
use questline::core::types::{SchedulerResult, WorkerOutcome};
use questline::io::quest_store::{FsQuestStore, QuestStore};
use questline::quest::StepStatus;
use questline::role::Role;
use questline::runner::run_scheduler;
use questline::slots::{FixedSlots, SlotCapability};
use questline::test_support::{
    OneShotSlots, ScriptedSpawner, ScriptedWorker, TestQuest, clean_outcome, crashed_outcome,
    quest, signal_outcome, step, step_with_status,
};

/// An already-complete quest terminates without issuing a single spawn.
#[tokio::test]
async fn complete_quest_terminates_without_spawns() {
    let fixture = TestQuest::new(&quest(vec![
        step_with_status("a", &[], StepStatus::Complete),
        step_with_status("b", &["a"], StepStatus::Complete),
    ]))
    .expect("fixture");
    let spawner = ScriptedSpawner::new(Vec::new());
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 2),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    assert!(spawner.records().is_empty());
}

/// With one slot and `b` depending on `a`, dispatch order is strictly a, b.
#[tokio::test]
async fn dependency_gates_dispatch_under_single_slot() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[]), step("b", &["a"])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![
        ScriptedWorker::settles(clean_outcome()),
        ScriptedWorker::settles(clean_outcome()),
    ]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    let steps: Vec<String> = spawner
        .records()
        .iter()
        .map(|record| record.step_id.clone())
        .collect();
    assert_eq!(steps, vec!["a", "b"]);

    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    assert!(reloaded.is_complete());
    let a = reloaded.step("a").expect("step a");
    assert!(a.started_at.is_some());
    assert!(a.completed_at.is_some());
}

/// Three independent steps under a budget of two never run three at a time.
#[tokio::test]
async fn concurrent_workers_never_exceed_slot_budget() {
    let fixture = TestQuest::new(&quest(vec![
        step("a", &[]),
        step("b", &[]),
        step("c", &[]),
    ]))
    .expect("fixture");
    let spawner = ScriptedSpawner::new(vec![
        ScriptedWorker::after(clean_outcome(), Duration::from_millis(40)),
        ScriptedWorker::after(clean_outcome(), Duration::from_millis(40)),
        ScriptedWorker::after(clean_outcome(), Duration::from_millis(10)),
    ]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 2),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    assert_eq!(spawner.records().len(), 3);
    assert!(
        spawner.max_in_flight() <= 2,
        "slot budget exceeded: {} workers in flight",
        spawner.max_in_flight()
    );
    assert!(slots.active().is_empty(), "all slots should be released");
}

/// A clean exit with no structured signal marks the step complete.
#[tokio::test]
async fn clean_exit_marks_step_complete() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![ScriptedWorker::settles(clean_outcome())]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    let a = reloaded.step("a").expect("step a");
    assert_eq!(a.status, StepStatus::Complete);
    assert!(a.completed_at.is_some());
}

/// A `complete` signal also lands its summary in the quest execution log.
#[tokio::test]
async fn complete_signal_appends_to_quest_log() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![ScriptedWorker::settles(signal_outcome(
        Signal::Complete {
            summary: "wired the parser".to_string(),
        },
    ))]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    assert_eq!(reloaded.step("a").expect("step a").status, StepStatus::Complete);
    assert_eq!(reloaded.log, vec!["step a: wired the parser"]);
}

/// `needs-user-input` ends the whole run immediately and carries the
/// signaling step's id; other in-flight workers are abandoned in place.
#[tokio::test]
async fn user_input_signal_ends_run_and_abandons_other_workers() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[]), step("b", &[])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![
        ScriptedWorker::after(
            signal_outcome(Signal::NeedsUserInput {
                question: "keep the v1 wire format?".to_string(),
                context: "migration cost is unclear".to_string(),
            }),
            Duration::from_millis(10),
        ),
        ScriptedWorker::after(clean_outcome(), Duration::from_millis(400)),
    ]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 2),
    )
    .await
    .expect("run");

    let SchedulerResult::UserInputNeeded(request) = result else {
        panic!("expected user input result");
    };
    assert_eq!(request.step_id, "a");
    assert_eq!(request.question, "keep the v1 wire format?");
    assert_eq!(request.context, "migration cost is unclear");

    // Both were dispatched; the second keeps running unobserved.
    assert_eq!(spawner.records().len(), 2);
    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    assert_eq!(reloaded.step("b").expect("step b").status, StepStatus::InProgress);
}

/// A crashed worker is re-dispatched for the same step, resuming the session
/// it reported.
#[tokio::test]
async fn crashed_worker_respawns_with_session_hint() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![
        ScriptedWorker::settles(crashed_outcome(Some("sess-1"))),
        ScriptedWorker::settles(clean_outcome()),
    ]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    let records = spawner.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].step_id, "a");
    assert_eq!(records[0].resume_session, None);
    assert_eq!(records[1].step_id, "a");
    assert_eq!(records[1].resume_session, Some("sess-1".to_string()));

    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    assert_eq!(reloaded.step("a").expect("step a").status, StepStatus::Complete);
}

/// A timed-out worker takes the same recovery path as a crash.
#[tokio::test]
async fn timed_out_worker_respawns_like_a_crash() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let timed_out = WorkerOutcome {
        session_id: None,
        crashed: false,
        timed_out: true,
        signal: None,
    };
    let spawner = ScriptedSpawner::new(vec![
        ScriptedWorker::settles(timed_out),
        ScriptedWorker::settles(clean_outcome()),
    ]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    assert_eq!(spawner.records().len(), 2);
}

/// Without a free slot the crash attempt is dropped: the active set shrinks
/// by one and the step stays `in_progress` (a later run can pick it up).
#[tokio::test]
async fn crash_without_capacity_leaves_step_in_progress() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![ScriptedWorker::settles(crashed_outcome(None))]);
    let mut slots = OneShotSlots::default();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    assert_eq!(spawner.records().len(), 1);
    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    assert_eq!(reloaded.step("a").expect("step a").status, StepStatus::InProgress);
}

/// `partially-complete` re-dispatches the same step, resuming the session
/// with the continuation point as the handoff instruction.
#[tokio::test]
async fn partial_completion_resumes_with_continuation_point() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let partial = WorkerOutcome {
        session_id: Some("sess-9".to_string()),
        ..signal_outcome(Signal::PartiallyComplete {
            progress: "half the endpoints are wired".to_string(),
            continuation_point: Some("finish the retry path".to_string()),
        })
    };
    let spawner = ScriptedSpawner::new(vec![
        ScriptedWorker::settles(partial),
        ScriptedWorker::settles(clean_outcome()),
    ]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    let records = spawner.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].resume_session, Some("sess-9".to_string()));
    assert!(records[1].prompt.contains("finish the retry path"));

    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    assert_eq!(reloaded.step("a").expect("step a").status, StepStatus::Complete);
}

/// Without a free slot, a partially complete step is left stranded: it is
/// not pending, so the readiness evaluator never reconsiders it.
#[tokio::test]
async fn partial_completion_without_capacity_strands_step() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![ScriptedWorker::settles(signal_outcome(
        Signal::PartiallyComplete {
            progress: "started".to_string(),
            continuation_point: None,
        },
    ))]);
    let mut slots = OneShotSlots::default();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    assert_eq!(spawner.records().len(), 1);
    let reloaded = FsQuestStore.load(&fixture.quest_path()).expect("load");
    assert_eq!(
        reloaded.step("a").expect("step a").status,
        StepStatus::PartiallyComplete
    );
}

/// `needs-role-followup` dispatches the target role against the same step
/// with a fresh session.
#[tokio::test]
async fn role_followup_dispatches_target_role_with_fresh_session() {
    let fixture = TestQuest::new(&quest(vec![step("a", &[])])).expect("fixture");
    let spawner = ScriptedSpawner::new(vec![
        ScriptedWorker::settles(signal_outcome(Signal::NeedsRoleFollowup {
            target_role: Role::Validator,
            reason: Some("tests missing for the error paths".to_string()),
            context: None,
        })),
        ScriptedWorker::settles(clean_outcome()),
    ]);
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 1),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    let records = spawner.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].role, Role::Implementer);
    assert_eq!(records[1].role, Role::Validator);
    assert_eq!(records[1].resume_session, None);
    assert!(records[1].prompt.contains("tests missing for the error paths"));
}

/// A quest whose only pending step sits behind a blocked dependency ends as
/// silent terminal success with nothing dispatched.
#[tokio::test]
async fn blocked_dependencies_end_as_silent_success() {
    let fixture = TestQuest::new(&quest(vec![
        step_with_status("a", &[], StepStatus::Blocked),
        step("b", &["a"]),
    ]))
    .expect("fixture");
    let spawner = ScriptedSpawner::new(Vec::new());
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &FsQuestStore,
        &spawner,
        &mut slots,
        fixture.opts(Role::Implementer, 2),
    )
    .await
    .expect("run");

    assert_eq!(result, SchedulerResult::Completed);
    assert!(spawner.records().is_empty());
}
