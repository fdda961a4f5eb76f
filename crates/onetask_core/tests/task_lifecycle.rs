use onetask_core::db::open_db_in_memory;
use onetask_core::{
    EngineConfig, LifecycleEngine, NewTask, SqliteTaskRepository, TaskRepoError, TaskStatus,
    UserId,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn engine(conn: &Connection) -> LifecycleEngine<SqliteTaskRepository<'_>> {
    LifecycleEngine::new(
        SqliteTaskRepository::try_new(conn).unwrap(),
        EngineConfig::default(),
    )
}

fn user() -> UserId {
    Uuid::new_v4()
}

#[test]
fn capture_creates_backlog_task() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("draft report", 2)).unwrap();
    assert_eq!(task.status, TaskStatus::Backlog);
    assert_eq!(task.energy_cost, 2);
    assert!(task.started_at.is_none());
    assert!(task.created_at > 0);
    assert!(task.deleted_at.is_none());
}

#[test]
fn capture_rejects_invalid_input() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let err = engine.capture(user, NewTask::new("  ", 2)).unwrap_err();
    assert!(matches!(err, TaskRepoError::Validation(_)));

    let err = engine.capture(user, NewTask::new("zero cost", 0)).unwrap_err();
    assert!(matches!(err, TaskRepoError::Validation(_)));
}

#[test]
fn start_moves_backlog_task_to_active() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("write tests", 1)).unwrap();
    let started = engine.start(user, task.uuid).unwrap();

    assert_eq!(started.status, TaskStatus::Active);
    assert!(started.started_at.is_some());

    let active = engine.get_active(user).unwrap().unwrap();
    assert_eq!(active.uuid, task.uuid);
}

#[test]
fn start_is_idempotent_for_the_already_active_task() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("focus", 1)).unwrap();
    let first = engine.start(user, task.uuid).unwrap();
    let second = engine.start(user, task.uuid).unwrap();

    assert_eq!(second.status, TaskStatus::Active);
    assert_eq!(second.started_at, first.started_at);
}

#[test]
fn second_start_fails_with_wip_limit() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task_a = engine.capture(user, NewTask::new("task a", 1)).unwrap();
    let task_b = engine.capture(user, NewTask::new("task b", 1)).unwrap();

    engine.start(user, task_a.uuid).unwrap();
    let err = engine.start(user, task_b.uuid).unwrap_err();

    match err {
        TaskRepoError::WipLimitExceeded { current, limit } => {
            assert_eq!(current, 1);
            assert_eq!(limit, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The loser must not have been touched.
    let loser = engine
        .get_active(user)
        .unwrap()
        .filter(|task| task.uuid == task_b.uuid);
    assert!(loser.is_none());
}

#[test]
fn different_users_do_not_share_the_wip_gate() {
    let conn = setup();
    let engine = engine(&conn);
    let user_a = user();
    let user_b = user();

    let task_a = engine.capture(user_a, NewTask::new("a's work", 1)).unwrap();
    let task_b = engine.capture(user_b, NewTask::new("b's work", 1)).unwrap();

    engine.start(user_a, task_a.uuid).unwrap();
    engine.start(user_b, task_b.uuid).unwrap();

    assert_eq!(
        engine.get_active(user_a).unwrap().unwrap().uuid,
        task_a.uuid
    );
    assert_eq!(
        engine.get_active(user_b).unwrap().unwrap().uuid,
        task_b.uuid
    );
}

#[test]
fn complete_sets_completed_at_and_frees_the_slot() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("finish it", 2)).unwrap();
    engine.start(user, task.uuid).unwrap();
    let completed = engine.complete(user, task.uuid).unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert!(engine.get_active(user).unwrap().is_none());
}

#[test]
fn complete_works_straight_from_backlog() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("trivial", 1)).unwrap();
    let completed = engine.complete(user, task.uuid).unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(completed.started_at.is_none());
}

#[test]
fn backlog_defers_active_task_and_keeps_started_at() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("pausable", 1)).unwrap();
    let started = engine.start(user, task.uuid).unwrap();
    let deferred = engine.backlog(user, task.uuid).unwrap();

    assert_eq!(deferred.status, TaskStatus::Backlog);
    assert_eq!(deferred.started_at, started.started_at);
    assert!(engine.get_active(user).unwrap().is_none());
}

#[test]
fn abandon_works_from_backlog_and_active() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task_a = engine.capture(user, NewTask::new("never mind", 1)).unwrap();
    let abandoned = engine.abandon(user, task_a.uuid).unwrap();
    assert_eq!(abandoned.status, TaskStatus::Abandoned);

    let task_b = engine.capture(user, NewTask::new("give up later", 1)).unwrap();
    engine.start(user, task_b.uuid).unwrap();
    let abandoned = engine.abandon(user, task_b.uuid).unwrap();
    assert_eq!(abandoned.status, TaskStatus::Abandoned);
    assert!(engine.get_active(user).unwrap().is_none());
}

#[test]
fn transitions_are_idempotent_reapplications() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("again", 1)).unwrap();
    engine.abandon(user, task.uuid).unwrap();
    let again = engine.abandon(user, task.uuid).unwrap();
    assert_eq!(again.status, TaskStatus::Abandoned);

    let done = engine.capture(user, NewTask::new("done twice", 1)).unwrap();
    engine.complete(user, done.uuid).unwrap();
    let again = engine.complete(user, done.uuid).unwrap();
    assert_eq!(again.status, TaskStatus::Completed);
}

#[test]
fn terminal_states_reject_outgoing_transitions() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let completed = engine.capture(user, NewTask::new("done", 1)).unwrap();
    engine.complete(user, completed.uuid).unwrap();

    assert!(matches!(
        engine.start(user, completed.uuid).unwrap_err(),
        TaskRepoError::InvalidTransition {
            from: TaskStatus::Completed,
            to: TaskStatus::Active,
        }
    ));
    assert!(matches!(
        engine.backlog(user, completed.uuid).unwrap_err(),
        TaskRepoError::InvalidTransition { .. }
    ));
    assert!(matches!(
        engine.abandon(user, completed.uuid).unwrap_err(),
        TaskRepoError::InvalidTransition { .. }
    ));

    let abandoned = engine.capture(user, NewTask::new("dropped", 1)).unwrap();
    engine.abandon(user, abandoned.uuid).unwrap();
    assert!(matches!(
        engine.complete(user, abandoned.uuid).unwrap_err(),
        TaskRepoError::InvalidTransition {
            from: TaskStatus::Abandoned,
            to: TaskStatus::Completed,
        }
    ));
}

#[test]
fn operations_on_foreign_tasks_report_not_found() {
    let conn = setup();
    let engine = engine(&conn);
    let owner = user();
    let stranger = user();

    let task = engine.capture(owner, NewTask::new("private", 1)).unwrap();

    assert!(matches!(
        engine.start(stranger, task.uuid).unwrap_err(),
        TaskRepoError::NotFound(id) if id == task.uuid
    ));
    assert!(matches!(
        engine.complete(stranger, task.uuid).unwrap_err(),
        TaskRepoError::NotFound(_)
    ));
    assert!(matches!(
        engine.soft_delete(stranger, task.uuid).unwrap_err(),
        TaskRepoError::NotFound(_)
    ));
}

#[test]
fn missing_task_reports_not_found() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let ghost = Uuid::new_v4();
    assert!(matches!(
        engine.start(user, ghost).unwrap_err(),
        TaskRepoError::NotFound(id) if id == ghost
    ));
}

#[test]
fn soft_deleted_task_is_hidden_and_frees_the_wip_slot() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("vanishing", 1)).unwrap();
    engine.start(user, task.uuid).unwrap();
    engine.soft_delete(user, task.uuid).unwrap();

    assert!(engine.get_active(user).unwrap().is_none());
    assert!(matches!(
        engine.complete(user, task.uuid).unwrap_err(),
        TaskRepoError::NotFound(_)
    ));

    // The slot is free for another task.
    let next = engine.capture(user, NewTask::new("replacement", 1)).unwrap();
    engine.start(user, next.uuid).unwrap();
}

#[test]
fn restore_returns_task_to_held_status() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task = engine.capture(user, NewTask::new("resurrect", 1)).unwrap();
    engine.complete(user, task.uuid).unwrap();
    engine.soft_delete(user, task.uuid).unwrap();

    let restored = engine.restore(user, task.uuid).unwrap();
    assert_eq!(restored.status, TaskStatus::Completed);
    assert!(restored.deleted_at.is_none());
}

#[test]
fn restoring_an_active_tombstone_reenters_the_wip_gate() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let first = engine.capture(user, NewTask::new("old focus", 1)).unwrap();
    engine.start(user, first.uuid).unwrap();
    engine.soft_delete(user, first.uuid).unwrap();

    let second = engine.capture(user, NewTask::new("new focus", 1)).unwrap();
    engine.start(user, second.uuid).unwrap();

    let err = engine.restore(user, first.uuid).unwrap_err();
    assert!(matches!(err, TaskRepoError::WipLimitExceeded { .. }));

    // Once the slot frees up the restore goes through.
    engine.complete(user, second.uuid).unwrap();
    let restored = engine.restore(user, first.uuid).unwrap();
    assert_eq!(restored.status, TaskStatus::Active);
}

#[test]
fn domain_errors_are_not_retryable() {
    let conn = setup();
    let engine = engine(&conn);
    let user = user();

    let task_a = engine.capture(user, NewTask::new("a", 1)).unwrap();
    let task_b = engine.capture(user, NewTask::new("b", 1)).unwrap();
    engine.start(user, task_a.uuid).unwrap();

    let wip_err = engine.start(user, task_b.uuid).unwrap_err();
    assert!(!wip_err.is_retryable());

    let not_found = engine.start(user, Uuid::new_v4()).unwrap_err();
    assert!(!not_found.is_retryable());
}
