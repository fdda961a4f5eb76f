use onetask_core::db::{open_db, open_db_in_memory};
use onetask_core::{
    EngineConfig, LifecycleEngine, NewTask, SqliteTaskRepository, TaskRepoError, TaskStatus,
};
use std::sync::{Arc, Barrier};
use std::thread;
use uuid::Uuid;

/// N concurrent starts against N distinct backlog tasks for one user:
/// exactly one wins, the rest observe the WIP limit.
#[test]
fn concurrent_starts_linearize_to_one_winner() {
    const CONTENDERS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wip.db");
    let user = Uuid::new_v4();

    let task_ids: Vec<Uuid> = {
        let conn = open_db(&path).unwrap();
        let engine = LifecycleEngine::new(
            SqliteTaskRepository::try_new(&conn).unwrap(),
            EngineConfig::default(),
        );
        (0..CONTENDERS)
            .map(|index| {
                engine
                    .capture(user, NewTask::new(format!("contender {index}"), 1))
                    .unwrap()
                    .uuid
            })
            .collect()
    };

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let mut handles = Vec::new();
    for task_id in task_ids.clone() {
        let barrier = Arc::clone(&barrier);
        let path = path.clone();
        handles.push(thread::spawn(move || {
            let conn = open_db(&path).unwrap();
            let repo = SqliteTaskRepository::try_new(&conn).unwrap();
            let engine = LifecycleEngine::new(repo, EngineConfig::default());
            barrier.wait();
            engine.start(user, task_id)
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(task) => {
                assert_eq!(task.status, TaskStatus::Active);
                winners += 1;
            }
            Err(TaskRepoError::WipLimitExceeded { current, limit }) => {
                assert_eq!(current, 1);
                assert_eq!(limit, 1);
                losers += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(losers, CONTENDERS - 1);

    // The invariant holds after the dust settles.
    let conn = open_db(&path).unwrap();
    let active_count: i64 = conn
        .query_row(
            "SELECT COUNT(*)
             FROM tasks
             WHERE user_uuid = ?1
               AND status = 'active'
               AND deleted_at IS NULL;",
            [user.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(active_count, 1);
}

/// Sequential interleavings reach the same single-active end state.
#[test]
fn any_operation_sequence_keeps_at_most_one_active() {
    let conn = open_db_in_memory().unwrap();
    let engine = LifecycleEngine::new(
        SqliteTaskRepository::try_new(&conn).unwrap(),
        EngineConfig::default(),
    );
    let user = Uuid::new_v4();

    let a = engine.capture(user, NewTask::new("a", 1)).unwrap().uuid;
    let b = engine.capture(user, NewTask::new("b", 1)).unwrap().uuid;
    let c = engine.capture(user, NewTask::new("c", 1)).unwrap().uuid;

    engine.start(user, a).unwrap();
    engine.backlog(user, a).unwrap();
    engine.start(user, b).unwrap();
    assert!(engine.start(user, a).is_err());
    engine.complete(user, b).unwrap();
    engine.start(user, c).unwrap();
    assert!(engine.start(user, a).is_err());
    engine.abandon(user, c).unwrap();
    engine.start(user, a).unwrap();

    let active_count: i64 = conn
        .query_row(
            "SELECT COUNT(*)
             FROM tasks
             WHERE user_uuid = ?1
               AND status = 'active'
               AND deleted_at IS NULL;",
            [user.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(active_count, 1);
}
