//! `create`/`delete` parent-subtasks-list maintenance (spec §4.4), backed
//! by a migration-applied Postgres pool rather than the bare-map harness
//! `manager.rs`'s own unit tests use.

use std::sync::Arc;

use sa_domain::task::Task;
use sa_store::Store;
use sa_tasks::TaskManager;
use sqlx::PgPool;
use uuid::Uuid;

#[sqlx::test(migrations = "../store/migrations")]
async fn create_appends_new_subtask_to_parents_subtasks_list(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();

    let main = tasks.create(Task::new_main(run_id, "goal")).await.unwrap();
    assert!(main.subtasks.is_empty());

    let s1 = tasks.create(Task::new_subtask(run_id, main.id, "s1")).await.unwrap();
    let s2 = tasks.create(Task::new_subtask(run_id, main.id, "s2")).await.unwrap();

    let main_after = tasks.get(main.id).unwrap();
    assert_eq!(main_after.subtasks, vec![s1.id, s2.id]);
}

#[sqlx::test(migrations = "../store/migrations")]
async fn delete_removes_task_from_parents_subtasks_list(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();

    let main = tasks.create(Task::new_main(run_id, "goal")).await.unwrap();
    let s1 = tasks.create(Task::new_subtask(run_id, main.id, "s1")).await.unwrap();
    let s2 = tasks.create(Task::new_subtask(run_id, main.id, "s2")).await.unwrap();

    tasks.delete(s1.id).await.unwrap();

    assert!(tasks.get(s1.id).is_none());
    let main_after = tasks.get(main.id).unwrap();
    assert_eq!(main_after.subtasks, vec![s2.id]);
}

#[sqlx::test(migrations = "../store/migrations")]
async fn delete_of_a_main_task_with_no_parent_just_removes_it(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();

    let main = tasks.create(Task::new_main(run_id, "goal")).await.unwrap();
    tasks.delete(main.id).await.unwrap();

    assert!(tasks.get(main.id).is_none());
}
