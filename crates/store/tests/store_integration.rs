//! Migration-backed integration tests for `sa-store` (spec §6 tables).
//! Each test gets a fresh, migrated database via `#[sqlx::test]`.

use sa_domain::run::{Run, RunOptions, RunStatus};
use sa_domain::task::{Task, TaskStatus};
use sa_store::Store;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_project_and_thread(store: &Store) -> (Uuid, Uuid) {
    let account_id = Uuid::new_v4();
    let project = store.insert_project(account_id, "Untitled").await.unwrap();
    let thread = store.insert_thread(project.project_id, account_id).await.unwrap();
    (project.project_id, thread.thread_id)
}

#[sqlx::test(migrations = "./migrations")]
async fn project_round_trips_through_store(pool: PgPool) {
    let store = Store::from_pool(pool);
    let account_id = Uuid::new_v4();
    let project = store.insert_project(account_id, "My Project").await.unwrap();

    let fetched = store.get_project(project.project_id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "My Project");
    assert_eq!(fetched.account_id, account_id);
    assert!(fetched.sandbox.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn project_sandbox_and_rename_are_persisted(pool: PgPool) {
    let store = Store::from_pool(pool);
    let project = store.insert_project(Uuid::new_v4(), "Untitled").await.unwrap();

    let sandbox = sa_store::projects::SandboxInfo {
        id: "sbx-1".into(),
        sandbox_url: Some("file:///tmp/sbx-1".into()),
        is_local: true,
        ..Default::default()
    };
    store.update_project_sandbox(project.project_id, &sandbox).await.unwrap();
    store.rename_project(project.project_id, "Renamed Project").await.unwrap();

    let fetched = store.get_project(project.project_id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Renamed Project");
    assert_eq!(fetched.sandbox.unwrap().id, "sbx-1");
}

#[sqlx::test(migrations = "./migrations")]
async fn thread_round_trips_through_store(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (project_id, thread_id) = seed_project_and_thread(&store).await;

    let fetched = store.get_thread(thread_id).await.unwrap().unwrap();
    assert_eq!(fetched.project_id, project_id);
    assert!(store.get_thread(Uuid::new_v4()).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn run_insert_and_fetch_round_trips_status_and_options(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (project_id, thread_id) = seed_project_and_thread(&store).await;

    let mut run = Run::new(
        project_id,
        thread_id,
        RunOptions { model: Some("gpt-4".into()), stream: true, ..Default::default() },
    );
    run.status = RunStatus::Running;
    store.insert_run(&run, Uuid::new_v4()).await.unwrap();

    let fetched = store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Running);
    assert_eq!(fetched.options.model.as_deref(), Some("gpt-4"));
    assert!(fetched.options.stream);
}

#[sqlx::test(migrations = "./migrations")]
async fn has_running_run_reflects_status(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (project_id, thread_id) = seed_project_and_thread(&store).await;

    assert!(store.has_running_run(project_id).await.unwrap().is_none());

    let mut run = Run::new(project_id, thread_id, RunOptions::default());
    run.status = RunStatus::Running;
    store.insert_run(&run, Uuid::new_v4()).await.unwrap();

    assert_eq!(store.has_running_run(project_id).await.unwrap(), Some(run.id));
}

/// §8 idempotence: `stop` on an already-terminal run is a no-op and
/// reports the existing status without mutating it.
#[sqlx::test(migrations = "./migrations")]
async fn mark_stopped_if_active_is_idempotent_once_terminal(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (project_id, thread_id) = seed_project_and_thread(&store).await;

    let mut run = Run::new(project_id, thread_id, RunOptions::default());
    run.status = RunStatus::Running;
    store.insert_run(&run, Uuid::new_v4()).await.unwrap();

    let first = store.mark_stopped_if_active(run.id, None).await.unwrap();
    assert_eq!(first, RunStatus::Stopped);

    // The run is now terminal; a second stop must not flip it to failed
    // or touch `completed_at` again.
    let second = store.mark_stopped_if_active(run.id, Some("late stop")).await.unwrap();
    assert_eq!(second, RunStatus::Stopped);

    let fetched = store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Stopped);
    assert!(fetched.error.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn finalize_run_writes_terminal_status_and_responses(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (project_id, thread_id) = seed_project_and_thread(&store).await;

    let mut run = Run::new(project_id, thread_id, RunOptions::default());
    run.status = RunStatus::Running;
    store.insert_run(&run, Uuid::new_v4()).await.unwrap();

    let event = sa_domain::response::ResponseEvent::status(
        run.id,
        sa_domain::response::Substatus::Completed,
        serde_json::json!({}),
    );
    store.finalize_run(run.id, RunStatus::Completed, None, &[event]).await.unwrap();

    let fetched = store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Completed);
    assert!(fetched.completed_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn list_runs_by_thread_orders_newest_first(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (project_id, thread_id) = seed_project_and_thread(&store).await;

    let first = Run::new(project_id, thread_id, RunOptions::default());
    store.insert_run(&first, Uuid::new_v4()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = Run::new(project_id, thread_id, RunOptions::default());
    store.insert_run(&second, Uuid::new_v4()).await.unwrap();

    let runs = store.list_runs_by_thread(thread_id).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second.id);
    assert_eq!(runs[1].id, first.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn first_user_message_text_finds_earliest_user_message(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (_project_id, thread_id) = seed_project_and_thread(&store).await;

    store
        .insert_message(thread_id, "user", true, serde_json::json!({"text": "first"}), None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store
        .insert_message(thread_id, "user", true, serde_json::json!({"text": "second"}), None)
        .await
        .unwrap();

    let text = store.first_user_message_text(thread_id).await.unwrap();
    assert_eq!(text.as_deref(), Some("first"));
}

#[sqlx::test(migrations = "./migrations")]
async fn list_messages_orders_oldest_first(pool: PgPool) {
    let store = Store::from_pool(pool);
    let (_project_id, thread_id) = seed_project_and_thread(&store).await;

    store.insert_message(thread_id, "user", true, serde_json::json!({"text": "a"}), None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.insert_message(thread_id, "assistant", true, serde_json::json!({"text": "b"}), None).await.unwrap();

    let messages = store.list_messages(thread_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].kind, "user");
    assert_eq!(messages[1].kind, "assistant");
}

#[sqlx::test(migrations = "./migrations")]
async fn task_round_trips_and_subtasks_order_by_creation(pool: PgPool) {
    let store = Store::from_pool(pool);
    let run_id = Uuid::new_v4();
    let main = Task::new_main(run_id, "do the thing");
    store.insert_task(&main).await.unwrap();

    let mut first = Task::new_subtask(run_id, main.id, "first");
    first.created_at = chrono::Utc::now() - chrono::Duration::seconds(10);
    let second = Task::new_subtask(run_id, main.id, "second");
    store.insert_task(&first).await.unwrap();
    store.insert_task(&second).await.unwrap();

    let subtasks = store.get_subtasks(main.id).await.unwrap();
    assert_eq!(subtasks.len(), 2);
    assert_eq!(subtasks[0].id, first.id);
    assert_eq!(subtasks[1].id, second.id);

    let fetched_main = store.get_task(main.id).await.unwrap().unwrap();
    assert_eq!(fetched_main.name, "do the thing");
}

#[sqlx::test(migrations = "./migrations")]
async fn update_task_overwrites_status_and_data(pool: PgPool) {
    let store = Store::from_pool(pool);
    let run_id = Uuid::new_v4();
    let mut task = Task::new_main(run_id, "goal");
    store.insert_task(&task).await.unwrap();

    task.status = TaskStatus::Completed;
    task.result = Some(serde_json::json!({"summary": "done"}));
    store.update_task(&task).await.unwrap();

    let fetched = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, TaskStatus::Completed);
    assert_eq!(fetched.result.unwrap()["summary"], "done");
}

#[sqlx::test(migrations = "./migrations")]
async fn update_task_errors_on_missing_row(pool: PgPool) {
    let store = Store::from_pool(pool);
    let ghost = Task::new_main(Uuid::new_v4(), "ghost");
    assert!(store.update_task(&ghost).await.is_err());
}

#[sqlx::test(migrations = "./migrations")]
async fn get_by_status_filters_within_a_run(pool: PgPool) {
    let store = Store::from_pool(pool);
    let run_id = Uuid::new_v4();
    let main = Task::new_main(run_id, "goal");
    store.insert_task(&main).await.unwrap();

    let mut done = Task::new_subtask(run_id, main.id, "done-subtask");
    done.status = TaskStatus::Completed;
    store.insert_task(&done).await.unwrap();
    let pending = Task::new_subtask(run_id, main.id, "pending-subtask");
    store.insert_task(&pending).await.unwrap();

    let completed = store.get_by_status(run_id, TaskStatus::Completed).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_task_removes_the_row(pool: PgPool) {
    let store = Store::from_pool(pool);
    let task = Task::new_main(Uuid::new_v4(), "goal");
    store.insert_task(&task).await.unwrap();

    store.delete_task(task.id).await.unwrap();
    assert!(store.get_task(task.id).await.unwrap().is_none());
}
