//! Control Plane handlers (§4.8): `initiate/start/stop/get/list/stream`.
//! Grounded on `backend/agent/api.py`'s endpoint sequencing, adapted to
//! axum extractors.

use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sa_domain::response::{ResponseEvent, Substatus};
use sa_domain::run::{Run, RunOptions, RunStatus};
use sa_domain::Error;
use sa_registry::ControlSignal;
use uuid::Uuid;

use crate::api::dto::{
    InitiateResponse, ListResponse, RunDto, RunOptionsInput, StartResponse, StopResponse, StreamQuery,
};
use crate::api::error::{ApiError, ApiResult};
use crate::runtime::coordinator::workspace_root_for;
use crate::state::AppState;

/// Caller identity is established by middleware upstream of this crate
/// (§1 Non-goal: "multi-tenant isolation beyond authorization already
/// performed upstream"); we only need *an* account id to scope rows, so
/// an absent or unparsable header falls back to the nil account.
fn account_id(headers: &axum::http::HeaderMap) -> Uuid {
    headers
        .get("x-account-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or(Uuid::nil())
}

pub async fn initiate(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<InitiateResponse>> {
    let account_id = account_id(&headers);

    let mut prompt: Option<String> = None;
    let mut options = RunOptionsInput::default();
    let mut uploads: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::Other(e.to_string()))? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "prompt" => {
                prompt = Some(field.text().await.map_err(|e| Error::Other(e.to_string()))?);
            }
            "stream" => {
                options.stream = field
                    .text()
                    .await
                    .map_err(|e| Error::Other(e.to_string()))?
                    .parse()
                    .unwrap_or(false);
            }
            "enable_thinking" => {
                options.enable_thinking = field.text().await.ok().and_then(|s| s.parse().ok());
            }
            "reasoning_effort" => {
                options.reasoning_effort = field.text().await.ok();
            }
            "model" => {
                options.model = field.text().await.ok();
            }
            "files" | "files[]" => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes = field.bytes().await.map_err(|e| Error::Other(e.to_string()))?;
                uploads.push((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let prompt = prompt.ok_or_else(|| Error::Other("missing required 'prompt' field".into()))?;

    let project = state.store.insert_project(account_id, "New Project").await?;
    let thread = state.store.insert_thread(project.project_id, account_id).await?;

    let sandbox = state.sandbox.create(project.project_id).await?;
    state.store.update_project_sandbox(project.project_id, &sandbox).await?;
    let workspace_root = workspace_root_for(&sandbox);
    if let Err(e) = std::fs::create_dir_all(&workspace_root) {
        tracing::warn!(error = %e, "failed to create workspace root for uploads");
    }

    let mut uploaded_paths = Vec::new();
    let mut upload_failures = Vec::new();
    for (filename, bytes) in uploads {
        let dest = workspace_root.join(&filename);
        match std::fs::write(&dest, &bytes) {
            Ok(()) => uploaded_paths.push(format!("/workspace/{filename}")),
            Err(e) => upload_failures.push(format!("{filename}: {e}")),
        }
    }

    let message_content = serde_json::json!({
        "text": prompt,
        "uploaded_files": uploaded_paths,
        "upload_failures": upload_failures,
    });
    state
        .store
        .insert_message(thread.thread_id, "user", true, message_content, None)
        .await?;

    let mut run = Run::new(project.project_id, thread.thread_id, options.into());
    run.status = RunStatus::Running;
    run.started_at = Some(chrono::Utc::now());
    state.store.insert_run(&run, account_id).await?;
    state.broker().enqueue(run.id).await?;

    spawn_project_naming(state.clone(), project.project_id, prompt);

    Ok(Json(InitiateResponse {
        thread_id: thread.thread_id,
        agent_run_id: run.id,
    }))
}

/// Fire-and-forget project naming (§4.8 `initiate`): failures are logged,
/// never propagated to the caller.
fn spawn_project_naming(state: AppState, project_id: Uuid, prompt: String) {
    tokio::spawn(async move {
        let Some(provider) = state.default_provider() else { return };
        let req = sa_providers::traits::ChatRequest {
            messages: vec![
                sa_domain::tool::Message::system(
                    "Generate a 2-4 word project name for the following request. Respond with only the name.",
                ),
                sa_domain::tool::Message::user(prompt),
            ],
            model: Some(state.config.llm.resolve_model(None)),
            ..Default::default()
        };
        match provider.chat(req).await {
            Ok(resp) => {
                let name = resp.content.trim().trim_matches('"');
                if !name.is_empty() {
                    if let Err(e) = state.store.rename_project(project_id, name).await {
                        tracing::warn!(project_id = %project_id, error = %e, "failed to persist generated project name");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "project naming call failed");
            }
        }
    });
}

pub async fn start(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(thread_id): Path<Uuid>,
    Json(options): Json<RunOptionsInput>,
) -> ApiResult<Json<StartResponse>> {
    let account_id = account_id(&headers);
    let Some(thread) = state.store.get_thread(thread_id).await? else {
        return Err(Error::NotFound(format!("thread {thread_id}")).into());
    };

    if let Some(existing) = state.store.has_running_run(thread.project_id).await? {
        stop_internal(&state, existing, None).await?;
    }

    let resolved_model = state.config.llm.resolve_model(options.model.as_deref());
    let mut run_options: RunOptions = options.into();
    run_options.model = Some(resolved_model);

    let mut run = Run::new(thread.project_id, thread_id, run_options);
    run.status = RunStatus::Running;
    run.started_at = Some(chrono::Utc::now());
    state.store.insert_run(&run, account_id).await?;
    state.broker().enqueue(run.id).await?;

    Ok(Json(StartResponse { agent_run_id: run.id, status: "running" }))
}

pub async fn stop(State(state): State<AppState>, Path(run_id): Path<Uuid>) -> ApiResult<Json<StopResponse>> {
    stop_internal(&state, run_id, None).await?;
    Ok(Json(StopResponse { status: "stopped" }))
}

/// Shared by `stop` and `start`'s "stop the currently-running run first"
/// step (§4.8 `start`).
async fn stop_internal(state: &AppState, run_id: Uuid, error: Option<&str>) -> ApiResult<()> {
    let run = state.store.get_run(run_id).await?;
    state.store.mark_stopped_if_active(run_id, error).await?;

    state.registry.publish_control(run_id, None, ControlSignal::Stop).await?;
    if let Some(instance_id) = run.and_then(|r| r.instance_id) {
        state
            .registry
            .publish_control(run_id, Some(&instance_id), ControlSignal::Stop)
            .await?;
    }
    state
        .registry
        .set_retention(run_id, state.config.registry.log_ttl_seconds)
        .await?;
    Ok(())
}

pub async fn get(State(state): State<AppState>, Path(run_id): Path<Uuid>) -> ApiResult<Json<RunDto>> {
    let run = state
        .store
        .get_run(run_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
    Ok(Json(RunDto::from(&run)))
}

pub async fn list(State(state): State<AppState>, Path(thread_id): Path<Uuid>) -> ApiResult<Json<ListResponse>> {
    let runs = state.store.list_runs_by_thread(thread_id).await?;
    Ok(Json(ListResponse { agent_runs: runs.iter().map(RunDto::from).collect() }))
}

/// `text/event-stream` (§6): replay the full log in order, then tail new
/// events as they're appended, closing once the trailing `thread_run_end`
/// status event is observed (after, not on, the terminal status itself).
pub async fn stream_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Query(_query): Query<StreamQuery>,
) -> Response {
    let registry = Arc::clone(&state.registry);

    let body = stream! {
        let mut cursor = 0u64;
        let mut events_rx = match registry.subscribe_events(run_id).await {
            Ok(rx) => rx,
            Err(e) => {
                yield Ok::<_, Infallible>(Event::default().event("error").data(e.to_string()));
                return;
            }
        };

        loop {
            let batch = match registry.read_range(run_id, cursor, None).await {
                Ok(batch) => batch,
                Err(e) => {
                    yield Ok(Event::default().event("error").data(e.to_string()));
                    return;
                }
            };

            let mut terminal = false;
            for (idx, event) in batch {
                cursor = idx + 1;
                let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                if matches!(&event, ResponseEvent::Status { status: Substatus::ThreadRunEnd, .. }) {
                    terminal = true;
                }
                yield Ok(Event::default().data(json));
            }
            if terminal {
                return;
            }

            if events_rx.recv().await.is_none() {
                return;
            }
        }
    };

    let mut response = Sse::new(body).keep_alive(KeepAlive::default()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, "no-cache, no-transform".parse().unwrap());
    headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
    headers.insert("x-accel-buffering", "no".parse().unwrap());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_parses_valid_header() {
        let id = Uuid::new_v4();
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-account-id", id.to_string().parse().unwrap());
        assert_eq!(account_id(&headers), id);
    }

    #[test]
    fn account_id_falls_back_to_nil_when_missing_or_invalid() {
        let headers = axum::http::HeaderMap::new();
        assert_eq!(account_id(&headers), Uuid::nil());

        let mut bad_headers = axum::http::HeaderMap::new();
        bad_headers.insert("x-account-id", "not-a-uuid".parse().unwrap());
        assert_eq!(account_id(&bad_headers), Uuid::nil());
    }
}
