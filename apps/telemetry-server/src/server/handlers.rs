// [[RARO]]/apps/telemetry-server/src/server/handlers.rs
// Purpose: Query and streaming handlers over the event hub and task engine.
// Architecture: API Layer
// Dependencies: Axum, Runtime

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde_json::json;
use std::sync::Arc;

use crate::events::{Event, StreamMessage};
use crate::models::{BackgroundTask, FilterOptions};
use crate::observability::Metrics;
use crate::runtime::TelemetryRuntime;

const DEFAULT_LIMIT: usize = 100;

#[derive(serde::Deserialize)]
pub struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    status: String,
    message: String,
    stored_events: usize,
    subscribers: usize,
    tasks: usize,
    agent_sessions: usize,
    metrics: Metrics,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

pub async fn health(State(runtime): State<Arc<TelemetryRuntime>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "RARO Telemetry Server is running".to_string(),
        stored_events: runtime.hub.stored_events(),
        subscribers: runtime.hub.subscriber_count(),
        tasks: runtime.tasks.task_count(),
        agent_sessions: runtime.registry.len(),
        metrics: runtime.metrics(),
    })
}

pub async fn recent_events(
    State(runtime): State<Arc<TelemetryRuntime>>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<Event>> {
    Json(runtime.hub.recent(query.limit()))
}

pub async fn filter_options(State(runtime): State<Arc<TelemetryRuntime>>) -> Json<FilterOptions> {
    Json(runtime.hub.filter_options())
}

pub async fn events_by_agent(
    State(runtime): State<Arc<TelemetryRuntime>>,
    Path(agent): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<Event>> {
    Json(runtime.hub.by_agent(&agent, query.limit()))
}

pub async fn list_tasks(State(runtime): State<Arc<TelemetryRuntime>>) -> Json<Vec<BackgroundTask>> {
    Json(runtime.tasks.all_tasks().await)
}

pub async fn get_task(
    State(runtime): State<Arc<TelemetryRuntime>>,
    Path(task_id): Path<String>,
) -> Result<Json<BackgroundTask>, ApiError> {
    runtime
        .tasks
        .task(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Task not found"))
}

pub async fn get_task_output(
    State(runtime): State<Arc<TelemetryRuntime>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut output = runtime.tasks.task_output(&task_id).await;
    // Tasks created since the last scan are not in the map yet.
    if output.is_none() && runtime.tasks.task(&task_id).await.is_some() {
        output = runtime.tasks.task_output(&task_id).await;
    }

    match output {
        Some(output) => Ok(Json(json!({ "output": output }))),
        None => Err(not_found("Task output not found")),
    }
}

pub async fn ws_stream(
    State(runtime): State<Arc<TelemetryRuntime>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, runtime))
}

async fn handle_stream(socket: WebSocket, runtime: Arc<TelemetryRuntime>) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = runtime.hub.subscribe();
    let id = subscription.id;

    let initial = StreamMessage::Initial(std::mem::take(&mut subscription.snapshot));
    if send_message(&mut sender, &initial).await.is_err() {
        runtime.hub.unsubscribe(id);
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        tracing::info!("Client disconnected from event stream");
                        break;
                    }
                    Some(Ok(other)) => tracing::debug!("Ignoring client message: {:?}", other),
                }
            }
            update = subscription.receiver.recv() => {
                // None means the hub dropped this subscriber.
                let Some(update) = update else {
                    let _ = sender.close().await;
                    break;
                };
                if send_message(&mut sender, &update).await.is_err() {
                    tracing::info!("Failed to send update, client disconnected");
                    break;
                }
            }
        }
    }

    runtime.hub.unsubscribe(id);
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &StreamMessage,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to serialize stream message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}
