//! Route handlers — schedule surface and run trigger surface.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use reelpilot_core::RunRequest;

use super::server::AppState;

/// Full schedule state: config, per-slot last-run join, attempt history.
pub async fn get_schedule(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(schedule_state(&state))
}

/// Apply a partial patch to the schedule document. Unknown accounts are
/// ignored and invalid time values dropped individually inside the store.
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<reelpilot_scheduler::SchedulePatch>,
) -> Json<serde_json::Value> {
    match state.schedule.update(&patch) {
        Ok(_) => Json(schedule_state(&state)),
        Err(e) => Json(serde_json::json!({"ok": false, "error": e.to_string()})),
    }
}

fn schedule_state(state: &AppState) -> serde_json::Value {
    let config = match state.schedule.load() {
        Ok(config) => config,
        Err(e) => return serde_json::json!({"ok": false, "error": e.to_string()}),
    };
    let last_runs = state.run_log.last_by_account();

    let slots: Vec<serde_json::Value> = config
        .accounts
        .iter()
        .map(|(account, slot)| {
            let last = last_runs.get(account);
            serde_json::json!({
                "account": account,
                "enabled": slot.enabled,
                "time_utc": slot.time_utc,
                "last_run": last.map(|e| e.timestamp.to_rfc3339()),
                "last_status": last.map(|e| e.status.to_string()),
            })
        })
        .collect();

    let attempts: Vec<serde_json::Value> = state
        .history
        .load()
        .iter()
        .map(|a| {
            serde_json::json!({
                "timestamp": a.timestamp.to_rfc3339(),
                "account": a.account,
                "action": a.action,
                "detail": a.detail,
            })
        })
        .collect();

    serde_json::json!({
        "ok": true,
        "recurrence": config.recurrence,
        "today_matches": config.recurrence.matches(Utc::now().date_naive()),
        "slots": slots,
        "dispatch_history": attempts,
        "spent_today": state.ledger.spent_today(),
        "daily_cap": state.ledger.cap(),
    })
}

/// Run trigger body: request flags plus the execution-path choice.
#[derive(Debug, Deserialize)]
pub struct TriggerRunBody {
    #[serde(flatten)]
    pub request: RunRequest,
    /// Fire-and-forget instead of the serialized queue.
    #[serde(default)]
    pub detached: bool,
}

/// Accept a run and return its id immediately.
pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TriggerRunBody>,
) -> Json<serde_json::Value> {
    if body.request.account.is_empty() {
        return Json(serde_json::json!({"ok": false, "error": "'account' is required"}));
    }
    let submitted = if body.detached {
        state.runs.submit_detached(&body.request)
    } else {
        state.runs.submit(&body.request)
    };
    match submitted {
        Ok(record) => Json(serde_json::json!({
            "ok": true,
            "run_id": record.id,
            "status": record.status,
            "started_at": record.started_at.to_rfc3339(),
        })),
        Err(e) => Json(serde_json::json!({"ok": false, "error": e.to_string()})),
    }
}

/// Status + captured output for one run.
pub async fn run_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.runs.registry().get(&id) {
        Some(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "ok": true,
                "id": record.id,
                "account": record.account,
                "status": record.status,
                "started_at": record.started_at.to_rfc3339(),
                "output": record.output,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"ok": false, "error": "Run not found"})),
        ),
    }
}

/// All known runs, output truncated to a tail window.
const LIST_OUTPUT_TAIL: usize = 500;

pub async fn list_runs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let runs = state.runs.registry().list_tail(LIST_OUTPUT_TAIL);
    Json(serde_json::json!({"ok": true, "count": runs.len(), "runs": runs}))
}
