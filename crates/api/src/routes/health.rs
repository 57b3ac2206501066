use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "rooms": state.rooms.room_count(),
        "workers": state.rooms.worker_count(),
        "uptime": state.uptime_secs(),
    }))
}
