use axum::{extract::State, Json};
use meetsfu_services::turn::generate_credentials;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::state::AppState;

pub async fn turn_credentials(State(state): State<AppState>) -> Json<meetsfu_services::turn::TurnCredentials> {
    let now_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Json(generate_credentials(&state.settings.turn, now_unix))
}
