use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    providers: Vec<String>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        providers: state.orchestrator.aliases().await,
    })
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .with_state(state)
}
