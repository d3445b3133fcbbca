use crate::AppState;
use crate::models::HealthResponse;
use axum::{Json, extract::State, response::IntoResponse};

#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Receiver is up", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_as: state.receiver.store_as().to_string(),
    })
}
