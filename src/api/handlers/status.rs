use crate::AppState;
use crate::api::error::AppError;
use crate::models::TransferRecord;
use axum::{
    Json,
    extract::{Path, State},
};

#[utoipa::path(
    get,
    path = "/v1/transfer/{id}/status",
    params(
        ("id" = String, Path, description = "Transfer identifier")
    ),
    responses(
        (status = 200, description = "Current transfer record", body = TransferRecord),
        (status = 404, description = "Unknown transfer")
    ),
    tag = "transfers"
)]
pub async fn transfer_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransferRecord>, AppError> {
    state
        .receiver
        .get_status(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Transfer not found".to_string()))
}
