use crate::AppState;
use crate::api::error::AppError;
use crate::models::{Format, UploadResponse};
use crate::services::receiver::UploadMeta;
use crate::utils::validation::{sanitize_filename, validate_transfer_id};
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, header},
};
use uuid::Uuid;

pub const TRANSFER_ID_HEADER: &str = "x-transfer-id";
pub const FILENAME_HEADER: &str = "x-original-filename";
pub const SOURCE_FORMAT_HEADER: &str = "x-source-format";

#[utoipa::path(
    post,
    path = "/v1/upload",
    request_body(content = Vec<u8>, content_type = "application/octet-stream", description = "Compressed payload"),
    params(
        ("X-Original-Filename" = String, Header, description = "Name of the file on the sender"),
        ("X-Transfer-ID" = Option<String>, Header, description = "Client-chosen transfer identifier"),
        ("X-Source-Format" = Option<String>, Header, description = "Format of the sender's input")
    ),
    responses(
        (status = 200, description = "Transfer stored", body = UploadResponse),
        (status = 400, description = "Missing headers or transport failure"),
        (status = 409, description = "Transfer identifier already in use"),
        (status = 422, description = "Payload could not be decompressed"),
        (status = 500, description = "Receiver could not store the payload")
    ),
    tag = "transfers"
)]
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, AppError> {
    let meta = upload_meta(&headers)?;

    if let Some(format) = header_str(&headers, SOURCE_FORMAT_HEADER)? {
        let format: Format = format
            .parse()
            .map_err(|e: crate::models::TransferError| AppError::BadRequest(e.to_string()))?;
        tracing::debug!("Transfer {} sent from a {} source", meta.transfer_id, format);
    }

    let record = state
        .receiver
        .accept_upload(meta, body.into_data_stream())
        .await?;

    Ok(Json(record.into()))
}

fn upload_meta(headers: &HeaderMap) -> Result<UploadMeta, AppError> {
    let filename = header_str(headers, FILENAME_HEADER)?
        .ok_or_else(|| AppError::BadRequest("Missing X-Original-Filename header".to_string()))?;
    let filename = sanitize_filename(filename).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let transfer_id = match header_str(headers, TRANSFER_ID_HEADER)? {
        Some(id) => {
            validate_transfer_id(id).map_err(|e| AppError::BadRequest(e.to_string()))?;
            id.to_string()
        }
        None => Uuid::new_v4().to_string(),
    };

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    Ok(UploadMeta {
        transfer_id,
        filename,
        content_length,
    })
}

/// Header value as UTF-8, so non-ASCII file names survive.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => std::str::from_utf8(value.as_bytes())
            .map(|s| Some(s.trim()).filter(|s| !s.is_empty()))
            .map_err(|_| AppError::BadRequest(format!("Header {} is not valid UTF-8", name))),
    }
}
