use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::TryStreamExt;
use http_body_util::BodyExt;
use mstransfer::config::{ServerConfig, StoreMode};
use mstransfer::services::codec::{Codec, SourceReader, ZlibCodec};
use mstransfer::{AppState, create_app};
use serde_json::Value;
use std::path::Path;
use tower::ServiceExt;

fn state(dir: &Path, store_as: StoreMode) -> AppState {
    AppState::new(ServerConfig::new(dir, store_as)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn upload_request(id: Option<&str>, filename: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/upload")
        .header("Content-Type", "application/octet-stream")
        .header("Content-Length", body.len());
    if let Some(id) = id {
        builder = builder.header("X-Transfer-ID", id);
    }
    if let Some(filename) = filename {
        builder = builder.header("X-Original-Filename", filename);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn compress(data: &[u8]) -> Vec<u8> {
    let reader: SourceReader = Box::new(std::io::Cursor::new(data.to_vec()));
    let chunks: Vec<bytes::Bytes> = ZlibCodec::default()
        .compress_stream(reader, 64)
        .try_collect()
        .await
        .unwrap();
    chunks.concat()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_health_reports_store_mode() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Mzml));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storeAs"], "mzml");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_small_compressed_upload_is_stored_as_is() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Msz));

    let response = app
        .clone()
        .oneshot(upload_request(Some("T1"), Some("x.msz"), b"0123456789".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["id"], "T1");
    assert_eq!(json["state"], "stored");
    assert_eq!(json["bytesReceived"], 10);

    assert_eq!(std::fs::read(dir.path().join("x.msz")).unwrap(), b"0123456789");
    assert_eq!(file_names(dir.path()), vec!["x.msz"]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/transfer/T1/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["state"], "stored");
    assert_eq!(json["bytesReceived"], 10);
    assert!(json["finishedAt"].is_string());
}

#[tokio::test]
async fn test_decompress_on_arrival() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Mzml));

    let original = b"<mzML>0123456789</mzML>".to_vec();
    let compressed = compress(&original).await;
    let sent = compressed.len() as u64;

    let response = app
        .oneshot(upload_request(Some("T2"), Some("run.msz"), compressed))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["state"], "stored");
    assert_eq!(json["bytesReceived"], sent);

    assert_eq!(std::fs::read(dir.path().join("run.mzML")).unwrap(), original);
    assert_eq!(file_names(dir.path()), vec!["run.mzML"]);
}

#[tokio::test]
async fn test_corrupt_payload_is_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Mzml));

    let response = app
        .clone()
        .oneshot(upload_request(Some("bad"), Some("bad.msz"), b"garbage".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "DecompressionFailure");
    assert_eq!(json["id"], "bad");
    assert!(file_names(dir.path()).is_empty());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/transfer/bad/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["state"], "failed");
    assert_eq!(json["error"]["kind"], "DecompressionFailure");
}

#[tokio::test]
async fn test_unknown_transfer_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Msz));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/transfer/nope/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Transfer not found");
}

#[tokio::test]
async fn test_duplicate_transfer_id_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Msz));

    let first = app
        .clone()
        .oneshot(upload_request(Some("same"), Some("a.msz"), b"aaaa".to_vec()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(upload_request(Some("same"), Some("b.msz"), b"bbbb".to_vec()))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(file_names(dir.path()), vec!["a.msz"]);
}

#[tokio::test]
async fn test_missing_filename_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Msz));

    let response = app
        .oneshot(upload_request(Some("T3"), None, b"data".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("X-Original-Filename"));
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn test_server_mints_transfer_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Msz));

    let response = app
        .oneshot(upload_request(None, Some("minted.msz"), b"abc".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(uuid::Uuid::parse_str(json["id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_app(state(dir.path(), StoreMode::Msz));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/v1/upload"].is_object());
    assert!(json["paths"]["/v1/transfer/{id}/status"].is_object());
}
