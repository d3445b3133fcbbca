use mstransfer::config::{ServerConfig, StoreMode};
use mstransfer::models::{ErrorKind, TransferState};
use mstransfer::{AppState, create_app};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

fn names_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

async fn wait_for_state(state: &AppState, id: &str, want: TransferState) -> bool {
    for _ in 0..200 {
        if state.registry.get(id).is_some_and(|r| r.state == want) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_client_disconnect_mid_upload_fails_and_cleans_up() {
    for store_as in [StoreMode::Msz, StoreMode::Mzml] {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(ServerConfig::new(dir.path(), store_as)).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_app(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let head = format!(
            "POST /v1/upload HTTP/1.1\r\n\
             Host: {addr}\r\n\
             X-Transfer-ID: T3\r\n\
             X-Original-Filename: cut.msz\r\n\
             Content-Type: application/octet-stream\r\n\
             Content-Length: 100\r\n\r\n"
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(b"12345").await.unwrap();
        stream.flush().await.unwrap();

        // Let the receiver register the transfer before the connection drops
        assert!(
            wait_for_state(&state, "T3", TransferState::Receiving).await,
            "transfer never registered"
        );
        drop(stream);

        assert!(
            wait_for_state(&state, "T3", TransferState::Failed).await,
            "transfer did not fail after disconnect ({:?})",
            store_as
        );
        let record = state.registry.get("T3").unwrap();
        assert_eq!(record.error.unwrap().kind, ErrorKind::TransportFailure);
        assert!(record.finished_at.is_some());

        assert!(names_in(dir.path()).is_empty(), "files left behind: {:?}", names_in(dir.path()));
    }
}
