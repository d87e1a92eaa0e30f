use std::net::SocketAddr;
use std::sync::Arc;

use dandy_relay::testing::RecordingPresenter;
use dandy_relay::{
    ActionRegistry, FrameLimits, NotificationManager, NotifyHandler, RelayServer, Router,
    TokenStore,
};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Start a relay backed by the token file at `store`, send one notify
/// request with `bearer` (or the stored token), shut down, and return the
/// status line with the secret that was in effect.
async fn start_and_notify(store: &TokenStore, bearer: Option<&str>) -> (String, String) {
    let token = store.load_or_create().expect("token");
    let secret = token.as_str().to_string();

    let presenter = Arc::new(RecordingPresenter::default());
    let manager = NotificationManager::new(presenter, ActionRegistry::new());
    let router = Router::new(NotifyHandler::new(token, manager));
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = RelayServer::bind(addr, router, FrameLimits::default())
        .await
        .expect("bind");
    let addr = server.local_addr().expect("addr");
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(server.serve(rx));

    let authorization = bearer
        .map(str::to_string)
        .unwrap_or_else(|| format!("Bearer {secret}"));
    let body = br#"{"notification":{"title":"T","message":"M"}}"#;
    let request = format!(
        "POST /notify HTTP/1.1\r\nAuthorization: {authorization}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write head");
    stream.write_all(body).await.expect("write body");
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.expect("read");

    shutdown.send(true).expect("shutdown");
    handle.await.expect("serve");

    let reply = String::from_utf8(raw).expect("utf8");
    let status_line = reply.lines().next().unwrap_or_default().to_string();
    (status_line, secret)
}

#[tokio::test]
async fn token_survives_restart() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(".dandy-notifier-token");
    assert!(!path.exists());

    let (first_status, first_secret) = start_and_notify(&TokenStore::at(&path), None).await;
    assert_eq!(first_status, "HTTP/1.1 200 OK");
    assert!(!first_secret.is_empty());
    assert!(path.exists());

    let old_bearer = format!("Bearer {first_secret}");
    let (second_status, second_secret) =
        start_and_notify(&TokenStore::at(&path), Some(&old_bearer)).await;
    assert_eq!(second_status, "HTTP/1.1 200 OK");
    assert_eq!(second_secret, first_secret);
}

#[tokio::test]
async fn replaced_token_file_invalidates_old_bearer() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("token");

    let (_, first_secret) = start_and_notify(&TokenStore::at(&path), None).await;
    std::fs::write(&path, "rotated-secret\n").expect("rotate");

    let stale = format!("Bearer {first_secret}");
    let (status, secret) = start_and_notify(&TokenStore::at(&path), Some(&stale)).await;
    assert_eq!(secret, "rotated-secret");
    assert_eq!(status, "HTTP/1.1 401 Unauthorized");
}
