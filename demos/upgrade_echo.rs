//! Accepts `Upgrade: websocket` requests on `/echo` and echoes raw bytes.
//!
//! No WebSocket framing is done here; try it with
//! `curl -i -N -H 'Connection: upgrade' -H 'Upgrade: websocket' localhost:8080/echo`.

use duet_http::{Server, Service, StatusCode, UpgradeVerdict};
use tokio::io::{copy, split, AsyncWriteExt};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let service = Service::new();

    service.add_upgrade_verifier(|req| match req.url().raw_path() {
        "/echo" => UpgradeVerdict::Accept,
        "/private" => UpgradeVerdict::Deny {
            status: StatusCode::UNAUTHORIZED,
            message: String::new(),
        },
        _ => UpgradeVerdict::PassToNext,
    });

    service.on_upgrade(|mut upgraded, req| async move {
        tracing::info!(remote = ?req.remote_addr(), "echo session started");

        let switched = b"HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: websocket\r\n\r\n";
        if upgraded.write_all(switched).await.is_err() {
            return;
        }

        let (mut reader, mut writer) = split(upgraded);
        let _ = copy(&mut reader, &mut writer).await;
    });

    Server::builder()
        .bind("127.0.0.1:8080".parse().unwrap())?
        .handler(service)
        .build()
        .launch()
        .await;
    Ok(())
}
