//! Server-side session establishment tests.
//!
//! Covers:
//! - Mutual TLS enforcement (missing and untrusted client certificates)
//! - WebSocket upgrade path checks
//! - The acknowledgment loop over a real TLS connection
//! - Listener isolation from misbehaving clients

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use ackwire_common::{
    test_pki::TestPki, ClientSecurity, Error, ServerSecurity, ServerVerification,
};
use ackwire_server::{client_certificate, serve_session, Listener, SecureWsServer};
use futures_util::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use tokio::{net::TcpStream, sync::oneshot};
use tokio_rustls::{client::TlsStream, TlsConnector};
use tokio_tungstenite::{client_async, tungstenite::Message, WebSocketStream};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn start_listener(pki: &TestPki) -> (Listener, SocketAddr) {
    let security = ServerSecurity::build(pki.server.credential(), pki.trust_store())
        .expect("server security should build");
    let server = SecureWsServer::with_security(security, "127.0.0.1:0");
    let listener = server.listen().await.expect("listen should succeed");
    let addr = listener.local_addr().expect("listener should have an address");
    (listener, addr)
}

async fn tls_connect(
    addr: SocketAddr,
    config: Arc<rustls::ClientConfig>,
) -> io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let server_name = ServerName::try_from("localhost").expect("valid server name");
    TlsConnector::from(config).connect(server_name, tcp).await
}

async fn ws_connect(
    addr: SocketAddr,
    config: Arc<rustls::ClientConfig>,
    path: &str,
) -> anyhow::Result<WebSocketStream<TlsStream<TcpStream>>> {
    let tls = tls_connect(addr, config).await?;
    let url = format!("wss://localhost:{}{}", addr.port(), path);
    let (ws, _response) = client_async(url, tls).await?;
    Ok(ws)
}

fn trusted_client(pki: &TestPki) -> Arc<rustls::ClientConfig> {
    ClientSecurity::build(
        pki.client.credential(),
        ServerVerification::TrustStore(pki.trust_store()),
    )
    .expect("client security should build")
    .tls_config()
}

fn client_without_certificate(pki: &TestPki) -> Arc<rustls::ClientConfig> {
    ackwire_common::security::ensure_crypto_provider();
    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(pki.trust_store().roots().clone())
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

#[tokio::test]
async fn test_trusted_client_receives_acknowledgments() {
    let pki = TestPki::generate();
    let (listener, addr) = start_listener(&pki).await;

    let client_leaf = pki.client.credential().cert_chain()[0].clone();
    let server_task = tokio::spawn(async move {
        let session = listener.accept_session().await.expect("session should open");
        assert_eq!(client_certificate(&session), Some(&client_leaf));
        serve_session(session).await
    });

    let mut ws = ws_connect(addr, trusted_client(&pki), "/")
        .await
        .expect("client should connect");

    ws.send(Message::Text("hello".into())).await.unwrap();
    let ack = ws.next().await.expect("ack expected").unwrap();
    assert_eq!(ack, Message::Text("ACK - hello".into()));

    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    let ack = ws.next().await.expect("ack expected").unwrap();
    let mut expected = b"ACK - ".to_vec();
    expected.extend_from_slice(&[1, 2, 3]);
    assert_eq!(ack, Message::Binary(expected));

    ws.close(None).await.unwrap();
    let result = tokio::time::timeout(TEST_TIMEOUT, server_task)
        .await
        .expect("server loop should end after close")
        .expect("server task panicked");
    assert!(result.is_ok(), "clean close should end the loop without error");
}

#[tokio::test]
async fn test_client_without_certificate_is_rejected() {
    let pki = TestPki::generate();
    let (listener, addr) = start_listener(&pki).await;

    let config = client_without_certificate(&pki);
    let client_task = tokio::spawn(async move { ws_connect(addr, config, "/").await });

    let result = tokio::time::timeout(TEST_TIMEOUT, listener.accept_session())
        .await
        .expect("accept should not hang");
    assert!(
        matches!(result, Err(Error::Handshake(_))),
        "expected handshake error, got {:?}",
        result.err()
    );

    let client_result = tokio::time::timeout(TEST_TIMEOUT, client_task)
        .await
        .expect("client should give up")
        .expect("client task panicked");
    assert!(client_result.is_err(), "no session may be created");
}

#[tokio::test]
async fn test_untrusted_client_certificate_is_rejected() {
    let pki = TestPki::generate();
    let (listener, addr) = start_listener(&pki).await;

    let rogue = ClientSecurity::build(
        pki.rogue_client.credential(),
        ServerVerification::TrustStore(pki.trust_store()),
    )
    .unwrap()
    .tls_config();
    let client_task = tokio::spawn(async move { ws_connect(addr, rogue, "/").await });

    let result = tokio::time::timeout(TEST_TIMEOUT, listener.accept_session())
        .await
        .expect("accept should not hang");
    assert!(matches!(result, Err(Error::Handshake(_))));

    let client_result = tokio::time::timeout(TEST_TIMEOUT, client_task)
        .await
        .expect("client should give up")
        .expect("client task panicked");
    assert!(client_result.is_err());
}

#[tokio::test]
async fn test_unknown_path_is_refused() {
    let pki = TestPki::generate();
    let (listener, addr) = start_listener(&pki).await;

    let config = trusted_client(&pki);
    let client_task = tokio::spawn(async move { ws_connect(addr, config, "/admin").await });

    let result = tokio::time::timeout(TEST_TIMEOUT, listener.accept_session())
        .await
        .expect("accept should not hang");
    assert!(matches!(result, Err(Error::Upgrade(_))));

    let client_result = client_task.await.expect("client task panicked");
    assert!(client_result.is_err(), "upgrade on /admin must fail");
}

#[tokio::test]
async fn test_listener_survives_rejected_client() {
    let pki = TestPki::generate();
    let (listener, addr) = start_listener(&pki).await;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(listener.run_until(async {
        let _ = shutdown_rx.await;
    }));

    let rejected = ws_connect(addr, client_without_certificate(&pki), "/").await;
    assert!(rejected.is_err());

    let mut ws = ws_connect(addr, trusted_client(&pki), "/")
        .await
        .expect("listener should still accept trusted clients");
    ws.send(Message::Text("still there?".into())).await.unwrap();
    let ack = ws.next().await.expect("ack expected").unwrap();
    assert_eq!(ack, Message::Text("ACK - still there?".into()));
    ws.close(None).await.unwrap();

    shutdown_tx.send(()).unwrap();
    let result = tokio::time::timeout(TEST_TIMEOUT, server_task)
        .await
        .expect("listener should stop on shutdown")
        .expect("listener task panicked");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_address_in_use_is_bind_error() {
    let pki = TestPki::generate();
    let (_listener, addr) = start_listener(&pki).await;

    let security = ServerSecurity::build(pki.server.credential(), pki.trust_store()).unwrap();
    let server = SecureWsServer::with_security(security, addr.to_string());
    let result = server.listen().await;
    assert!(matches!(result, Err(Error::Bind { .. })));
}
