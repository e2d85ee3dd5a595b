//! Tests for the sidecar HTTP client against a one-shot stub server.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use wabridge::whatsapp::client::{BridgeClient, BridgeClientFactory};
use wabridge::whatsapp::{ClientFactory, ConnectionState, WhatsAppClient, WhatsAppError};

use crate::fake_client::incoming;

/// Serve one HTTP response and hand back the raw request that was received.
async fn serve_once(status_line: &str, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("listener should bind: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should expose local addr: {err}"),
    };

    let (request_tx, request_rx) = oneshot::channel();
    let status_line_owned = status_line.to_owned();
    let body_owned = body.to_owned();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status_line_owned}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body_owned}",
            body_owned.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = request_tx.send(request);
    });

    (format!("http://{addr}"), request_rx)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0_u8; 1024];
    loop {
        let Ok(n) = socket.read(&mut buf).await else {
            break;
        };
        if n == 0 {
            break;
        }
        raw.extend_from_slice(buf.get(..n).unwrap_or_default());
        let text = String::from_utf8_lossy(&raw).to_string();
        if let Some((head, body)) = text.split_once("\r\n\r\n") {
            let expected = head
                .lines()
                .find_map(|line| {
                    let lower = line.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            if body.len() >= expected {
                return text;
            }
        }
    }
    String::from_utf8_lossy(&raw).to_string()
}

fn client(base_url: &str) -> BridgeClient {
    let (tx, _rx) = mpsc::channel(4);
    BridgeClient::new(base_url, tx)
}

async fn received(rx: oneshot::Receiver<String>) -> String {
    match rx.await {
        Ok(request) => request,
        Err(err) => panic!("stub should capture the request: {err}"),
    }
}

#[tokio::test]
async fn send_message_returns_receipt() {
    let (url, request) = serve_once(
        "200 OK",
        r#"{"success":true,"data":{"id":"true_6281@c.us_3EB0","to":"6281234567890@c.us","body":"hi","timestamp":1700000000,"ack":1}}"#,
    )
    .await;

    let receipt = match client(&url).send_message("6281234567890@c.us", "hi").await {
        Ok(receipt) => receipt,
        Err(err) => panic!("send should succeed: {err}"),
    };
    assert_eq!(receipt.id, "true_6281@c.us_3EB0");
    assert_eq!(receipt.to, "6281234567890@c.us");
    assert_eq!(receipt.timestamp, 1_700_000_000);
    assert_eq!(receipt.extra.get("ack"), Some(&serde_json::json!(1)));

    let request = received(request).await;
    assert!(request.starts_with("POST /send "));
    assert!(request.contains(r#""chatId":"6281234567890@c.us""#));
    assert!(request.contains(r#""text":"hi""#));
}

#[tokio::test]
async fn bridge_error_envelope_maps_to_bridge_error() {
    let (url, _request) = serve_once(
        "500 Internal Server Error",
        r#"{"success":false,"error":"Evaluation failed: session not ready"}"#,
    )
    .await;

    match client(&url).send_message("6281234567890@c.us", "hi").await {
        Err(WhatsAppError::Bridge(reason)) => assert!(reason.contains("session not ready")),
        other => panic!("expected bridge error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_failure_maps_to_bridge_error() {
    let (url, _request) = serve_once("502 Bad Gateway", "upstream down").await;

    match client(&url).get_chats().await {
        Err(WhatsAppError::Bridge(reason)) => assert!(reason.contains("502")),
        other => panic!("expected bridge error, got {other:?}"),
    }
}

#[tokio::test]
async fn unsuccessful_envelope_with_ok_status_is_an_error() {
    let (url, _request) = serve_once("200 OK", r#"{"success":false,"error":"nope"}"#).await;

    match client(&url).is_registered_user("1@c.us").await {
        Err(WhatsAppError::Bridge(reason)) => assert_eq!(reason, "nope"),
        other => panic!("expected bridge error, got {other:?}"),
    }
}

#[tokio::test]
async fn registration_check_sends_address_as_query() {
    let (url, request) = serve_once("200 OK", r#"{"success":true,"data":true}"#).await;

    let registered = client(&url).is_registered_user("6281234567890@c.us").await;
    assert!(matches!(registered, Ok(true)));

    let request = received(request).await;
    assert!(request.starts_with("GET /registered?address=6281234567890%40c.us "));
}

#[tokio::test]
async fn state_null_is_none() {
    let (url, _request) = serve_once("200 OK", r#"{"success":true,"data":null}"#).await;
    assert!(matches!(client(&url).get_state().await, Ok(None)));
}

#[tokio::test]
async fn state_is_decoded() {
    let (url, _request) = serve_once("200 OK", r#"{"success":true,"data":"CONNECTED"}"#).await;
    assert!(matches!(
        client(&url).get_state().await,
        Ok(Some(ConnectionState::Connected))
    ));

    let (url, _request) = serve_once("200 OK", r#"{"success":true,"data":"SMB_TOS_BLOCK"}"#).await;
    assert!(matches!(
        client(&url).get_state().await,
        Ok(Some(ConnectionState::SmbTosBlock))
    ));

    let (url, _request) = serve_once("200 OK", r#"{"success":true,"data":"NEW_STATE"}"#).await;
    match client(&url).get_state().await {
        Ok(Some(state)) => {
            assert_eq!(state, ConnectionState::Other("NEW_STATE".to_owned()));
            assert_eq!(state.to_string(), "NEW_STATE");
        }
        other => panic!("expected a state, got {other:?}"),
    }
}

#[test]
fn every_named_state_keeps_its_wire_name() {
    for name in [
        "CONNECTED",
        "OPENING",
        "PAIRING",
        "UNPAIRED",
        "UNPAIRED_IDLE",
        "CONFLICT",
        "TIMEOUT",
        "UNLAUNCHED",
        "PROXYBLOCK",
        "TOS_BLOCK",
        "SMB_TOS_BLOCK",
        "DEPRECATED_VERSION",
    ] {
        let state = ConnectionState::from(name.to_owned());
        assert!(
            !matches!(state, ConnectionState::Other(_)),
            "{name} should be a named state"
        );
        assert_eq!(state.as_str(), name);
    }
}

#[tokio::test]
async fn chats_are_decoded() {
    let (url, _request) = serve_once(
        "200 OK",
        r#"{"success":true,"data":[{"id":"1203630@g.us","name":"Family","isGroup":true},{"id":"6281@c.us","name":"Alice","isGroup":false}]}"#,
    )
    .await;

    let chats = match client(&url).get_chats().await {
        Ok(chats) => chats,
        Err(err) => panic!("chats should decode: {err}"),
    };
    assert_eq!(chats.len(), 2);
    assert!(chats[0].is_group);
    assert_eq!(chats[0].name, "Family");
    assert!(!chats[1].is_group);
}

#[tokio::test]
async fn reply_quotes_message_id() {
    let (url, request) = serve_once("200 OK", r#"{"success":true,"data":null}"#).await;

    let message = incoming("!ping");
    assert!(client(&url).reply(&message, "pong").await.is_ok());

    let request = received(request).await;
    assert!(request.starts_with("POST /reply "));
    assert!(request.contains(&format!(r#""messageId":"{}""#, message.id)));
    assert!(request.contains(r#""text":"pong""#));
}

#[tokio::test]
async fn unreachable_sidecar_is_http_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener.local_addr().ok(),
        Err(err) => panic!("listener should bind: {err}"),
    };
    let url = match addr {
        Some(addr) => format!("http://{addr}"),
        None => panic!("listener should expose local addr"),
    };

    assert!(matches!(
        client(&url).get_state().await,
        Err(WhatsAppError::Http(_))
    ));
}

#[test]
fn factory_normalises_base_url() {
    let client = client("http://127.0.0.1:3001/");
    assert_eq!(client.base_url(), "http://127.0.0.1:3001");

    let default_factory = BridgeClientFactory::default();
    let (tx, _rx) = mpsc::channel(1);
    let _client = default_factory.create(tx);
}
