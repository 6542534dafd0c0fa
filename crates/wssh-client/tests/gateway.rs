//! End-to-end sessions against a scripted gateway on a local WebSocket.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use wssh_client::{AuthFailure, Callbacks, ClientError, ClientSession, ConnectionConfig, SessionEvent};
use wssh_core::{codec, AuthCredential, ClientMessage, GatewayMessage};

type GatewaySocket = WebSocketStream<TcpStream>;

/// Accept one WebSocket connection and hand it to `script`.
async fn spawn_gateway<F, Fut>(script: F) -> String
where
    F: FnOnce(GatewaySocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = accept_async(tcp).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}/remote")
}

async fn read_control(ws: &mut GatewaySocket) -> ClientMessage {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return codec::decode_client(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a control message, got {other:?}"),
        }
    }
}

async fn send_control(ws: &mut GatewaySocket, message: &GatewayMessage) {
    let text = codec::encode_gateway(message).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

/// Read until the client's close frame arrives, letting the reply flush.
async fn await_client_close(ws: &mut GatewaySocket) -> bool {
    let mut closed = false;
    while let Some(Ok(message)) = ws.next().await {
        if matches!(message, Message::Close(_)) {
            closed = true;
        }
    }
    closed
}

async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> Option<SessionEvent> {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("session event timed out")
}

#[tokio::test]
async fn password_session_over_websocket() {
    let endpoint = spawn_gateway(|mut ws| async move {
        match read_control(&mut ws).await {
            ClientMessage::Auth(request) => {
                assert_eq!(request.username, "root");
                assert_eq!(request.hostname, "localhost");
                assert_eq!(request.term, "xterm");
                assert_eq!(
                    request.credential,
                    AuthCredential::Password {
                        password: "secretpassword".into()
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        send_control(
            &mut ws,
            &GatewayMessage::AuthOk {
                session_id: Some("1".into()),
            },
        )
        .await;

        match ws.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(data, b"ls\n"),
            other => panic!("unexpected {other:?}"),
        }
        ws.send(Message::Binary(b"file.txt\r\n".to_vec())).await.unwrap();
        send_control(&mut ws, &GatewayMessage::Data("$ ".into())).await;
        ws.close(None).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (callbacks, mut events) = Callbacks::channel();
    let session = ClientSession::new(callbacks);
    session
        .connect(ConnectionConfig::password(
            endpoint,
            "localhost",
            "root",
            "secretpassword",
        ))
        .unwrap();

    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Connected));
    session.send(b"ls\n").unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Some(SessionEvent::Data(b"file.txt\r\n".to_vec()))
    );
    assert_eq!(
        next_event(&mut events).await,
        Some(SessionEvent::Data(b"$ ".to_vec()))
    );
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Closed));
    assert_eq!(next_event(&mut events).await, None);
}

#[tokio::test]
async fn local_close_completes_the_handshake() {
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let endpoint = spawn_gateway(|mut ws| async move {
        read_control(&mut ws).await;
        send_control(&mut ws, &GatewayMessage::AuthOk { session_id: None }).await;
        let _ = done_tx.send(await_client_close(&mut ws).await);
    })
    .await;

    let (callbacks, mut events) = Callbacks::channel();
    let session = ClientSession::new(callbacks);
    session
        .connect(ConnectionConfig::password(endpoint, "localhost", "root", "pw"))
        .unwrap();
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Connected));

    session.close();
    assert_eq!(next_event(&mut events).await, Some(SessionEvent::Closed));
    assert_eq!(next_event(&mut events).await, None);
    assert!(done_rx.await.unwrap(), "gateway never saw a close frame");
}

#[tokio::test]
async fn rejected_password_over_websocket() {
    let endpoint = spawn_gateway(|mut ws| async move {
        read_control(&mut ws).await;
        send_control(
            &mut ws,
            &GatewayMessage::Error("Authentication failed.".into()),
        )
        .await;
        await_client_close(&mut ws).await;
    })
    .await;

    let (callbacks, mut events) = Callbacks::channel();
    let session = ClientSession::new(callbacks);
    session
        .connect(ConnectionConfig::password(endpoint, "localhost", "root", "wrong"))
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(SessionEvent::Error(ClientError::Auth(AuthFailure::Rejected(
            "Authentication failed.".into()
        ))))
    );
    assert_eq!(next_event(&mut events).await, None);
}

#[tokio::test]
async fn unreachable_gateway_fails_to_open() {
    // Bind then drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (callbacks, mut events) = Callbacks::channel();
    let session = ClientSession::new(callbacks);
    session
        .connect(ConnectionConfig::password(
            format!("ws://{addr}/remote"),
            "localhost",
            "root",
            "pw",
        ))
        .unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        Some(SessionEvent::Error(ClientError::TransportOpen(_)))
    ));
}
