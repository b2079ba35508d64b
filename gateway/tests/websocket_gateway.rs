//! WebSocket Gateway Tests
//!
//! Runs the gateway on a local port and talks to it as a real client would,
//! with the model side played in-process.

mod mock_model;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{Router, middleware};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use mock_model::{STEP_TIMEOUT, TestGateway, test_config};
use voicekb_gateway::middleware::connection_limit_middleware;
use voicekb_gateway::{AudioFrame, ContentEvent, Role, routes};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(gateway: &TestGateway) -> SocketAddr {
    let state = gateway.state.clone();
    let session_routes = routes::session::create_session_router().layer(
        middleware::from_fn_with_state(state.clone(), connection_limit_middleware),
    );
    let app: Router = routes::api::create_api_router()
        .merge(session_routes)
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/session")).await.unwrap();
    ws
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next JSON text frame from the gateway.
async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(STEP_TIMEOUT, ws.next())
            .await
            .expect("gateway sent nothing in time")
            .expect("connection ended")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// Read until the gateway closes the connection.
async fn expect_closed(ws: &mut Client) {
    loop {
        match timeout(STEP_TIMEOUT, ws.next())
            .await
            .expect("connection stayed open")
        {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(Message::Text(text))) => panic!("unexpected message after close: {text}"),
            Some(Ok(_)) => continue,
        }
    }
}

async fn wait_until_idle(gateway: &TestGateway) {
    let drained = timeout(STEP_TIMEOUT, async {
        while !gateway.state.registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "sessions were not cleaned up");
}

#[tokio::test]
async fn test_conversation_over_websocket() {
    let dir = TempDir::new().unwrap();
    let mut gateway = TestGateway::start(test_config(dir.path())).await;
    let addr = serve(&gateway).await;

    let mut ws = connect(addr).await;
    let created = next_json(&mut ws).await;
    assert_eq!(created["type"], "sessionCreated");

    let mut model = gateway.next_model().await;
    assert_eq!(created["sessionId"], model.session_id());
    model.expect("sessionStart").await;

    send_json(&mut ws, json!({ "type": "promptStart", "knowledgeSource": "bedrock" })).await;
    model.expect("promptStart").await;

    send_json(&mut ws, json!({ "type": "systemPrompt" })).await;
    model
        .expect_sequence(&["contentStart", "textInput", "contentEnd"])
        .await;

    send_json(&mut ws, json!({ "type": "audioStart" })).await;
    model.expect("contentStart").await;

    let chunk = base64::engine::general_purpose::STANDARD.encode([0u8; 320]);
    send_json(&mut ws, json!({ "type": "audioInput", "data": chunk })).await;
    ws.send(Message::binary(vec![0u8; 640])).await.unwrap();

    let mut sample_counts = Vec::new();
    for _ in 0..2 {
        if let voicekb_gateway::core::upstream::ClientEvent::AudioInput { content, .. } =
            model.expect("audioInput").await
        {
            sample_counts.push(content.sample_count());
        }
    }
    assert_eq!(sample_counts, vec![160, 320]);

    model
        .send(ContentEvent::TextOutput {
            content_id: "reply-1".into(),
            role: Role::Assistant,
            content: "Hi, how can I help?".into(),
        })
        .await;
    let text = next_json(&mut ws).await;
    assert_eq!(text["type"], "textOutput");
    assert_eq!(text["contentId"], "reply-1");
    assert_eq!(text["role"], "ASSISTANT");
    assert_eq!(text["content"], "Hi, how can I help?");

    let speech = AudioFrame::output(vec![1u8; 96]).unwrap();
    model
        .send(ContentEvent::AudioOutput {
            content_id: "reply-1".into(),
            content: speech.clone(),
        })
        .await;
    let audio = next_json(&mut ws).await;
    assert_eq!(audio["type"], "audioOutput");
    assert_eq!(audio["content"], speech.to_base64());

    send_json(&mut ws, json!({ "type": "stopAudio" })).await;
    assert_eq!(
        model.confirm_close().await,
        vec!["contentEnd", "promptEnd", "sessionEnd"]
    );

    let complete = next_json(&mut ws).await;
    assert_eq!(complete["type"], "streamComplete");
    expect_closed(&mut ws).await;

    wait_until_idle(&gateway).await;
    assert_eq!(gateway.state.registry.streams_in_use(), 0);
}

#[tokio::test]
async fn test_protocol_errors_keep_connection_open() {
    let dir = TempDir::new().unwrap();
    let mut gateway = TestGateway::start(test_config(dir.path())).await;
    let addr = serve(&gateway).await;

    let mut ws = connect(addr).await;
    assert_eq!(next_json(&mut ws).await["type"], "sessionCreated");
    let mut model = gateway.next_model().await;

    ws.send(Message::text("{not json")).await.unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["details"], "parse_error");

    send_json(&mut ws, json!({ "type": "audioStart" })).await;
    let error = next_json(&mut ws).await;
    assert_eq!(error["details"], "invalid_transition");

    send_json(&mut ws, json!({ "type": "setKnowledgeSource", "source": "dropbox" })).await;
    let error = next_json(&mut ws).await;
    assert_eq!(error["details"], "invalid_knowledge_source");

    send_json(&mut ws, json!({ "type": "setKnowledgeSource", "source": "SharePoint" })).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack, json!({ "type": "knowledgeSourceSet", "source": "sharepoint" }));

    // a prompt started without a source keeps the one chosen above
    send_json(&mut ws, json!({ "type": "promptStart" })).await;
    model.expect_sequence(&["sessionStart", "promptStart"]).await;
    let session = gateway.state.registry.get(model.session_id()).unwrap();
    assert_eq!(
        session.knowledge_source(),
        voicekb_gateway::KnowledgeSource::Sharepoint
    );
    drop(session);

    // closing the socket closes the session
    let model_task = tokio::spawn(async move { model.confirm_close().await });
    ws.close(None).await.unwrap();
    assert_eq!(
        model_task.await.unwrap(),
        vec!["promptEnd", "sessionEnd"]
    );
    wait_until_idle(&gateway).await;
}

#[tokio::test]
async fn test_upgrade_rejected_when_streams_exhausted() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.max_concurrent_streams = 1;
    let mut gateway = TestGateway::start(config).await;
    let addr = serve(&gateway).await;

    let mut first = connect(addr).await;
    assert_eq!(next_json(&mut first).await["type"], "sessionCreated");
    let _model = gateway.next_model().await;

    match connect_async(format!("ws://{addr}/session")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503);
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("second session should have been rejected"),
    }
    assert_eq!(gateway.state.registry.len(), 1);
}

#[tokio::test]
async fn test_model_loss_ends_connection() {
    let dir = TempDir::new().unwrap();
    let mut gateway = TestGateway::start(test_config(dir.path())).await;
    let addr = serve(&gateway).await;

    let mut ws = connect(addr).await;
    assert_eq!(next_json(&mut ws).await["type"], "sessionCreated");
    let mut model = gateway.next_model().await;
    model.expect("sessionStart").await;

    model.hang_up();

    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["details"], "upstream_channel_failure");
    assert_eq!(next_json(&mut ws).await["type"], "streamComplete");
    expect_closed(&mut ws).await;

    wait_until_idle(&gateway).await;
}

#[tokio::test]
async fn test_unreachable_model_reported_before_close() {
    let dir = TempDir::new().unwrap();
    let gateway = TestGateway::start(test_config(dir.path())).await;
    gateway.connector.refuse_connections(true);
    let addr = serve(&gateway).await;

    let mut ws = connect(addr).await;
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["details"], "upstream_channel_failure");
    expect_closed(&mut ws).await;
    assert!(gateway.state.registry.is_empty());
}
