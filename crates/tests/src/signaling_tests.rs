use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::fixtures::TestApp;

async fn recv_json(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a server push")
        .expect("socket closed unexpectedly")
        .expect("websocket read error");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).expect("server push must be JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn send_event(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    event: &str,
    payload: Value,
    req_id: &str,
) {
    let envelope = json!({ "event": event, "payload": payload, "reqId": req_id });
    ws.send(Message::Text(envelope.to_string().into()))
        .await
        .expect("send should succeed");
}

/// E1: a meeting with a lobby holds a non-host joiner until the host admits
/// them, then pushes `meeting-joined` to the joiner and `participant-joined`
/// to the host.
#[tokio::test]
async fn lobby_admit_flow_notifies_both_sides() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", true).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;

    let (mut host_ws, _) = connect_async(app.ws_url_for(&meeting.host.token))
        .await
        .expect("host should connect");
    send_event(&mut host_ws, "join-meeting", json!({ "meetingCode": meeting.code }), "host-join").await;
    let host_joined = recv_json(&mut host_ws).await;
    assert_eq!(host_joined["event"], "meeting-joined");
    let _host_join_ack = recv_json(&mut host_ws).await;

    let (mut bob_ws, _) = connect_async(app.ws_url_for(&bob.token))
        .await
        .expect("bob should connect");
    send_event(&mut bob_ws, "join-meeting", json!({ "meetingCode": meeting.code }), "bob-join").await;

    let bob_waiting = recv_json(&mut bob_ws).await;
    assert_eq!(bob_waiting["event"], "lobby-waiting");
    let _bob_join_ack = recv_json(&mut bob_ws).await;

    let host_notice = recv_json(&mut host_ws).await;
    assert_eq!(host_notice["event"], "lobby-participant");
    let bob_participant_id = host_notice["payload"]["participantId"]
        .as_str()
        .expect("lobby-participant must carry participantId")
        .to_string();

    send_event(
        &mut host_ws,
        "lobby-admit",
        json!({ "participantId": bob_participant_id }),
        "admit-1",
    )
    .await;

    let bob_joined = recv_json(&mut bob_ws).await;
    assert_eq!(bob_joined["event"], "meeting-joined");

    let bob_admitted = recv_json(&mut bob_ws).await;
    assert_eq!(bob_admitted["event"], "admitted");

    let host_participant_joined = recv_json(&mut host_ws).await;
    assert_eq!(host_participant_joined["event"], "participant-joined");
}

/// E6: a burst of `produce` calls past the media category limit (30/s) is
/// silently dropped — fewer than the burst size arrive as acks, and the
/// connection stays open.
#[tokio::test]
async fn rate_limited_bursts_are_silently_dropped() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;

    let (mut host_ws, _) = connect_async(app.ws_url_for(&meeting.host.token))
        .await
        .expect("host should connect");
    send_event(&mut host_ws, "join-meeting", json!({ "meetingCode": meeting.code }), "host-join").await;
    let _ack = recv_json(&mut host_ws).await;
    let _joined = recv_json(&mut host_ws).await;

    for i in 0..40 {
        send_event(
            &mut host_ws,
            "produce",
            json!({ "transportId": "does-not-exist", "kind": "audio" }),
            &format!("produce-{i}"),
        )
        .await;
    }

    let mut acks = 0;
    loop {
        let next = tokio::time::timeout(Duration::from_millis(500), host_ws.next()).await;
        match next {
            Ok(Some(Ok(Message::Text(_)))) => acks += 1,
            _ => break,
        }
    }

    assert!(acks <= 30, "expected at most 30 acks for 40 produce calls, got {acks}");
}
