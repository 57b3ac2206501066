use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::fixtures::TestApp;

type Ws = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn recv_json(ws: &mut Ws) -> Value {
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

async fn send_event(ws: &mut Ws, event: &str, payload: Value, req_id: &str) {
    let envelope = json!({ "event": event, "payload": payload, "reqId": req_id });
    ws.send(Message::Text(envelope.to_string().into())).await.unwrap();
}

async fn join(app: &TestApp, token: &str, code: &str, req_id: &str) -> (Ws, Value) {
    let (mut ws, _) = connect_async(app.ws_url_for(token)).await.expect("should connect");
    send_event(&mut ws, "join-meeting", json!({ "meetingCode": code }), req_id).await;
    let joined = recv_json(&mut ws).await;
    assert_eq!(joined["event"], "meeting-joined");
    let _ack = recv_json(&mut ws).await;
    (ws, joined)
}

/// E4: host moves two peers into a breakout room; the third peer stays in
/// the main meeting scope and does not receive the breakout-scoped pushes.
/// `close-breakouts` restores everyone to the main meeting scope.
#[tokio::test]
async fn create_and_close_breakouts_round_trips_membership() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;
    let carol = app.seed_user("carol@test.local", "Carol").await;

    let (mut host_ws, _) = join(&app, &meeting.host.token, &meeting.code, "host-join").await;
    let (mut bob_ws, bob_joined) = join(&app, &bob.token, &meeting.code, "bob-join").await;
    let (mut carol_ws, carol_joined) = join(&app, &carol.token, &meeting.code, "carol-join").await;

    // "participant-joined" pushes land on the host for bob and then carol.
    let _host_sees_bob = recv_json(&mut host_ws).await;
    let _host_sees_carol = recv_json(&mut host_ws).await;
    let _bob_sees_carol = recv_json(&mut bob_ws).await;

    let bob_id = bob_joined["payload"]["participants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["userId"] == bob.id.to_hex())
        .expect("bob should be listed")["id"]
        .as_str()
        .unwrap()
        .to_string();
    let carol_id = carol_joined["payload"]["participants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["userId"] == carol.id.to_hex())
        .expect("carol should be listed")["id"]
        .as_str()
        .unwrap()
        .to_string();

    send_event(
        &mut host_ws,
        "create-breakout",
        json!({
            "rooms": [{ "name": "R1", "participantIds": [bob_id, carol_id] }],
            "duration": 1,
        }),
        "create-1",
    )
    .await;

    let bob_breakout_joined = recv_json(&mut bob_ws).await;
    assert_eq!(bob_breakout_joined["event"], "breakout-joined");
    assert_eq!(bob_breakout_joined["payload"]["breakoutRoom"]["name"], "R1");

    let carol_breakout_joined = recv_json(&mut carol_ws).await;
    assert_eq!(carol_breakout_joined["event"], "breakout-joined");

    // Host, still in the main meeting scope, sees the creation notice; bob
    // and carol were already reseated by the time it was broadcast.
    let host_created_notice = recv_json(&mut host_ws).await;
    assert_eq!(host_created_notice["event"], "breakout-created");
    let host_ack = recv_json(&mut host_ws).await;
    assert_eq!(host_ack["event"], "ack");

    send_event(&mut host_ws, "close-breakouts", json!({}), "close-1").await;

    let bob_ended = recv_json(&mut bob_ws).await;
    assert_eq!(bob_ended["event"], "breakout-ended");
    let carol_ended = recv_json(&mut carol_ws).await;
    assert_eq!(carol_ended["event"], "breakout-ended");

    // All three are meeting members again, so all three see "breakout-closed".
    let host_closed = recv_json(&mut host_ws).await;
    assert_eq!(host_closed["event"], "breakout-closed");
    let bob_closed = recv_json(&mut bob_ws).await;
    assert_eq!(bob_closed["event"], "breakout-closed");
    let carol_closed = recv_json(&mut carol_ws).await;
    assert_eq!(carol_closed["event"], "breakout-closed");
}

#[tokio::test]
async fn create_breakout_rejects_empty_room_list() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let (mut host_ws, _) = join(&app, &meeting.host.token, &meeting.code, "host-join").await;

    send_event(&mut host_ws, "create-breakout", json!({ "rooms": [] }), "create-1").await;
    let ack = recv_json(&mut host_ws).await;
    assert_eq!(ack["event"], "ack");
    assert_eq!(ack["payload"]["ok"], false);
}

#[tokio::test]
async fn create_breakout_rejects_a_participant_listed_twice() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;
    let (mut host_ws, _) = join(&app, &meeting.host.token, &meeting.code, "host-join").await;
    let (mut bob_ws, bob_joined) = join(&app, &bob.token, &meeting.code, "bob-join").await;
    let _host_sees_bob = recv_json(&mut host_ws).await;
    let _ = &mut bob_ws; // keep bob connected for the duration of the test

    let bob_id = bob_joined["payload"]["participants"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["userId"] == bob.id.to_hex())
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    send_event(
        &mut host_ws,
        "create-breakout",
        json!({
            "rooms": [
                { "name": "R1", "participantIds": [bob_id.clone()] },
                { "name": "R2", "participantIds": [bob_id] },
            ],
        }),
        "create-1",
    )
    .await;

    let ack = recv_json(&mut host_ws).await;
    assert_eq!(ack["event"], "ack");
    assert_eq!(ack["payload"]["ok"], false);
}
