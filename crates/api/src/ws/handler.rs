//! The 8-step dispatch pipeline described for the signaling channel: rate
//! check, binding check, resource resolution, authorization, validation,
//! action, response. One inbound `{event, payload, reqId}` envelope produces
//! at most one ack plus whatever broadcasts the action requires.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use bson::oid::ObjectId;
use futures::{SinkExt, StreamExt};
use mediasoup::prelude::*;
use meetsfu_db::models::{
    chat_message::ChatMessage,
    meeting::{Meeting, MeetingStatus},
    participant::{Participant, ParticipantRole, ParticipantStatus},
    question::Question,
};
use meetsfu_services::breakout::{BreakoutConfig, CreateBreakoutsRequest};
use meetsfu_services::media::{AppType, Direction, Peer, PeerIdentity, Room};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

use super::dispatcher;
use super::signaling::{ack_error, ack_success, ClientEnvelope, ServerPush, SignalingError};
use super::storage::{Binding, Scope, WsSender};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match state.auth.verify(&params.token) {
        Ok(c) => c,
        Err(_) => {
            return Response::builder()
                .status(401)
                .body("unauthorized".into())
                .unwrap();
        }
    };

    let user_id = match ObjectId::parse_str(&claims.user_id) {
        Ok(id) => id,
        Err(_) => {
            return Response::builder()
                .status(400)
                .body("invalid user id".into())
                .unwrap();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, claims.name))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: ObjectId, display_name: String) {
    let conn_id = Uuid::new_v4();
    let (split_sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(split_sender));
    state.ws_storage.add(conn_id, sender);

    info!(%conn_id, %user_id, "signaling connection established");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let envelope: ClientEnvelope = match serde_json::from_str(&text) {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                dispatch(&state, conn_id, user_id, &display_name, envelope).await;
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                warn!(%conn_id, %err, "signaling socket error");
                break;
            }
            _ => {}
        }
    }

    cleanup_connection(&state, conn_id).await;
    info!(%conn_id, %user_id, "signaling connection closed");
}

async fn cleanup_connection(state: &AppState, conn_id: Uuid) {
    state.rate_limiter.clear_connection(conn_id);

    let Some(conn) = state.ws_storage.remove(conn_id) else {
        return;
    };
    let Some(binding) = conn.binding.read().clone() else {
        return;
    };

    // Disconnect cleanup is best-effort: durable failures here are logged,
    // never surfaced, and never block releasing the in-memory Room state.
    if let Err(err) = state.participants.mark_left(binding.participant_id).await {
        warn!(?err, "failed to mark participant left on disconnect");
    }

    if let Some(room) = state.rooms.get(&binding.meeting_code) {
        room.remove_peer(conn_id);
    }

    let notice = json!({ "participantId": binding.participant_id.to_hex() });
    let text = ServerPush::new("participant-left", notice).to_message();
    dispatcher::broadcast(&state.ws_storage, &scope_members(&state.ws_storage, &binding), &text, None).await;
}

async fn dispatch(state: &AppState, conn_id: Uuid, user_id: ObjectId, display_name: &str, env: ClientEnvelope) {
    let category = meetsfu_services::rate_limit::classify(&env.event);
    if !state.rate_limiter.check(conn_id, category) {
        return;
    }

    let result = route(state, conn_id, user_id, display_name, &env).await;

    if let Some(req_id) = env.req_id {
        let text = match result {
            Ok(data) => ack_success(&req_id, data),
            Err(err) => ack_error(&req_id, &err),
        };
        dispatcher::send_to(&state.ws_storage, conn_id, text).await;
    }
}

async fn route(
    state: &AppState,
    conn_id: Uuid,
    user_id: ObjectId,
    display_name: &str,
    env: &ClientEnvelope,
) -> Result<Value, SignalingError> {
    if env.event == "join-meeting" {
        return handle_join_meeting(state, conn_id, user_id, display_name, &env.payload).await;
    }

    let conn = state
        .ws_storage
        .get(conn_id)
        .ok_or_else(|| SignalingError::Internal("connection missing from registry".into()))?;
    let binding = conn.binding.read().clone().ok_or(SignalingError::NotBound)?;

    match env.event.as_str() {
        "create-transport" => handle_create_transport(state, conn_id, &binding, &env.payload).await,
        "connect-transport" => handle_connect_transport(state, conn_id, &binding, &env.payload).await,
        "produce" => handle_produce(state, conn_id, &binding, &env.payload).await,
        "consume" => handle_consume(state, conn_id, &binding, &env.payload).await,
        "resume-consumer" => handle_resume_consumer(state, conn_id, &binding, &env.payload).await,
        "set-preferred-layers" => handle_set_preferred_layers(state, conn_id, &binding, &env.payload).await,
        "pause-producer" => handle_producer_toggle(state, conn_id, &binding, &env.payload, ProducerToggle::Pause).await,
        "resume-producer" => {
            handle_producer_toggle(state, conn_id, &binding, &env.payload, ProducerToggle::Resume).await
        }
        "close-producer" => handle_close_producer(state, conn_id, &binding, &env.payload).await,
        "lobby-admit" => handle_lobby_admit(state, &binding, &env.payload).await,
        "lobby-reject" => handle_lobby_reject(state, &binding, &env.payload).await,
        "move-to-lobby" => handle_move_to_lobby(state, &binding, &env.payload).await,
        "kick-participant" => handle_kick_participant(state, &binding, &env.payload).await,
        "transfer-host" => handle_transfer_host(state, conn_id, &binding, &env.payload).await,
        "end-meeting" => handle_end_meeting(state, &binding).await,
        "invite-participant" => handle_invite_participant(state, &binding, &env.payload).await,
        "send-chat" => handle_send_chat(state, &binding, &env.payload).await,
        "get-chat-history" => handle_get_chat_history(state, &binding).await,
        "ask-question" => handle_ask_question(state, &binding, &env.payload).await,
        "upvote-question" => handle_upvote_question(state, &binding, &env.payload).await,
        "mark-answered" => handle_mark_answered(state, &binding, &env.payload).await,
        "pin-question" => handle_pin_question(state, &binding, &env.payload).await,
        "create-breakout" => handle_create_breakout(state, &binding, &env.payload).await,
        "close-breakouts" => handle_close_breakouts(state, &binding).await,
        "broadcast-to-breakouts" => handle_broadcast_to_breakouts(state, &binding, &env.payload).await,
        other => Err(SignalingError::InvalidArgument(format!("unknown event: {other}"))),
    }
}

fn scope_members(storage: &super::storage::WsStorage, binding: &Binding) -> Vec<Uuid> {
    match &binding.scope {
        Scope::Lobby => storage.lobby_members(&binding.meeting_code),
        Scope::Meeting => storage.meeting_members(&binding.meeting_code),
        Scope::Breakout(id) => storage.breakout_members(&binding.meeting_code, *id),
    }
}

fn require_host(binding: &Binding) -> Result<(), SignalingError> {
    if binding.role != ParticipantRole::Host {
        return Err(SignalingError::PermissionDenied("host role required".into()));
    }
    Ok(())
}

fn require_cohost(binding: &Binding) -> Result<(), SignalingError> {
    match binding.role {
        ParticipantRole::Host | ParticipantRole::CoHost => Ok(()),
        ParticipantRole::Participant => Err(SignalingError::PermissionDenied("host or co-host role required".into())),
    }
}

/// Mirrors a produce/pause/resume/close transition onto the durable presence
/// flags so a late-joining client's `meeting-joined` snapshot reflects who is
/// currently on camera/mic/sharing.
async fn set_presence_flag(
    state: &AppState,
    participant_id: ObjectId,
    app_type: AppType,
    producing: bool,
) -> Result<(), SignalingError> {
    let update = match app_type {
        AppType::Audio => bson::doc! { "$set": { "is_muted": !producing } },
        AppType::Video => bson::doc! { "$set": { "is_video_on": producing } },
        AppType::Screen => bson::doc! { "$set": { "is_screen_sharing": producing } },
    };
    state.participants.base.update_by_id(participant_id, update).await?;
    Ok(())
}

fn field<'a>(payload: &'a Value, key: &str) -> Result<&'a Value, SignalingError> {
    payload
        .get(key)
        .ok_or_else(|| SignalingError::InvalidArgument(format!("missing field: {key}")))
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Result<&'a str, SignalingError> {
    field(payload, key)?
        .as_str()
        .ok_or_else(|| SignalingError::InvalidArgument(format!("{key} must be a string")))
}

fn oid_field(payload: &Value, key: &str) -> Result<ObjectId, SignalingError> {
    let raw = str_field(payload, key)?;
    ObjectId::parse_str(raw).map_err(|_| SignalingError::InvalidArgument(format!("{key} is not a valid id")))
}

fn meeting_json(meeting: &Meeting) -> Value {
    json!({
        "id": meeting.id.map(|id| id.to_hex()),
        "code": meeting.code,
        "title": meeting.title,
        "hostUserId": meeting.host_user_id.to_hex(),
        "lobbyEnabled": meeting.lobby_enabled,
        "status": meeting.status,
    })
}

fn participant_json(p: &Participant) -> Value {
    json!({
        "id": p.id.map(|id| id.to_hex()),
        "userId": p.user_id.to_hex(),
        "displayName": p.display_name,
        "role": p.role,
        "status": p.status,
        "isMuted": p.is_muted,
        "isVideoOn": p.is_video_on,
        "isScreenSharing": p.is_screen_sharing,
        "isHandRaised": p.is_hand_raised,
    })
}

fn question_json(q: &Question) -> Value {
    json!({
        "id": q.id.map(|id| id.to_hex()),
        "authorId": q.author_id.to_hex(),
        "content": q.content,
        "answered": q.answered,
        "pinned": q.pinned,
        "upvoteCount": q.upvote_count,
        "createdAt": q.created_at,
    })
}

fn chat_message_json(m: &ChatMessage) -> Value {
    json!({
        "id": m.id.map(|id| id.to_hex()),
        "authorId": m.author_id.to_hex(),
        "content": m.content,
        "createdAt": m.created_at,
    })
}

/// Shared by the direct-join path (lobby disabled or self = host) and the
/// host-admit path: registers the Peer, gathers what the new entrant needs
/// to renegotiate, and pushes `meeting-joined` to them.
async fn enter_meeting_and_push(
    state: &AppState,
    room: &Arc<Room>,
    conn_id: Uuid,
    meeting: &Meeting,
    participant: &Participant,
) -> Result<(), SignalingError> {
    let participant_id = participant
        .id
        .ok_or_else(|| SignalingError::Internal("participant has no id".into()))?;
    let meeting_id = meeting
        .id
        .ok_or_else(|| SignalingError::Internal("meeting has no id".into()))?;

    let identity = PeerIdentity {
        conn_id,
        user_id: participant.user_id,
        participant_id,
        display_name: participant.display_name.clone(),
    };
    room.add_peer(Arc::new(Peer::new(identity)));

    let existing_producers: Vec<Value> = room
        .main_producers_excluding(conn_id)
        .into_iter()
        .map(|(identity, producer_id, app_type)| {
            json!({
                "producerId": producer_id.to_string(),
                "participantId": identity.participant_id.to_hex(),
                "userId": identity.user_id.to_hex(),
                "appType": app_type,
            })
        })
        .collect();

    let participants = state.participants.list_active_for_meeting(meeting_id).await?;
    let payload = json!({
        "meeting": meeting_json(meeting),
        "participants": participants.iter().map(participant_json).collect::<Vec<_>>(),
        "routerCapabilities": room.main_router.rtp_capabilities(),
        "existingProducers": existing_producers,
    });

    let text = ServerPush::new("meeting-joined", payload).to_message();
    dispatcher::send_to(&state.ws_storage, conn_id, text).await;
    Ok(())
}

async fn handle_join_meeting(
    state: &AppState,
    conn_id: Uuid,
    user_id: ObjectId,
    display_name: &str,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let code = str_field(payload, "meetingCode")?;
    let meeting = state.meetings.find_by_code(code).await?;
    let meeting_id = meeting
        .id
        .ok_or_else(|| SignalingError::Internal("meeting has no id".into()))?;

    let existing = state.participants.find_by_meeting_and_user(meeting_id, user_id).await?;
    let is_host = meeting.host_user_id == user_id;
    let status = state.admission.join_status(&meeting, existing.as_ref(), is_host).await;

    if status == ParticipantStatus::Removed {
        return Err(SignalingError::PermissionDenied("removed from this meeting".into()));
    }

    let participant = match existing {
        Some(p) => {
            let id = p.id.ok_or_else(|| SignalingError::Internal("participant has no id".into()))?;
            state.participants.mark_rejoined(id, status).await?;
            state.participants.base.find_by_id(id).await?
        }
        None => {
            let role = if is_host { ParticipantRole::Host } else { ParticipantRole::Participant };
            state
                .participants
                .create(meeting_id, user_id, display_name.to_string(), role, status)
                .await?
        }
    };
    let participant_id = participant
        .id
        .ok_or_else(|| SignalingError::Internal("participant has no id".into()))?;

    if meeting.status == MeetingStatus::Scheduled {
        let _ = state.meetings.mark_live(meeting_id).await;
    }

    let room = state.rooms.get_or_create(meeting_id, &meeting.code).await?;

    let scope = if status == ParticipantStatus::InLobby { Scope::Lobby } else { Scope::Meeting };
    state.ws_storage.set_binding(
        conn_id,
        Binding {
            meeting_id,
            meeting_code: meeting.code.clone(),
            participant_id,
            user_id,
            role: participant.role,
            scope: scope.clone(),
        },
    );

    if status == ParticipantStatus::InLobby {
        let waiting = json!({ "meetingTitle": meeting.title });
        let text = ServerPush::new("lobby-waiting", waiting).to_message();
        dispatcher::send_to(&state.ws_storage, conn_id, text).await;

        let notice = json!({
            "participantId": participant_id.to_hex(),
            "userId": user_id.to_hex(),
            "name": display_name,
        });
        let text = ServerPush::new("lobby-participant", notice).to_message();
        dispatcher::broadcast(&state.ws_storage, &state.ws_storage.meeting_members(&meeting.code), &text, None).await;

        return Ok(json!({}));
    }

    enter_meeting_and_push(state, &room, conn_id, &meeting, &participant).await?;

    let notice = json!({
        "participantId": participant_id.to_hex(),
        "userId": user_id.to_hex(),
        "name": display_name,
    });
    let text = ServerPush::new("participant-joined", notice).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&meeting.code),
        &text,
        Some(conn_id),
    )
    .await;

    Ok(json!({}))
}

async fn handle_create_transport(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let direction = match str_field(payload, "direction")? {
        "send" => Direction::Send,
        "recv" => Direction::Recv,
        other => return Err(SignalingError::InvalidArgument(format!("unknown direction: {other}"))),
    };
    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;

    let params = room.create_transport(direction, &peer, &state.settings.mediasoup).await?;
    Ok(serde_json::to_value(params).unwrap_or_default())
}

async fn handle_connect_transport(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let transport_id = str_field(payload, "transportId")?;
    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;

    let dtls_parameters: DtlsParameters = serde_json::from_value(field(payload, "dtlsParameters")?.clone())
        .map_err(|e| SignalingError::InvalidArgument(format!("invalid dtlsParameters: {e}")))?;

    if let Some(transport) = peer.send_transport() {
        if transport.id().to_string() == transport_id {
            if !peer.is_send_connected() {
                transport
                    .connect(WebRtcTransportRemoteParameters { dtls_parameters })
                    .await
                    .map_err(|e| SignalingError::UpstreamUnavailable(e.to_string()))?;
                peer.mark_send_connected();
            }
            return Ok(json!({ "connected": true }));
        }
    }
    if let Some(transport) = peer.recv_transport() {
        if transport.id().to_string() == transport_id {
            if !peer.is_recv_connected() {
                transport
                    .connect(WebRtcTransportRemoteParameters { dtls_parameters })
                    .await
                    .map_err(|e| SignalingError::UpstreamUnavailable(e.to_string()))?;
                peer.mark_recv_connected();
            }
            return Ok(json!({ "connected": true }));
        }
    }
    Err(SignalingError::NotFound("transport".into()))
}

async fn handle_produce(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let kind: MediaKind = serde_json::from_value(field(payload, "kind")?.clone())
        .map_err(|e| SignalingError::InvalidArgument(format!("invalid kind: {e}")))?;
    let rtp_parameters: RtpParameters = serde_json::from_value(field(payload, "rtpParameters")?.clone())
        .map_err(|e| SignalingError::InvalidArgument(format!("invalid rtpParameters: {e}")))?;
    let app_type_str = payload
        .get("appData")
        .and_then(|d| d.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| SignalingError::InvalidArgument("missing appData.type".into()))?;
    let app_type = AppType::from_str(app_type_str)
        .ok_or_else(|| SignalingError::InvalidArgument(format!("unknown appData.type: {app_type_str}")))?;

    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;

    let producer = room.create_producer(&peer, kind, rtp_parameters, app_type).await?;
    let producer_id = producer.id();
    set_presence_flag(state, binding.participant_id, app_type, true).await?;

    let notice = json!({
        "producerId": producer_id.to_string(),
        "participantId": binding.participant_id.to_hex(),
        "userId": binding.user_id.to_hex(),
        "kind": kind,
        "appData": { "type": app_type },
    });
    let text = ServerPush::new("new-producer", notice).to_message();
    dispatcher::broadcast(&state.ws_storage, &scope_members(&state.ws_storage, binding), &text, Some(conn_id)).await;

    Ok(json!({ "producerId": producer_id.to_string() }))
}

async fn handle_consume(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let producer_id: ProducerId = str_field(payload, "producerId")?
        .parse()
        .map_err(|_| SignalingError::InvalidArgument("invalid producerId".into()))?;
    let rtp_capabilities: RtpCapabilities = serde_json::from_value(field(payload, "rtpCapabilities")?.clone())
        .map_err(|e| SignalingError::InvalidArgument(format!("invalid rtpCapabilities: {e}")))?;

    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;

    let app_type = room.producer_app_type(conn_id, producer_id);
    let consumer = room
        .create_consumer(&peer, producer_id, &rtp_capabilities)
        .await?
        .ok_or(SignalingError::CodecIncompatible)?;

    Ok(json!({
        "id": consumer.id().to_string(),
        "producerId": producer_id.to_string(),
        "kind": consumer.kind(),
        "rtpParameters": consumer.rtp_parameters(),
        "appData": { "type": app_type },
    }))
}

async fn handle_resume_consumer(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let consumer_id: ConsumerId = str_field(payload, "consumerId")?
        .parse()
        .map_err(|_| SignalingError::InvalidArgument("invalid consumerId".into()))?;
    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;
    let consumer = peer.get_consumer(&consumer_id).ok_or_else(|| SignalingError::NotFound("consumer".into()))?;

    consumer
        .resume()
        .await
        .map_err(|e| SignalingError::UpstreamUnavailable(e.to_string()))?;
    Ok(json!({ "resumed": true }))
}

async fn handle_set_preferred_layers(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let consumer_id: ConsumerId = str_field(payload, "consumerId")?
        .parse()
        .map_err(|_| SignalingError::InvalidArgument("invalid consumerId".into()))?;
    let spatial_layer = field(payload, "spatialLayer")?
        .as_u64()
        .ok_or_else(|| SignalingError::InvalidArgument("spatialLayer must be an integer".into()))? as u8;
    let temporal_layer = payload.get("temporalLayer").and_then(Value::as_u64).map(|v| v as u8);

    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;
    let consumer = peer.get_consumer(&consumer_id).ok_or_else(|| SignalingError::NotFound("consumer".into()))?;

    consumer
        .set_preferred_layers(ConsumerLayers { spatial_layer, temporal_layer })
        .await
        .map_err(|e| SignalingError::UpstreamUnavailable(e.to_string()))?;
    Ok(json!({ "success": true }))
}

#[derive(Clone, Copy)]
enum ProducerToggle {
    Pause,
    Resume,
}

async fn handle_producer_toggle(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
    action: ProducerToggle,
) -> Result<Value, SignalingError> {
    let producer_id: ProducerId = str_field(payload, "producerId")?
        .parse()
        .map_err(|_| SignalingError::InvalidArgument("invalid producerId".into()))?;
    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;
    let producer = peer.get_producer(&producer_id).ok_or_else(|| SignalingError::NotFound("producer".into()))?;
    let app_type = room.producer_app_type(conn_id, producer_id);

    let event = match action {
        ProducerToggle::Pause => {
            producer.pause().await.map_err(|e| SignalingError::UpstreamUnavailable(e.to_string()))?;
            "producer-paused"
        }
        ProducerToggle::Resume => {
            producer.resume().await.map_err(|e| SignalingError::UpstreamUnavailable(e.to_string()))?;
            "producer-resumed"
        }
    };
    if let Some(app_type) = app_type {
        let producing = matches!(action, ProducerToggle::Resume);
        set_presence_flag(state, binding.participant_id, app_type, producing).await?;
    }

    let notice = json!({ "producerId": producer_id.to_string() });
    let text = ServerPush::new(event, notice).to_message();
    dispatcher::broadcast(&state.ws_storage, &scope_members(&state.ws_storage, binding), &text, Some(conn_id)).await;
    Ok(json!({}))
}

async fn handle_close_producer(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    let producer_id: ProducerId = str_field(payload, "producerId")?
        .parse()
        .map_err(|_| SignalingError::InvalidArgument("invalid producerId".into()))?;
    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let peer = room.get_peer(conn_id).ok_or_else(|| SignalingError::NotFound("peer".into()))?;

    // Removed from the Peer's producer set before the broadcast fires, so a
    // racing consume on another peer rechecks existence and loses the race.
    let entry = peer
        .remove_producer(&producer_id)
        .ok_or_else(|| SignalingError::NotFound("producer".into()))?;
    entry.producer.close();
    set_presence_flag(state, binding.participant_id, entry.app_type, false).await?;

    let notice = json!({ "producerId": producer_id.to_string() });
    let text = ServerPush::new("producer-closed", notice).to_message();
    dispatcher::broadcast(&state.ws_storage, &scope_members(&state.ws_storage, binding), &text, Some(conn_id)).await;
    Ok(json!({}))
}

async fn handle_lobby_admit(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let target_id = oid_field(payload, "participantId")?;

    let host_participant = state.participants.base.find_by_id(binding.participant_id).await?;
    let target = state.admission.admit(binding.meeting_id, &host_participant, target_id).await?;

    if let Some(target_conn) = state.ws_storage.find_conn_for_participant(&binding.meeting_code, target_id) {
        let meeting = state.meetings.find_by_code(&binding.meeting_code).await?;
        let room = state
            .rooms
            .get(&binding.meeting_code)
            .ok_or_else(|| SignalingError::NotFound("room".into()))?;

        state.ws_storage.set_scope(target_conn, Scope::Meeting);
        enter_meeting_and_push(state, &room, target_conn, &meeting, &target).await?;

        let text = ServerPush::new("admitted", json!({})).to_message();
        dispatcher::send_to(&state.ws_storage, target_conn, text).await;

        let notice = json!({
            "participantId": target_id.to_hex(),
            "userId": target.user_id.to_hex(),
            "name": target.display_name,
        });
        let text = ServerPush::new("participant-joined", notice).to_message();
        dispatcher::broadcast(
            &state.ws_storage,
            &state.ws_storage.meeting_members(&binding.meeting_code),
            &text,
            Some(target_conn),
        )
        .await;
    }

    Ok(json!({}))
}

async fn handle_lobby_reject(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let target_id = oid_field(payload, "participantId")?;

    let host_participant = state.participants.base.find_by_id(binding.participant_id).await?;
    state.admission.reject(binding.meeting_id, &host_participant, target_id).await?;

    if let Some(target_conn) = state.ws_storage.find_conn_for_participant(&binding.meeting_code, target_id) {
        let text = ServerPush::new("lobby-rejected", json!({})).to_message();
        dispatcher::send_to(&state.ws_storage, target_conn, text).await;
    }
    Ok(json!({}))
}

async fn handle_move_to_lobby(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let target_id = oid_field(payload, "participantId")?;

    let host_participant = state.participants.base.find_by_id(binding.participant_id).await?;
    let target = state.participants.base.find_by_id(target_id).await?;
    state.admission.move_to_lobby(&host_participant, &target).await?;

    if let Some(target_conn) = state.ws_storage.find_conn_for_participant(&binding.meeting_code, target_id) {
        if let Some(room) = state.rooms.get(&binding.meeting_code) {
            room.remove_peer(target_conn);
        }
        state.ws_storage.set_scope(target_conn, Scope::Lobby);

        let text = ServerPush::new("moved-to-lobby", json!({})).to_message();
        dispatcher::send_to(&state.ws_storage, target_conn, text).await;

        let notice = json!({ "participantId": target_id.to_hex() });
        let text = ServerPush::new("participant-left", notice).to_message();
        dispatcher::broadcast(
            &state.ws_storage,
            &state.ws_storage.meeting_members(&binding.meeting_code),
            &text,
            Some(target_conn),
        )
        .await;
    }
    Ok(json!({}))
}

async fn handle_kick_participant(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let target_id = oid_field(payload, "participantId")?;

    let host_participant = state.participants.base.find_by_id(binding.participant_id).await?;
    let target = state.participants.base.find_by_id(target_id).await?;
    state.admission.kick(&host_participant, &target).await?;

    if let Some(target_conn) = state.ws_storage.find_conn_for_participant(&binding.meeting_code, target_id) {
        if let Some(room) = state.rooms.get(&binding.meeting_code) {
            room.remove_peer(target_conn);
        }

        let text = ServerPush::new("kicked", json!({})).to_message();
        dispatcher::send_to(&state.ws_storage, target_conn, text).await;

        let notice = json!({ "participantId": target_id.to_hex() });
        let text = ServerPush::new("participant-left", notice).to_message();
        dispatcher::broadcast(
            &state.ws_storage,
            &state.ws_storage.meeting_members(&binding.meeting_code),
            &text,
            Some(target_conn),
        )
        .await;
    }
    Ok(json!({}))
}

async fn handle_transfer_host(
    state: &AppState,
    conn_id: Uuid,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    require_host(binding)?;
    let target_id = oid_field(payload, "newHostId")?;

    let meeting = state.meetings.find_by_code(&binding.meeting_code).await?;
    let current_host = state.participants.base.find_by_id(binding.participant_id).await?;
    let target = state.participants.base.find_by_id(target_id).await?;

    state.admission.transfer_host(&meeting, &current_host, &target).await?;

    state.ws_storage.set_role(conn_id, ParticipantRole::Participant);
    if let Some(target_conn) = state.ws_storage.find_conn_for_participant(&binding.meeting_code, target_id) {
        state.ws_storage.set_role(target_conn, ParticipantRole::Host);
    }

    let notice = json!({
        "newHostId": target_id.to_hex(),
        "oldHostId": binding.participant_id.to_hex(),
    });
    let text = ServerPush::new("host-changed", notice).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&binding.meeting_code),
        &text,
        None,
    )
    .await;
    Ok(json!({}))
}

async fn handle_end_meeting(state: &AppState, binding: &Binding) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let host_participant = state.participants.base.find_by_id(binding.participant_id).await?;
    state.admission.end_meeting(&host_participant, binding.meeting_id).await?;

    state.rooms.remove(&binding.meeting_code);

    let members = state.ws_storage.all_members(&binding.meeting_code);
    let text = ServerPush::new("meeting-ended", json!({})).to_message();
    dispatcher::broadcast(&state.ws_storage, &members, &text, None).await;
    Ok(json!({}))
}

async fn handle_invite_participant(
    state: &AppState,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let email = str_field(payload, "email")?;
    if email.is_empty() {
        return Err(SignalingError::InvalidArgument("email must not be empty".into()));
    }

    let meeting = state.meetings.find_by_code(&binding.meeting_code).await?;
    state.invitations.create(binding.meeting_id, binding.user_id, email.to_string()).await?;
    state
        .email
        .send_meeting_invite(email, &meeting.title, &meeting.code)
        .await
        .map_err(|e| SignalingError::UpstreamUnavailable(e.to_string()))?;
    Ok(json!({}))
}

async fn handle_send_chat(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    let content = str_field(payload, "content")?;
    if content.is_empty() || content.chars().count() > 2000 {
        return Err(SignalingError::InvalidArgument("content must be 1..2000 characters".into()));
    }

    let message = state
        .chat_messages
        .create(binding.meeting_id, binding.user_id, content.to_string())
        .await?;

    let text = ServerPush::new("new-chat", chat_message_json(&message)).to_message();
    dispatcher::broadcast(&state.ws_storage, &scope_members(&state.ws_storage, binding), &text, None).await;
    Ok(json!({}))
}

async fn handle_get_chat_history(state: &AppState, binding: &Binding) -> Result<Value, SignalingError> {
    let messages = state.chat_messages.recent_history(binding.meeting_id).await?;
    let messages: Vec<Value> = messages.iter().map(chat_message_json).collect();
    Ok(json!({ "messages": messages }))
}

async fn handle_ask_question(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    let content = str_field(payload, "content")?;
    if content.is_empty() || content.chars().count() > 1000 {
        return Err(SignalingError::InvalidArgument("content must be 1..1000 characters".into()));
    }

    let question = state.questions.create(binding.meeting_id, binding.user_id, content.to_string()).await?;

    let text = ServerPush::new("new-question", question_json(&question)).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&binding.meeting_code),
        &text,
        None,
    )
    .await;
    Ok(json!({}))
}

async fn handle_upvote_question(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    let question_id = oid_field(payload, "questionId")?;
    state.upvotes.toggle(&state.questions, question_id, binding.user_id).await?;
    let question = state.questions.base.find_by_id(question_id).await?;

    let notice = json!({ "questionId": question_id.to_hex(), "upvoteCount": question.upvote_count });
    let text = ServerPush::new("question-upvoted", notice).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&binding.meeting_code),
        &text,
        None,
    )
    .await;
    Ok(json!({}))
}

async fn handle_mark_answered(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let question_id = oid_field(payload, "questionId")?;
    let question = state.questions.toggle_answered(question_id).await?;

    let notice = json!({ "questionId": question_id.to_hex(), "answered": question.answered });
    let text = ServerPush::new("question-answered", notice).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&binding.meeting_code),
        &text,
        None,
    )
    .await;
    Ok(json!({}))
}

async fn handle_pin_question(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let question_id = oid_field(payload, "questionId")?;
    let question = state.questions.toggle_pinned(question_id).await?;

    let notice = json!({ "questionId": question_id.to_hex(), "pinned": question.pinned });
    let text = ServerPush::new("question-pinned", notice).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&binding.meeting_code),
        &text,
        None,
    )
    .await;
    Ok(json!({}))
}

async fn handle_create_breakout(state: &AppState, binding: &Binding, payload: &Value) -> Result<Value, SignalingError> {
    require_cohost(binding)?;

    let rooms_value = field(payload, "rooms")?
        .as_array()
        .ok_or_else(|| SignalingError::InvalidArgument("rooms must be an array".into()))?;

    let mut configs = Vec::with_capacity(rooms_value.len());
    for room_cfg in rooms_value {
        let name = room_cfg
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| SignalingError::InvalidArgument("room config missing name".into()))?
            .to_string();
        let participant_ids = room_cfg
            .get("participantIds")
            .and_then(Value::as_array)
            .ok_or_else(|| SignalingError::InvalidArgument("room config missing participantIds".into()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .and_then(|s| ObjectId::parse_str(s).ok())
                    .ok_or_else(|| SignalingError::InvalidArgument("invalid participant id in room config".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        configs.push(BreakoutConfig { name, participant_ids });
    }

    let duration_minutes = payload.get("duration").and_then(Value::as_u64).map(|d| d as u32);

    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let worker_pool = state.rooms.worker_pool();

    let outcome = state
        .breakouts
        .create_breakouts(
            binding.meeting_id,
            room.clone(),
            worker_pool,
            CreateBreakoutsRequest { configs, duration_minutes },
        )
        .await?;

    for reseated in &outcome.reseated {
        state.ws_storage.set_scope(reseated.conn_id, Scope::Breakout(reseated.breakout_id));
        let breakout = state.breakout_rooms.base.find_by_id(reseated.breakout_id).await?;
        let caps = room.breakout_router_capabilities(reseated.breakout_id);
        let push = json!({
            "breakoutRoom": {
                "id": reseated.breakout_id.to_hex(),
                "name": breakout.name,
                "endsAt": breakout.ends_at,
            },
            "routerCapabilities": caps,
        });
        let text = ServerPush::new("breakout-joined", push).to_message();
        dispatcher::send_to(&state.ws_storage, reseated.conn_id, text).await;
    }

    let breakout_ids: Vec<String> = outcome.breakout_ids.iter().map(|id| id.to_hex()).collect();
    let notice = json!({ "breakoutIds": breakout_ids });
    let text = ServerPush::new("breakout-created", notice).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&binding.meeting_code),
        &text,
        None,
    )
    .await;

    Ok(json!({ "breakoutIds": breakout_ids }))
}

async fn handle_close_breakouts(state: &AppState, binding: &Binding) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;
    let reseated = state.breakouts.close_breakouts(binding.meeting_id, room.clone()).await?;

    let main_caps = room.main_router.rtp_capabilities();
    for conn_id in &reseated {
        state.ws_storage.set_scope(*conn_id, Scope::Meeting);
        let push = json!({ "routerCapabilities": main_caps });
        let text = ServerPush::new("breakout-ended", push).to_message();
        dispatcher::send_to(&state.ws_storage, *conn_id, text).await;
    }

    let text = ServerPush::new("breakout-closed", json!({})).to_message();
    dispatcher::broadcast(
        &state.ws_storage,
        &state.ws_storage.meeting_members(&binding.meeting_code),
        &text,
        None,
    )
    .await;
    Ok(json!({}))
}

async fn handle_broadcast_to_breakouts(
    state: &AppState,
    binding: &Binding,
    payload: &Value,
) -> Result<Value, SignalingError> {
    require_cohost(binding)?;
    let message = str_field(payload, "message")?;
    let room = state
        .rooms
        .get(&binding.meeting_code)
        .ok_or_else(|| SignalingError::NotFound("room".into()))?;

    let notice = json!({ "message": message });
    let text = ServerPush::new("breakout-broadcast", notice).to_message();
    for breakout_id in room.breakout_ids() {
        let members = state.ws_storage.breakout_members(&binding.meeting_code, breakout_id);
        dispatcher::broadcast(&state.ws_storage, &members, &text, None).await;
    }
    Ok(json!({}))
}
