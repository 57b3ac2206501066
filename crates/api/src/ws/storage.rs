use axum::extract::ws::{Message, WebSocket};
use bson::oid::ObjectId;
use dashmap::DashMap;
use futures::stream::SplitSink;
use meetsfu_db::models::participant::ParticipantRole;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Which broadcast group a bound connection currently belongs to. A
/// connection is a member of at most one at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Lobby,
    Meeting,
    Breakout(ObjectId),
}

/// Established once `join-meeting` completes; absent until then.
#[derive(Debug, Clone)]
pub struct Binding {
    pub meeting_id: ObjectId,
    pub meeting_code: String,
    pub participant_id: ObjectId,
    pub user_id: ObjectId,
    pub role: ParticipantRole,
    pub scope: Scope,
}

pub struct Connection {
    pub sender: WsSender,
    pub binding: RwLock<Option<Binding>>,
}

/// Tracks every live WebSocket connection by `connId`. Broadcast groups
/// (`lobby:<code>`, `meeting:<code>`, `breakout:<id>`) are derived by
/// scanning bindings rather than maintained as a separate index — connection
/// counts per process are small enough that this stays cheap.
pub struct WsStorage {
    connections: DashMap<Uuid, Arc<Connection>>,
}

impl WsStorage {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn add(&self, conn_id: Uuid, sender: WsSender) -> Arc<Connection> {
        let connection = Arc::new(Connection {
            sender,
            binding: RwLock::new(None),
        });
        self.connections.insert(conn_id, connection.clone());
        connection
    }

    pub fn remove(&self, conn_id: Uuid) -> Option<Arc<Connection>> {
        self.connections.remove(&conn_id).map(|(_, c)| c)
    }

    pub fn get(&self, conn_id: Uuid) -> Option<Arc<Connection>> {
        self.connections.get(&conn_id).map(|c| c.clone())
    }

    pub fn set_binding(&self, conn_id: Uuid, binding: Binding) {
        if let Some(conn) = self.connections.get(&conn_id) {
            *conn.binding.write() = Some(binding);
        }
    }

    pub fn set_scope(&self, conn_id: Uuid, scope: Scope) {
        if let Some(conn) = self.connections.get(&conn_id) {
            if let Some(binding) = conn.binding.write().as_mut() {
                binding.scope = scope;
            }
        }
    }

    pub fn set_role(&self, conn_id: Uuid, role: ParticipantRole) {
        if let Some(conn) = self.connections.get(&conn_id) {
            if let Some(binding) = conn.binding.write().as_mut() {
                binding.role = role;
            }
        }
    }

    /// All connections bound to `meeting_code`, regardless of scope. Used for
    /// `meeting-ended`, which must reach lobby, main, and breakout members.
    pub fn all_members(&self, meeting_code: &str) -> Vec<Uuid> {
        self.members_where(meeting_code, |_| true)
    }

    pub fn find_conn_for_participant(&self, meeting_code: &str, participant_id: ObjectId) -> Option<Uuid> {
        self.connections.iter().find_map(|entry| {
            let binding = entry.value().binding.read();
            let binding = binding.as_ref()?;
            (binding.meeting_code == meeting_code && binding.participant_id == participant_id)
                .then_some(*entry.key())
        })
    }

    /// Every connection of `user_id` currently bound to `meeting_code`,
    /// regardless of scope. Used to target a reminder push at one user rather
    /// than broadcasting it to the whole meeting.
    pub fn find_conns_for_user(&self, meeting_code: &str, user_id: ObjectId) -> Vec<Uuid> {
        self.members_where(meeting_code, |b| b.user_id == user_id)
    }

    pub fn lobby_members(&self, meeting_code: &str) -> Vec<Uuid> {
        self.members_where(meeting_code, |b| b.scope == Scope::Lobby)
    }

    pub fn meeting_members(&self, meeting_code: &str) -> Vec<Uuid> {
        self.members_where(meeting_code, |b| b.scope == Scope::Meeting)
    }

    pub fn breakout_members(&self, meeting_code: &str, breakout_id: ObjectId) -> Vec<Uuid> {
        self.members_where(meeting_code, |b| b.scope == Scope::Breakout(breakout_id))
    }

    fn members_where(&self, meeting_code: &str, pred: impl Fn(&Binding) -> bool) -> Vec<Uuid> {
        self.connections
            .iter()
            .filter_map(|entry| {
                let binding = entry.value().binding.read();
                let binding = binding.as_ref()?;
                (binding.meeting_code == meeting_code && pred(binding)).then_some(*entry.key())
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for WsStorage {
    fn default() -> Self {
        Self::new()
    }
}
