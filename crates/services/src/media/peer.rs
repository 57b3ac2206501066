//! Per-connection state: identity, transports, owned producers/consumers.
//! A Peer is bound to one Connection for the duration of its presence in one
//! room scope (main or a single breakout). Operations are documented as
//! single-threaded relative to a given Peer — callers hold the owning Room's
//! guard while mutating it (see [`super::room::Room`]).

use dashmap::DashMap;
use mediasoup::prelude::*;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("transport already set")]
    InvalidState,
    #[error("peer is closed")]
    Closed,
}

/// `appData.type` on a Producer — screen-share is single-writer per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Audio,
    Video,
    Screen,
}

impl AppType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "screen" => Some(Self::Screen),
            _ => None,
        }
    }
}

pub struct ProducerEntry {
    pub producer: Producer,
    pub app_type: AppType,
}

pub struct ConsumerEntry {
    pub consumer: Consumer,
}

/// Identity carried over from the Connection that created this Peer.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub conn_id: Uuid,
    pub user_id: bson::oid::ObjectId,
    pub participant_id: bson::oid::ObjectId,
    pub display_name: String,
}

pub struct Peer {
    pub identity: PeerIdentity,
    send_transport: parking_lot::RwLock<Option<WebRtcTransport>>,
    recv_transport: parking_lot::RwLock<Option<WebRtcTransport>>,
    send_connected: std::sync::atomic::AtomicBool,
    recv_connected: std::sync::atomic::AtomicBool,
    producers: DashMap<ProducerId, ProducerEntry>,
    consumers: DashMap<ConsumerId, ConsumerEntry>,
    closed: std::sync::atomic::AtomicBool,
}

impl Peer {
    pub fn new(identity: PeerIdentity) -> Self {
        Self {
            identity,
            send_transport: parking_lot::RwLock::new(None),
            recv_transport: parking_lot::RwLock::new(None),
            send_connected: std::sync::atomic::AtomicBool::new(false),
            recv_connected: std::sync::atomic::AtomicBool::new(false),
            producers: DashMap::new(),
            consumers: DashMap::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), PeerError> {
        if self.is_closed() {
            Err(PeerError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn set_send_transport(&self, transport: WebRtcTransport) -> Result<(), PeerError> {
        self.ensure_open()?;
        let mut slot = self.send_transport.write();
        if slot.is_some() {
            return Err(PeerError::InvalidState);
        }
        *slot = Some(transport);
        Ok(())
    }

    pub fn set_recv_transport(&self, transport: WebRtcTransport) -> Result<(), PeerError> {
        self.ensure_open()?;
        let mut slot = self.recv_transport.write();
        if slot.is_some() {
            return Err(PeerError::InvalidState);
        }
        *slot = Some(transport);
        Ok(())
    }

    pub fn send_transport(&self) -> Option<WebRtcTransport> {
        self.send_transport.read().clone()
    }

    pub fn recv_transport(&self) -> Option<WebRtcTransport> {
        self.recv_transport.read().clone()
    }

    /// `connect-transport` is idempotent per the signaling contract: a second
    /// call against an already-connected transport must succeed without
    /// re-issuing the DTLS handshake to the SFU.
    pub fn is_send_connected(&self) -> bool {
        self.send_connected.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn is_recv_connected(&self) -> bool {
        self.recv_connected.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn mark_send_connected(&self) {
        self.send_connected
            .store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn mark_recv_connected(&self) {
        self.recv_connected
            .store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn add_producer(&self, producer: Producer, app_type: AppType) -> Result<(), PeerError> {
        self.ensure_open()?;
        self.producers
            .insert(producer.id(), ProducerEntry { producer, app_type });
        Ok(())
    }

    pub fn remove_producer(&self, id: &ProducerId) -> Option<ProducerEntry> {
        self.producers.remove(id).map(|(_, v)| v)
    }

    pub fn get_producer(&self, id: &ProducerId) -> Option<Producer> {
        self.producers.get(id).map(|e| e.producer.clone())
    }

    pub fn producers_of_type(&self, app_type: AppType) -> Vec<Producer> {
        self.producers
            .iter()
            .filter(|e| e.app_type == app_type)
            .map(|e| e.producer.clone())
            .collect()
    }

    pub fn all_producers(&self) -> Vec<(ProducerId, AppType)> {
        self.producers
            .iter()
            .map(|e| (*e.key(), e.app_type))
            .collect()
    }

    pub fn add_consumer(&self, consumer: Consumer) -> Result<(), PeerError> {
        self.ensure_open()?;
        self.consumers
            .insert(consumer.id(), ConsumerEntry { consumer });
        Ok(())
    }

    pub fn remove_consumer(&self, id: &ConsumerId) -> Option<ConsumerEntry> {
        self.consumers.remove(id).map(|(_, v)| v)
    }

    pub fn get_consumer(&self, id: &ConsumerId) -> Option<Consumer> {
        self.consumers.get(id).map(|e| e.consumer.clone())
    }

    /// Closes every owned Producer and Consumer, then both transports.
    /// Idempotent — a second call is a no-op.
    pub fn close(&self) {
        if self
            .closed
            .swap(true, std::sync::atomic::Ordering::AcqRel)
        {
            return;
        }
        self.producers.clear();
        self.consumers.clear();
        self.send_transport.write().take();
        self.recv_transport.write().take();
    }
}
