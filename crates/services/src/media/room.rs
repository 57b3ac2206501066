//! Per-meeting runtime aggregate: the main router, its peers, and breakout
//! sub-routers with their own peer sets. A connId appears in at most one
//! scope of one Room at any instant — callers serialize through `guard` so
//! that invariant never races.

use bson::oid::ObjectId;
use dashmap::DashMap;
use mediasoup::prelude::*;
use meetsfu_config::MediasoupSettings;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::peer::{AppType, Peer, PeerIdentity};
use super::sfu::{self, SfuError};
use super::worker_pool::WorkerPool;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("peer not found")]
    PeerNotFound,
    #[error("breakout not found")]
    BreakoutNotFound,
    #[error(transparent)]
    Sfu(#[from] SfuError),
    #[error("transport not found for this peer")]
    TransportNotFound,
    #[error("screen producer already exists in this scope")]
    ScreenAlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

struct BreakoutScope {
    router: Router,
    peers: DashMap<Uuid, Arc<Peer>>,
}

/// A short exclusive guard over peer/breakout maps and router references,
/// held only across synchronous mutation — never across an SFU call or a
/// broadcast. See the concurrency notes in the scheduler/dispatch layer.
pub struct Room {
    pub meeting_id: ObjectId,
    pub meeting_code: String,
    pub main_router: Router,
    main_peers: DashMap<Uuid, Arc<Peer>>,
    breakouts: DashMap<ObjectId, BreakoutScope>,
    guard: Mutex<()>,
}

impl Room {
    pub async fn new(
        meeting_id: ObjectId,
        meeting_code: String,
        worker_pool: &WorkerPool,
    ) -> Result<Self, RoomError> {
        let router = sfu::create_router(worker_pool.get_worker()).await?;
        Ok(Self {
            meeting_id,
            meeting_code,
            main_router: router,
            main_peers: DashMap::new(),
            breakouts: DashMap::new(),
            guard: Mutex::new(()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.main_peers.is_empty() && self.breakouts.iter().all(|b| b.peers.is_empty())
    }

    pub fn add_peer(&self, peer: Arc<Peer>) {
        let _g = self.guard.lock();
        self.main_peers.insert(peer.identity.conn_id, peer);
    }

    /// Removes the peer from whichever scope contains it, closes it, and
    /// returns it so the caller can fan out closure events.
    pub fn remove_peer(&self, conn_id: Uuid) -> Option<Arc<Peer>> {
        let removed = {
            let _g = self.guard.lock();
            if let Some((_, peer)) = self.main_peers.remove(&conn_id) {
                Some(peer)
            } else {
                let mut found = None;
                for scope in self.breakouts.iter() {
                    if let Some((_, peer)) = scope.peers.remove(&conn_id) {
                        found = Some(peer);
                        break;
                    }
                }
                found
            }
        };
        if let Some(peer) = &removed {
            peer.close();
        }
        removed
    }

    pub fn get_peer(&self, conn_id: Uuid) -> Option<Arc<Peer>> {
        if let Some(p) = self.main_peers.get(&conn_id) {
            return Some(p.clone());
        }
        for scope in self.breakouts.iter() {
            if let Some(p) = scope.peers.get(&conn_id) {
                return Some(p.clone());
            }
        }
        None
    }

    pub fn main_peer_ids(&self) -> Vec<Uuid> {
        self.main_peers.iter().map(|e| *e.key()).collect()
    }

    pub fn breakout_peer_ids(&self, breakout_id: &ObjectId) -> Vec<Uuid> {
        self.breakouts
            .get(breakout_id)
            .map(|scope| scope.peers.iter().map(|e| *e.key()).collect())
            .unwrap_or_default()
    }

    pub fn breakout_ids(&self) -> Vec<ObjectId> {
        self.breakouts.iter().map(|e| *e.key()).collect()
    }

    /// Every producer currently open in the main scope, excluding `exclude`'s
    /// own — the set a newly-joined peer must be told about up front.
    pub fn main_producers_excluding(&self, exclude: Uuid) -> Vec<(PeerIdentity, ProducerId, AppType)> {
        self.main_peers
            .iter()
            .filter(|e| *e.key() != exclude)
            .flat_map(|e| {
                let identity = e.value().identity.clone();
                e.value()
                    .all_producers()
                    .into_iter()
                    .map(move |(id, app_type)| (identity.clone(), id, app_type))
            })
            .collect()
    }

    /// The router a peer's transports should be created on: the breakout
    /// router if the peer currently lives in a breakout scope, else main.
    fn router_for(&self, conn_id: Uuid) -> Router {
        for scope in self.breakouts.iter() {
            if scope.peers.contains_key(&conn_id) {
                return scope.router.clone();
            }
        }
        self.main_router.clone()
    }

    pub async fn create_transport(
        &self,
        direction: Direction,
        peer: &Peer,
        settings: &MediasoupSettings,
    ) -> Result<sfu::TransportParams, RoomError> {
        let router = self.router_for(peer.identity.conn_id);
        let transport = sfu::create_webrtc_transport(&router, settings).await?;
        let params = sfu::transport_params(&transport);
        match direction {
            Direction::Send => peer
                .set_send_transport(transport)
                .map_err(|_| RoomError::TransportNotFound)?,
            Direction::Recv => peer
                .set_recv_transport(transport)
                .map_err(|_| RoomError::TransportNotFound)?,
        }
        Ok(params)
    }

    /// Screen-share single-writer check over whichever scope `conn_id` is in.
    pub fn has_screen_producer(&self, conn_id: Uuid) -> bool {
        let peers = self.scope_peers(conn_id);
        peers
            .iter()
            .any(|p| !p.producers_of_type(AppType::Screen).is_empty())
    }

    /// The `appData.type` of a producer, looked up across whichever scope
    /// `consumer_conn_id` lives in — needed so `consume` can echo it back.
    pub fn producer_app_type(&self, consumer_conn_id: Uuid, producer_id: ProducerId) -> Option<AppType> {
        self.scope_peers(consumer_conn_id)
            .into_iter()
            .find_map(|peer| {
                peer.all_producers()
                    .into_iter()
                    .find(|(id, _)| *id == producer_id)
                    .map(|(_, app_type)| app_type)
            })
    }

    pub fn breakout_router_capabilities(&self, breakout_id: ObjectId) -> Option<RtpCapabilities> {
        self.breakouts
            .get(&breakout_id)
            .map(|scope| scope.router.rtp_capabilities().clone())
    }

    fn scope_peers(&self, conn_id: Uuid) -> Vec<Arc<Peer>> {
        if self.main_peers.contains_key(&conn_id) {
            return self.main_peers.iter().map(|e| e.value().clone()).collect();
        }
        for scope in self.breakouts.iter() {
            if scope.peers.contains_key(&conn_id) {
                return scope.peers.iter().map(|e| e.value().clone()).collect();
            }
        }
        Vec::new()
    }

    pub async fn create_producer(
        &self,
        peer: &Peer,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        app_type: AppType,
    ) -> Result<Producer, RoomError> {
        if app_type == AppType::Screen && self.has_screen_producer(peer.identity.conn_id) {
            return Err(RoomError::ScreenAlreadyExists);
        }
        let transport = peer
            .send_transport()
            .ok_or(RoomError::TransportNotFound)?;
        let options = ProducerOptions::new(kind, rtp_parameters);
        let producer = transport
            .produce(options)
            .await
            .map_err(|e| SfuError::Produce(e.to_string()))?;
        peer.add_producer(producer.clone(), app_type)
            .map_err(|_| RoomError::TransportNotFound)?;
        Ok(producer)
    }

    /// Returns `None` when codecs are incompatible. The consumer is always
    /// created paused.
    pub async fn create_consumer(
        &self,
        consumer_peer: &Peer,
        producer_id: ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<Option<Consumer>, RoomError> {
        let router = self.router_for(consumer_peer.identity.conn_id);
        if !router.can_consume(&producer_id, rtp_capabilities) {
            return Ok(None);
        }
        let transport = consumer_peer
            .recv_transport()
            .ok_or(RoomError::TransportNotFound)?;
        let mut options = ConsumerOptions::new(producer_id, rtp_capabilities.clone());
        options.paused = true;
        let consumer = transport
            .consume(options)
            .await
            .map_err(|e| SfuError::Consume(e.to_string()))?;
        consumer_peer
            .add_consumer(consumer.clone())
            .map_err(|_| RoomError::TransportNotFound)?;
        Ok(Some(consumer))
    }

    pub async fn create_breakout_router(
        &self,
        breakout_id: ObjectId,
        worker_pool: &WorkerPool,
    ) -> Result<(), RoomError> {
        let router = sfu::create_router(worker_pool.get_worker()).await?;
        self.breakouts.insert(
            breakout_id,
            BreakoutScope {
                router,
                peers: DashMap::new(),
            },
        );
        Ok(())
    }

    /// Atomic sequence: verify source in main, close the old Peer (releasing
    /// main-router resources), construct a fresh Peer with the same identity
    /// in the breakout. Caller instructs the client to renegotiate.
    pub fn move_peer_to_breakout(
        &self,
        conn_id: Uuid,
        breakout_id: ObjectId,
    ) -> Result<Arc<Peer>, RoomError> {
        let _g = self.guard.lock();
        let (_, old_peer) = self
            .main_peers
            .remove(&conn_id)
            .ok_or(RoomError::PeerNotFound)?;
        old_peer.close();

        let scope = self
            .breakouts
            .get(&breakout_id)
            .ok_or(RoomError::BreakoutNotFound)?;
        let fresh = Arc::new(Peer::new(old_peer.identity.clone()));
        scope.peers.insert(conn_id, fresh.clone());
        Ok(fresh)
    }

    pub fn move_peer_to_main(&self, conn_id: Uuid) -> Result<Arc<Peer>, RoomError> {
        let _g = self.guard.lock();
        let mut old_peer = None;
        for scope in self.breakouts.iter() {
            if let Some((_, p)) = scope.peers.remove(&conn_id) {
                old_peer = Some(p);
                break;
            }
        }
        let old_peer = old_peer.ok_or(RoomError::PeerNotFound)?;
        old_peer.close();

        let fresh = Arc::new(Peer::new(old_peer.identity.clone()));
        self.main_peers.insert(conn_id, fresh.clone());
        Ok(fresh)
    }

    /// For every breakout: close each Peer and reseat a fresh Peer with the
    /// same identity in `main_peers`; close the breakout router. Returns the
    /// reseated connIds so the caller can instruct renegotiation.
    pub fn close_all_breakouts(&self) -> Vec<Uuid> {
        let _g = self.guard.lock();
        let mut reseated = Vec::new();
        let breakout_ids: Vec<ObjectId> = self.breakouts.iter().map(|e| *e.key()).collect();
        for id in breakout_ids {
            if let Some((_, scope)) = self.breakouts.remove(&id) {
                for (conn_id, peer) in scope.peers.into_iter() {
                    peer.close();
                    let fresh = Arc::new(Peer::new(peer.identity.clone()));
                    self.main_peers.insert(conn_id, fresh);
                    reseated.push(conn_id);
                }
                // Dropping `scope.router` here closes it and everything pinned to it.
            }
        }
        reseated
    }

    pub fn close(&self) {
        let _g = self.guard.lock();
        for entry in self.main_peers.iter() {
            entry.value().close();
        }
        self.main_peers.clear();
        for entry in self.breakouts.iter() {
            for peer in entry.value().peers.iter() {
                peer.value().close();
            }
        }
        self.breakouts.clear();
        info!(meeting_code = %self.meeting_code, "room closed");
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        debug!(meeting_code = %self.meeting_code, "room dropped");
    }
}
