//! Breakout room lifecycle: validation, router creation, peer reseating, and
//! the cancellable auto-close timer.

use bson::{doc, oid::ObjectId, DateTime};
use dashmap::DashMap;
use meetsfu_db::models::breakout_room::BreakoutRoom;
use meetsfu_db::models::participant::Participant;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::error;
use uuid::Uuid;

use crate::dao::base::{BaseDao, DaoError};
use crate::media::room::{Room, RoomError};
use crate::media::WorkerPool;

#[derive(Debug, Error)]
pub enum BreakoutError {
    #[error(transparent)]
    Dao(#[from] DaoError),
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error("between 1 and 20 breakout room configs are required")]
    InvalidConfigCount,
    #[error("room name must be 1..100 characters")]
    InvalidName,
    #[error("duration must be between 1 and 120 minutes")]
    InvalidDuration,
    #[error("participant {0} listed in more than one breakout room")]
    DuplicateParticipant(ObjectId),
}

#[derive(Debug, Clone)]
pub struct BreakoutConfig {
    pub name: String,
    pub participant_ids: Vec<ObjectId>,
}

#[derive(Debug, Clone)]
pub struct CreateBreakoutsRequest {
    pub configs: Vec<BreakoutConfig>,
    pub duration_minutes: Option<u32>,
}

/// A participant reseated into a breakout scope; the caller instructs this
/// connection to renegotiate against the breakout router.
pub struct Reseated {
    pub conn_id: Uuid,
    pub breakout_id: ObjectId,
}

pub struct CreateBreakoutsOutcome {
    pub breakout_ids: Vec<ObjectId>,
    pub reseated: Vec<Reseated>,
}

pub struct BreakoutCoordinator {
    breakout_rooms: BaseDao<BreakoutRoom>,
    participants: BaseDao<Participant>,
    timers: DashMap<ObjectId, oneshot::Sender<()>>,
}

impl BreakoutCoordinator {
    pub fn new(breakout_rooms: BaseDao<BreakoutRoom>, participants: BaseDao<Participant>) -> Self {
        Self {
            breakout_rooms,
            participants,
            timers: DashMap::new(),
        }
    }

    fn validate(req: &CreateBreakoutsRequest) -> Result<(), BreakoutError> {
        if req.configs.is_empty() || req.configs.len() > 20 {
            return Err(BreakoutError::InvalidConfigCount);
        }
        if let Some(minutes) = req.duration_minutes {
            if !(1..=120).contains(&minutes) {
                return Err(BreakoutError::InvalidDuration);
            }
        }
        let mut seen = HashSet::new();
        for config in &req.configs {
            if config.name.is_empty() || config.name.chars().count() > 100 {
                return Err(BreakoutError::InvalidName);
            }
            for pid in &config.participant_ids {
                if !seen.insert(*pid) {
                    return Err(BreakoutError::DuplicateParticipant(*pid));
                }
            }
        }
        Ok(())
    }

    /// Persists the BreakoutRoom rows, creates their routers, and reseats any
    /// currently-connected listed participants. Returns the new breakout ids
    /// and the connections that must renegotiate.
    pub async fn create_breakouts(
        self: &Arc<Self>,
        meeting_id: ObjectId,
        room: Arc<Room>,
        worker_pool: &WorkerPool,
        req: CreateBreakoutsRequest,
    ) -> Result<CreateBreakoutsOutcome, BreakoutError> {
        Self::validate(&req)?;

        let now = DateTime::now();
        let mut breakout_ids = Vec::with_capacity(req.configs.len());
        let mut reseated = Vec::new();

        for config in &req.configs {
            let ends_at = req
                .duration_minutes
                .map(|m| DateTime::from_millis(now.timestamp_millis() + m as i64 * 60_000));
            let row = BreakoutRoom {
                id: None,
                meeting_id,
                name: config.name.clone(),
                participant_ids: config.participant_ids.clone(),
                is_active: true,
                ends_at,
                created_at: now,
            };
            let breakout_id = self.breakout_rooms.insert_one(&row).await?;
            room.create_breakout_router(breakout_id, worker_pool).await?;
            breakout_ids.push(breakout_id);

            for participant_id in &config.participant_ids {
                let participant = self.participants.find_by_id(*participant_id).await?;
                self.participants
                    .update_by_id(
                        *participant_id,
                        doc! { "$set": {
                            "status": "in_breakout",
                            "breakout_room_id": breakout_id,
                        } },
                    )
                    .await?;

                if let Some(conn_id) = room
                    .main_peer_ids()
                    .into_iter()
                    .find(|id| room.get_peer(*id).map_or(false, |p| p.identity.participant_id == participant.id.unwrap_or_default()))
                {
                    room.move_peer_to_breakout(conn_id, breakout_id)?;
                    reseated.push(Reseated {
                        conn_id,
                        breakout_id,
                    });
                }
            }
        }

        if let Some(minutes) = req.duration_minutes {
            self.arm_auto_close(meeting_id, room, Duration::from_secs(minutes as u64 * 60));
        }

        Ok(CreateBreakoutsOutcome {
            breakout_ids,
            reseated,
        })
    }

    fn arm_auto_close(self: &Arc<Self>, meeting_id: ObjectId, room: Arc<Room>, duration: Duration) {
        let (tx, rx) = oneshot::channel();
        if let Some((_, old)) = self.timers.remove(&meeting_id) {
            let _ = old.send(());
        }
        self.timers.insert(meeting_id, tx);

        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    if let Err(err) = coordinator.close_breakouts(meeting_id, room).await {
                        error!(?meeting_id, %err, "auto close of breakouts failed");
                    }
                }
                _ = rx => {
                    // cancelled by a manual close-breakouts call
                }
            }
        });
    }

    /// Reverts every `IN_BREAKOUT` participant of this meeting to `IN_MEETING`,
    /// marks all active BreakoutRoom rows inactive, and closes the breakout
    /// routers. Cancels any armed auto-close timer to avoid a double close.
    pub async fn close_breakouts(
        self: &Arc<Self>,
        meeting_id: ObjectId,
        room: Arc<Room>,
    ) -> Result<Vec<Uuid>, BreakoutError> {
        if let Some((_, tx)) = self.timers.remove(&meeting_id) {
            let _ = tx.send(());
        }

        self.breakout_rooms
            .update_many(
                doc! { "meeting_id": meeting_id, "is_active": true },
                doc! { "$set": { "is_active": false } },
            )
            .await?;

        let in_breakout = self
            .participants
            .find_many(
                doc! { "meeting_id": meeting_id, "status": "in_breakout" },
                None,
            )
            .await?;
        for participant in in_breakout {
            if let Some(id) = participant.id {
                self.participants
                    .update_by_id(
                        id,
                        doc! { "$set": { "status": "in_meeting", "breakout_room_id": bson::Bson::Null } },
                    )
                    .await?;
            }
        }

        let reseated = room.close_all_breakouts();
        Ok(reseated)
    }
}
