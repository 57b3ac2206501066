//! Process-wide `meetingCode -> Room` map. Insertion/lookup/removal happen
//! under a short exclusive guard that never spans a suspension point; the
//! Room itself owns its own finer-grained guard for peer/breakout mutation.

use bson::oid::ObjectId;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::room::{Room, RoomError};
use super::worker_pool::WorkerPool;

pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    worker_pool: Arc<WorkerPool>,
}

impl RoomRegistry {
    pub fn new(worker_pool: Arc<WorkerPool>) -> Self {
        Self {
            rooms: DashMap::new(),
            worker_pool,
        }
    }

    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.worker_pool
    }

    pub async fn get_or_create(
        &self,
        meeting_id: ObjectId,
        meeting_code: &str,
    ) -> Result<Arc<Room>, RoomError> {
        if let Some(room) = self.rooms.get(meeting_code) {
            return Ok(room.clone());
        }
        let room = Arc::new(Room::new(meeting_id, meeting_code.to_string(), &self.worker_pool).await?);
        self.rooms.insert(meeting_code.to_string(), room.clone());
        info!(meeting_code, "room created");
        Ok(room)
    }

    pub fn get(&self, meeting_code: &str) -> Option<Arc<Room>> {
        self.rooms.get(meeting_code).map(|r| r.clone())
    }

    pub fn remove(&self, meeting_code: &str) -> Option<Arc<Room>> {
        self.rooms.remove(meeting_code).map(|(_, r)| {
            r.close();
            r
        })
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }
}
