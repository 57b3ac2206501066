//! Participant admission and host state machine. `Participant.status` is the
//! authoritative state; `role` only governs what a connection may request.
//! The in-memory Room/Peer maps are a cache of the live subset of it.

use bson::{doc, oid::ObjectId, DateTime};
use meetsfu_db::models::meeting::Meeting;
use meetsfu_db::models::participant::{Participant, ParticipantRole, ParticipantStatus};
use thiserror::Error;

use crate::dao::base::{BaseDao, DaoError};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Dao(#[from] DaoError),
    #[error("meeting not found")]
    MeetingNotFound,
    #[error("participant not found")]
    ParticipantNotFound,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("host cannot be moved to lobby or kicked")]
    CannotTargetHost,
}

pub struct AdmissionService {
    meetings: BaseDao<Meeting>,
    participants: BaseDao<Participant>,
}

impl AdmissionService {
    pub fn new(meetings: BaseDao<Meeting>, participants: BaseDao<Participant>) -> Self {
        Self {
            meetings,
            participants,
        }
    }

    /// Determines the initial status for a newly joining `(userId, meetingId)`
    /// pair: lobby if lobby is enabled and the joiner isn't host, else straight
    /// into the meeting. A reconnecting participant who had `leftAt` set and
    /// was previously `IN_MEETING` stays `IN_MEETING`; one who was `IN_LOBBY`
    /// is held in lobby again.
    pub async fn join_status(
        &self,
        meeting: &Meeting,
        existing: Option<&Participant>,
        is_host: bool,
    ) -> ParticipantStatus {
        if let Some(existing) = existing {
            if existing.left_at.is_some() {
                return match existing.status {
                    ParticipantStatus::InMeeting | ParticipantStatus::InBreakout => {
                        ParticipantStatus::InMeeting
                    }
                    other => other,
                };
            }
        }
        if meeting.lobby_enabled && !is_host {
            ParticipantStatus::InLobby
        } else {
            ParticipantStatus::InMeeting
        }
    }

    /// Host admits a lobby participant into the meeting.
    pub async fn admit(
        &self,
        meeting_id: ObjectId,
        host_participant: &Participant,
        target_id: ObjectId,
    ) -> Result<Participant, AdmissionError> {
        self.require_host_or_cohost(host_participant)?;
        let target = self.participants.find_by_id(target_id).await?;
        if target.meeting_id != meeting_id || target.status != ParticipantStatus::InLobby {
            return Err(AdmissionError::ParticipantNotFound);
        }
        self.participants
            .update_by_id(
                target_id,
                doc! { "$set": { "status": "in_meeting" } },
            )
            .await?;
        self.participants.find_by_id(target_id).await.map_err(Into::into)
    }

    /// Host rejects a lobby participant; the row is marked `REMOVED`.
    pub async fn reject(
        &self,
        meeting_id: ObjectId,
        host_participant: &Participant,
        target_id: ObjectId,
    ) -> Result<(), AdmissionError> {
        self.require_host_or_cohost(host_participant)?;
        let target = self.participants.find_by_id(target_id).await?;
        if target.meeting_id != meeting_id || target.status != ParticipantStatus::InLobby {
            return Err(AdmissionError::ParticipantNotFound);
        }
        self.participants
            .update_by_id(target_id, doc! { "$set": { "status": "removed" } })
            .await?;
        Ok(())
    }

    /// Host moves an in-meeting participant back to lobby. Forbidden on the
    /// host themselves.
    pub async fn move_to_lobby(
        &self,
        host_participant: &Participant,
        target: &Participant,
    ) -> Result<(), AdmissionError> {
        self.require_host_or_cohost(host_participant)?;
        if target.role == ParticipantRole::Host {
            return Err(AdmissionError::CannotTargetHost);
        }
        self.participants
            .update_by_id(
                target.id.ok_or(AdmissionError::ParticipantNotFound)?,
                doc! { "$set": { "status": "in_lobby", "breakout_room_id": bson::Bson::Null } },
            )
            .await?;
        Ok(())
    }

    /// Host kicks a participant out of the meeting entirely.
    pub async fn kick(
        &self,
        host_participant: &Participant,
        target: &Participant,
    ) -> Result<(), AdmissionError> {
        self.require_host_or_cohost(host_participant)?;
        if target.role == ParticipantRole::Host {
            return Err(AdmissionError::CannotTargetHost);
        }
        self.participants
            .update_by_id(
                target.id.ok_or(AdmissionError::ParticipantNotFound)?,
                doc! { "$set": { "status": "removed", "left_at": DateTime::now() } },
            )
            .await?;
        Ok(())
    }

    /// Atomic host transfer: demote the old host, promote the target, and
    /// repoint `Meeting.hostUserId`. Requires the caller to hold HOST — CO_HOST
    /// is not sufficient.
    pub async fn transfer_host(
        &self,
        meeting: &Meeting,
        current_host: &Participant,
        target: &Participant,
    ) -> Result<(), AdmissionError> {
        if current_host.role != ParticipantRole::Host {
            return Err(AdmissionError::Forbidden(
                "only the current host may transfer host".into(),
            ));
        }
        let meeting_id = meeting.id.ok_or(AdmissionError::MeetingNotFound)?;
        let old_host_id = current_host.id.ok_or(AdmissionError::ParticipantNotFound)?;
        let target_id = target.id.ok_or(AdmissionError::ParticipantNotFound)?;

        self.participants
            .update_by_id(old_host_id, doc! { "$set": { "role": "participant" } })
            .await?;
        self.participants
            .update_by_id(target_id, doc! { "$set": { "role": "host" } })
            .await?;
        self.meetings
            .update_by_id(
                meeting_id,
                doc! { "$set": { "host_user_id": target.user_id } },
            )
            .await?;
        Ok(())
    }

    /// Host or co-host ends the meeting: marks it ENDED. Room teardown and
    /// connection disconnection are the caller's responsibility (dispatcher
    /// layer).
    pub async fn end_meeting(
        &self,
        host_participant: &Participant,
        meeting_id: ObjectId,
    ) -> Result<(), AdmissionError> {
        self.require_host_or_cohost(host_participant)?;
        self.meetings
            .update_by_id(
                meeting_id,
                doc! { "$set": { "status": "ended", "ended_at": DateTime::now() } },
            )
            .await?;
        Ok(())
    }

    fn require_host(&self, participant: &Participant) -> Result<(), AdmissionError> {
        if participant.role != ParticipantRole::Host {
            return Err(AdmissionError::Forbidden("host role required".into()));
        }
        Ok(())
    }

    fn require_host_or_cohost(&self, participant: &Participant) -> Result<(), AdmissionError> {
        match participant.role {
            ParticipantRole::Host | ParticipantRole::CoHost => Ok(()),
            ParticipantRole::Participant => {
                Err(AdmissionError::Forbidden("host or co-host role required".into()))
            }
        }
    }
}
