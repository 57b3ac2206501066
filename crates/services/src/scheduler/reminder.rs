//! One-minute cadence tick driving two passes: firing due reminders, and
//! garbage-collecting idle instant meetings. Single-instance assumption —
//! running more than one scheduler against the same database races on the
//! same rows; coordination across replicas would need an external lease.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime};
use meetsfu_db::models::meeting::{Meeting, MeetingStatus};
use meetsfu_db::models::participant::Participant;
use meetsfu_db::models::reminder::{Reminder, ReminderType};
use meetsfu_db::models::user::User;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::dao::base::{BaseDao, DaoResult};
use crate::email::EmailSender;

const REMINDER_BATCH_SIZE: i64 = 50;
const IDLE_MEETING_THRESHOLD_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct InAppReminder {
    pub meeting_id: ObjectId,
    pub meeting_title: String,
    pub meeting_code: String,
    pub minutes_before: u32,
    pub target_email: String,
}

/// Lets the scheduler push an in-app reminder without depending on the
/// signaling layer directly.
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    async fn notify_in_app(&self, reminder: InAppReminder);
}

pub struct ReminderScheduler {
    reminders: BaseDao<Reminder>,
    meetings: BaseDao<Meeting>,
    participants: BaseDao<Participant>,
    users: BaseDao<User>,
    email: Arc<EmailSender>,
    notifier: Arc<dyn ReminderNotifier>,
}

impl ReminderScheduler {
    pub fn new(
        reminders: BaseDao<Reminder>,
        meetings: BaseDao<Meeting>,
        participants: BaseDao<Participant>,
        users: BaseDao<User>,
        email: Arc<EmailSender>,
        notifier: Arc<dyn ReminderNotifier>,
    ) -> Self {
        Self {
            reminders,
            meetings,
            participants,
            users,
            email,
            notifier,
        }
    }

    /// Invoked once per minute by the task that schedules this scheduler
    /// (see `crates/api`'s boot sequence, which owns the `tokio-cron-scheduler`
    /// instance and calls this on tick).
    pub async fn run_tick(&self) {
        if let Err(err) = self.fire_due_reminders().await {
            error!(%err, "reminder pass failed");
        }
        if let Err(err) = self.gc_idle_instant_meetings().await {
            error!(%err, "idle meeting gc pass failed");
        }
    }

    async fn fire_due_reminders(&self) -> DaoResult<()> {
        let now = DateTime::now();
        let due = self
            .reminders
            .find_many(
                doc! { "sent": false, "trigger_at": { "$lte": now } },
                Some(doc! { "trigger_at": 1 }),
            )
            .await?;

        for reminder in due.into_iter().take(REMINDER_BATCH_SIZE as usize) {
            self.fire_one(&reminder).await;
        }
        Ok(())
    }

    async fn fire_one(&self, reminder: &Reminder) {
        let Some(reminder_id) = reminder.id else {
            return;
        };
        let meeting = match self.meetings.find_by_id(reminder.meeting_id).await {
            Ok(m) => m,
            Err(err) => {
                warn!(?reminder_id, %err, "reminder references missing meeting");
                return;
            }
        };

        match reminder.reminder_type {
            ReminderType::Email => self.fire_email_reminder(reminder, &meeting).await,
            ReminderType::InApp => self.fire_in_app_reminder(reminder, &meeting).await,
        }
    }

    async fn fire_email_reminder(&self, reminder: &Reminder, meeting: &Meeting) {
        let reminder_id = reminder.id.expect("reminder loaded from store has an id");
        let participants = match self
            .participants
            .find_many(
                doc! { "meeting_id": reminder.meeting_id, "status": { "$ne": "removed" } },
                None,
            )
            .await
        {
            Ok(p) => p,
            Err(err) => {
                error!(?reminder_id, %err, "failed to load participants for reminder");
                return;
            }
        };

        let mut all_succeeded = !participants.is_empty();
        for participant in &participants {
            let user = match self.users.find_by_id(participant.user_id).await {
                Ok(u) => u,
                Err(err) => {
                    error!(?reminder_id, %err, "failed to load user for reminder participant");
                    all_succeeded = false;
                    continue;
                }
            };
            if let Err(err) = self
                .email
                .send_meeting_reminder(
                    &user.email,
                    &user.display_name,
                    &meeting.title,
                    &meeting.code,
                    reminder.minutes_before,
                )
                .await
            {
                error!(?reminder_id, %err, "failed to send reminder email");
                all_succeeded = false;
            }
        }

        if all_succeeded {
            if let Err(err) = self
                .reminders
                .update_by_id(reminder_id, doc! { "$set": { "sent": true } })
                .await
            {
                error!(?reminder_id, %err, "failed to mark reminder sent");
            }
        }
    }

    async fn fire_in_app_reminder(&self, reminder: &Reminder, meeting: &Meeting) {
        let reminder_id = reminder.id.expect("reminder loaded from store has an id");
        let Some(target_email) = reminder.target_email.clone() else {
            warn!(?reminder_id, "in-app reminder has no targetEmail, dropping");
            return;
        };

        self.notifier
            .notify_in_app(InAppReminder {
                meeting_id: reminder.meeting_id,
                meeting_title: meeting.title.clone(),
                meeting_code: meeting.code.clone(),
                minutes_before: reminder.minutes_before,
                target_email,
            })
            .await;

        if let Err(err) = self
            .reminders
            .update_by_id(reminder_id, doc! { "$set": { "sent": true } })
            .await
        {
            error!(?reminder_id, %err, "failed to mark reminder sent");
        }
    }

    /// Deletes Meetings with `scheduledAt = NULL AND status != ENDED` that are
    /// either scheduled-but-never-joined for 30+ minutes, or live with no
    /// recent participant activity. Relies on cascade deletion of dependent
    /// rows at the database layer.
    async fn gc_idle_instant_meetings(&self) -> DaoResult<()> {
        let cutoff = DateTime::from_millis(
            DateTime::now().timestamp_millis() - IDLE_MEETING_THRESHOLD_MINUTES * 60_000,
        );

        let candidates = self
            .meetings
            .find_many(
                doc! {
                    "scheduled_at": bson::Bson::Null,
                    "status": { "$ne": "ended" },
                },
                None,
            )
            .await?;

        for meeting in candidates {
            let Some(meeting_id) = meeting.id else {
                continue;
            };
            let idle = match meeting.status {
                MeetingStatus::Scheduled => meeting.created_at <= cutoff,
                MeetingStatus::Live => self.meeting_has_no_recent_activity(meeting_id, cutoff).await?,
                MeetingStatus::Ended => false,
            };
            if idle {
                self.meetings.hard_delete(doc! { "_id": meeting_id }).await?;
                self.participants
                    .hard_delete(doc! { "meeting_id": meeting_id })
                    .await?;
                info!(?meeting_id, "garbage collected idle instant meeting");
            }
        }
        Ok(())
    }

    async fn meeting_has_no_recent_activity(
        &self,
        meeting_id: ObjectId,
        cutoff: DateTime,
    ) -> DaoResult<bool> {
        let still_connected = self
            .participants
            .count(doc! {
                "meeting_id": meeting_id,
                "status": { "$in": ["in_meeting", "in_breakout", "in_lobby"] },
                "left_at": bson::Bson::Null,
            })
            .await?;
        if still_connected > 0 {
            return Ok(false);
        }
        let recently_left = self
            .participants
            .count(doc! {
                "meeting_id": meeting_id,
                "left_at": { "$gt": cutoff },
            })
            .await?;
        Ok(recently_left == 0)
    }
}
