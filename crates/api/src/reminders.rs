//! Bridges the durable reminder scheduler to the live signaling layer: an
//! in-app reminder becomes a `reminder` push targeted at the connections of
//! the user identified by `targetEmail`, not the whole meeting.

use async_trait::async_trait;
use meetsfu_services::dao::UserDao;
use meetsfu_services::scheduler::reminder::{InAppReminder, ReminderNotifier};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::ws::dispatcher;
use crate::ws::signaling::ServerPush;
use crate::ws::storage::WsStorage;

pub struct WsReminderNotifier {
    storage: Arc<WsStorage>,
    users: Arc<UserDao>,
}

impl WsReminderNotifier {
    pub fn new(storage: Arc<WsStorage>, users: Arc<UserDao>) -> Self {
        Self { storage, users }
    }
}

#[async_trait]
impl ReminderNotifier for WsReminderNotifier {
    async fn notify_in_app(&self, reminder: InAppReminder) {
        let user = match self.users.find_by_email(&reminder.target_email).await {
            Ok(user) => user,
            Err(err) => {
                warn!(target_email = %reminder.target_email, %err, "reminder target user not found");
                return;
            }
        };
        let Some(user_id) = user.id else {
            return;
        };
        let targets = self.storage.find_conns_for_user(&reminder.meeting_code, user_id);
        if targets.is_empty() {
            return;
        }
        let payload = json!({
            "type": "in_app",
            "meetingId": reminder.meeting_id.to_hex(),
            "meetingTitle": reminder.meeting_title,
            "meetingCode": reminder.meeting_code,
            "minutesBefore": reminder.minutes_before,
            "targetEmail": reminder.target_email,
        });
        let text = ServerPush::new("reminder", payload).to_message();
        dispatcher::broadcast(&self.storage, &targets, &text, None).await;
    }
}
