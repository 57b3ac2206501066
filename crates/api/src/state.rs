use mongodb::Database;
use meetsfu_config::Settings;
use meetsfu_services::dao::{
    BreakoutRoomDao, ChatMessageDao, InvitationDao, MeetingDao, ParticipantDao, QuestionDao,
    ReminderDao, UpvoteDao, UserDao,
};
use meetsfu_services::media::{RoomRegistry, WorkerPool};
use meetsfu_services::{AdmissionService, AuthVerifier, BreakoutCoordinator, EmailSender, RateLimiter};
use std::sync::Arc;
use std::time::Instant;

use crate::ws::storage::WsStorage;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    started_at: Instant,
    pub auth: Arc<AuthVerifier>,
    pub users: Arc<UserDao>,
    pub meetings: Arc<MeetingDao>,
    pub participants: Arc<ParticipantDao>,
    pub questions: Arc<QuestionDao>,
    pub upvotes: Arc<UpvoteDao>,
    pub chat_messages: Arc<ChatMessageDao>,
    pub invitations: Arc<InvitationDao>,
    pub breakout_rooms: Arc<BreakoutRoomDao>,
    pub reminders: Arc<ReminderDao>,
    pub admission: Arc<AdmissionService>,
    pub breakouts: Arc<BreakoutCoordinator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub email: Arc<EmailSender>,
    pub rooms: Arc<RoomRegistry>,
    pub ws_storage: Arc<WsStorage>,
}

impl AppState {
    pub async fn new(db: Database, settings: Settings) -> anyhow::Result<Self> {
        let auth = Arc::new(AuthVerifier::new(&settings.jwt));

        let users = Arc::new(UserDao::new(&db));
        let meetings = Arc::new(MeetingDao::new(&db));
        let participants = Arc::new(ParticipantDao::new(&db));
        let questions = Arc::new(QuestionDao::new(&db));
        let upvotes = Arc::new(UpvoteDao::new(&db));
        let chat_messages = Arc::new(ChatMessageDao::new(&db));
        let invitations = Arc::new(InvitationDao::new(&db));
        let breakout_rooms = Arc::new(BreakoutRoomDao::new(&db));
        let reminders = Arc::new(ReminderDao::new(&db));

        let admission = Arc::new(AdmissionService::new(
            meetsfu_services::dao::base::BaseDao::new(&db, meetsfu_db::models::meeting::Meeting::COLLECTION),
            meetsfu_services::dao::base::BaseDao::new(&db, meetsfu_db::models::participant::Participant::COLLECTION),
        ));
        let breakouts = Arc::new(BreakoutCoordinator::new(
            meetsfu_services::dao::base::BaseDao::new(&db, meetsfu_db::models::breakout_room::BreakoutRoom::COLLECTION),
            meetsfu_services::dao::base::BaseDao::new(&db, meetsfu_db::models::participant::Participant::COLLECTION),
        ));

        let rate_limiter = Arc::new(RateLimiter::new());
        let email = Arc::new(EmailSender::new(&settings.smtp)?);

        let worker_pool = Arc::new(WorkerPool::new(&settings.mediasoup).await?);
        let rooms = Arc::new(RoomRegistry::new(worker_pool));

        let ws_storage = Arc::new(WsStorage::new());

        Ok(Self {
            db,
            settings,
            started_at: Instant::now(),
            auth,
            users,
            meetings,
            participants,
            questions,
            upvotes,
            chat_messages,
            invitations,
            breakout_rooms,
            reminders,
            admission,
            breakouts,
            rate_limiter,
            email,
            rooms,
            ws_storage,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
