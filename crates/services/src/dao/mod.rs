pub mod base;
pub mod breakout_room;
pub mod chat_message;
pub mod invitation;
pub mod meeting;
pub mod participant;
pub mod question;
pub mod reminder;
pub mod upvote;
pub mod user;

pub use base::{BaseDao, DaoError, DaoResult};
pub use breakout_room::BreakoutRoomDao;
pub use chat_message::ChatMessageDao;
pub use invitation::InvitationDao;
pub use meeting::MeetingDao;
pub use participant::ParticipantDao;
pub use question::QuestionDao;
pub use reminder::ReminderDao;
pub use upvote::UpvoteDao;
pub use user::UserDao;
