pub mod breakout_room;
pub mod chat_message;
pub mod invitation;
pub mod meeting;
pub mod participant;
pub mod question;
pub mod reminder;
pub mod upvote;
pub mod user;
