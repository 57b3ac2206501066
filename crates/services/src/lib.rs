pub mod admission;
pub mod auth;
pub mod breakout;
pub mod dao;
pub mod email;
pub mod media;
pub mod rate_limit;
pub mod scheduler;
pub mod turn;

pub use admission::{AdmissionError, AdmissionService};
pub use auth::{AuthError, AuthVerifier, Claims};
pub use breakout::{BreakoutCoordinator, BreakoutError};
pub use dao::*;
pub use email::EmailSender;
pub use rate_limit::{Category, RateLimiter};
pub use scheduler::{ReminderNotifier, ReminderScheduler};
