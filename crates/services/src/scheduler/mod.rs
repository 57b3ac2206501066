pub mod reminder;

pub use reminder::{InAppReminder, ReminderNotifier, ReminderScheduler};
