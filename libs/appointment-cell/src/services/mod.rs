pub mod booking;
pub mod daily;
pub mod expiration;
pub mod lifecycle;
pub mod locks;
pub mod reminders;

pub use booking::AppointmentService;
pub use daily::DailyReminderRunner;
pub use expiration::ExpirationProcessor;
pub use lifecycle::AppointmentLifecycleService;
pub use locks::SpecialistLocks;
pub use reminders::{render_notification, render_reminder, ReminderProcessor};
