pub mod appointment;
pub mod audit;
pub mod error;
pub mod specialist;
pub mod time;
pub mod webhook;

pub use appointment::*;
pub use audit::*;
pub use error::AppError;
pub use specialist::*;
pub use time::{weekday_name, TimeOfDay, WEEKDAY_NAMES};
pub use webhook::*;
