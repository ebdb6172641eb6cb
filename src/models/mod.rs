pub mod user;
pub mod event;
pub mod booking;

pub use user::{Role, User};
pub use event::{Event, EventInput};
pub use booking::Booking;
