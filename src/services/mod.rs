pub mod auth;
pub mod bookings;
pub mod events;
pub mod mailer;
pub mod otp;
pub mod users;

pub use bookings::BookingService;
pub use events::EventService;
pub use users::UserService;
