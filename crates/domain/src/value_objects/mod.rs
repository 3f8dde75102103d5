pub mod bookings;
pub mod enums;
pub mod events;
pub mod gateway;
