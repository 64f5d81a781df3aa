//! Control Channel (C8): authenticated request/response messaging between
//! the two sides, plus the Chronos clock-offset exchange it carries.

mod channel;
mod clock;
mod messages;

pub use channel::ControlChannel;
pub use clock::{sync_as_drone, sync_as_gcs};
pub use messages::{AuthChallenge, AuthResponse, ControlMessage};
