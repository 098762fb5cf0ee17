mod error;
mod manager;
mod member;
#[allow(clippy::module_inception)]
mod room;

pub use error::{RoomError, SendError};
pub use manager::{RoomManager, RoomReservation, RoomStats};
pub use member::Member;
pub use room::Room;
