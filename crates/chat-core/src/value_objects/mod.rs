//! Value objects - immutable types that represent domain concepts

mod ids;
mod room;

pub use ids::{ActorId, IdParseError, LivestreamId, RoomId, StreamerId};
pub use room::{KnownRoom, RoomIdentity};
