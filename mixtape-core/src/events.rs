use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::QueueEntry;

pub type EventSender = Sender<RoomEvent>;
pub type EventReceiver = Receiver<RoomEvent>;

/// Single-shot notifications handed to the external bus.
/// Nothing in the engine depends on their delivery.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A user became a member of a room
    UserJoined { room_id: String, username: String },
    /// A song was appended to a room's queue
    SongQueued { room_id: String, entry: QueueEntry },
    /// The head of a room's queue moved into the play history
    PlaybackAdvanced { room_id: String, entry: QueueEntry },
    /// A room was deleted by its host
    RoomClosed { room_id: String, host_id: String },
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    unbounded()
}
