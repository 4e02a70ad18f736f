use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0} is full")]
    RoomFull(u32),
    #[error("room {0} does not accept intrusion")]
    NoIntrusion(u32),
    #[error("player {0} is not in the room")]
    NotInRoom(u64),
    #[error("player {0} is not the room master")]
    NotMaster(u64),
    #[error("operation requires the {0} phase")]
    WrongPhase(&'static str),
    #[error("target team is full")]
    TeamFull,
    #[error("no free slot")]
    NoFreeSlot,
    #[error("both teams need a ready player")]
    CannotStart,
    #[error("match key does not name a known rule")]
    InvalidMatchKey,
}
