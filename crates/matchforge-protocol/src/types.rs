//! Shared wire-level enumerations.
//!
//! These are the byte values clients actually send; every enum here has a
//! fallible `from_u8` so a tampered or unknown value surfaces as `None`
//! instead of a bogus variant.

/// Team assignment inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Team {
    Neutral = 0,
    Alpha = 1,
    Beta = 2,
}

impl Team {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Neutral),
            1 => Some(Self::Alpha),
            2 => Some(Self::Beta),
            _ => None,
        }
    }
}

impl From<Team> for u8 {
    fn from(value: Team) -> u8 {
        value as u8
    }
}

/// Game rule a room was created with. Encoded in the high nibble of the
/// first match-key byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GameRule {
    Touchdown = 1,
    Deathmatch = 2,
    Survival = 3,
}

impl GameRule {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Touchdown),
            2 => Some(Self::Deathmatch),
            3 => Some(Self::Survival),
            _ => None,
        }
    }
}

impl From<GameRule> for u8 {
    fn from(value: GameRule) -> u8 {
        value as u8
    }
}

/// In-round state of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayState {
    Alive = 0,
    Dead = 1,
    Waiting = 2,
    Spectating = 3,
    Lobby = 4,
}

impl PlayState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Alive),
            1 => Some(Self::Dead),
            2 => Some(Self::Waiting),
            3 => Some(Self::Spectating),
            4 => Some(Self::Lobby),
            _ => None,
        }
    }

    /// True while the player takes part in the running round in any form.
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Alive | Self::Dead | Self::Waiting)
    }
}

impl From<PlayState> for u8 {
    fn from(value: PlayState) -> u8 {
        value as u8
    }
}

/// Whether a player occupies a player slot or a spectator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayerMode {
    Normal = 1,
    Spectate = 2,
}

impl PlayerMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            2 => Some(Self::Spectate),
            _ => None,
        }
    }
}

impl From<PlayerMode> for u8 {
    fn from(value: PlayerMode) -> u8 {
        value as u8
    }
}

/// Lifecycle phase of a match room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GamePhase {
    Waiting = 0,
    Playing = 1,
    Result = 2,
}

impl From<GamePhase> for u8 {
    fn from(value: GamePhase) -> u8 {
        value as u8
    }
}

/// Time sub-state while a match room is `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimeState {
    FirstHalf = 0,
    HalfTime = 1,
    SecondHalf = 2,
}

impl From<TimeState> for u8 {
    fn from(value: TimeState) -> u8 {
        value as u8
    }
}

/// Room-wide event messages shown in the client HUD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventMessage {
    ChangedTeamTo = 1,
    EnteredRoom = 2,
    LeftRoom = 3,
    Kicked = 4,
    MasterAfk = 5,
    Afk = 6,
    KickedByModerator = 7,
    BallReset = 8,
    StartGame = 9,
    TouchdownAlpha = 10,
    TouchdownBeta = 11,
    ChatMessage = 13,
    TeamMessage = 14,
    ResetRound = 15,
    HalfTimeIn = 18,
    RespawnIn = 21,
    GodmodeForSeconds = 22,
    CantStartGame = 24,
}

impl EventMessage {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ChangedTeamTo),
            2 => Some(Self::EnteredRoom),
            3 => Some(Self::LeftRoom),
            4 => Some(Self::Kicked),
            5 => Some(Self::MasterAfk),
            6 => Some(Self::Afk),
            7 => Some(Self::KickedByModerator),
            8 => Some(Self::BallReset),
            9 => Some(Self::StartGame),
            10 => Some(Self::TouchdownAlpha),
            11 => Some(Self::TouchdownBeta),
            13 => Some(Self::ChatMessage),
            14 => Some(Self::TeamMessage),
            15 => Some(Self::ResetRound),
            18 => Some(Self::HalfTimeIn),
            21 => Some(Self::RespawnIn),
            22 => Some(Self::GodmodeForSeconds),
            24 => Some(Self::CantStartGame),
            _ => None,
        }
    }
}

impl From<EventMessage> for u8 {
    fn from(value: EventMessage) -> u8 {
        value as u8
    }
}

/// Result codes delivered through the generic result ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ServerResult {
    EnteredChannel = 5,
    LeftChannel = 8,
    PasswordError = 16,
    WearingUnusableItem = 25,
    ImpossibleToEnterRoom = 29,
    FailedToRequestTask = 32,
    SelectGameMode = 35,
}

impl From<ServerResult> for u32 {
    fn from(value: ServerResult) -> u32 {
        value as u32
    }
}

/// Result codes for the shop purchase ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BuyItemResult {
    DbError = 0x00,
    NotEnoughMoney = 0x01,
    UnknownItem = 0x02,
    Ok = 0x03,
}

impl From<BuyItemResult> for u8 {
    fn from(value: BuyItemResult) -> u8 {
        value as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_rule_and_team() {
        assert_eq!(GameRule::from_u8(0), None);
        assert_eq!(GameRule::from_u8(7), None);
        assert_eq!(Team::from_u8(3), None);
        assert_eq!(PlayerMode::from_u8(0), None);
    }

    #[test]
    fn play_state_round_trips_through_u8() {
        for state in [
            PlayState::Alive,
            PlayState::Dead,
            PlayState::Waiting,
            PlayState::Spectating,
            PlayState::Lobby,
        ] {
            assert_eq!(PlayState::from_u8(u8::from(state)), Some(state));
        }
    }

    #[test]
    fn play_state_playing_set() {
        assert!(PlayState::Alive.is_playing());
        assert!(PlayState::Dead.is_playing());
        assert!(PlayState::Waiting.is_playing());
        assert!(!PlayState::Spectating.is_playing());
        assert!(!PlayState::Lobby.is_playing());
    }
}
