//! Player model.
//!
//! A [`Player`] couples the immutable facts established at login (the
//! session handle, account id and nickname) with a mutable
//! [`PlayerState`] behind a `parking_lot` mutex. All room and channel
//! bookkeeping on the player goes through that one lock; code that holds
//! a room lock may take a player lock, never the other way around.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::time::Instant;

use matchforge_protocol::{PlayState, PlayerMode, Team};
use matchforge_transport::SessionHandle;

use crate::score::{DeathmatchStats, GameScore, TouchdownStats};

/// Hole-punching endpoints reported by the client and corrected by the
/// server from the socket's real address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NatInfo {
    pub private_ip: u32,
    pub private_port: u16,
    pub public_ip: u32,
    pub public_port: u16,
    pub unk: u16,
    pub connection_type: u8,
}

impl NatInfo {
    /// Overrides the public endpoint with the address the connection
    /// actually came from. Loopback peers are marked as direct.
    pub fn correct_public(&mut self, peer: Option<SocketAddr>) {
        if let Some(addr) = peer {
            if let IpAddr::V4(ip) = addr.ip() {
                self.public_ip = u32::from_le_bytes(ip.octets());
                if ip.is_loopback() {
                    self.connection_type = 1;
                }
            }
        }
        // Clients punch from the same local port they report privately.
        self.public_port = self.private_port;
        if self.connection_type == 6 {
            self.connection_type = 4;
        }
    }
}

/// Mutable side of a player.
#[derive(Debug)]
pub struct PlayerState {
    pub session_token: u32,
    pub channel_id: Option<u16>,
    /// Tunnel id of the room the player is in, if any.
    pub room_tunnel: Option<u32>,
    pub slot: u8,
    pub team: Team,
    pub mode: PlayerMode,
    pub play_state: PlayState,
    pub ready: bool,
    pub score: GameScore,
    /// Set when the player enters a live round; drives the payout clock.
    pub round_joined: Option<Instant>,
    pub td_stats: TouchdownStats,
    pub dm_stats: DeathmatchStats,
    pub level: u32,
    pub exp: u32,
    pub pen: u32,
    pub ap: u32,
    pub ping: u32,
    pub last_sync: u32,
    pub tutorial_completed: bool,
    pub nat: NatInfo,
    /// Relay slots this player forwards detour traffic to.
    pub relay_targets: Vec<u8>,
    /// Whether the relay has seen this player's spawn handshake.
    pub spawned: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            session_token: 0,
            channel_id: None,
            room_tunnel: None,
            slot: 0,
            team: Team::Neutral,
            mode: PlayerMode::Normal,
            play_state: PlayState::Lobby,
            ready: false,
            score: GameScore::Idle,
            round_joined: None,
            td_stats: TouchdownStats::default(),
            dm_stats: DeathmatchStats::default(),
            level: 0,
            exp: 0,
            pen: 0,
            ap: 0,
            ping: 0,
            last_sync: 0,
            tutorial_completed: false,
            nat: NatInfo::default(),
            relay_targets: Vec::new(),
            spawned: false,
        }
    }
}

/// One authenticated player.
pub struct Player {
    session: SessionHandle,
    account_id: u64,
    nickname: String,
    state: Mutex<PlayerState>,
}

impl Player {
    pub fn new(session: SessionHandle, account_id: u64, nickname: String) -> Arc<Self> {
        Arc::new(Self {
            session,
            account_id,
            nickname,
            state: Mutex::new(PlayerState::default()),
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn account_id(&self) -> u64 {
        self.account_id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Locks the mutable state. Keep guards short-lived and never await
    /// while holding one.
    pub fn state(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock()
    }

    pub fn send(&self, frame: Vec<u8>) {
        self.session.send(frame);
    }

    pub fn channel_id(&self) -> Option<u16> {
        self.state.lock().channel_id
    }

    pub fn room_tunnel(&self) -> Option<u32> {
        self.state.lock().room_tunnel
    }

    pub fn slot(&self) -> u8 {
        self.state.lock().slot
    }

    pub fn team(&self) -> Team {
        self.state.lock().team
    }

    /// Restores the lobby defaults after leaving a room.
    pub fn reset_room_state(&self) {
        let mut state = self.state.lock();
        state.room_tunnel = None;
        state.slot = 0;
        state.team = Team::Neutral;
        state.mode = PlayerMode::Normal;
        state.play_state = PlayState::Lobby;
        state.ready = false;
        state.score = GameScore::Idle;
        state.round_joined = None;
        state.relay_targets.clear();
        state.spawned = false;
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("session", &self.session.id())
            .field("account_id", &self.account_id)
            .field("nickname", &self.nickname)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchforge_protocol::GameRule;
    use matchforge_transport::SessionId;

    fn player() -> Arc<Player> {
        let (session, _rx) = SessionHandle::piped(SessionId::new(1));
        Player::new(session, 1000, "tester".into())
    }

    #[test]
    fn leaving_a_room_restores_lobby_defaults() {
        let plr = player();
        {
            let mut state = plr.state();
            state.room_tunnel = Some(9);
            state.slot = 3;
            state.team = Team::Beta;
            state.play_state = PlayState::Alive;
            state.ready = true;
            state.score = GameScore::for_rule(GameRule::Touchdown);
        }
        plr.reset_room_state();
        let state = plr.state();
        assert_eq!(state.room_tunnel, None);
        assert_eq!(state.slot, 0);
        assert_eq!(state.team, Team::Neutral);
        assert_eq!(state.play_state, PlayState::Lobby);
        assert!(!state.ready);
        assert_eq!(state.score, GameScore::Idle);
    }

    #[test]
    fn public_endpoint_corrected_from_peer() {
        let mut nat = NatInfo {
            private_ip: 0x0100_00_0A,
            private_port: 28_000,
            public_ip: 0,
            public_port: 1,
            unk: 0,
            connection_type: 6,
        };
        nat.correct_public(Some("203.0.113.9:9999".parse().unwrap()));
        assert_eq!(nat.public_port, 28_000);
        assert_eq!(nat.connection_type, 4);
        assert_ne!(nat.public_ip, 0);
    }

    #[test]
    fn loopback_peer_is_direct() {
        let mut nat = NatInfo::default();
        nat.correct_public(Some("127.0.0.1:5000".parse().unwrap()));
        assert_eq!(nat.connection_type, 1);
    }
}
