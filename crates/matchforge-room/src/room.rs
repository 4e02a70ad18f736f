//! Room state machine.
//!
//! A [`Room`] owns one match: its settings, roster, team scores and the
//! timers that drive phase transitions. All mutable match state sits in
//! a `RoomInner` behind one `parking_lot` mutex; lock order is room
//! before player, and no guard is held across an await. Timers are
//! plain tokio tasks holding a `Weak<Room>`, aborted when the room is
//! disposed, and every timer re-checks the phase after waking so a
//! stale wakeup cannot corrupt a newer round.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use matchforge_protocol::{
    EventMessage, GamePhase, GameRule, MatchKey, MatchOpcode, PlayState, PlayerMode, Team,
    TimeState,
};
use matchforge_session::{apply_exp, total_exp, Channel, GameScore, Player, PlayerStore};
use matchforge_transport::SessionId;

use crate::error::RoomError;
use crate::packets::{self, RosterEntry};

/// Seconds of half-time countdown lines before the break.
const HALF_TIME_COUNTDOWN: u32 = 10;
/// Length of the half-time break itself.
const HALF_TIME_BREAK: Duration = Duration::from_secs(25);
/// How long the result screen stays up before the room resets.
const RESULT_SCREEN: Duration = Duration::from_secs(20);
/// Play is frozen this long after a touchdown.
const TOUCHDOWN_RESET: Duration = Duration::from_secs(10);
/// A fumble recovery within this window of a touchdown earns an assist.
const FUMBLE_ASSIST_WINDOW: Duration = Duration::from_secs(10);

/// Immutable settings chosen at room creation.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub name: String,
    pub match_key: MatchKey,
    pub time_limit: Duration,
    pub score_limit: u8,
    pub password: u32,
    pub is_friendly: bool,
    pub is_balanced: bool,
    pub min_level: u8,
    pub max_level: u8,
    pub equip_limit: u8,
    pub no_intrusion: bool,
}

struct RoomInner {
    phase: GamePhase,
    time_state: TimeState,
    master: Option<u64>,
    players: Vec<Arc<Player>>,
    round_started_at: Option<Instant>,
    score_alpha: u32,
    score_beta: u32,
    /// Set between a touchdown and the ball reset; blocks scoring.
    td_waiting: bool,
    last_fumble_alpha: Option<(Instant, u64)>,
    last_fumble_beta: Option<(Instant, u64)>,
}

/// Phase change computed under the lock, applied after releasing it.
enum Transition {
    None,
    HalfTime,
    Result,
}

pub struct Room {
    tunnel_id: u32,
    number: u32,
    rule: GameRule,
    channel: Arc<Channel>,
    settings: RoomSettings,
    store: Arc<dyn PlayerStore>,
    inner: Mutex<RoomInner>,
    timers: Mutex<Vec<AbortHandle>>,
}

impl Room {
    pub fn new(
        tunnel_id: u32,
        number: u32,
        rule: GameRule,
        channel: Arc<Channel>,
        settings: RoomSettings,
        store: Arc<dyn PlayerStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            tunnel_id,
            number,
            rule,
            channel,
            settings,
            store,
            inner: Mutex::new(RoomInner {
                phase: GamePhase::Waiting,
                time_state: TimeState::FirstHalf,
                master: None,
                players: Vec::new(),
                round_started_at: None,
                score_alpha: 0,
                score_beta: 0,
                td_waiting: false,
                last_fumble_alpha: None,
                last_fumble_beta: None,
            }),
            timers: Mutex::new(Vec::new()),
        })
    }

    pub fn tunnel_id(&self) -> u32 {
        self.tunnel_id
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn rule(&self) -> GameRule {
        self.rule
    }

    pub fn channel_id(&self) -> u16 {
        self.channel.id()
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn phase(&self) -> GamePhase {
        self.inner.lock().phase
    }

    pub fn time_state(&self) -> TimeState {
        self.inner.lock().time_state
    }

    pub fn master(&self) -> Option<u64> {
        self.inner.lock().master
    }

    pub fn player_count(&self) -> usize {
        self.inner.lock().players.len()
    }

    pub fn scores(&self) -> (u32, u32) {
        let inner = self.inner.lock();
        (inner.score_alpha, inner.score_beta)
    }

    /// Sends a frame to every member except `exclude`.
    pub fn broadcast(&self, frame: &[u8], exclude: Option<SessionId>) {
        let members: Vec<Arc<Player>> = self.inner.lock().players.to_vec();
        for member in members {
            if Some(member.session().id()) == exclude {
                continue;
            }
            member.send(frame.to_vec());
        }
    }

    pub fn find_player(&self, account_id: u64) -> Option<Arc<Player>> {
        self.inner
            .lock()
            .players
            .iter()
            .find(|p| p.account_id() == account_id)
            .cloned()
    }

    /// Room-list header frame for this room.
    pub fn header_frame(&self) -> Vec<u8> {
        let inner = self.inner.lock();
        packets::deploy_room(
            self.number,
            &self.settings,
            inner.phase,
            inner.players.len() as u8,
            Self::quality_of(&inner.players),
        )
    }

    /// Appends this room's header to a packet under construction.
    pub fn write_header(&self, pkt: &mut matchforge_protocol::Packet) {
        let inner = self.inner.lock();
        packets::write_room_header(
            pkt,
            self.number,
            &self.settings,
            inner.phase,
            inner.players.len() as u8,
            Self::quality_of(&inner.players),
        );
    }

    /// Announces the room to its channel's lobby list.
    pub fn announce(&self) {
        self.channel.broadcast(&self.header_frame(), None);
    }

    /// Connection quality badge derived from the average member ping.
    pub fn connection_quality(&self) -> u8 {
        Self::quality_of(&self.inner.lock().players)
    }

    fn quality_of(players: &[Arc<Player>]) -> u8 {
        let mut sum: u64 = 0;
        for player in players {
            sum += u64::from(player.state().ping);
        }
        let avg = if players.is_empty() || sum == 0 {
            50
        } else {
            sum / players.len() as u64
        };
        let score = 200i64 - avg as i64 * 100 / 80;
        score.clamp(0, 100) as u8
    }

    fn count_in_team(inner: &RoomInner, team: Team, mode: PlayerMode) -> usize {
        inner
            .players
            .iter()
            .filter(|p| {
                let state = p.state();
                state.team == team && state.mode == mode
            })
            .count()
    }

    fn count_playing(inner: &RoomInner, team: Team) -> usize {
        inner
            .players
            .iter()
            .filter(|p| {
                let state = p.state();
                state.team == team && state.play_state.is_playing()
            })
            .count()
    }

    fn count_ready(inner: &RoomInner, team: Team) -> usize {
        inner
            .players
            .iter()
            .filter(|p| {
                let is_master = inner.master == Some(p.account_id());
                let state = p.state();
                state.team == team
                    && state.mode != PlayerMode::Spectate
                    && (state.ready || is_master)
            })
            .count()
    }

    fn roster_entries(inner: &RoomInner) -> Vec<RosterEntry> {
        inner
            .players
            .iter()
            .map(|p| {
                let state = p.state();
                RosterEntry {
                    private_ip: state.nat.private_ip,
                    private_port: state.nat.private_port,
                    public_ip: state.nat.public_ip,
                    public_port: state.nat.public_port,
                    nat_unk: state.nat.unk,
                    connection_type: state.nat.connection_type,
                    account_id: p.account_id(),
                    slot: state.slot,
                    nickname: p.nickname().to_owned(),
                }
            })
            .collect()
    }

    fn round_elapsed(inner: &RoomInner) -> Duration {
        inner
            .round_started_at
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    /// Adds a player to the room and replays the join sequence to them.
    pub fn join(self: &Arc<Self>, player: &Arc<Player>) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if self.settings.no_intrusion && inner.phase != GamePhase::Waiting {
            return Err(RoomError::NoIntrusion(self.tunnel_id));
        }
        let normal = inner
            .players
            .iter()
            .filter(|p| p.state().mode == PlayerMode::Normal)
            .count();
        if normal >= usize::from(self.settings.match_key.player_limit()) {
            return Err(RoomError::RoomFull(self.tunnel_id));
        }

        // Slot 1 belongs to the relay host side, so seats start at 2.
        let slot = (2u8..=u8::MAX)
            .find(|candidate| inner.players.iter().all(|p| p.state().slot != *candidate))
            .ok_or(RoomError::NoFreeSlot)?;
        let alpha = Self::count_in_team(&inner, Team::Alpha, PlayerMode::Normal);
        let beta = Self::count_in_team(&inner, Team::Beta, PlayerMode::Normal);
        let team = if alpha <= beta { Team::Alpha } else { Team::Beta };

        {
            let mut state = player.state();
            state.room_tunnel = Some(self.tunnel_id);
            state.slot = slot;
            state.team = team;
            state.mode = PlayerMode::Normal;
            state.play_state = PlayState::Lobby;
            state.ready = false;
            state.score = GameScore::for_rule(self.rule);
            state.round_joined = None;
        }

        let first = inner.players.is_empty();
        inner.players.push(Arc::clone(player));
        if first {
            inner.master = Some(player.account_id());
        }
        tracing::info!(
            tunnel = self.tunnel_id,
            nickname = player.nickname(),
            slot,
            "player entered room"
        );

        let elapsed_ms = if inner.phase == GamePhase::Playing {
            Self::round_elapsed(&inner).as_millis() as u32
        } else {
            0
        };
        player.send(packets::enter_success(
            self.number,
            self.settings.match_key,
            inner.phase,
            inner.time_state,
            self.settings.time_limit.as_millis() as u32,
            elapsed_ms,
            self.settings.score_limit,
            &self.settings,
        ));
        player.send(packets::slot_info(slot, self.tunnel_id));
        if first {
            let master = player.account_id();
            Self::broadcast_locked(&inner, &packets::change_master(master));
            Self::broadcast_locked(&inner, &packets::change_referee(master));
        }
        Self::broadcast_locked(&inner, &packets::roster(&Self::roster_entries(&inner)));
        Ok(())
    }

    fn broadcast_locked(inner: &RoomInner, frame: &[u8]) {
        for member in &inner.players {
            member.send(frame.to_vec());
        }
    }

    /// Removes a player. Returns `true` when the room is now empty and
    /// should be disposed by the caller.
    pub fn leave(self: &Arc<Self>, player: &Arc<Player>, leave_type: u8) -> bool {
        let force_result = {
            let mut inner = self.inner.lock();
            let Some(pos) = inner
                .players
                .iter()
                .position(|p| p.account_id() == player.account_id())
            else {
                return false;
            };
            let (account, slot) = (player.account_id(), player.state().slot);
            inner.players.remove(pos);
            Self::broadcast_locked(
                &inner,
                &packets::player_left_room(account, player.nickname(), leave_type),
            );
            Self::broadcast_locked(&inner, &packets::player_leave(account, slot));
            player.reset_room_state();
            tracing::info!(tunnel = self.tunnel_id, account, "player left room");

            if inner.players.is_empty() {
                return true;
            }
            if inner.master == Some(account) {
                let next = inner.players[0].account_id();
                inner.master = Some(next);
                Self::broadcast_locked(&inner, &packets::change_master(next));
                Self::broadcast_locked(&inner, &packets::change_referee(next));
            }
            Self::broadcast_locked(&inner, &packets::roster(&Self::roster_entries(&inner)));

            inner.phase == GamePhase::Playing
                && [Team::Alpha, Team::Beta].iter().any(|&team| {
                    Self::count_in_team(&inner, team, PlayerMode::Normal) == 0
                        || Self::count_playing(&inner, team) == 0
                })
        };
        if force_result {
            self.begin_result();
        }
        false
    }

    /// Aborts all timers and announces the room's removal.
    pub fn dispose(&self) {
        for handle in self.timers.lock().drain(..) {
            handle.abort();
        }
        self.channel
            .broadcast(&packets::dispose_room(self.number), None);
        tracing::info!(tunnel = self.tunnel_id, "room disposed");
    }

    /// Flips the player's ready flag outside a live round.
    pub fn toggle_ready(&self, player: &Arc<Player>) -> Result<bool, RoomError> {
        let inner = self.inner.lock();
        if inner.phase != GamePhase::Waiting {
            return Err(RoomError::WrongPhase("waiting"));
        }
        let ready = {
            let mut state = player.state();
            state.ready = !state.ready;
            state.ready
        };
        Self::broadcast_locked(&inner, &packets::ready(player.account_id(), ready));
        Ok(ready)
    }

    /// Moves the player onto `team`, enforcing per-team capacity.
    pub fn change_team(&self, player: &Arc<Player>, team: Team) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        if inner.phase != GamePhase::Waiting {
            return Err(RoomError::WrongPhase("waiting"));
        }
        let mode = player.state().mode;
        let limit = match mode {
            PlayerMode::Normal => self.settings.match_key.player_limit() / 2,
            PlayerMode::Spectate => self.settings.match_key.spectator_limit() / 2,
        };
        if Self::count_in_team(&inner, team, mode) >= usize::from(limit) {
            return Err(RoomError::TeamFull);
        }
        player.state().team = team;
        Self::broadcast_locked(
            &inner,
            &packets::change_team(player.account_id(), team, mode.into()),
        );
        Ok(())
    }

    /// Switches between playing and spectating.
    pub fn change_mode(&self, player: &Arc<Player>, mode: PlayerMode) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        if inner.phase != GamePhase::Waiting {
            return Err(RoomError::WrongPhase("waiting"));
        }
        if mode == PlayerMode::Spectate {
            let spectators = inner
                .players
                .iter()
                .filter(|p| p.state().mode == PlayerMode::Spectate)
                .count();
            if spectators >= usize::from(self.settings.match_key.spectator_limit()) {
                return Err(RoomError::TeamFull);
            }
        }
        let team = {
            let mut state = player.state();
            state.mode = mode;
            state.team
        };
        Self::broadcast_locked(
            &inner,
            &packets::change_team(player.account_id(), team, mode.into()),
        );
        Ok(())
    }

    /// Master-only removal of another player while the room is idle.
    pub fn kick(self: &Arc<Self>, kicker: u64, target: u64) -> Result<bool, RoomError> {
        let victim = {
            let inner = self.inner.lock();
            if inner.master != Some(kicker) {
                return Err(RoomError::NotMaster(kicker));
            }
            if inner.phase != GamePhase::Waiting {
                return Err(RoomError::WrongPhase("waiting"));
            }
            inner
                .players
                .iter()
                .find(|p| p.account_id() == target)
                .cloned()
                .ok_or(RoomError::NotInRoom(target))?
        };
        Ok(self.leave(&victim, EventMessage::Kicked.into()))
    }

    /// Brings a lobby-state player into the running round.
    pub fn late_join(self: &Arc<Self>, player: &Arc<Player>) {
        let joined = {
            let inner = self.inner.lock();
            if inner.phase == GamePhase::Waiting {
                false
            } else {
                let mut state = player.state();
                if state.play_state != PlayState::Lobby {
                    false
                } else {
                    state.play_state = match state.mode {
                        PlayerMode::Spectate => PlayState::Spectating,
                        PlayerMode::Normal => PlayState::Alive,
                    };
                    state.round_joined = Some(Instant::now());
                    state.score = GameScore::for_rule(self.rule);
                    true
                }
            }
        };
        if joined {
            self.broadcast_briefing(false);
        }
    }

    /// Starts the round. Only the master may, and both teams need at
    /// least one ready player. Survival is co-op, so it skips the
    /// two-team ready gate and a solo master can start.
    pub fn begin_round(self: &Arc<Self>, initiator: u64) -> Result<(), RoomError> {
        {
            let mut inner = self.inner.lock();
            if inner.master != Some(initiator) {
                return Err(RoomError::NotMaster(initiator));
            }
            if inner.phase != GamePhase::Waiting {
                return Err(RoomError::WrongPhase("waiting"));
            }
            if self.rule != GameRule::Survival
                && (Self::count_ready(&inner, Team::Alpha) == 0
                    || Self::count_ready(&inner, Team::Beta) == 0)
            {
                return Err(RoomError::CannotStart);
            }
            let master = inner.master;
            for player in &inner.players {
                let is_master = master == Some(player.account_id());
                let mut state = player.state();
                if !(state.ready || is_master) {
                    continue;
                }
                state.play_state = match state.mode {
                    PlayerMode::Spectate => PlayState::Spectating,
                    PlayerMode::Normal => PlayState::Alive,
                };
                state.round_joined = Some(Instant::now());
                state.ready = false;
                state.score = GameScore::for_rule(self.rule);
            }
            inner.round_started_at = Some(Instant::now());
            inner.time_state = TimeState::FirstHalf;
            inner.td_waiting = false;
            inner.score_alpha = 0;
            inner.score_beta = 0;
            inner.last_fumble_alpha = None;
            inner.last_fumble_beta = None;
        }
        tracing::info!(tunnel = self.tunnel_id, "round started");
        self.broadcast_briefing(false);
        self.broadcast(&packets::room_sub_state(TimeState::FirstHalf), None);
        self.inner.lock().phase = GamePhase::Playing;
        self.broadcast(&packets::room_state(GamePhase::Playing), None);
        Ok(())
    }

    /// One scheduler tick: time and score limits drive the phase.
    pub fn update(self: &Arc<Self>) {
        let transition = {
            let inner = self.inner.lock();
            if inner.phase != GamePhase::Playing {
                Transition::None
            } else {
                let round_time = match self.rule {
                    GameRule::Survival => self.settings.time_limit,
                    _ => self.settings.time_limit / 2,
                };
                if Self::round_elapsed(&inner) >= round_time {
                    match (self.rule, inner.time_state) {
                        (GameRule::Survival, _) => Transition::Result,
                        (_, TimeState::FirstHalf) => Transition::HalfTime,
                        (_, TimeState::SecondHalf) => Transition::Result,
                        (_, TimeState::HalfTime) => Transition::None,
                    }
                } else if self.rule != GameRule::Survival {
                    let top = inner.score_alpha.max(inner.score_beta);
                    let limit = u32::from(self.settings.score_limit);
                    if inner.time_state == TimeState::FirstHalf && top >= limit / 2 {
                        Transition::HalfTime
                    } else if inner.time_state == TimeState::SecondHalf && top >= limit {
                        Transition::Result
                    } else {
                        Transition::None
                    }
                } else {
                    Transition::None
                }
            }
        };
        match transition {
            Transition::None => {}
            Transition::HalfTime => self.change_time_state(TimeState::HalfTime),
            Transition::Result => self.begin_result(),
        }
    }

    /// Moves to a new sub-state. Entering half time runs the countdown,
    /// the break, and the hand-off to the second half on a timer.
    pub fn change_time_state(self: &Arc<Self>, time_state: TimeState) {
        match time_state {
            TimeState::HalfTime => {
                self.inner.lock().time_state = TimeState::HalfTime;
                let weak = Arc::downgrade(self);
                self.spawn_timer(async move {
                    for remaining in (1..=HALF_TIME_COUNTDOWN).rev() {
                        let Some(room) = weak.upgrade() else { return };
                        if room.phase() != GamePhase::Playing {
                            return;
                        }
                        room.broadcast(
                            &packets::event_message(EventMessage::HalfTimeIn, 0, remaining, ""),
                            None,
                        );
                        drop(room);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    let Some(room) = weak.upgrade() else { return };
                    room.broadcast(&packets::room_sub_state(TimeState::HalfTime), None);
                    drop(room);
                    tokio::time::sleep(HALF_TIME_BREAK).await;
                    let Some(room) = weak.upgrade() else { return };
                    if room.phase() == GamePhase::Playing {
                        room.change_time_state(TimeState::SecondHalf);
                    }
                });
            }
            other => {
                {
                    let mut inner = self.inner.lock();
                    inner.time_state = other;
                    if other == TimeState::SecondHalf {
                        inner.round_started_at = Some(Instant::now());
                    }
                }
                self.broadcast(&packets::room_sub_state(other), None);
            }
        }
    }

    /// Ends play: result screen, payouts, then the lobby reset.
    pub fn begin_result(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.phase != GamePhase::Playing {
                return;
            }
            inner.phase = GamePhase::Result;
        }
        tracing::info!(tunnel = self.tunnel_id, "round over");
        self.broadcast(&packets::room_state(GamePhase::Result), None);
        self.broadcast_briefing(true);
        {
            let inner = self.inner.lock();
            for player in &inner.players {
                let mut state = player.state();
                if !matches!(state.play_state, PlayState::Lobby | PlayState::Spectating) {
                    state.score = GameScore::for_rule(self.rule);
                }
            }
        }
        let weak = Arc::downgrade(self);
        self.spawn_timer(async move {
            tokio::time::sleep(RESULT_SCREEN).await;
            if let Some(room) = weak.upgrade() {
                room.end_result();
            }
        });
    }

    fn end_result(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.phase != GamePhase::Result {
                return;
            }
            inner.phase = GamePhase::Waiting;
            inner.time_state = TimeState::FirstHalf;
            inner.round_started_at = None;
            inner.score_alpha = 0;
            inner.score_beta = 0;
            inner.td_waiting = false;
            inner.last_fumble_alpha = None;
            inner.last_fumble_beta = None;
            for player in &inner.players {
                let mut state = player.state();
                state.play_state = PlayState::Lobby;
                state.round_joined = None;
            }
        }
        self.broadcast(&packets::room_state(GamePhase::Waiting), None);
        self.broadcast_briefing(false);
    }

    fn winning_team(&self, inner: &RoomInner) -> Team {
        if self.rule == GameRule::Survival {
            return Team::Alpha;
        }
        if inner.score_alpha != inner.score_beta {
            return if inner.score_alpha > inner.score_beta {
                Team::Alpha
            } else {
                Team::Beta
            };
        }
        // Tie-break on the points of players still standing.
        let points = |team: Team| -> u32 {
            inner
                .players
                .iter()
                .filter(|p| {
                    let state = p.state();
                    state.team == team && state.play_state == PlayState::Alive
                })
                .map(|p| p.state().score.total())
                .sum()
        };
        if points(Team::Beta) > points(Team::Alpha) {
            Team::Beta
        } else {
            Team::Alpha
        }
    }

    /// Builds and broadcasts the scoreboard. With `result` set it also
    /// pays out currency and experience and persists the changes.
    pub fn broadcast_briefing(&self, result: bool) {
        let frame = {
            let inner = self.inner.lock();
            self.briefing_frame(&inner, result)
        };
        self.broadcast(&frame, None);
    }

    fn briefing_frame(&self, inner: &RoomInner, result: bool) -> Vec<u8> {
        let win_team = self.winning_team(inner);
        let mut players: Vec<&Arc<Player>> = Vec::new();
        let mut spectators: Vec<&Arc<Player>> = Vec::new();
        for player in &inner.players {
            let state = player.state();
            if state.mode == PlayerMode::Spectate {
                spectators.push(player);
                continue;
            }
            if result && matches!(state.play_state, PlayState::Lobby | PlayState::Spectating) {
                continue;
            }
            players.push(player);
        }

        let mut pkt = matchforge_protocol::Packet::new(MatchOpcode::BriefingAck);
        pkt.write_bool(result);
        if result {
            pkt.write_u8(1);
            pkt.write_u8(1);
            pkt.write_u32(u32::from(u8::from(win_team)));
        } else {
            pkt.write_u8(0);
            pkt.write_u8(0);
            pkt.write_u32(0);
        }
        pkt.write_u32(2);
        pkt.write_u32(players.len() as u32);
        pkt.write_u32(spectators.len() as u32);
        pkt.write_u8(Team::Alpha.into());
        pkt.write_u32(inner.score_alpha);
        pkt.write_u8(Team::Beta.into());
        pkt.write_u32(inner.score_beta);

        for player in players {
            let account = player.account_id();
            let mut state = player.state();
            let (pen_gain, exp_gain) = if result {
                let elapsed = state
                    .round_joined
                    .map(|t| t.elapsed())
                    .unwrap_or_default()
                    .as_secs();
                let pen = state.score.payout(elapsed);
                (pen, pen * 2)
            } else {
                (0, 0)
            };
            if result {
                let win = state.team == win_team;
                state.pen += pen_gain;
                let (mut level, mut exp) = (state.level, state.exp);
                apply_exp(&mut level, &mut exp, exp_gain);
                state.level = level;
                state.exp = exp;
                match &state.score {
                    GameScore::Touchdown(score) => {
                        let score = score.clone();
                        state.td_stats.record_result(&score, win);
                        if let Err(error) =
                            self.store.update_touchdown_stats(account, &state.td_stats)
                        {
                            tracing::warn!(account, %error, "stat update failed");
                        }
                    }
                    GameScore::Deathmatch(score) => {
                        let score = score.clone();
                        state.dm_stats.record_result(&score, win);
                        if let Err(error) =
                            self.store.update_deathmatch_stats(account, &state.dm_stats)
                        {
                            tracing::warn!(account, %error, "stat update failed");
                        }
                    }
                    _ => {}
                }
                if let Err(error) = self.store.update_money(account, state.pen, state.ap) {
                    tracing::warn!(account, %error, "wallet update failed");
                }
                if let Err(error) = self.store.update_exp_level(account, state.level, state.exp) {
                    tracing::warn!(account, %error, "level update failed");
                }
            }

            pkt.write_u64(account);
            pkt.write_u8(state.team.into());
            pkt.write_u8(state.play_state.into());
            pkt.write_bool(state.ready);
            pkt.write_i32(i32::from(u8::from(state.mode)));
            pkt.write_u32(state.score.total());
            pkt.write_u32(0);
            pkt.write_u32(pen_gain);
            pkt.write_u32(exp_gain);
            pkt.write_u32(total_exp(state.level, state.exp) as u32);
            for _ in 0..5 {
                pkt.write_u32(0);
            }
            pkt.write_u8(0);
            pkt.write_u8(0);
            match &state.score {
                GameScore::Touchdown(score) => {
                    pkt.write_u32(score.touchdowns);
                    pkt.write_u32(score.kills * 3);
                    pkt.write_u32(score.defense * 4);
                    for _ in 0..4 {
                        pkt.write_u32(0);
                    }
                    pkt.write_u32(score.offense);
                    pkt.write_u32(0);
                    pkt.write_u32(0);
                }
                GameScore::Deathmatch(score) => {
                    pkt.write_u32(score.kills >> 1);
                    pkt.write_u32(score.kills);
                    for _ in 0..4 {
                        pkt.write_u32(0);
                    }
                    pkt.write_u32(score.deaths);
                }
                GameScore::Survival(score) => {
                    pkt.write_u32(score.kills);
                }
                GameScore::Idle => {
                    pkt.write_u32(0);
                }
            }
        }
        for spectator in spectators {
            pkt.write_u64(spectator.account_id());
            pkt.write_i32(0);
        }
        pkt.finish()
    }

    fn scoring_open(inner: &RoomInner) -> bool {
        inner.phase == GamePhase::Playing
            && !inner.td_waiting
            && inner.time_state != TimeState::HalfTime
    }

    fn with_player<T>(
        inner: &RoomInner,
        account: u64,
        apply: impl FnOnce(&mut GameScore) -> T,
    ) -> Result<T, RoomError> {
        let player = inner
            .players
            .iter()
            .find(|p| p.account_id() == account)
            .ok_or(RoomError::NotInRoom(account))?;
        Ok(apply(&mut player.state().score))
    }

    fn apply_kill(&self, inner: &mut RoomInner, killer: u64, victim: u64) -> Result<(), RoomError> {
        Self::with_player(inner, killer, |score| match score {
            GameScore::Touchdown(s) => {
                s.total += 2;
                s.kills += 1;
            }
            GameScore::Deathmatch(s) => {
                s.total += 2;
                s.kills += 1;
            }
            _ => {}
        })?;
        let killer_team = inner
            .players
            .iter()
            .find(|p| p.account_id() == killer)
            .map(|p| p.state().team);
        Self::with_player(inner, victim, |score| {
            if let GameScore::Deathmatch(s) = score {
                s.deaths += 1;
            }
        })?;
        if self.rule == GameRule::Deathmatch {
            match killer_team {
                Some(Team::Alpha) => inner.score_alpha += 1,
                Some(Team::Beta) => inner.score_beta += 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// A confirmed kill. In Deathmatch the killer's team also scores.
    pub fn score_kill(&self, killer: u64, victim: u64, echo: &[u8]) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if !Self::scoring_open(&inner) {
            return Ok(());
        }
        self.apply_kill(&mut inner, killer, victim)?;
        Self::broadcast_locked(&inner, &packets::score_ack(MatchOpcode::ScoreKillAck, echo));
        Ok(())
    }

    /// A kill with an assist.
    pub fn score_kill_assist(
        &self,
        killer: u64,
        assist: u64,
        victim: u64,
        echo: &[u8],
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if !Self::scoring_open(&inner) {
            return Ok(());
        }
        self.apply_kill(&mut inner, killer, victim)?;
        Self::with_player(&inner, assist, |score| match score {
            GameScore::Touchdown(s) => {
                s.total += 1;
                s.kill_assists += 1;
            }
            GameScore::Deathmatch(s) => {
                s.total += 1;
                s.kill_assists += 1;
            }
            _ => {}
        })?;
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::ScoreKillAssistAck, echo),
        );
        Ok(())
    }

    /// Killing the ball carrier.
    pub fn score_offense(&self, scorer: u64, echo: &[u8]) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        if !Self::scoring_open(&inner) {
            return Ok(());
        }
        Self::with_player(&inner, scorer, |score| {
            if let GameScore::Touchdown(s) = score {
                s.total += 4;
                s.offense += 1;
            }
        })?;
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::ScoreOffenseAck, echo),
        );
        Ok(())
    }

    pub fn score_offense_assist(
        &self,
        scorer: u64,
        assist: u64,
        echo: &[u8],
    ) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        if !Self::scoring_open(&inner) {
            return Ok(());
        }
        Self::with_player(&inner, scorer, |score| {
            if let GameScore::Touchdown(s) = score {
                s.total += 4;
                s.offense += 1;
            }
        })?;
        Self::with_player(&inner, assist, |score| {
            if let GameScore::Touchdown(s) = score {
                s.total += 2;
                s.offense_assists += 1;
            }
        })?;
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::ScoreOffenseAssistAck, echo),
        );
        Ok(())
    }

    /// Stopping an attacker near the goal.
    pub fn score_defense(&self, scorer: u64, echo: &[u8]) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        if !Self::scoring_open(&inner) {
            return Ok(());
        }
        Self::with_player(&inner, scorer, |score| {
            if let GameScore::Touchdown(s) = score {
                s.total += 4;
                s.defense += 1;
            }
        })?;
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::ScoreDefenseAck, echo),
        );
        Ok(())
    }

    pub fn score_defense_assist(
        &self,
        scorer: u64,
        assist: u64,
        echo: &[u8],
    ) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        if !Self::scoring_open(&inner) {
            return Ok(());
        }
        Self::with_player(&inner, scorer, |score| {
            if let GameScore::Touchdown(s) = score {
                s.total += 4;
                s.defense += 1;
            }
        })?;
        Self::with_player(&inner, assist, |score| {
            if let GameScore::Touchdown(s) = score {
                s.total += 2;
                s.defense_assists += 1;
            }
        })?;
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::ScoreDefenseAssistAck, echo),
        );
        Ok(())
    }

    /// Self-inflicted death. Only Deathmatch tracks it.
    pub fn score_suicide(&self, account: u64, echo: &[u8]) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        if !Self::scoring_open(&inner) {
            return Ok(());
        }
        Self::with_player(&inner, account, |score| {
            if let GameScore::Deathmatch(s) = score {
                s.deaths += 1;
            }
        })?;
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::ScoreSuicideAck, echo),
        );
        Ok(())
    }

    /// Survival kills count without the touchdown guards.
    pub fn score_survival(&self, account: u64, echo: &[u8]) -> Result<(), RoomError> {
        let inner = self.inner.lock();
        Self::with_player(&inner, account, |score| {
            if let GameScore::Survival(s) = score {
                s.total += 1;
                s.kills += 1;
            }
        })?;
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::ScoreSurvivalAck, echo),
        );
        Ok(())
    }

    /// Picking up a fumbled ball. Remembered for the assist window.
    pub fn fumble_recovery(&self, account: u64, echo: &[u8]) -> Result<(), RoomError> {
        let mut inner = self.inner.lock();
        if self.rule != GameRule::Touchdown || !Self::scoring_open(&inner) {
            return Ok(());
        }
        let team = Self::with_player(&inner, account, |score| {
            if let GameScore::Touchdown(s) = score {
                s.total += 2;
                s.recovery += 1;
            }
        })
        .and_then(|_| {
            inner
                .players
                .iter()
                .find(|p| p.account_id() == account)
                .map(|p| p.state().team)
                .ok_or(RoomError::NotInRoom(account))
        })?;
        match team {
            Team::Alpha => inner.last_fumble_alpha = Some((Instant::now(), account)),
            Team::Beta => inner.last_fumble_beta = Some((Instant::now(), account)),
            Team::Neutral => {}
        }
        Self::broadcast_locked(
            &inner,
            &packets::score_ack(MatchOpcode::FumbleReboundAck, echo),
        );
        Ok(())
    }

    /// A touchdown: points, team score, the freeze and the delayed ball
    /// reset. A recovery by a teammate inside the window earns an
    /// assist.
    pub fn touchdown(self: &Arc<Self>, scorer: u64, echo: &[u8]) -> Result<(), RoomError> {
        {
            let mut inner = self.inner.lock();
            if self.rule != GameRule::Touchdown || !Self::scoring_open(&inner) {
                return Ok(());
            }
            let team = inner
                .players
                .iter()
                .find(|p| p.account_id() == scorer)
                .map(|p| p.state().team)
                .ok_or(RoomError::NotInRoom(scorer))?;
            Self::with_player(&inner, scorer, |score| {
                if let GameScore::Touchdown(s) = score {
                    s.total += 10;
                    s.touchdowns += 1;
                }
            })?;
            let last_fumble = match team {
                Team::Alpha => inner.last_fumble_alpha,
                Team::Beta => inner.last_fumble_beta,
                Team::Neutral => None,
            };
            let assist = last_fumble.and_then(|(at, account)| {
                (account != scorer && at.elapsed() <= FUMBLE_ASSIST_WINDOW).then_some(account)
            });
            if let Some(assist) = assist {
                Self::with_player(&inner, assist, |score| {
                    if let GameScore::Touchdown(s) = score {
                        s.total += 5;
                        s.td_assists += 1;
                    }
                })?;
            }
            let event = match team {
                Team::Beta => {
                    inner.score_beta += 1;
                    EventMessage::TouchdownBeta
                }
                _ => {
                    inner.score_alpha += 1;
                    EventMessage::TouchdownAlpha
                }
            };
            inner.td_waiting = true;
            Self::broadcast_locked(&inner, &packets::touchdown(echo));
            match assist {
                Some(assist) => Self::broadcast_locked(
                    &inner,
                    &packets::touchdown_assist(scorer, assist),
                ),
                None => Self::broadcast_locked(&inner, &packets::touchdown_score(scorer)),
            }
            Self::broadcast_locked(&inner, &packets::event_message(event, scorer, 0, ""));
        }

        let weak = Arc::downgrade(self);
        self.spawn_timer(async move {
            tokio::time::sleep(TOUCHDOWN_RESET).await;
            let Some(room) = weak.upgrade() else { return };
            let reset = {
                let mut inner = room.inner.lock();
                inner.td_waiting = false;
                inner.phase == GamePhase::Playing && inner.time_state != TimeState::HalfTime
            };
            if reset {
                room.broadcast(
                    &packets::event_message(EventMessage::ResetRound, 0, 0, ""),
                    None,
                );
            }
        });
        Ok(())
    }

    fn spawn_timer<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut timers = self.timers.lock();
        timers.retain(|h| !h.is_finished());
        timers.push(handle.abort_handle());
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("tunnel_id", &self.tunnel_id)
            .field("number", &self.number)
            .field("rule", &self.rule)
            .finish()
    }
}
