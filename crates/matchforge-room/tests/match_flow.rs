//! Full match flow: join, rounds, scoring, half time and results.

use std::sync::Arc;
use std::time::Duration;

use matchforge_protocol::{GamePhase, GameRule, MatchKey, MatchOpcode, PlayState, Team, TimeState};
use matchforge_room::{RoomRegistry, RoomSettings};
use matchforge_session::{Channel, GameScore, MemoryStore, Player, PlayerRecord, PlayerStore};
use matchforge_transport::{SessionHandle, SessionId};
use tokio::sync::mpsc;

struct Fixture {
    registry: RoomRegistry,
    channel: Arc<Channel>,
    store: Arc<MemoryStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            channel: Arc::new(Channel::new(1, "Rookie")),
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn settings(&self, rule: GameRule, score_limit: u8, time_limit: Duration) -> RoomSettings {
        RoomSettings {
            name: "scrim".into(),
            match_key: MatchKey::compose(rule, 1, 5, true),
            time_limit,
            score_limit,
            password: 0,
            is_friendly: false,
            is_balanced: false,
            min_level: 0,
            max_level: 100,
            equip_limit: 0,
            no_intrusion: false,
        }
    }

    fn player(&self, id: u64) -> (Arc<Player>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (session, rx) = SessionHandle::piped(SessionId::new(id));
        let player = Player::new(session, 1000 + id, format!("p{id}"));
        self.store.insert_player(PlayerRecord {
            account_id: player.account_id(),
            username: format!("user{id}"),
            nickname: player.nickname().to_owned(),
            ..Default::default()
        });
        self.channel.join(&player);
        (player, rx)
    }
}

fn opcodes(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    let mut seen = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        seen.push(frame[3]);
    }
    seen
}

#[tokio::test]
async fn join_assigns_slots_and_balances_teams() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Touchdown, 6, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    let (c, _crx) = fx.player(3);
    room.join(&a).unwrap();
    room.join(&b).unwrap();
    room.join(&c).unwrap();

    assert_eq!(a.slot(), 2);
    assert_eq!(b.slot(), 3);
    assert_eq!(c.slot(), 4);
    assert_eq!(a.team(), Team::Alpha);
    assert_eq!(b.team(), Team::Beta);
    assert_eq!(c.team(), Team::Alpha);
    assert_eq!(room.master(), Some(a.account_id()));
    assert_eq!(a.room_tunnel(), Some(room.tunnel_id()));
}

#[tokio::test]
async fn full_room_rejects_entry() {
    let fx = Fixture::new();
    // Capacity code 3 caps the room at four players.
    let mut settings = fx.settings(GameRule::Touchdown, 6, Duration::from_secs(600));
    settings.match_key = MatchKey::compose(GameRule::Touchdown, 1, 3, true);
    let room = fx
        .registry
        .create(Arc::clone(&fx.channel), settings, fx.store.clone())
        .unwrap();

    let mut keep = Vec::new();
    for id in 1..=4 {
        let (plr, rx) = fx.player(id);
        room.join(&plr).unwrap();
        keep.push((plr, rx));
    }
    let (fifth, _rx) = fx.player(5);
    assert!(room.join(&fifth).is_err());
}

#[tokio::test]
async fn master_leaving_promotes_and_empty_room_reports_it() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Touchdown, 6, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, mut brx) = fx.player(2);
    room.join(&a).unwrap();
    room.join(&b).unwrap();

    assert!(!room.leave(&a, 3));
    assert_eq!(room.master(), Some(b.account_id()));
    assert_eq!(a.room_tunnel(), None);
    assert_eq!(a.slot(), 0);
    assert!(matches!(a.state().score, GameScore::Idle));
    let seen = opcodes(&mut brx);
    assert!(seen.contains(&u8::from(MatchOpcode::ChangeMasterAck)));

    assert!(room.leave(&b, 3));
    fx.registry.remove(room.tunnel_id());
    assert!(fx.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn round_start_and_score_limit_drive_the_half_time_cycle() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            // Score limit 2 puts half time at one touchdown.
            fx.settings(GameRule::Touchdown, 2, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, mut arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    room.join(&a).unwrap();
    room.join(&b).unwrap();
    b.state().ready = true;

    room.begin_round(a.account_id()).unwrap();
    assert_eq!(room.phase(), GamePhase::Playing);
    assert_eq!(room.time_state(), TimeState::FirstHalf);
    assert_eq!(a.state().play_state, PlayState::Alive);
    let seen = opcodes(&mut arx);
    assert!(seen.contains(&u8::from(MatchOpcode::BriefingAck)));
    assert!(seen.contains(&u8::from(MatchOpcode::RoomStateAck)));

    room.touchdown(a.account_id(), &[]).unwrap();
    assert_eq!(room.scores(), (1, 0));
    room.update();
    assert_eq!(room.time_state(), TimeState::HalfTime);

    // Ten countdown lines, then the break, then the second half.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(room.time_state(), TimeState::HalfTime);
    tokio::time::sleep(Duration::from_secs(26)).await;
    assert_eq!(room.time_state(), TimeState::SecondHalf);
    let seen = opcodes(&mut arx);
    assert!(seen.contains(&u8::from(MatchOpcode::RoomSubStateAck)));
    assert!(seen.contains(&u8::from(MatchOpcode::EventMessageAck)));
}

#[tokio::test(start_paused = true)]
async fn second_half_score_limit_ends_the_match_and_pays_out() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Touchdown, 2, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    room.join(&a).unwrap();
    room.join(&b).unwrap();
    b.state().ready = true;
    room.begin_round(a.account_id()).unwrap();

    room.touchdown(a.account_id(), &[]).unwrap();
    room.update();
    // Skip through the break into the second half.
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(room.time_state(), TimeState::SecondHalf);

    // Touchdowns are frozen for ten seconds after each score.
    tokio::time::sleep(Duration::from_secs(11)).await;
    room.touchdown(a.account_id(), &[]).unwrap();
    room.update();
    assert_eq!(room.phase(), GamePhase::Result);

    let record = fx.store.get_player(a.account_id()).unwrap().unwrap();
    assert!(record.pen > 0, "scorer should earn currency");
    assert_eq!(record.td_stats.matches, 1);
    assert_eq!(record.td_stats.won, 1);

    // Result screen runs out and the room resets to the lobby.
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(room.phase(), GamePhase::Waiting);
    assert_eq!(a.state().play_state, PlayState::Lobby);
    assert_eq!(room.scores(), (0, 0));
}

#[tokio::test(start_paused = true)]
async fn fumble_recovery_inside_the_window_earns_the_assist() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Touchdown, 10, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    let (c, _crx) = fx.player(3);
    room.join(&a).unwrap(); // alpha
    room.join(&b).unwrap(); // beta
    room.join(&c).unwrap(); // alpha
    b.state().ready = true;
    c.state().ready = true;
    room.begin_round(a.account_id()).unwrap();

    room.fumble_recovery(c.account_id(), &[]).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    room.touchdown(a.account_id(), &[]).unwrap();

    let a_state = a.state();
    match &a_state.score {
        GameScore::Touchdown(score) => {
            assert_eq!(score.touchdowns, 1);
            assert_eq!(score.total, 10);
        }
        other => panic!("unexpected score {other:?}"),
    }
    let c_state = c.state();
    match &c_state.score {
        GameScore::Touchdown(score) => {
            assert_eq!(score.td_assists, 1);
            // Recovery paid 2, the assist 5 more.
            assert_eq!(score.total, 7);
        }
        other => panic!("unexpected score {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stale_recovery_earns_no_assist() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Touchdown, 10, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    let (c, _crx) = fx.player(3);
    room.join(&a).unwrap();
    room.join(&b).unwrap();
    room.join(&c).unwrap();
    b.state().ready = true;
    c.state().ready = true;
    room.begin_round(a.account_id()).unwrap();

    room.fumble_recovery(c.account_id(), &[]).unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    room.touchdown(a.account_id(), &[]).unwrap();

    let c_state = c.state();
    match &c_state.score {
        GameScore::Touchdown(score) => {
            assert_eq!(score.td_assists, 0);
            assert_eq!(score.total, 2);
        }
        other => panic!("unexpected score {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn deathmatch_kills_move_the_team_score() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Deathmatch, 50, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    room.join(&a).unwrap();
    room.join(&b).unwrap();
    b.state().ready = true;
    room.begin_round(a.account_id()).unwrap();

    room.score_kill(a.account_id(), b.account_id(), &[1, 2]).unwrap();
    assert_eq!(room.scores(), (1, 0));
    let a_state = a.state();
    match &a_state.score {
        GameScore::Deathmatch(score) => {
            assert_eq!(score.kills, 1);
            assert_eq!(score.total, 2);
        }
        other => panic!("unexpected score {other:?}"),
    }
    let b_state = b.state();
    match &b_state.score {
        GameScore::Deathmatch(score) => assert_eq!(score.deaths, 1),
        other => panic!("unexpected score {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn leaving_mid_round_forces_the_result_when_a_team_empties() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Deathmatch, 50, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    room.join(&a).unwrap();
    room.join(&b).unwrap();
    b.state().ready = true;
    room.begin_round(a.account_id()).unwrap();

    assert!(!room.leave(&b, 3));
    assert_eq!(room.phase(), GamePhase::Result);
}

#[tokio::test]
async fn survival_round_starts_with_a_solo_master() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Survival, 0, Duration::from_secs(60)),
            fx.store.clone(),
        )
        .unwrap();

    // Auto-balance puts a lone player on Alpha; survival is co-op, so
    // the empty Beta bench must not block the start.
    let (a, _arx) = fx.player(1);
    room.join(&a).unwrap();
    room.begin_round(a.account_id()).unwrap();
    assert_eq!(room.phase(), GamePhase::Playing);
    assert_eq!(a.state().play_state, PlayState::Alive);
}

#[tokio::test]
async fn team_rules_still_need_a_ready_player_on_both_teams() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Touchdown, 6, Duration::from_secs(600)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    room.join(&a).unwrap();
    assert!(room.begin_round(a.account_id()).is_err());
    assert_eq!(room.phase(), GamePhase::Waiting);
}

#[tokio::test(start_paused = true)]
async fn survival_round_runs_the_full_time_limit() {
    let fx = Fixture::new();
    let room = fx
        .registry
        .create(
            Arc::clone(&fx.channel),
            fx.settings(GameRule::Survival, 0, Duration::from_secs(60)),
            fx.store.clone(),
        )
        .unwrap();

    let (a, _arx) = fx.player(1);
    let (b, _brx) = fx.player(2);
    room.join(&a).unwrap();
    room.join(&b).unwrap();
    b.state().ready = true;
    room.begin_round(a.account_id()).unwrap();

    room.score_survival(a.account_id(), &[]).unwrap();
    match &a.state().score {
        GameScore::Survival(score) => assert_eq!(score.kills, 1),
        other => panic!("unexpected score {other:?}"),
    }

    // Half the limit is not enough; survival plays the whole hour glass.
    tokio::time::sleep(Duration::from_secs(31)).await;
    room.update();
    assert_eq!(room.phase(), GamePhase::Playing);
    tokio::time::sleep(Duration::from_secs(30)).await;
    room.update();
    assert_eq!(room.phase(), GamePhase::Result);
}
