//! Match-service packet dispatch.
//!
//! Frames arrive descrambled. Layout after the marker and opcode is a
//! 4 byte rolling counter the client stamps on every request, then the
//! request payload. Score requests are echoed back to the room wholesale,
//! so their handlers keep a slice of the raw payload around.

use std::sync::Arc;
use std::time::Duration;

use matchforge_protocol::{
    BuyItemResult, EventMessage, MatchKey, MatchOpcode, Packet, PacketReader, PlayerMode,
    ServerResult, Team,
};
use matchforge_room::{packets as room_packets, Room, RoomError, RoomSettings};
use matchforge_session::{Player, ShopItem, ShopKey};
use matchforge_transport::SessionHandle;

use crate::error::MatchforgeError;
use crate::server::MatchServer;

/// Marker + opcode + rolling counter.
const PAYLOAD_OFFSET: usize = 6;
/// Username field width in the login request.
const USERNAME_LEN: usize = 43;
/// Room name field width in the create request.
const ROOM_NAME_LEN: usize = 31;
/// One-time reward for finishing the tutorial.
const TUTORIAL_REWARD: u32 = 5_000;
/// The lobby gets the room list this long after entering a channel.
const ROOM_LIST_DELAY: Duration = Duration::from_secs(1);

pub(crate) fn dispatch(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    body: &[u8],
) -> Result<(), MatchforgeError> {
    let mut reader = PacketReader::parse(body)?;
    let raw_opcode = reader.opcode();
    let player = server.players().get(session.id());
    if !server.plugins().allow_packet(player.as_ref(), raw_opcode, body) {
        tracing::debug!(id = %session.id(), opcode = raw_opcode, "packet vetoed by plugin");
        return Ok(());
    }
    let opcode = match MatchOpcode::from_u8(raw_opcode) {
        Ok(opcode) => opcode,
        Err(_) => {
            tracing::warn!(id = %session.id(), opcode = raw_opcode, "unknown opcode");
            return Ok(());
        }
    };
    reader.skip(4)?;

    match opcode {
        MatchOpcode::KeepAliveReq => Ok(()),
        MatchOpcode::LoginReq => login(server, session, &mut reader),
        MatchOpcode::TimeSyncReq => time_sync(server, session, player.as_ref(), &mut reader),
        MatchOpcode::NatInfoReq => nat_info(session, player, &mut reader),
        MatchOpcode::LogoutReq => {
            session.send(Packet::new(MatchOpcode::LogoutAck).finish());
            session.close();
            Ok(())
        }
        MatchOpcode::ChannelInfoReq => channel_info(server, session, player, &mut reader),
        MatchOpcode::ChannelEnterReq => channel_enter(server, session, player, &mut reader),
        MatchOpcode::ChannelLeaveReq => channel_leave(server, session, player),
        MatchOpcode::CreateRoomReq => create_room(server, session, player, &mut reader),
        MatchOpcode::EnterRoomReq => enter_room(server, session, player, &mut reader),
        MatchOpcode::BeginRoundReq => begin_round(server, player),
        MatchOpcode::ReadyRoundReq => ready_round(server, player),
        MatchOpcode::LeaveRoomReq => leave_room(server, player),
        MatchOpcode::ChangeTeamReq => change_team(server, player, &mut reader),
        MatchOpcode::ChangePlayerModeReq => change_mode(server, player, &mut reader),
        MatchOpcode::KickPlayerReq => kick_player(server, player, &mut reader),
        MatchOpcode::MovePlayer => move_player(server, player, &mut reader),
        MatchOpcode::EventMessageReq => event_message(server, player, &mut reader),
        MatchOpcode::RoomPlayerEnter => room_player_enter(server, player, &mut reader),
        MatchOpcode::ScoreKillReq
        | MatchOpcode::ScoreKillAssistReq
        | MatchOpcode::ScoreOffenseReq
        | MatchOpcode::ScoreOffenseAssistReq
        | MatchOpcode::ScoreDefenseReq
        | MatchOpcode::ScoreDefenseAssistReq
        | MatchOpcode::ScoreSuicideReq
        | MatchOpcode::ScoreSurvivalReq
        | MatchOpcode::FumbleReboundReq
        | MatchOpcode::Touchdown => score(server, player, opcode, &mut reader, &body[PAYLOAD_OFFSET..]),
        MatchOpcode::BuyItemReq => buy_item(server, session, player, &mut reader),
        MatchOpcode::TutorialCompletedReq => tutorial_completed(server, session, player),
        MatchOpcode::AdminShowWindowReq => {
            if player.is_some() {
                let mut pkt = Packet::new(MatchOpcode::AdminShowWindowAck);
                pkt.write_bool(true);
                session.send(pkt.finish());
            }
            Ok(())
        }
        MatchOpcode::AdminActionReq => admin_action(server, session, player, &mut reader),
        other => {
            tracing::trace!(id = %session.id(), ?other, "unhandled opcode");
            Ok(())
        }
    }
}

fn login_ack(account_id: u64, result: u32) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::LoginAck);
    pkt.write_u64(account_id);
    pkt.write_u32(result);
    pkt.finish()
}

fn cash_update(pen: u32, ap: u32) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::CashUpdateAck);
    pkt.write_u32(pen);
    pkt.write_u32(ap);
    pkt.finish()
}

/// Login failure code shown by the client as "wrong id or password".
const LOGIN_FAILED: u32 = 5;

fn login(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let username = reader.read_cstring_buffer(USERNAME_LEN)?;
    let token = reader.read_u32()?;

    let account_id = match server.store().account_id_by_username(&username)? {
        Some(id) => id,
        None => {
            tracing::warn!(id = %session.id(), username, "login for unknown account");
            session.send(login_ack(0, LOGIN_FAILED));
            session.close();
            return Ok(());
        }
    };
    let Some(record) = server.store().get_player(account_id)? else {
        session.send(login_ack(0, LOGIN_FAILED));
        session.close();
        return Ok(());
    };
    if !server
        .validator()
        .validate(account_id, token, session.peer_addr())
    {
        tracing::warn!(id = %session.id(), account_id, "session token rejected");
        session.send(login_ack(0, LOGIN_FAILED));
        session.close();
        return Ok(());
    }
    if server.players().contains_account(account_id) {
        tracing::warn!(id = %session.id(), account_id, "duplicate login");
        session.close();
        return Ok(());
    }

    let player = Player::new(session.clone(), account_id, record.nickname.clone());
    {
        let mut state = player.state();
        state.session_token = token;
        state.level = record.level;
        state.exp = record.exp;
        state.pen = record.pen;
        state.ap = record.ap;
        state.tutorial_completed = record.tutorial_completed;
        state.td_stats = record.td_stats;
        state.dm_stats = record.dm_stats;
    }
    server.players().insert(session.id(), Arc::clone(&player));
    tracing::info!(id = %session.id(), account_id, nickname = %record.nickname, "login");
    session.send(login_ack(account_id, 0));
    session.send(cash_update(record.pen, record.ap));
    Ok(())
}

fn time_sync(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<&Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let client_time = reader.read_u32()?;
    let uptime = server.uptime_ms();
    if let Some(player) = player {
        let mut state = player.state();
        // Sync requests run on a three second cadence; anything past
        // that is the wire.
        state.ping = uptime
            .saturating_sub(state.last_sync)
            .saturating_sub(3_000);
        state.last_sync = uptime;
    }
    let mut pkt = Packet::new(MatchOpcode::TimeSyncAck);
    pkt.write_u32(client_time);
    pkt.write_u32(uptime);
    session.send(pkt.finish());
    Ok(())
}

fn nat_info(
    session: &SessionHandle,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let mut state = player.state();
    state.nat.private_ip = reader.read_u32()?;
    state.nat.private_port = reader.read_u16()?;
    state.nat.public_ip = reader.read_u32()?;
    state.nat.public_port = reader.read_u16()?;
    state.nat.unk = reader.read_u16()?;
    state.nat.connection_type = reader.read_u8()?;
    // Clients report what they think their endpoint is; the socket
    // knows better.
    state.nat.correct_public(session.peer_addr());
    Ok(())
}

/// Request kinds carried in the channel info request.
const CHANNEL_LIST: u8 = 5;
const ROOM_LIST: u8 = 4;

fn room_list_frame(server: &Arc<MatchServer>, channel_id: u16) -> Vec<u8> {
    let rooms = server.rooms().rooms_in_channel(channel_id);
    let mut pkt = Packet::new(MatchOpcode::RoomListAck);
    pkt.write_u8(rooms.len() as u8);
    for room in rooms {
        room.write_header(&mut pkt);
    }
    pkt.finish()
}

fn channel_info(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    match reader.read_u8()? {
        CHANNEL_LIST => {
            let channels = server.channels().snapshot();
            let mut pkt = Packet::new(MatchOpcode::ChannelInfoAck);
            pkt.write_u8(channels.len() as u8);
            for channel in channels {
                pkt.write_u16(channel.id());
                pkt.write_u16(channel.member_count() as u16);
            }
            session.send(pkt.finish());
        }
        ROOM_LIST => {
            if let Some(channel_id) = player.and_then(|p| p.channel_id()) {
                session.send(room_list_frame(server, channel_id));
            }
        }
        other => {
            tracing::debug!(id = %session.id(), kind = other, "unknown channel info request");
        }
    }
    Ok(())
}

fn channel_enter(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let channel_id = reader.read_u16()?;
    let Some(player) = player else { return Ok(()) };
    let Some(channel) = server.channels().get(channel_id) else {
        session.send(room_packets::result(ServerResult::FailedToRequestTask));
        return Ok(());
    };
    if let Some(previous) = player.channel_id().and_then(|id| server.channels().get(id)) {
        previous.leave(&player);
    }
    channel.join(&player);
    session.send(room_packets::result(ServerResult::EnteredChannel));
    let (pen, ap) = {
        let state = player.state();
        (state.pen, state.ap)
    };
    session.send(cash_update(pen, ap));

    // The client draws the lobby first and wants the list a beat later.
    let server = Arc::clone(server);
    let session = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ROOM_LIST_DELAY).await;
        if !session.is_closed() {
            session.send(room_list_frame(&server, channel_id));
        }
    });
    Ok(())
}

fn channel_leave(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    if let Some(channel) = player.channel_id().and_then(|id| server.channels().get(id)) {
        channel.leave(&player);
    }
    session.send(room_packets::result(ServerResult::LeftChannel));
    Ok(())
}

fn create_room(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let Some(channel) = player.channel_id().and_then(|id| server.channels().get(id)) else {
        return Ok(());
    };

    let name = reader.read_cstring_buffer(ROOM_NAME_LEN)?;
    let mut key = [0u8; 4];
    key.copy_from_slice(reader.read_bytes(4)?);
    let match_key = MatchKey::from_bytes(key);
    let time_limit = Duration::from_millis(u64::from(reader.read_u8()?) * 60_000);
    let score_limit = reader.read_u8()?;
    reader.read_i32()?;
    let password = reader.read_u32()?;
    let settings = RoomSettings {
        name,
        match_key,
        time_limit,
        score_limit,
        password,
        is_friendly: reader.read_bool()?,
        is_balanced: reader.read_bool()?,
        min_level: reader.read_u8()?,
        max_level: reader.read_u8()?,
        equip_limit: reader.read_u8()?,
        no_intrusion: reader.read_bool()?,
    };

    if !server.store().is_valid_map(match_key.map_id()) {
        tracing::warn!(
            account = player.account_id(),
            map = match_key.map_id(),
            "room creation with tampered map id"
        );
        session.send(room_packets::result(ServerResult::FailedToRequestTask));
        return Ok(());
    }
    let room = match server
        .rooms()
        .create(channel, settings, Arc::clone(server.store()))
    {
        Ok(room) => room,
        Err(RoomError::InvalidMatchKey) => {
            tracing::warn!(
                account = player.account_id(),
                "room creation with tampered match key"
            );
            session.send(room_packets::result(ServerResult::FailedToRequestTask));
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };
    if !server.plugins().allow_create_room(&player, &room) {
        server.rooms().remove(room.tunnel_id());
        session.send(room_packets::result(ServerResult::FailedToRequestTask));
        return Ok(());
    }
    room.join(&player)?;
    Ok(())
}

fn enter_room(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let number = reader.read_u32()?;
    let password = reader.read_u32()?;
    let Some(player) = player else { return Ok(()) };
    let Some(channel_id) = player.channel_id() else {
        return Ok(());
    };
    let Some(room) = server.rooms().room_by_number(channel_id, number) else {
        session.send(room_packets::result(ServerResult::ImpossibleToEnterRoom));
        return Ok(());
    };
    if room.settings().password != 0 && room.settings().password != password {
        session.send(room_packets::result(ServerResult::PasswordError));
        return Ok(());
    }
    if room.join(&player).is_err() {
        session.send(room_packets::result(ServerResult::ImpossibleToEnterRoom));
    }
    Ok(())
}

fn room_of(server: &Arc<MatchServer>, player: &Arc<Player>) -> Option<Arc<Room>> {
    player.room_tunnel().and_then(|tunnel| server.rooms().get(tunnel))
}

fn begin_round(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let Some(room) = room_of(server, &player) else {
        return Ok(());
    };
    if !server.plugins().allow_begin_round(&player, &room) {
        return Ok(());
    }
    match room.begin_round(player.account_id()) {
        Ok(()) => {}
        Err(RoomError::CannotStart) => {
            room.broadcast(
                &room_packets::event_message(EventMessage::CantStartGame, 0, 0, ""),
                None,
            );
        }
        Err(error) => {
            tracing::debug!(account = player.account_id(), %error, "round start refused");
        }
    }
    Ok(())
}

fn ready_round(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let Some(room) = room_of(server, &player) else {
        return Ok(());
    };
    if !server.plugins().allow_ready_round(&player, &room) {
        return Ok(());
    }
    if let Err(error) = room.toggle_ready(&player) {
        tracing::debug!(account = player.account_id(), %error, "ready refused");
    }
    Ok(())
}

fn leave_room(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let Some(room) = room_of(server, &player) else {
        return Ok(());
    };
    if room.leave(&player, EventMessage::LeftRoom.into()) {
        server.rooms().remove(room.tunnel_id());
    }
    Ok(())
}

fn change_team(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let team = reader.read_u8()?;
    let Some(player) = player else { return Ok(()) };
    let (Some(room), Some(team)) = (room_of(server, &player), Team::from_u8(team)) else {
        return Ok(());
    };
    if let Err(error) = room.change_team(&player, team) {
        tracing::debug!(account = player.account_id(), %error, "team change refused");
    }
    Ok(())
}

fn change_mode(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let mode = reader.read_u8()?;
    let Some(player) = player else { return Ok(()) };
    let (Some(room), Some(mode)) = (room_of(server, &player), PlayerMode::from_u8(mode)) else {
        return Ok(());
    };
    if let Err(error) = room.change_mode(&player, mode) {
        tracing::debug!(account = player.account_id(), %error, "mode change refused");
    }
    Ok(())
}

fn kick_player(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let target = reader.read_u64()?;
    let Some(player) = player else { return Ok(()) };
    let Some(room) = room_of(server, &player) else {
        return Ok(());
    };
    match room.kick(player.account_id(), target) {
        Ok(true) => {
            server.rooms().remove(room.tunnel_id());
        }
        Ok(false) => {}
        Err(error) => {
            tracing::debug!(account = player.account_id(), %error, "kick refused");
        }
    }
    Ok(())
}

fn move_player(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let target = reader.read_u64()?;
    let team = reader.read_u8()?;
    let Some(player) = player else { return Ok(()) };
    let (Some(room), Some(team)) = (room_of(server, &player), Team::from_u8(team)) else {
        return Ok(());
    };
    if room.master() != Some(player.account_id()) {
        return Ok(());
    }
    let Some(target) = room.find_player(target) else {
        return Ok(());
    };
    if let Err(error) = room.change_team(&target, team) {
        tracing::debug!(account = target.account_id(), %error, "move refused");
    }
    Ok(())
}

/// The entering client announces itself and the frame is echoed to the
/// whole room so everyone redraws the seat.
fn room_player_enter(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let payload = reader.read_remaining().to_vec();
    let Some(player) = player else { return Ok(()) };
    let Some(room) = room_of(server, &player) else {
        return Ok(());
    };
    let mut pkt = Packet::new(MatchOpcode::RoomPlayerEnter);
    pkt.write_bytes(&payload);
    room.broadcast(&pkt.finish(), None);
    Ok(())
}

fn event_message(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let event = reader.read_u8()?;
    let account = reader.read_u64()?;
    let value = reader.read_u32()?;
    reader.read_u16()?;
    let text = if reader.remaining() > 0 {
        reader.read_cstring()?
    } else {
        String::new()
    };
    let Some(player) = player else { return Ok(()) };
    let Some(room) = room_of(server, &player) else {
        return Ok(());
    };
    let Some(event) = EventMessage::from_u8(event) else {
        return Ok(());
    };
    // The start-game line doubles as the late-join signal.
    if event == EventMessage::StartGame {
        room.late_join(&player);
    }
    room.broadcast(
        &room_packets::event_message(event, account, value, &text),
        None,
    );
    Ok(())
}

fn score(
    server: &Arc<MatchServer>,
    player: Option<Arc<Player>>,
    opcode: MatchOpcode,
    reader: &mut PacketReader<'_>,
    echo: &[u8],
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let Some(room) = room_of(server, &player) else {
        return Ok(());
    };
    let outcome = match opcode {
        MatchOpcode::ScoreKillReq => {
            let killer = reader.read_u64()?;
            let victim = reader.read_u64()?;
            room.score_kill(killer, victim, echo)
        }
        MatchOpcode::ScoreKillAssistReq => {
            let killer = reader.read_u64()?;
            let assist = reader.read_u64()?;
            let victim = reader.read_u64()?;
            room.score_kill_assist(killer, assist, victim, echo)
        }
        MatchOpcode::ScoreOffenseReq => {
            let scorer = reader.read_u64()?;
            room.score_offense(scorer, echo)
        }
        MatchOpcode::ScoreOffenseAssistReq => {
            let scorer = reader.read_u64()?;
            let assist = reader.read_u64()?;
            room.score_offense_assist(scorer, assist, echo)
        }
        MatchOpcode::ScoreDefenseReq => {
            let scorer = reader.read_u64()?;
            room.score_defense(scorer, echo)
        }
        MatchOpcode::ScoreDefenseAssistReq => {
            let scorer = reader.read_u64()?;
            let assist = reader.read_u64()?;
            room.score_defense_assist(scorer, assist, echo)
        }
        MatchOpcode::ScoreSuicideReq => {
            let account = reader.read_u64()?;
            room.score_suicide(account, echo)
        }
        MatchOpcode::ScoreSurvivalReq => {
            let account = reader.read_u64()?;
            room.score_survival(account, echo)
        }
        MatchOpcode::FumbleReboundReq => {
            let account = reader.read_u64()?;
            room.fumble_recovery(account, echo)
        }
        MatchOpcode::Touchdown => {
            let account = reader.read_u64()?;
            room.touchdown(account, echo)
        }
        _ => Ok(()),
    };
    if let Err(error) = outcome {
        tracing::debug!(account = player.account_id(), %error, "score rejected");
    }
    Ok(())
}

fn buy_item_ack(result: BuyItemResult, item: Option<(&ShopItem, u32)>) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::BuyItemAck);
    pkt.write_u8(result.into());
    if let Some((item, effect)) = item {
        pkt.write_u8(item.category);
        pkt.write_u8(item.sub_category);
        pkt.write_u16(item.item_id);
        pkt.write_u8(item.product_id);
        pkt.write_u32(effect);
    }
    pkt.finish()
}

fn buy_item(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let count = reader.read_u8()?;
    let mut requested: Vec<(ShopKey, u32)> = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let category = reader.read_u8()?;
        let sub_category = reader.read_u8()?;
        let item_id = reader.read_u16()?;
        let product_id = reader.read_u8()?;
        let effect = reader.read_u32()?;
        requested.push(((category, sub_category, item_id, product_id), effect));
    }

    let mut items: Vec<(ShopItem, u32)> = Vec::with_capacity(requested.len());
    for (key, effect) in &requested {
        match server.store().shop_item(*key)? {
            Some(item) => items.push((item, *effect)),
            None => {
                // Prices live server-side; naming an item that does not
                // exist means the client is forged.
                tracing::warn!(
                    account = player.account_id(),
                    ?key,
                    "purchase of unknown shop item"
                );
                session.close();
                return Ok(());
            }
        }
    }

    let total: u32 = items.iter().map(|(item, _)| item.price).sum();
    if player.state().pen < total {
        session.send(buy_item_ack(BuyItemResult::NotEnoughMoney, None));
        return Ok(());
    }
    let keys: Vec<ShopKey> = requested.iter().map(|(key, _)| *key).collect();
    server.plugins().notify_buy_item(&player, &keys);

    for (item, _) in &items {
        if let Err(error) = server.store().record_purchase(player.account_id(), item) {
            tracing::error!(account = player.account_id(), %error, "purchase write failed");
            session.send(buy_item_ack(BuyItemResult::DbError, None));
            return Ok(());
        }
    }
    let (pen, ap) = {
        let mut state = player.state();
        state.pen -= total;
        (state.pen, state.ap)
    };
    server.store().update_money(player.account_id(), pen, ap)?;
    for (item, effect) in &items {
        session.send(buy_item_ack(BuyItemResult::Ok, Some((item, *effect))));
    }
    session.send(cash_update(pen, ap));
    Ok(())
}

fn tutorial_completed(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
) -> Result<(), MatchforgeError> {
    let Some(player) = player else { return Ok(()) };
    let (pen, ap, first_time) = {
        let mut state = player.state();
        if state.tutorial_completed {
            (state.pen, state.ap, false)
        } else {
            state.tutorial_completed = true;
            state.pen += TUTORIAL_REWARD;
            (state.pen, state.ap, true)
        }
    };
    if first_time {
        server.store().set_tutorial_completed(player.account_id())?;
        server.store().update_money(player.account_id(), pen, ap)?;
        session.send(cash_update(pen, ap));
    }
    Ok(())
}

fn admin_action(
    server: &Arc<MatchServer>,
    session: &SessionHandle,
    player: Option<Arc<Player>>,
    reader: &mut PacketReader<'_>,
) -> Result<(), MatchforgeError> {
    let command = reader.read_cstring()?;
    let Some(player) = player else { return Ok(()) };
    let args: Vec<&str> = command.split_whitespace().collect();
    let response = server
        .plugins()
        .admin_action(&player, &args)
        .unwrap_or_else(|| format!("unknown command: {command}"));
    let mut pkt = Packet::new(MatchOpcode::AdminActionAck);
    pkt.write_cstring(&response);
    session.send(pkt.finish());
    Ok(())
}
