//! Outbound match-service frames built by the room engine.
//!
//! Every function returns a finished wire frame, ready for
//! `SessionHandle::send`. Field layouts follow the client's reader for
//! each opcode; fixed zero fields the client skips are written as
//! literals.

use matchforge_protocol::{
    EventMessage, GamePhase, MatchKey, MatchOpcode, Packet, ServerResult, Team, TimeState,
};

use crate::room::RoomSettings;

/// Nickname field width used by roster and leave frames.
pub const NICKNAME_LEN: usize = 31;

pub fn result(result: ServerResult) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::ResultAck);
    pkt.write_u32(result.into());
    pkt.finish()
}

/// Writes one room header, the shape shared by the deploy ack and the
/// room list.
pub fn write_room_header(
    pkt: &mut Packet,
    number: u32,
    settings: &RoomSettings,
    phase: GamePhase,
    player_count: u8,
    quality: u8,
) {
    pkt.write_u32(number);
    pkt.write_bytes(settings.match_key.as_bytes());
    pkt.write_u8(u8::from(phase));
    pkt.write_u8(player_count);
    pkt.write_u8(quality);
    pkt.write_cstring(&settings.name);
    pkt.write_bool(settings.password != 0);
    pkt.write_u32(settings.time_limit.as_millis() as u32);
    pkt.write_u8(settings.score_limit);
    pkt.write_bool(settings.is_friendly);
    pkt.write_bool(settings.is_balanced);
    pkt.write_u8(settings.min_level);
    pkt.write_u8(settings.max_level);
    pkt.write_u8(settings.equip_limit);
    pkt.write_bool(settings.no_intrusion);
}

/// Room header shown in the channel's room list.
pub fn deploy_room(
    number: u32,
    settings: &RoomSettings,
    phase: GamePhase,
    player_count: u8,
    quality: u8,
) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::DeployRoomAck);
    write_room_header(&mut pkt, number, settings, phase, player_count, quality);
    pkt.finish()
}

pub fn dispose_room(number: u32) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::DisposeRoomAck);
    pkt.write_u32(number);
    pkt.finish()
}

/// Sent to a player entering a room. `elapsed_ms` is zero outside a
/// live round.
#[allow(clippy::too_many_arguments)]
pub fn enter_success(
    number: u32,
    match_key: MatchKey,
    phase: GamePhase,
    time_state: TimeState,
    time_limit_ms: u32,
    elapsed_ms: u32,
    score_limit: u8,
    settings: &RoomSettings,
) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::EnterRoomSuccessAck);
    pkt.write_u32(number);
    pkt.write_bytes(match_key.as_bytes());
    pkt.write_u32(u32::from(u8::from(phase)));
    pkt.write_u32(u32::from(u8::from(time_state)));
    pkt.write_u32(time_limit_ms);
    pkt.write_u32(elapsed_ms);
    pkt.write_u8(score_limit);
    pkt.write_bool(settings.is_friendly);
    pkt.write_bool(settings.is_balanced);
    pkt.write_u8(settings.min_level);
    pkt.write_u8(settings.max_level);
    pkt.write_u8(settings.equip_limit);
    pkt.write_bool(settings.no_intrusion);
    pkt.finish()
}

/// Tells the entering player their slot and the relay tunnel to join.
pub fn slot_info(slot: u8, tunnel_id: u32) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::SlotInfoAck);
    pkt.write_u8(slot);
    pkt.write_u32(tunnel_id);
    pkt.write_u8(0);
    pkt.finish()
}

/// One line of the room roster.
pub struct RosterEntry {
    pub private_ip: u32,
    pub private_port: u16,
    pub public_ip: u32,
    pub public_port: u16,
    pub nat_unk: u16,
    pub connection_type: u8,
    pub account_id: u64,
    pub slot: u8,
    pub nickname: String,
}

/// Full roster, broadcast whenever membership changes.
pub fn roster(entries: &[RosterEntry]) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::RosterAck);
    pkt.write_u8(entries.len() as u8);
    for entry in entries {
        pkt.write_u32(entry.private_ip);
        pkt.write_u16(entry.private_port);
        pkt.write_u32(entry.public_ip);
        pkt.write_u16(entry.public_port);
        pkt.write_u16(entry.nat_unk);
        pkt.write_u8(entry.connection_type);
        pkt.write_u64(entry.account_id);
        pkt.write_u8(entry.slot);
        pkt.write_u32(0);
        pkt.write_u8(1);
        pkt.write_string_buffer(&entry.nickname, NICKNAME_LEN);
    }
    pkt.finish()
}

pub fn player_left_room(account_id: u64, nickname: &str, leave_type: u8) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::PlayerLeftRoom);
    pkt.write_u64(account_id);
    pkt.write_string_buffer(nickname, NICKNAME_LEN);
    pkt.write_u8(leave_type);
    pkt.finish()
}

pub fn player_leave(account_id: u64, slot: u8) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::PlayerLeaveAck);
    pkt.write_u64(account_id);
    pkt.write_u8(slot);
    pkt.finish()
}

pub fn change_master(account_id: u64) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::ChangeMasterAck);
    pkt.write_u64(account_id);
    pkt.finish()
}

pub fn change_referee(account_id: u64) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::ChangeRefereeAck);
    pkt.write_u64(account_id);
    pkt.finish()
}

pub fn ready(account_id: u64, is_ready: bool) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::ReadyAck);
    pkt.write_u64(account_id);
    pkt.write_bool(is_ready);
    pkt.finish()
}

pub fn change_team(account_id: u64, team: Team, mode: u8) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::ChangeTeamAck);
    pkt.write_u64(account_id);
    pkt.write_u8(team.into());
    pkt.write_u8(mode);
    pkt.finish()
}

pub fn room_state(phase: GamePhase) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::RoomStateAck);
    pkt.write_u8(phase.into());
    pkt.finish()
}

pub fn room_sub_state(time_state: TimeState) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::RoomSubStateAck);
    pkt.write_u8(time_state.into());
    pkt.finish()
}

/// In-room event line, also used for countdowns and chat echoes.
pub fn event_message(event: EventMessage, account_id: u64, value: u32, text: &str) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::EventMessageAck);
    pkt.write_u8(event.into());
    pkt.write_u64(account_id);
    pkt.write_u32(value);
    pkt.write_u16(0);
    pkt.write_cstring(text);
    pkt.finish()
}

/// Score acks echo the request payload and close with a confirm byte.
pub fn score_ack(opcode: MatchOpcode, echo: &[u8]) -> Vec<u8> {
    let mut pkt = Packet::new(opcode);
    pkt.write_bytes(echo);
    pkt.write_u8(0);
    pkt.finish()
}

pub fn touchdown(echo: &[u8]) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::Touchdown);
    pkt.write_bytes(echo);
    pkt.write_u8(0);
    pkt.finish()
}

pub fn touchdown_score(account_id: u64) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::TouchdownScoreAck);
    pkt.write_u64(account_id);
    pkt.finish()
}

pub fn touchdown_assist(scorer: u64, assist: u64) -> Vec<u8> {
    let mut pkt = Packet::new(MatchOpcode::TouchdownAssistAck);
    pkt.write_u32(0);
    pkt.write_u64(scorer);
    pkt.write_u64(assist);
    pkt.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchforge_protocol::{GameRule, PacketReader};
    use std::time::Duration;

    fn settings() -> RoomSettings {
        RoomSettings {
            name: "scrim".into(),
            match_key: MatchKey::compose(GameRule::Touchdown, 1, 5, true),
            time_limit: Duration::from_secs(600),
            score_limit: 6,
            password: 0,
            is_friendly: false,
            is_balanced: true,
            min_level: 0,
            max_level: 100,
            equip_limit: 0,
            no_intrusion: false,
        }
    }

    #[test]
    fn deploy_room_frame_parses_back() {
        let frame = deploy_room(3, &settings(), GamePhase::Waiting, 1, 100);
        let mut reader = PacketReader::parse_wire(&frame).unwrap();
        assert_eq!(reader.opcode(), u8::from(MatchOpcode::DeployRoomAck));
        assert_eq!(reader.read_u32().unwrap(), 3);
        let key = MatchKey::from_bytes([
            reader.read_u8().unwrap(),
            reader.read_u8().unwrap(),
            reader.read_u8().unwrap(),
            reader.read_u8().unwrap(),
        ]);
        assert_eq!(key.game_rule(), Some(GameRule::Touchdown));
        assert_eq!(reader.read_u8().unwrap(), u8::from(GamePhase::Waiting));
    }

    #[test]
    fn roster_carries_fixed_width_nicknames() {
        let frame = roster(&[RosterEntry {
            private_ip: 1,
            private_port: 2,
            public_ip: 3,
            public_port: 4,
            nat_unk: 0,
            connection_type: 4,
            account_id: 77,
            slot: 2,
            nickname: "ace".into(),
        }]);
        let mut reader = PacketReader::parse_wire(&frame).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 1);
        reader.skip(4 + 2 + 4 + 2 + 2 + 1).unwrap();
        assert_eq!(reader.read_u64().unwrap(), 77);
        assert_eq!(reader.read_u8().unwrap(), 2);
        reader.skip(4 + 1).unwrap();
        assert_eq!(reader.read_cstring_buffer(NICKNAME_LEN).unwrap(), "ace");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn score_ack_appends_confirm_byte() {
        let frame = score_ack(MatchOpcode::ScoreKillAck, &[9, 9, 9]);
        let reader = PacketReader::parse_wire(&frame).unwrap();
        assert_eq!(reader.opcode(), u8::from(MatchOpcode::ScoreKillAck));
        assert_eq!(reader.remaining(), 4);
    }
}
