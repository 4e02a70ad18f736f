//! Opcode spaces for the three packet families.
//!
//! The match service and the relay service each own a full opcode byte
//! space; P2P sub-opcodes live inside relayed detour payloads. Variants
//! named `*Req` originate from clients, `*Ack` from the server; a few are
//! relayed in both directions and carry no suffix.

use crate::ProtocolError;

macro_rules! opcode_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:expr,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl $name {
            /// Maps a raw opcode byte to a variant, or fails with
            /// [`ProtocolError::UnknownOpcode`].
            pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(ProtocolError::UnknownOpcode(other)),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

opcode_enum! {
    /// Match-service opcodes.
    MatchOpcode {
        LoginReq = 0x01,
        KeepAliveReq = 0x02,
        TimeSyncReq = 0x03,
        NatInfoReq = 0x04,
        LogoutReq = 0x05,

        ChannelInfoReq = 0x10,
        ChannelEnterReq = 0x11,
        ChannelLeaveReq = 0x12,

        CreateRoomReq = 0x20,
        EnterRoomReq = 0x21,
        JoinTunnelReq = 0x22,
        BeginRoundReq = 0x23,
        ReadyRoundReq = 0x24,
        LeaveRoomReq = 0x25,
        ChangeTeamReq = 0x26,
        ChangePlayerModeReq = 0x27,
        KickPlayerReq = 0x28,
        EventMessageReq = 0x29,
        /// Sent by the entering client and echoed to the whole room.
        RoomPlayerEnter = 0x2A,
        /// Sent by the master and echoed back with the move applied.
        MovePlayer = 0x2B,
        /// Touchdown announcement, client to server and back.
        Touchdown = 0x2C,

        ScoreKillReq = 0x30,
        ScoreKillAssistReq = 0x31,
        ScoreOffenseReq = 0x32,
        ScoreOffenseAssistReq = 0x33,
        ScoreDefenseReq = 0x34,
        ScoreDefenseAssistReq = 0x35,
        ScoreSuicideReq = 0x36,
        ScoreSurvivalReq = 0x37,
        FumbleReboundReq = 0x38,

        BuyItemReq = 0x40,
        TutorialCompletedReq = 0x41,

        AdminShowWindowReq = 0x50,
        AdminActionReq = 0x51,

        LoginAck = 0x81,
        ResultAck = 0x82,
        TimeSyncAck = 0x83,
        LogoutAck = 0x84,
        CashUpdateAck = 0x85,

        ChannelInfoAck = 0x90,
        RoomListAck = 0x91,
        DeployRoomAck = 0x92,
        DisposeRoomAck = 0x93,

        EnterRoomSuccessAck = 0xA0,
        SlotInfoAck = 0xA1,
        RosterAck = 0xA2,
        PlayerLeftRoom = 0xA3,
        PlayerLeaveAck = 0xA4,
        ChangeMasterAck = 0xA5,
        ChangeRefereeAck = 0xA6,
        ReadyAck = 0xA7,
        ChangeTeamAck = 0xA8,
        RoomStateAck = 0xA9,
        RoomSubStateAck = 0xAA,
        BriefingAck = 0xAB,
        EventMessageAck = 0xAC,

        ScoreKillAck = 0xB0,
        ScoreKillAssistAck = 0xB1,
        ScoreOffenseAck = 0xB2,
        ScoreOffenseAssistAck = 0xB3,
        ScoreDefenseAck = 0xB4,
        ScoreDefenseAssistAck = 0xB5,
        ScoreSuicideAck = 0xB6,
        FumbleReboundAck = 0xB7,
        TouchdownScoreAck = 0xB8,
        TouchdownAssistAck = 0xB9,
        ScoreSurvivalAck = 0xBA,

        BuyItemAck = 0xC0,

        AdminShowWindowAck = 0xD0,
        AdminActionAck = 0xD1,
    }
}

opcode_enum! {
    /// Relay-service opcodes. `C` prefixes client-to-server, `S` the
    /// reverse; both directions interleave in one byte space. The typo in
    /// `SDetourPackettAck` is the wire name clients were built against.
    RelayOpcode {
        CKeepAliveReq = 0x01,
        SResultAck = 0x02,
        CLoginReq = 0x03,
        CJoinTunnelReq = 0x04,
        CUseTunnelReq = 0x05,
        SUseTunnelAck = 0x06,
        CDetourPacketReq = 0x07,
        SDetourPackettAck = 0x09,
        CLeaveTunnelReq = 0x0A,
        SLeaveTunnelAck = 0x0B,
    }
}

opcode_enum! {
    /// P2P sub-opcodes the relay inspects. Everything else in the detour
    /// payload is opaque to the server.
    P2pOpcode {
        PlayerSpawnReq = 0x0B,
        PlayerSpawnAck = 0x0C,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_opcodes() {
        assert_eq!(
            MatchOpcode::from_u8(MatchOpcode::BeginRoundReq.into()).unwrap(),
            MatchOpcode::BeginRoundReq
        );
        assert_eq!(
            RelayOpcode::from_u8(0x07).unwrap(),
            RelayOpcode::CDetourPacketReq
        );
        assert_eq!(P2pOpcode::from_u8(0x0C).unwrap(), P2pOpcode::PlayerSpawnAck);
    }

    #[test]
    fn unknown_opcode_is_typed() {
        assert!(matches!(
            MatchOpcode::from_u8(0xFF),
            Err(ProtocolError::UnknownOpcode(0xFF))
        ));
        assert!(matches!(
            RelayOpcode::from_u8(0x42),
            Err(ProtocolError::UnknownOpcode(0x42))
        ));
    }
}
