//! P2P sub-header carried inside relay detour payloads.
//!
//! The relay only ever looks at the sub-opcode to spot the spawn
//! handshake; the rest of the header and the trailing body are forwarded
//! untouched.

use crate::ProtocolError;

/// Fixed 12-byte header at the front of every detoured P2P payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2pHeader {
    pub port: u16,
    pub ip: u32,
    pub unk: u16,
    pub opcode: u8,
    pub slot: u8,
    pub size: u16,
}

impl P2pHeader {
    pub const LEN: usize = 12;

    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::LEN {
            return Err(ProtocolError::UnexpectedEof(data.len()));
        }
        Ok(Self {
            port: u16::from_le_bytes([data[0], data[1]]),
            ip: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            unk: u16::from_le_bytes([data[6], data[7]]),
            opcode: data[8],
            slot: data[9],
            size: u16::from_le_bytes([data[10], data[11]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::P2pOpcode;

    #[test]
    fn parses_header_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&7777u16.to_le_bytes());
        data.extend_from_slice(&0x0A00_0001u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.push(P2pOpcode::PlayerSpawnReq.into());
        data.push(3); // slot
        data.extend_from_slice(&16u16.to_le_bytes());
        data.extend_from_slice(&[0xAA; 16]);

        let header = P2pHeader::parse(&data).unwrap();
        assert_eq!(header.port, 7777);
        assert_eq!(header.ip, 0x0A00_0001);
        assert_eq!(header.opcode, u8::from(P2pOpcode::PlayerSpawnReq));
        assert_eq!(header.slot, 3);
        assert_eq!(header.size, 16);
    }

    #[test]
    fn short_payload_is_rejected() {
        assert!(matches!(
            P2pHeader::parse(&[0u8; 11]),
            Err(ProtocolError::UnexpectedEof(11))
        ));
    }
}
