//! Relay tunnel forwarder.
//!
//! Clients that cannot reach each other directly open a second
//! connection to the relay, join the tunnel their room was assigned,
//! and push game traffic through detour packets. The relay binds each
//! connection to a match player by nickname, keeps per-tunnel
//! membership, and forwards detour payloads to the peers a player has
//! claimed with use-tunnel. Spawn handshakes are the exception: they go
//! to the whole tunnel so every peer learns about the new player.

use std::sync::Arc;

use dashmap::DashMap;

use matchforge_protocol::{
    P2pHeader, P2pOpcode, Packet, PacketReader, ProtocolError, RelayOpcode,
};
use matchforge_session::{Player, PlayerRegistry};
use matchforge_transport::{SessionHandle, SessionId};

use crate::error::RelayError;

/// Reply codes carried in the relay's result ack.
const LOGIN_OK: u8 = 0;
const LOGIN_DUPLICATE: u8 = 1;
const JOIN_OK: u8 = 3;
const LEAVE_OK: u8 = 6;

struct Binding {
    player: Arc<Player>,
    session: SessionHandle,
    tunnel: Option<u32>,
    slot: u8,
}

#[derive(Default)]
struct Tunnel {
    members: DashMap<u8, SessionId>,
}

/// One relay endpoint, shared by all relay connections.
pub struct RelayService {
    players: Arc<PlayerRegistry>,
    bindings: DashMap<SessionId, Binding>,
    tunnels: DashMap<u32, Arc<Tunnel>>,
}

impl RelayService {
    pub fn new(players: Arc<PlayerRegistry>) -> Self {
        Self {
            players,
            bindings: DashMap::new(),
            tunnels: DashMap::new(),
        }
    }

    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }

    /// Handles one relay frame. Returns `Ok(false)` when the connection
    /// should be dropped.
    pub fn handle_frame(
        &self,
        session: &SessionHandle,
        body: &[u8],
    ) -> Result<bool, RelayError> {
        let mut reader = PacketReader::parse(body)?;
        let opcode = match RelayOpcode::from_u8(reader.opcode()) {
            Ok(opcode) => opcode,
            Err(ProtocolError::UnknownOpcode(raw)) => {
                tracing::warn!(id = %session.id(), opcode = raw, "unknown relay opcode");
                return Ok(true);
            }
            Err(error) => return Err(error.into()),
        };
        match opcode {
            RelayOpcode::CKeepAliveReq => Ok(true),
            RelayOpcode::CLoginReq => self.login(session, &mut reader),
            RelayOpcode::CJoinTunnelReq => self.join_tunnel(session, &mut reader),
            RelayOpcode::CUseTunnelReq => self.use_tunnel(session, &mut reader),
            RelayOpcode::CDetourPacketReq => self.detour(session, &mut reader),
            RelayOpcode::CLeaveTunnelReq => {
                self.leave_tunnel(session.id());
                session.send(result_ack(LEAVE_OK));
                Ok(true)
            }
            other => {
                tracing::warn!(id = %session.id(), ?other, "relay opcode from wrong direction");
                Ok(true)
            }
        }
    }

    /// Drops the binding for a closed connection and prunes the tunnel.
    pub fn handle_disconnect(&self, id: SessionId) {
        self.leave_tunnel(id);
        self.bindings.remove(&id);
    }

    fn login(
        &self,
        session: &SessionHandle,
        reader: &mut PacketReader<'_>,
    ) -> Result<bool, RelayError> {
        let nickname = reader.read_cstring()?;
        let Some(player) = self.players.by_nickname(&nickname) else {
            tracing::warn!(id = %session.id(), nickname, "relay login for unknown player");
            session.send(result_ack(LOGIN_DUPLICATE));
            return Ok(false);
        };
        let account_id = player.account_id();
        let duplicate = self
            .bindings
            .iter()
            .any(|entry| entry.player.account_id() == account_id);
        if duplicate {
            session.send(result_ack(LOGIN_DUPLICATE));
            return Ok(false);
        }
        self.bindings.insert(
            session.id(),
            Binding {
                player,
                session: session.clone(),
                tunnel: None,
                slot: 0,
            },
        );
        tracing::debug!(id = %session.id(), account_id, "relay login");
        session.send(result_ack(LOGIN_OK));
        Ok(true)
    }

    fn join_tunnel(
        &self,
        session: &SessionHandle,
        reader: &mut PacketReader<'_>,
    ) -> Result<bool, RelayError> {
        let tunnel_id = reader.read_u32()?;
        let slot = reader.read_u8()?;
        let mut binding = self
            .bindings
            .get_mut(&session.id())
            .ok_or(RelayError::NotLoggedIn(session.id()))?;
        let tunnel = self
            .tunnels
            .entry(tunnel_id)
            .or_insert_with(|| Arc::new(Tunnel::default()))
            .clone();
        tunnel.members.insert(slot, session.id());
        binding.tunnel = Some(tunnel_id);
        binding.slot = slot;
        tracing::debug!(id = %session.id(), tunnel = tunnel_id, slot, "joined tunnel");
        session.send(result_ack(JOIN_OK));
        Ok(true)
    }

    fn use_tunnel(
        &self,
        session: &SessionHandle,
        reader: &mut PacketReader<'_>,
    ) -> Result<bool, RelayError> {
        let slot = reader.read_u8()?;
        // Slot 1 is the room's host side; nobody proxies to it.
        if slot == 1 {
            return Ok(true);
        }
        let binding = self
            .bindings
            .get(&session.id())
            .ok_or(RelayError::NotLoggedIn(session.id()))?;
        {
            let mut state = binding.player.state();
            if !state.relay_targets.contains(&slot) {
                state.relay_targets.push(slot);
            }
        }
        let mut pkt = Packet::new(RelayOpcode::SUseTunnelAck);
        pkt.write_u8(slot);
        session.send(pkt.finish());
        Ok(true)
    }

    fn detour(
        &self,
        session: &SessionHandle,
        reader: &mut PacketReader<'_>,
    ) -> Result<bool, RelayError> {
        reader.read_u32()?;
        let len = reader.read_u16()?;
        let data = reader.read_bytes(usize::from(len))?;

        let binding = self
            .bindings
            .get(&session.id())
            .ok_or(RelayError::NotLoggedIn(session.id()))?;
        let Some(tunnel_id) = binding.tunnel else {
            return Ok(true);
        };
        let Some(tunnel) = self.tunnels.get(&tunnel_id).map(|t| Arc::clone(&t)) else {
            return Ok(true);
        };

        let mut pkt = Packet::new(RelayOpcode::SDetourPackettAck);
        pkt.write_u8(0);
        pkt.write_bytes(data);
        let frame = pkt.finish();

        let spawn = P2pHeader::parse(data)
            .ok()
            .map(|header| {
                header.opcode == u8::from(P2pOpcode::PlayerSpawnReq)
                    || header.opcode == u8::from(P2pOpcode::PlayerSpawnAck)
            })
            .unwrap_or(false);
        if spawn {
            binding.player.state().spawned = true;
            for member in tunnel.members.iter() {
                if *member.value() == session.id() {
                    continue;
                }
                if let Some(target) = self.bindings.get(member.value()) {
                    target.session.send(frame.clone());
                }
            }
            return Ok(true);
        }

        let targets = binding.player.state().relay_targets.clone();
        for slot in targets {
            let Some(member) = tunnel.members.get(&slot) else {
                continue;
            };
            if *member.value() == session.id() {
                continue;
            }
            if let Some(target) = self.bindings.get(member.value()) {
                // Skip peers that already hopped to another tunnel.
                if target.tunnel == Some(tunnel_id) {
                    target.session.send(frame.clone());
                }
            }
        }
        Ok(true)
    }

    fn leave_tunnel(&self, id: SessionId) {
        let Some(mut binding) = self.bindings.get_mut(&id) else {
            return;
        };
        let Some(tunnel_id) = binding.tunnel.take() else {
            return;
        };
        let slot = binding.slot;
        binding.slot = 0;
        binding.player.state().relay_targets.clear();
        drop(binding);

        let Some(tunnel) = self.tunnels.get(&tunnel_id).map(|t| Arc::clone(&t)) else {
            return;
        };
        tunnel.members.remove(&slot);
        // Nobody should keep proxying to a vacated seat.
        for member in tunnel.members.iter() {
            if let Some(peer) = self.bindings.get(member.value()) {
                peer.player.state().relay_targets.retain(|&s| s != slot);
            }
        }
        if tunnel.members.is_empty() {
            self.tunnels.remove(&tunnel_id);
        }
        tracing::debug!(%id, tunnel = tunnel_id, slot, "left tunnel");
    }
}

fn result_ack(code: u8) -> Vec<u8> {
    let mut pkt = Packet::new(RelayOpcode::SResultAck);
    pkt.write_u8(code);
    pkt.finish()
}
