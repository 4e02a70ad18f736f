//! Relay login, tunnel membership and detour forwarding.

use std::sync::Arc;

use matchforge_protocol::{Packet, PacketReader, RelayOpcode};
use matchforge_relay::RelayService;
use matchforge_session::{Player, PlayerRegistry};
use matchforge_transport::{SessionHandle, SessionId};
use tokio::sync::mpsc;

struct Fixture {
    players: Arc<PlayerRegistry>,
    relay: RelayService,
}

impl Fixture {
    fn new() -> Self {
        let players = Arc::new(PlayerRegistry::new());
        let relay = RelayService::new(Arc::clone(&players));
        Self { players, relay }
    }

    /// Registers a match player and opens a relay connection for them.
    fn connect(
        &self,
        id: u64,
        nickname: &str,
    ) -> (Arc<Player>, SessionHandle, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (match_session, _match_rx) = SessionHandle::piped(SessionId::new(id));
        let player = Player::new(match_session, 1000 + id, nickname.into());
        self.players.insert(player.session().id(), Arc::clone(&player));
        let (relay_session, relay_rx) = SessionHandle::piped(SessionId::new(100 + id));
        (player, relay_session, relay_rx)
    }

    fn send(&self, session: &SessionHandle, opcode: RelayOpcode, payload: &[u8]) -> bool {
        let mut pkt = Packet::new(opcode);
        pkt.write_bytes(payload);
        let frame = pkt.finish();
        self.relay.handle_frame(session, &frame[2..]).unwrap()
    }

    fn login(&self, session: &SessionHandle, nickname: &str) -> bool {
        let mut payload = nickname.as_bytes().to_vec();
        payload.push(0);
        self.send(session, RelayOpcode::CLoginReq, &payload)
    }

    fn join(&self, session: &SessionHandle, tunnel: u32, slot: u8) {
        let mut payload = tunnel.to_le_bytes().to_vec();
        payload.push(slot);
        assert!(self.send(session, RelayOpcode::CJoinTunnelReq, &payload));
    }
}

fn last_result(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> u8 {
    let mut code = None;
    while let Ok(frame) = rx.try_recv() {
        let mut reader = PacketReader::parse_wire(&frame).unwrap();
        if reader.opcode() == u8::from(RelayOpcode::SResultAck) {
            code = Some(reader.read_u8().unwrap());
        }
    }
    code.expect("expected a result ack")
}

/// Detour payload with a 12 byte peer header in front of `tail`.
fn detour_payload(p2p_opcode: u8, tail: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&28_960u16.to_le_bytes());
    data.extend_from_slice(&0x0100_007Fu32.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.push(p2p_opcode);
    data.push(2);
    data.extend_from_slice(&(tail.len() as u16).to_le_bytes());
    data.extend_from_slice(tail);

    let mut payload = 0u32.to_le_bytes().to_vec();
    payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
    payload.extend_from_slice(&data);
    payload
}

#[tokio::test]
async fn duplicate_relay_login_is_rejected() {
    let fx = Fixture::new();
    let (_player, first, mut first_rx) = fx.connect(1, "ace");
    assert!(fx.login(&first, "ace"));
    assert_eq!(last_result(&mut first_rx), 0);

    let (second, mut second_rx) = SessionHandle::piped(SessionId::new(200));
    assert!(!fx.login(&second, "ace"));
    assert_eq!(last_result(&mut second_rx), 1);
}

#[tokio::test]
async fn login_requires_a_known_nickname() {
    let fx = Fixture::new();
    let (session, mut rx) = SessionHandle::piped(SessionId::new(300));
    assert!(!fx.login(&session, "ghost"));
    assert_eq!(last_result(&mut rx), 1);
}

#[tokio::test]
async fn detour_reaches_only_claimed_peers() {
    let fx = Fixture::new();
    let (alice, alice_relay, mut alice_rx) = fx.connect(1, "alice");
    let (_bob, bob_relay, mut bob_rx) = fx.connect(2, "bob");
    let (_carol, carol_relay, mut carol_rx) = fx.connect(3, "carol");
    fx.login(&alice_relay, "alice");
    fx.login(&bob_relay, "bob");
    fx.login(&carol_relay, "carol");
    fx.join(&alice_relay, 9, 2);
    fx.join(&bob_relay, 9, 3);
    fx.join(&carol_relay, 9, 4);
    while alice_rx.try_recv().is_ok() {}
    while bob_rx.try_recv().is_ok() {}
    while carol_rx.try_recv().is_ok() {}

    // Alice proxies to bob's seat only.
    assert!(fx.send(&alice_relay, RelayOpcode::CUseTunnelReq, &[3]));
    assert_eq!(alice.state().relay_targets, vec![3]);
    let frame = alice_rx.try_recv().unwrap();
    let reader = PacketReader::parse_wire(&frame).unwrap();
    assert_eq!(reader.opcode(), u8::from(RelayOpcode::SUseTunnelAck));

    let payload = detour_payload(0x20, b"move");
    assert!(fx.send(&alice_relay, RelayOpcode::CDetourPacketReq, &payload));

    let forwarded = bob_rx.try_recv().unwrap();
    let mut reader = PacketReader::parse_wire(&forwarded).unwrap();
    assert_eq!(reader.opcode(), u8::from(RelayOpcode::SDetourPackettAck));
    assert_eq!(reader.read_u8().unwrap(), 0);
    assert!(carol_rx.try_recv().is_err());
    assert!(alice_rx.try_recv().is_err());
}

#[tokio::test]
async fn spawn_handshake_goes_to_the_whole_tunnel() {
    let fx = Fixture::new();
    let (alice, alice_relay, mut alice_rx) = fx.connect(1, "alice");
    let (_bob, bob_relay, mut bob_rx) = fx.connect(2, "bob");
    let (_carol, carol_relay, mut carol_rx) = fx.connect(3, "carol");
    fx.login(&alice_relay, "alice");
    fx.login(&bob_relay, "bob");
    fx.login(&carol_relay, "carol");
    fx.join(&alice_relay, 9, 2);
    fx.join(&bob_relay, 9, 3);
    fx.join(&carol_relay, 9, 4);
    while alice_rx.try_recv().is_ok() {}
    while bob_rx.try_recv().is_ok() {}
    while carol_rx.try_recv().is_ok() {}

    // Spawn request: broadcast without any use-tunnel claims.
    let payload = detour_payload(0x0B, b"");
    assert!(fx.send(&alice_relay, RelayOpcode::CDetourPacketReq, &payload));

    assert!(bob_rx.try_recv().is_ok());
    assert!(carol_rx.try_recv().is_ok());
    assert!(alice_rx.try_recv().is_err());
    assert!(alice.state().spawned);
}

#[tokio::test]
async fn leaving_prunes_the_seat_from_other_proxies() {
    let fx = Fixture::new();
    let (alice, alice_relay, mut alice_rx) = fx.connect(1, "alice");
    let (_bob, bob_relay, mut bob_rx) = fx.connect(2, "bob");
    fx.login(&alice_relay, "alice");
    fx.login(&bob_relay, "bob");
    fx.join(&alice_relay, 9, 2);
    fx.join(&bob_relay, 9, 3);
    assert!(fx.send(&alice_relay, RelayOpcode::CUseTunnelReq, &[3]));
    assert_eq!(alice.state().relay_targets, vec![3]);
    while alice_rx.try_recv().is_ok() {}
    while bob_rx.try_recv().is_ok() {}

    assert!(fx.send(&bob_relay, RelayOpcode::CLeaveTunnelReq, &[]));
    assert_eq!(last_result(&mut bob_rx), 6);
    assert!(alice.state().relay_targets.is_empty());

    // The detour now has nowhere to go.
    let payload = detour_payload(0x20, b"move");
    assert!(fx.send(&alice_relay, RelayOpcode::CDetourPacketReq, &payload));
    assert!(bob_rx.try_recv().is_err());

    fx.relay.handle_disconnect(alice_relay.id());
    assert_eq!(fx.relay.tunnel_count(), 0);
}

#[tokio::test]
async fn the_host_seat_cannot_be_claimed() {
    let fx = Fixture::new();
    let (alice, alice_relay, mut alice_rx) = fx.connect(1, "alice");
    fx.login(&alice_relay, "alice");
    fx.join(&alice_relay, 9, 2);
    while alice_rx.try_recv().is_ok() {}

    assert!(fx.send(&alice_relay, RelayOpcode::CUseTunnelReq, &[1]));
    assert!(alice.state().relay_targets.is_empty());
    assert!(alice_rx.try_recv().is_err());
}
