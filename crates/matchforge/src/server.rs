//! The orchestration server.
//!
//! `MatchServer` wires the crates together: one framed TCP listener for
//! the match service, one for the relay, the registries both share, and
//! the sweep loop that drives room timers. Everything a deployment
//! swaps (persistence, login validation, plugins) is injected through
//! the builder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use matchforge_protocol::{EventMessage, GamePhase, TimeState};
use matchforge_relay::RelayService;
use matchforge_room::RoomRegistry;
use matchforge_session::{Channel, ChannelRegistry, MemoryStore, PlayerRegistry, PlayerStore};
use matchforge_tick::TickLoop;
use matchforge_transport::{FramedServer, ServerEvent, ServerHandle, SessionHandle, SessionId};

use crate::auth::{AllowAll, SessionValidator};
use crate::config::ServerConfig;
use crate::error::MatchforgeError;
use crate::handler;
use crate::plugin::PluginRegistry;

pub struct MatchServer {
    config: ServerConfig,
    store: Arc<dyn PlayerStore>,
    validator: Arc<dyn SessionValidator>,
    plugins: PluginRegistry,
    players: Arc<PlayerRegistry>,
    channels: Arc<ChannelRegistry>,
    rooms: Arc<RoomRegistry>,
    relay: RelayService,
    started_at: Instant,
    listeners: Mutex<Vec<ServerHandle>>,
    stop: Notify,
    stopped: AtomicBool,
}

impl MatchServer {
    pub fn builder() -> MatchServerBuilder {
        MatchServerBuilder::default()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PlayerStore> {
        &self.store
    }

    pub fn validator(&self) -> &Arc<dyn SessionValidator> {
        &self.validator
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn players(&self) -> &Arc<PlayerRegistry> {
        &self.players
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn relay(&self) -> &RelayService {
        &self.relay
    }

    /// Milliseconds since the server came up; the time-sync epoch.
    pub fn uptime_ms(&self) -> u32 {
        self.started_at.elapsed().as_millis() as u32
    }

    /// Decodes and dispatches one match-service frame. Malformed
    /// packets are logged and dropped; the session stays open.
    pub fn process_frame(self: &Arc<Self>, session: &SessionHandle, mut body: Vec<u8>) {
        matchforge_protocol::descramble(&mut body);
        if let Err(error) = handler::dispatch(self, session, &body) {
            tracing::warn!(id = %session.id(), %error, "dropped malformed packet");
        }
    }

    /// Unwinds a departed session: room seat, channel membership,
    /// registry entry.
    pub fn handle_disconnect(self: &Arc<Self>, id: SessionId) {
        let Some(player) = self.players.remove(id) else {
            return;
        };
        tracing::info!(%id, account = player.account_id(), "player disconnected");
        if let Some(tunnel) = player.room_tunnel() {
            if let Some(room) = self.rooms.get(tunnel) {
                if room.leave(&player, EventMessage::LeftRoom.into()) {
                    self.rooms.remove(tunnel);
                }
            }
        }
        if let Some(channel_id) = player.channel_id() {
            if let Some(channel) = self.channels.get(channel_id) {
                channel.leave(&player);
            }
        }
        player.session().close();
    }

    /// Binds both listeners and serves until [`MatchServer::shutdown`].
    pub async fn run(self: Arc<Self>) -> Result<(), MatchforgeError> {
        let (match_server, mut match_events) =
            FramedServer::bind(&self.config.match_addr).await?;
        let (relay_server, mut relay_events) =
            FramedServer::bind(&self.config.relay_addr).await?;
        let match_handle = match_server.handle();
        let relay_handle = relay_server.handle();
        self.listeners
            .lock()
            .extend([match_handle.clone(), relay_handle.clone()]);

        let match_listener = tokio::spawn(async move {
            if let Err(error) = match_server.run().await {
                tracing::error!(%error, "match listener failed");
            }
        });
        let relay_listener = tokio::spawn(async move {
            if let Err(error) = relay_server.run().await {
                tracing::error!(%error, "relay listener failed");
            }
        });

        let server = Arc::clone(&self);
        let match_pump = tokio::spawn(async move {
            while let Some(event) = match_events.recv().await {
                match event {
                    ServerEvent::Connected(session) => {
                        tracing::debug!(id = %session.id(), "match connection");
                    }
                    ServerEvent::Frame { session, body } => {
                        if let Some(handle) = match_handle.session(session) {
                            server.process_frame(&handle, body);
                        }
                    }
                    ServerEvent::Disconnected(id) => server.handle_disconnect(id),
                }
            }
        });

        let server = Arc::clone(&self);
        let relay_pump = tokio::spawn(async move {
            while let Some(event) = relay_events.recv().await {
                match event {
                    ServerEvent::Connected(session) => {
                        tracing::debug!(id = %session.id(), "relay connection");
                    }
                    ServerEvent::Frame { session, body } => {
                        let Some(handle) = relay_handle.session(session) else {
                            continue;
                        };
                        match server.relay.handle_frame(&handle, &body) {
                            Ok(true) => {}
                            Ok(false) => handle.close(),
                            Err(error) => {
                                tracing::warn!(id = %handle.id(), %error, "dropped relay packet");
                            }
                        }
                    }
                    ServerEvent::Disconnected(id) => server.relay.handle_disconnect(id),
                }
            }
        });

        let server = Arc::clone(&self);
        let sweep = tokio::spawn(TickLoop::new(self.config.tick_rate_hz).run(move || {
            server.sweep_rooms();
            !server.is_shutdown()
        }));

        tracing::info!(
            match_addr = %self.config.match_addr,
            relay_addr = %self.config.relay_addr,
            "server up"
        );
        self.stop.notified().await;
        for listener in self.listeners.lock().drain(..) {
            listener.shutdown();
        }
        // Closing the listeners drops the event senders, so both pumps
        // drain and finish on their own.
        for room in self.rooms.snapshot() {
            self.rooms.remove(room.tunnel_id());
        }
        sweep.abort();
        for task in [match_listener, relay_listener, match_pump, relay_pump] {
            let _ = task.await;
        }
        let _ = sweep.await;
        tracing::info!("server stopped");
        Ok(())
    }

    /// One sweep pass over every live room.
    pub fn sweep_rooms(&self) {
        for room in self.rooms.snapshot() {
            if room.phase() != GamePhase::Playing || room.time_state() == TimeState::HalfTime {
                continue;
            }
            if !self.plugins.allow_room_tick(&room) {
                continue;
            }
            room.update();
        }
    }

    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.stop.notify_one();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

pub struct MatchServerBuilder {
    config: ServerConfig,
    store: Option<Arc<dyn PlayerStore>>,
    validator: Arc<dyn SessionValidator>,
    plugins: PluginRegistry,
}

impl Default for MatchServerBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig::default(),
            store: None,
            validator: Arc::new(AllowAll),
            plugins: PluginRegistry::new(),
        }
    }
}

impl MatchServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn PlayerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn plugin(mut self, plugin: Box<dyn crate::plugin::GamePlugin>) -> Self {
        self.plugins.register(plugin);
        self
    }

    pub fn build(self) -> Arc<MatchServer> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn PlayerStore>);
        let players = Arc::new(PlayerRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        channels.seed(
            self.config
                .channels
                .iter()
                .map(|c| Channel::new(c.id, c.name.clone())),
        );
        let relay = RelayService::new(Arc::clone(&players));
        Arc::new(MatchServer {
            config: self.config,
            store,
            validator: self.validator,
            plugins: self.plugins,
            players,
            channels,
            rooms: Arc::new(RoomRegistry::new()),
            relay,
            started_at: Instant::now(),
            listeners: Mutex::new(Vec::new()),
            stop: Notify::new(),
            stopped: AtomicBool::new(false),
        })
    }
}
