//! Authority network layer: peer admission, request validation and fan-out

use crate::peers::PeerManager;
use log::{debug, error, info, warn};
use shared::protocol::sanitize_name;
use shared::{
    CharacterId, ConnectionSlot, GameConfig, GameState, InputManager, Message, Mode, NetCommand,
    NetEvent, Outgoing, Role, Round, SessionState,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Authority coordinating the session and the canonical simulation
pub struct Server {
    slot: ConnectionSlot,
    game: GameState,
    peers: PeerManager,
    /// Input for Pink when someone plays at the authority's console
    local_input: Option<InputManager>,
    local_addr: SocketAddr,
    tick_duration: Duration,
    peer_timeout: Duration,
    last_timeout_check: Instant,

    event_rx: mpsc::UnboundedReceiver<NetEvent>,
    command_tx: mpsc::UnboundedSender<NetCommand>,
}

impl Server {
    /// Binds `addr` and opens `expected_peers` slots (at most three). Pink
    /// never goes to a peer; it stays with the local AI unless
    /// [`Server::set_local_input`] hands it to a player here.
    pub async fn new(
        addr: &str,
        config: GameConfig,
        expected_peers: usize,
        seed: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let slots: Vec<CharacterId> = CharacterId::PEER_SLOTS
            .iter()
            .copied()
            .take(expected_peers)
            .collect();
        if expected_peers > slots.len() {
            warn!("At most {} peers can join", slots.len());
        }

        let tick_duration = config.tick_duration();
        let peer_timeout = config.peer_timeout();
        let mut game = GameState::new(config, Mode::Authority, seed);
        let mut slot = ConnectionSlot::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let connection = slot.host(addr, &slots, game.roster_mut()).await?;
        let local_addr = connection.local_addr()?;
        let command_tx = connection.start(event_tx);
        info!("Server listening on {}", local_addr);

        Ok(Server {
            slot,
            game,
            peers: PeerManager::new(&slots),
            local_input: None,
            local_addr,
            tick_duration,
            peer_timeout,
            last_timeout_check: Instant::now(),
            event_rx,
            command_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }

    /// Names the locally driven character
    pub fn set_local_name(&mut self, name: &str) {
        self.game.set_name(CharacterId::Pink, sanitize_name(name));
    }

    /// Hands Pink to a local player instead of the AI
    pub fn set_local_input(&mut self, input: InputManager) {
        self.game.roster_mut().get_mut(CharacterId::Pink).role = Role::Human;
        self.local_input = Some(input);
    }

    pub fn session_state(&self) -> SessionState {
        self.slot.state()
    }

    /// Runs the tick loop until the session ends
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut ticker = interval(self.tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.slot.state() == SessionState::Active {
            self.start_round();
        } else {
            info!("Waiting for {} peers", self.peers_missing());
        }

        loop {
            ticker.tick().await;
            if !self.tick() {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Tells every peer the session is over and hands the characters back
    /// to their local roles.
    pub async fn shutdown(&mut self) {
        if self.slot.connection().is_some() {
            self.broadcast(Message::Quit, None);
        }
        self.slot.close(self.game.roster_mut()).await;
    }

    /// One simulation step: apply every queued network event, then advance.
    /// Returns false once the session is over.
    pub fn tick(&mut self) -> bool {
        while let Ok(event) = self.event_rx.try_recv() {
            let keep_going = match event {
                NetEvent::Received { message, from } => self.handle_message(message, from),
                NetEvent::Closed => {
                    error!("Transport closed");
                    false
                }
            };
            if !keep_going {
                return false;
            }
        }

        let mut intents = Vec::new();
        if let Some(input) = self.local_input.as_mut() {
            let intent = input.update(CharacterId::Pink, &self.game);
            if input.quit_requested() {
                info!("Local player left, ending the session");
                return false;
            }
            intents.push((CharacterId::Pink, intent));
        }

        let out = self.game.advance(&intents);
        self.dispatch(out);

        if self.last_timeout_check.elapsed() >= TIMEOUT_CHECK_INTERVAL {
            self.last_timeout_check = Instant::now();
            let timed_out = self.peers.check_timeouts(self.peer_timeout);
            if let Some(character) = timed_out.first() {
                warn!("Peer controlling {} timed out", character);
                return false;
            }
        }

        if self.game.tick_count() % 600 == 0 {
            debug!(
                "Tick {}: {} peers, round {:?}",
                self.game.tick_count(),
                self.peers.len(),
                self.game.round()
            );
        }
        true
    }

    fn handle_message(&mut self, message: Message, from: SocketAddr) -> bool {
        let sender = self.peers.find_by_addr(from);
        if sender.is_some() {
            self.peers.touch(from);
        }

        match message {
            Message::Join { name } => self.handle_join(name, from),

            Message::RemoteMove { id, direction } => {
                if sender == Some(id) {
                    self.game.queue_remote_move(id, direction);
                } else {
                    warn!("{} tried to move {} it does not control", from, id);
                }
            }

            Message::ShootWeapon { id } => {
                if sender == Some(id) {
                    let out = self.game.apply_remote_fire(id);
                    self.dispatch(out);
                } else {
                    warn!("{} tried to fire for {} it does not control", from, id);
                }
            }

            Message::Ping { sequence } => {
                if sender.is_some() {
                    self.send_to(Message::Pong { sequence }, vec![from]);
                } else {
                    debug!("Ignoring PING from {}, which never joined", from);
                }
            }

            Message::Quit => {
                if let Some(character) = sender {
                    info!("Peer controlling {} quit", character);
                    if let Some(peer) = self.peers.remove_peer(from) {
                        debug!("Dropped {}", peer.addr);
                    }
                    return false;
                }
            }

            Message::Pong { .. } => {}

            other => warn!("Unexpected {} from {}", other.tag(), from),
        }
        true
    }

    fn handle_join(&mut self, name: String, from: SocketAddr) {
        let name = sanitize_name(&name);
        let Some((id, is_new)) = self.peers.add_peer(from, name.clone()) else {
            info!("Rejecting {}: no free slot", from);
            self.send_to(Message::Reject, vec![from]);
            return;
        };

        let lives = self.game.config().lives;
        self.send_to(Message::Welcome { id, lives }, vec![from]);

        if is_new {
            self.game
                .roster_mut()
                .get_mut(id)
                .enter_role(Role::NetworkPlaying);
            self.game.set_name(id, name.clone());
            self.broadcast(Message::Name { id, name }, Some(id));
        }

        // Catch the newcomer up on who is who and where
        let names: Vec<Message> = self
            .game
            .roster()
            .iter()
            .map(|c| Message::Name {
                id: c.id,
                name: c.name.clone(),
            })
            .collect();
        let snapshots = self.game.snapshots();
        for message in names.into_iter().chain(snapshots) {
            self.send_to(message, vec![from]);
        }

        if !is_new {
            return;
        }
        let state = self
            .slot
            .connection_mut()
            .map(|connection| connection.record_join());
        match state {
            Some(SessionState::Active) if self.game.round() == Round::Waiting => {
                self.start_round();
            }
            Some(SessionState::WaitingForPeers) => {
                let remaining = self.peers_missing() as u32;
                self.broadcast(Message::Waiting { remaining }, None);
            }
            _ => {}
        }
    }

    fn peers_missing(&self) -> usize {
        self.slot
            .connection()
            .map_or(0, |connection| connection.players_to_wait_for())
    }

    fn start_round(&mut self) {
        self.broadcast(Message::Start, None);
        let out = self.game.start_round();
        self.dispatch(out);
    }

    fn dispatch(&self, out: Vec<Outgoing>) {
        for outgoing in out {
            self.broadcast(outgoing.message, outgoing.exclude);
        }
    }

    /// Sends to every peer except the one controlling `exclude`
    fn broadcast(&self, message: Message, exclude: Option<CharacterId>) {
        let to = self.peers.addrs_except(exclude);
        if !to.is_empty() {
            self.send_to(message, to);
        }
    }

    fn send_to(&self, message: Message, to: Vec<SocketAddr>) {
        if let Err(e) = self.command_tx.send(NetCommand::Send { message, to }) {
            error!("Failed to queue message: {}", e);
        }
    }
}
