use crate::rendering::render;
use log::{debug, error, info, warn};
use shared::{
    CharacterId, ConnectionSlot, Direction, GameConfig, GameState, InputIntent, InputManager,
    Message, Mode, NetCommand, NetEvent, Role, SessionState, DEFAULT_PORT,
};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Appends the default port unless `server` already names one. A bare IPv6
/// literal such as `::1` comes back bracketed.
pub fn authority_address(server: &str) -> String {
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            server.to_string()
        }
        _ => format!("{}:{}", server, DEFAULT_PORT),
    }
}

/// How a client session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Still running
    Open,
    /// The authority had no free slot
    Rejected,
    /// The authority sent `QUIT`
    AuthorityQuit,
    /// Nothing heard from the authority for too long
    TimedOut,
    /// Local quit or transport failure
    Local,
}

pub struct Client {
    slot: ConnectionSlot,
    game: GameState,
    input: InputManager,
    name: String,
    character: Option<CharacterId>,
    authority: SocketAddr,

    event_rx: mpsc::UnboundedReceiver<NetEvent>,
    command_tx: mpsc::UnboundedSender<NetCommand>,

    last_heard: Instant,
    peer_timeout: Duration,
    ping_sequence: u32,
    show_board: bool,
    ending: Ending,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        name: &str,
        config: GameConfig,
        input: InputManager,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let peer_timeout = config.peer_timeout();
        let mut game = GameState::new(config, Mode::Replica, 0);
        let mut slot = ConnectionSlot::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let connection = slot.join(server_addr, game.roster_mut()).await?;
        let authority = connection
            .authority_addr()
            .ok_or("peer session has no authority address")?;
        let command_tx = connection.start(event_tx);

        Ok(Client {
            slot,
            game,
            input,
            name: name.to_string(),
            character: None,
            authority,
            event_rx,
            command_tx,
            last_heard: Instant::now(),
            peer_timeout,
            ping_sequence: 0,
            show_board: false,
            ending: Ending::Open,
        })
    }

    pub fn set_show_board(&mut self, show_board: bool) {
        self.show_board = show_board;
    }

    /// The character the authority assigned to us, once welcomed
    pub fn character(&self) -> Option<CharacterId> {
        self.character
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn ending(&self) -> Ending {
        self.ending
    }

    pub fn session_state(&self) -> SessionState {
        self.slot.state()
    }

    /// Asks the authority for a slot
    pub fn join(&mut self) {
        info!("Joining {} as {}", self.authority, self.name);
        self.send(Message::Join {
            name: self.name.clone(),
        });
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.join();

        let mut ticker = interval(self.game.config().tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !self.tick() {
                break;
            }
        }

        self.shutdown().await;
        match self.ending {
            Ending::Rejected => Err("the authority has no free slot".into()),
            Ending::TimedOut => Err("lost contact with the authority".into()),
            _ => Ok(()),
        }
    }

    /// Leaves the session and hands every character back to its local role
    pub async fn shutdown(&mut self) {
        if self.slot.connection().is_some() && self.ending != Ending::AuthorityQuit {
            self.send(Message::Quit);
        }
        self.slot.close(self.game.roster_mut()).await;
    }

    /// One tick: apply everything the authority sent, predict our own
    /// character, advance the local simulation. Returns false once the
    /// session is over.
    pub fn tick(&mut self) -> bool {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                NetEvent::Received { message, .. } => {
                    if !self.handle_message(message) {
                        return false;
                    }
                    // Only a welcomed peer is in a session worth keeping alive
                    if self.character.is_some() {
                        self.last_heard = Instant::now();
                    }
                }
                NetEvent::Closed => {
                    error!("Transport closed");
                    self.ending = Ending::Local;
                    return false;
                }
            }
        }

        if self.last_heard.elapsed() > self.peer_timeout {
            warn!(
                "Nothing heard from {} for {:?}",
                self.authority, self.peer_timeout
            );
            self.ending = Ending::TimedOut;
            return false;
        }

        if let Some(id) = self.character {
            let intent = self.input.update(id, &self.game);
            if self.input.quit_requested() {
                info!("Leaving the session");
                self.ending = Ending::Local;
                return false;
            }
            self.apply_local(id, intent);
        }

        self.game.advance(&[]);

        let tick = self.game.tick_count();
        let ping_interval = u64::from(self.game.config().ping_interval_ticks.max(1));
        if tick % ping_interval == 0 {
            if self.character.is_none() {
                debug!("No welcome from {} yet, asking again", self.authority);
                self.send(Message::Join {
                    name: self.name.clone(),
                });
            } else {
                self.ping_sequence = self.ping_sequence.wrapping_add(1);
                self.send(Message::Ping {
                    sequence: self.ping_sequence,
                });
            }
        }

        let tick_rate = u64::from(self.game.config().tick_rate.max(1));
        if self.show_board && tick % tick_rate == 0 {
            println!("{}", render(&self.game, self.character));
        }
        true
    }

    /// Predicts our own step or throw and forwards it to the authority
    fn apply_local(&mut self, id: CharacterId, intent: InputIntent) {
        if intent.fire {
            let predicted = self.game.try_fire(id);
            debug!("Fire request (predicted {})", predicted);
            self.send(Message::ShootWeapon { id });
            if predicted {
                return;
            }
        }
        if intent.direction != Direction::None {
            self.game.try_step(id, intent.direction);
            self.send(Message::RemoteMove {
                id,
                direction: intent.direction,
            });
        }
    }

    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Welcome { id, lives } => {
                if self.character != Some(id) {
                    info!("Playing as {} with {} lives", id, lives);
                }
                self.character = Some(id);
                self.game.set_lives(lives);
                self.game.roster_mut().get_mut(id).role = Role::Human;
            }
            Message::Reject => {
                warn!("The authority has no free slot");
                self.ending = Ending::Rejected;
                return false;
            }
            Message::Quit => {
                info!("The authority ended the session");
                self.ending = Ending::AuthorityQuit;
                return false;
            }
            Message::Waiting { remaining } => info!("Waiting for {} more players", remaining),
            Message::Start => info!("All players joined"),
            Message::Ping { sequence } => self.send(Message::Pong { sequence }),
            Message::Pong { .. } => {}
            Message::Countdown { seconds } => {
                if seconds > 0 {
                    info!("Round starts in {}", seconds);
                } else {
                    info!("Go!");
                }
                self.game.apply_authoritative(&message);
            }
            Message::Died { id, lives } => {
                info!("{} fell, {} lives left", id, lives);
                self.game.apply_authoritative(&message);
            }
            Message::Join { .. } | Message::RemoteMove { .. } => {
                warn!("Unexpected {} from the authority", message.tag());
            }
            other => self.game.apply_authoritative(&other),
        }
        true
    }

    fn send(&self, message: Message) {
        let to = vec![self.authority];
        if let Err(e) = self.command_tx.send(NetCommand::Send { message, to }) {
            error!("Failed to queue message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;
    use tokio::time::{sleep, timeout};

    async fn authority() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn client(authority: &UdpSocket) -> Client {
        client_with(authority, GameConfig::default()).await
    }

    async fn client_with(authority: &UdpSocket, config: GameConfig) -> Client {
        let (_tx, rx) = mpsc::unbounded_channel();
        let addr = authority.local_addr().unwrap().to_string();
        let input = InputManager::from_commands(rx);
        Client::new(&addr, "ann", config, input).await.unwrap()
    }

    async fn recv_from(socket: &UdpSocket) -> (String, SocketAddr) {
        let mut buffer = [0u8; 128];
        let (len, from) = timeout(Duration::from_secs(1), socket.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        (String::from_utf8_lossy(&buffer[..len]).into_owned(), from)
    }

    async fn settle(client: &mut Client) -> bool {
        let mut running = true;
        for _ in 0..5 {
            sleep(Duration::from_millis(10)).await;
            running &= client.tick();
        }
        running
    }

    #[tokio::test]
    async fn test_join_and_welcome() {
        let authority = authority().await;
        let mut client = client(&authority).await;
        assert!(client
            .game()
            .roster()
            .iter()
            .all(|c| c.role == Role::NetworkPlaying));

        client.join();
        let (text, peer) = recv_from(&authority).await;
        assert_eq!(text, "JOIN ann");

        authority.send_to(b"WELCOME 3 2", peer).await.unwrap();
        assert!(settle(&mut client).await);

        assert_eq!(client.character(), Some(CharacterId::Blue));
        assert_eq!(client.game().config().lives, 2);
        assert_eq!(client.game().character(CharacterId::Blue).role, Role::Human);

        client.shutdown().await;
        assert_eq!(client.session_state(), SessionState::Idle);
        assert!(client.game().roster().iter().all(|c| c.role == Role::Ai));
    }

    #[tokio::test]
    async fn test_reject_ends_session() {
        let authority = authority().await;
        let mut client = client(&authority).await;
        client.join();
        let (_, peer) = recv_from(&authority).await;

        authority.send_to(b"REJECT", peer).await.unwrap();
        assert!(!settle(&mut client).await);
        assert_eq!(client.ending(), Ending::Rejected);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_strangers_are_ignored() {
        let authority = authority().await;
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut client = client(&authority).await;
        client.join();
        let (_, peer) = recv_from(&authority).await;

        stranger.send_to(b"WELCOME 1 5", peer).await.unwrap();
        settle(&mut client).await;
        assert_eq!(client.character(), None);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_join_is_resent_until_welcomed() {
        let authority = authority().await;
        let config = GameConfig {
            ping_interval_ticks: 3,
            ..GameConfig::default()
        };
        let mut client = client_with(&authority, config).await;

        // The first JOIN is lost on the way
        client.join();
        let (first, peer) = recv_from(&authority).await;
        assert_eq!(first, "JOIN ann");

        for _ in 0..3 {
            client.tick();
        }
        let (again, _) = recv_from(&authority).await;
        assert_eq!(again, "JOIN ann");

        authority.send_to(b"WELCOME 2 5", peer).await.unwrap();
        assert!(settle(&mut client).await);
        assert_eq!(client.character(), Some(CharacterId::Green));

        // Once welcomed the peer pings instead
        for _ in 0..3 {
            client.tick();
        }
        let (sent, _) = recv_from(&authority).await;
        assert!(sent.starts_with("PING "), "unexpected {}", sent);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_unwelcomed_peer_gives_up() {
        let authority = authority().await;
        let config = GameConfig {
            peer_timeout_secs: 1,
            ..GameConfig::default()
        };
        let mut client = client_with(&authority, config).await;
        client.join();
        let (_, peer) = recv_from(&authority).await;

        let mut running = true;
        for _ in 0..200 {
            authority.send_to(b"PING 9", peer).await.unwrap();
            sleep(Duration::from_millis(10)).await;
            if !client.tick() {
                running = false;
                break;
            }
        }
        assert!(!running);
        assert_eq!(client.ending(), Ending::TimedOut);
        assert_eq!(client.character(), None);
        client.shutdown().await;
    }

    #[test]
    fn test_authority_address_adds_default_port() {
        assert_eq!(authority_address("127.0.0.1"), "127.0.0.1:4893");
        assert_eq!(authority_address("10.0.0.2:9000"), "10.0.0.2:9000");
        assert_eq!(authority_address("::1"), "[::1]:4893");
        assert_eq!(authority_address("[::1]:7000"), "[::1]:7000");
        assert_eq!(authority_address("[::1]"), "[::1]:4893");
        assert_eq!(authority_address("arena.local"), "arena.local:4893");
        assert_eq!(authority_address("arena.local:5000"), "arena.local:5000");
    }
}
