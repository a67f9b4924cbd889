//! Session lifecycle and the background network task
//!
//! A session moves through `Idle -> Initializing -> WaitingForPeers -> Active
//! -> Terminating -> Idle`; peers skip `WaitingForPeers`. [`ConnectionSlot`]
//! holds at most one [`NetworkConnection`] and refuses to open a new one until
//! the previous one's task has been joined.
//!
//! The network task owns the socket for receiving. It decodes datagrams and
//! hands them to the simulation loop over a channel, and it sends whatever the
//! loop queues on the command channel. It never touches game state.

use crate::character::{CharacterId, Roster};
use crate::protocol::Message;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const RECV_BUFFER_LEN: usize = 512;
const RUN_FLAG_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Transport being opened; only seen from inside `host`/`join`
    Initializing,
    WaitingForPeers,
    Active,
    Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Authority,
    Peer,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to resolve {address}: {source}")]
    Resolve { address: String, source: io::Error },
    #[error("{0} did not resolve to any address")]
    NoAddress(String),
    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },
    #[error("a session is already open")]
    AlreadyOpen,
}

/// Something the network task observed
#[derive(Debug)]
pub enum NetEvent {
    Received { message: Message, from: SocketAddr },
    /// The transport failed; the session is over
    Closed,
}

/// Work queued for the network task
#[derive(Debug)]
pub enum NetCommand {
    Send { message: Message, to: Vec<SocketAddr> },
}

pub struct NetworkConnection {
    role: SessionRole,
    state: SessionState,
    socket: Arc<UdpSocket>,
    peer_addr: Option<SocketAddr>,
    task: Option<JoinHandle<()>>,
    should_run: Arc<AtomicBool>,
    players_to_wait_for: usize,
}

impl NetworkConnection {
    fn new(
        role: SessionRole,
        socket: UdpSocket,
        peer_addr: Option<SocketAddr>,
        players_to_wait_for: usize,
    ) -> Self {
        let state = if players_to_wait_for == 0 {
            SessionState::Active
        } else {
            SessionState::WaitingForPeers
        };
        debug!("Session {:?} -> {:?}", SessionState::Initializing, state);
        Self {
            role,
            state,
            socket: Arc::new(socket),
            peer_addr,
            task: None,
            should_run: Arc::new(AtomicBool::new(true)),
            players_to_wait_for,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Where a peer sends its requests
    pub fn authority_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_running(&self) -> bool {
        self.should_run.load(Ordering::Relaxed)
    }

    pub fn players_to_wait_for(&self) -> usize {
        self.players_to_wait_for
    }

    /// Counts one more peer in. Returns the state afterwards.
    pub fn record_join(&mut self) -> SessionState {
        if self.state == SessionState::WaitingForPeers {
            self.players_to_wait_for = self.players_to_wait_for.saturating_sub(1);
            if self.players_to_wait_for == 0 {
                info!("All peers joined");
                self.state = SessionState::Active;
            }
        }
        self.state
    }

    /// Spawns the network task. A peer only accepts datagrams from its
    /// authority.
    pub fn start(
        &mut self,
        events: mpsc::UnboundedSender<NetEvent>,
    ) -> mpsc::UnboundedSender<NetCommand> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_network_task(
            Arc::clone(&self.socket),
            Arc::clone(&self.should_run),
            self.peer_addr,
            events,
            command_rx,
        ));
        self.task = Some(task);
        command_tx
    }

    fn stop(&mut self) {
        self.state = SessionState::Terminating;
        self.should_run.store(false, Ordering::Relaxed);
    }

    async fn join_task(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Network task failed: {}", e);
            }
        }
        info!("Session closed");
    }
}

/// The process-wide home of the current session
#[derive(Default)]
pub struct ConnectionSlot {
    active: Option<NetworkConnection>,
    teardown: Option<NetworkConnection>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        match (&self.active, &self.teardown) {
            (Some(connection), _) => connection.state(),
            (None, Some(_)) => SessionState::Terminating,
            (None, None) => SessionState::Idle,
        }
    }

    pub fn connection(&self) -> Option<&NetworkConnection> {
        self.active.as_ref()
    }

    pub fn connection_mut(&mut self) -> Option<&mut NetworkConnection> {
        self.active.as_mut()
    }

    /// Opens an authority session on `bind_addr`, handing `peer_slots` to the
    /// network. The roles are rolled back if the socket cannot be bound.
    pub async fn host(
        &mut self,
        bind_addr: &str,
        peer_slots: &[CharacterId],
        roster: &mut Roster,
    ) -> Result<&mut NetworkConnection, SessionError> {
        self.finish_teardown().await;
        if self.active.is_some() {
            return Err(SessionError::AlreadyOpen);
        }

        roster.begin_hosting(peer_slots);
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(source) => {
                roster.restore_backups();
                return Err(SessionError::Bind {
                    address: bind_addr.to_string(),
                    source,
                });
            }
        };

        info!(
            "Hosting on {} with {} peer slots",
            bind_addr,
            peer_slots.len()
        );
        let connection =
            NetworkConnection::new(SessionRole::Authority, socket, None, peer_slots.len());
        Ok(self.active.insert(connection))
    }

    /// Opens a peer session towards `authority`. Every character belongs to
    /// the network until the authority assigns one to us.
    pub async fn join(
        &mut self,
        authority: &str,
        roster: &mut Roster,
    ) -> Result<&mut NetworkConnection, SessionError> {
        self.finish_teardown().await;
        if self.active.is_some() {
            return Err(SessionError::AlreadyOpen);
        }

        roster.begin_joining();
        let (socket, authority_addr) = match open_peer_socket(authority).await {
            Ok(opened) => opened,
            Err(e) => {
                roster.restore_backups();
                return Err(e);
            }
        };

        info!("Joining {} ({})", authority, authority_addr);
        let connection =
            NetworkConnection::new(SessionRole::Peer, socket, Some(authority_addr), 0);
        Ok(self.active.insert(connection))
    }

    /// Stops the current session and restores local roles without waiting
    /// for the network task.
    pub fn begin_close(&mut self, roster: &mut Roster) {
        if let Some(mut connection) = self.active.take() {
            connection.stop();
            roster.restore_backups();
            self.teardown = Some(connection);
        }
    }

    /// Stops the current session and waits for its network task
    pub async fn close(&mut self, roster: &mut Roster) {
        self.begin_close(roster);
        self.finish_teardown().await;
    }

    async fn finish_teardown(&mut self) {
        if let Some(connection) = self.teardown.take() {
            connection.join_task().await;
        }
    }
}

async fn open_peer_socket(authority: &str) -> Result<(UdpSocket, SocketAddr), SessionError> {
    let mut addrs = lookup_host(authority)
        .await
        .map_err(|source| SessionError::Resolve {
            address: authority.to_string(),
            source,
        })?;
    let authority_addr = addrs
        .next()
        .ok_or_else(|| SessionError::NoAddress(authority.to_string()))?;

    let local = if authority_addr.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(local)
        .await
        .map_err(|source| SessionError::Bind {
            address: local.to_string(),
            source,
        })?;
    Ok((socket, authority_addr))
}

async fn run_network_task(
    socket: Arc<UdpSocket>,
    should_run: Arc<AtomicBool>,
    only_from: Option<SocketAddr>,
    events: mpsc::UnboundedSender<NetEvent>,
    mut commands: mpsc::UnboundedReceiver<NetCommand>,
) {
    let mut buffer = [0u8; RECV_BUFFER_LEN];
    let mut poll = tokio::time::interval(RUN_FLAG_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while should_run.load(Ordering::Relaxed) {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, from)) => {
                    if only_from.map_or(false, |expected| expected != from) {
                        debug!("Ignoring datagram from stranger {}", from);
                    } else {
                        match Message::decode(&buffer[..len]) {
                            Ok(message) => {
                                if events.send(NetEvent::Received { message, from }).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Discarding datagram from {}: {}", from, e),
                        }
                    }
                }
                Err(e) => {
                    error!("Socket receive failed: {}", e);
                    let _ = events.send(NetEvent::Closed);
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(command) => send(&socket, command).await,
                None => break,
            },
            _ = poll.tick() => {}
        }
    }

    // Flush what was queued before the stop, such as a final QUIT
    while let Ok(command) = commands.try_recv() {
        send(&socket, command).await;
    }
    debug!("Network task stopped");
}

async fn send(socket: &UdpSocket, command: NetCommand) {
    let NetCommand::Send { message, to } = command;
    let data = message.encode();
    for addr in to {
        if let Err(e) = socket.send_to(&data, addr).await {
            warn!("Failed to send {} to {}: {}", message.tag(), addr, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Role;
    use tokio::time::timeout;

    fn roles(roster: &Roster) -> Vec<Role> {
        roster.iter().map(|c| c.role).collect()
    }

    #[tokio::test]
    async fn test_host_waits_for_every_peer() {
        let mut slot = ConnectionSlot::new();
        let mut roster = Roster::new();

        let connection = slot
            .host("127.0.0.1:0", &[CharacterId::Red, CharacterId::Green], &mut roster)
            .await
            .unwrap();
        assert_eq!(connection.role(), SessionRole::Authority);
        assert_eq!(connection.players_to_wait_for(), 2);
        assert_eq!(connection.record_join(), SessionState::WaitingForPeers);
        assert_eq!(connection.record_join(), SessionState::Active);
        assert_eq!(connection.record_join(), SessionState::Active);

        assert_eq!(roster.get(CharacterId::Red).role, Role::NetworkPending);
        assert_eq!(roster.get(CharacterId::Blue).role, Role::Ai);
        slot.close(&mut roster).await;
    }

    #[tokio::test]
    async fn test_host_without_peers_is_active() {
        let mut slot = ConnectionSlot::new();
        let mut roster = Roster::new();
        slot.host("127.0.0.1:0", &[], &mut roster).await.unwrap();
        assert_eq!(slot.state(), SessionState::Active);
        slot.close(&mut roster).await;
    }

    #[tokio::test]
    async fn test_bind_failure_rolls_back_roles() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap().to_string();
        let mut slot = ConnectionSlot::new();
        let mut roster = Roster::new();
        let before = roles(&roster);

        let result = slot
            .host(&address, &CharacterId::PEER_SLOTS, &mut roster)
            .await;

        assert!(matches!(result, Err(SessionError::Bind { .. })));
        assert_eq!(roles(&roster), before);
        assert_eq!(slot.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_resolve_failure_rolls_back_roles() {
        let mut slot = ConnectionSlot::new();
        let mut roster = Roster::new();
        let before = roles(&roster);

        let result = slot.join("no port here", &mut roster).await;

        assert!(matches!(result, Err(SessionError::Resolve { .. })));
        assert_eq!(roles(&roster), before);
        assert_eq!(slot.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_only_one_session_at_a_time() {
        let mut slot = ConnectionSlot::new();
        let mut roster = Roster::new();
        slot.host("127.0.0.1:0", &[CharacterId::Blue], &mut roster)
            .await
            .unwrap();

        let second = slot.join("127.0.0.1:4893", &mut roster).await;
        assert!(matches!(second, Err(SessionError::AlreadyOpen)));
        assert_eq!(roster.get(CharacterId::Red).role, Role::Ai);
        slot.close(&mut roster).await;
    }

    #[tokio::test]
    async fn test_close_joins_task_and_restores_roles() {
        let mut slot = ConnectionSlot::new();
        let mut roster = Roster::new();
        let (event_tx, _event_rx) = mpsc::unbounded_channel();

        let connection = slot
            .host("127.0.0.1:0", &CharacterId::PEER_SLOTS, &mut roster)
            .await
            .unwrap();
        let _commands = connection.start(event_tx);
        assert!(connection.is_running());

        slot.begin_close(&mut roster);
        assert_eq!(slot.state(), SessionState::Terminating);
        assert!(roster.iter().all(|c| c.role == Role::Ai));

        timeout(Duration::from_secs(1), slot.close(&mut roster))
            .await
            .unwrap();
        assert_eq!(slot.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_task_forwards_valid_messages_only() {
        let mut slot = ConnectionSlot::new();
        let mut roster = Roster::new();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let connection = slot
            .host("127.0.0.1:0", &[CharacterId::Red], &mut roster)
            .await
            .unwrap();
        let authority = connection.local_addr().unwrap();
        let commands = connection.start(event_tx);

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"FLY 1", authority).await.unwrap();
        sender.send_to(b"PING 8", authority).await.unwrap();

        let event = timeout(Duration::from_secs(1), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let (message, from) = match event {
            NetEvent::Received { message, from } => (message, from),
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(message, Message::Ping { sequence: 8 });
        assert_eq!(from, sender.local_addr().unwrap());

        commands
            .send(NetCommand::Send {
                message: Message::Pong { sequence: 8 },
                to: vec![from],
            })
            .unwrap();
        let mut buffer = [0u8; 64];
        let (len, _) = timeout(Duration::from_secs(1), sender.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buffer[..len], b"PONG 8");

        slot.close(&mut roster).await;
    }
}
