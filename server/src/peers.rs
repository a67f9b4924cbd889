//! Peer bookkeeping for the authority
//!
//! This module tracks which remote process controls which character:
//! - Slot assignment when a peer sends `JOIN`
//! - Address lookup so requests can be checked against the sender
//! - Liveness tracking for the heartbeat timeout
//!
//! The set of slots is fixed when the session opens. A slot, once taken, stays
//! with its peer until the session ends; there is no mid-round rejoin.

use log::info;
use shared::CharacterId;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A remote process driving one character
#[derive(Debug, Clone)]
pub struct Peer {
    /// The character this peer controls
    pub character: CharacterId,
    /// Where fan-out for this peer is sent
    pub addr: SocketAddr,
    /// Display name from the `JOIN` request
    pub name: String,
    /// Last time any datagram arrived from this peer
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(character: CharacterId, addr: SocketAddr, name: String) -> Self {
        Self {
            character,
            addr,
            name,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// True if nothing has been heard from this peer within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// The peers of one authority session, in join order
pub struct PeerManager {
    peers: Vec<Peer>,
    /// Slots still free, handed out front to back
    open_slots: Vec<CharacterId>,
}

impl PeerManager {
    /// Creates a manager that will hand out `slots` in order
    pub fn new(slots: &[CharacterId]) -> Self {
        Self {
            peers: Vec::new(),
            open_slots: slots.to_vec(),
        }
    }

    /// Assigns the next free slot to a new peer.
    ///
    /// A second `JOIN` from an address that already holds a slot gets the
    /// same slot back and does not count as a new peer. Returns `None` when
    /// every slot is taken.
    pub fn add_peer(&mut self, addr: SocketAddr, name: String) -> Option<(CharacterId, bool)> {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.addr == addr) {
            peer.touch();
            return Some((peer.character, false));
        }
        if self.open_slots.is_empty() {
            return None;
        }

        let character = self.open_slots.remove(0);
        info!("{} joined from {} as {}", name, addr, character);
        self.peers.push(Peer::new(character, addr, name));
        Some((character, true))
    }

    pub fn remove_peer(&mut self, addr: SocketAddr) -> Option<Peer> {
        let index = self.peers.iter().position(|p| p.addr == addr)?;
        let peer = self.peers.remove(index);
        info!("{} ({}) left", peer.name, peer.character);
        Some(peer)
    }

    /// The character controlled from `addr`, if any
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<CharacterId> {
        self.peers
            .iter()
            .find(|p| p.addr == addr)
            .map(|p| p.character)
    }

    pub fn get(&self, character: CharacterId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.character == character)
    }

    /// Refreshes the liveness timestamp of the peer at `addr`
    pub fn touch(&mut self, addr: SocketAddr) -> bool {
        match self.peers.iter_mut().find(|p| p.addr == addr) {
            Some(peer) => {
                peer.touch();
                true
            }
            None => false,
        }
    }

    /// Characters whose peers have gone quiet for longer than `timeout`
    pub fn check_timeouts(&self, timeout: Duration) -> Vec<CharacterId> {
        self.peers
            .iter()
            .filter(|p| p.is_timed_out(timeout))
            .map(|p| p.character)
            .collect()
    }

    /// Fan-out targets, skipping the peer that controls `exclude`
    pub fn addrs_except(&self, exclude: Option<CharacterId>) -> Vec<SocketAddr> {
        self.peers
            .iter()
            .filter(|p| Some(p.character) != exclude)
            .map(|p| p.addr)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_slots_assigned_in_order() {
        let mut peers = PeerManager::new(&CharacterId::PEER_SLOTS);

        assert_eq!(
            peers.add_peer(addr(5001), "ann".into()),
            Some((CharacterId::Red, true))
        );
        assert_eq!(
            peers.add_peer(addr(5002), "bo".into()),
            Some((CharacterId::Green, true))
        );
        assert_eq!(peers.len(), 2);
        assert_eq!(peers.find_by_addr(addr(5002)), Some(CharacterId::Green));
        assert_eq!(peers.get(CharacterId::Red).map(|p| p.name.as_str()), Some("ann"));
    }

    #[test]
    fn test_duplicate_join_keeps_slot() {
        let mut peers = PeerManager::new(&[CharacterId::Red, CharacterId::Green]);
        peers.add_peer(addr(5001), "ann".into());

        assert_eq!(
            peers.add_peer(addr(5001), "ann".into()),
            Some((CharacterId::Red, false))
        );
        assert_eq!(peers.len(), 1);
    }

    #[test]
    fn test_full_session_rejects() {
        let mut peers = PeerManager::new(&[CharacterId::Blue]);
        assert!(peers.add_peer(addr(5001), "ann".into()).is_some());
        assert_eq!(peers.add_peer(addr(5002), "bo".into()), None);
        assert!(peers.find_by_addr(addr(5002)).is_none());
    }

    #[test]
    fn test_fan_out_excludes_controller() {
        let mut peers = PeerManager::new(&CharacterId::PEER_SLOTS);
        for port in [5001, 5002, 5003] {
            peers.add_peer(addr(port), format!("p{}", port));
        }

        let targets = peers.addrs_except(Some(CharacterId::Green));
        assert_eq!(targets, vec![addr(5001), addr(5003)]);
        assert_eq!(peers.addrs_except(None).len(), 3);
        assert_eq!(peers.addrs_except(Some(CharacterId::Pink)).len(), 3);
    }

    #[test]
    fn test_timeouts_and_removal() {
        let mut peers = PeerManager::new(&CharacterId::PEER_SLOTS);
        peers.add_peer(addr(5001), "ann".into());
        assert!(peers.check_timeouts(Duration::from_secs(5)).is_empty());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(
            peers.check_timeouts(Duration::from_millis(10)),
            vec![CharacterId::Red]
        );
        assert!(peers.touch(addr(5001)));
        assert!(peers.check_timeouts(Duration::from_millis(10)).is_empty());

        assert!(peers.remove_peer(addr(5001)).is_some());
        assert!(peers.is_empty());
        assert!(!peers.touch(addr(5001)));
    }
}
