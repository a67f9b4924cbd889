//! # Arena Authority
//!
//! The authoritative side of a checkerboard arena session. It owns the
//! canonical simulation, drives the Pink character (with the local AI, or
//! with console input when someone plays at the authority), and admits up
//! to three remote peers for Red, Green and Blue in join order.
//!
//! ## Responsibilities
//!
//! ### Admission
//! A peer sends `JOIN <name>` and receives `WELCOME <id> <lives>` or `REJECT`.
//! The round does not start until every expected peer has joined; meanwhile
//! the authority broadcasts `WAITING <n>`.
//!
//! ### Request validation
//! `REMOTE_MOVE` and `SHOOT_WEAPON` are accepted only from the address that
//! controls the named character, and only if the movement validator agrees.
//! Steps are queued and taken on the next tick, at most one per character per
//! tick no matter how many datagrams arrive. Accepted requests are rebroadcast
//! to everyone else; refused ones are dropped silently and corrected by the
//! next keyframe.
//!
//! ### Liveness
//! Any datagram refreshes a peer's timestamp. `PING` is answered only for
//! peers that have joined. A peer silent for longer than
//! the configured timeout, or one that sends `QUIT`, ends the session.
//!
//! ## Architecture
//!
//! A single background task owns the socket. It decodes datagrams into events
//! for the tick loop and sends whatever the loop queues, fanning out to peers
//! one after another. The tick loop drains all events before advancing the
//! simulation, so every request received before a tick is applied before that
//! tick's weapons, destruction and eliminations run.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::GameConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Two remote peers (Red and Green); Blue and Pink stay with the AI
//!     let mut server = Server::new("0.0.0.0:4893", GameConfig::default(), 2, 1).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod peers;
