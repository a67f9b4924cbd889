//! # Arena Peer
//!
//! The peer side of a checkerboard arena session. A peer controls exactly one
//! character, assigned by the authority in reply to `JOIN`, and mirrors the
//! rest of the session from the authority's messages.
//!
//! ## Synchronisation
//!
//! ### Local prediction
//! The peer runs its own character through the same movement validator the
//! authority uses and applies accepted steps at once, then forwards the
//! request as `REMOTE_MOVE`. Throws are predicted the same way and forwarded
//! as `SHOOT_WEAPON`.
//!
//! ### Authority corrections
//! `MOVE`, `DIED`, `KILLS`, `SPAWN` and `RESET` are applied without any local
//! validation. The authority sends a `MOVE` keyframe for every character at a
//! fixed interval, so any mispredicted step is overwritten within a fraction
//! of a second.
//!
//! ### Local simulation
//! Weapon flight, tile destruction and tile recovery run locally from the
//! `SHOOT_WEAPON` events. Eliminations and respawns never do; those come only
//! from the authority.
//!
//! ## Module Organization
//!
//! - `network`: session setup, the tick loop and message handling. Local
//!   input comes from `shared::InputManager`.
//! - `rendering`: a plain-text board dump for the console

pub mod network;
pub mod rendering;
