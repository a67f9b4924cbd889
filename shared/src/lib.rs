//! Core of the four-player checkerboard arena
//!
//! Everything both sides of a session need lives here: the board and its
//! coordinate mapping, characters and weapons, the movement validator, the
//! text protocol, the AI controller, the deterministic round simulation and
//! the session lifecycle with its background network task.

pub mod ai;
pub mod board;
pub mod character;
pub mod collision;
pub mod config;
pub mod game;
pub mod input;
pub mod protocol;
pub mod session;
pub mod weapon;

pub use board::{tile_center, tile_index, Board, Tile, TileColor, BOARD_SIZE, TILE_COUNT};
pub use character::{Character, CharacterId, Direction, Role, Roster};
pub use collision::can_move;
pub use config::{Difficulty, GameConfig, DEFAULT_PORT};
pub use game::{GameState, Mode, Outgoing, Round};
pub use input::{InputCommand, InputIntent, InputManager};
pub use protocol::{Message, ProtocolError};
pub use session::{ConnectionSlot, NetCommand, NetEvent, SessionError, SessionRole, SessionState};
