//! The fixed roster of four characters

use crate::weapon::Weapon;
use serde::{Deserialize, Serialize};
use std::fmt;

/// z-plane a character occupies while standing on the board
pub const ALIVE_Z: f32 = 2.0;
/// z-plane of a character that has fallen through the board
pub const FALLEN_Z: f32 = -10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CharacterId {
    Red = 1,
    Green = 2,
    Blue = 3,
    Pink = 4,
}

impl CharacterId {
    pub const ALL: [CharacterId; 4] = [
        CharacterId::Red,
        CharacterId::Green,
        CharacterId::Blue,
        CharacterId::Pink,
    ];

    /// Slots handed to remote peers, in join order
    pub const PEER_SLOTS: [CharacterId; 3] =
        [CharacterId::Red, CharacterId::Green, CharacterId::Blue];

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(CharacterId::Red),
            2 => Some(CharacterId::Green),
            3 => Some(CharacterId::Blue),
            4 => Some(CharacterId::Pink),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        self as u8
    }

    pub(crate) fn slot(self) -> usize {
        self as usize - 1
    }

    pub fn label(self) -> &'static str {
        match self {
            CharacterId::Red => "Red",
            CharacterId::Green => "Green",
            CharacterId::Blue => "Blue",
            CharacterId::Pink => "Pink",
        }
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Facing and travel direction. `Up` increases y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const MOVING: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            Direction::None => "NONE",
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "NONE" => Some(Direction::None),
            "UP" => Some(Direction::Up),
            "DOWN" => Some(Direction::Down),
            "LEFT" => Some(Direction::Left),
            "RIGHT" => Some(Direction::Right),
            _ => None,
        }
    }

    /// Unit step along the board axes
    pub fn delta(self) -> (f32, f32) {
        match self {
            Direction::None => (0.0, 0.0),
            Direction::Up => (0.0, 1.0),
            Direction::Down => (0.0, -1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Who drives a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    Human,
    #[default]
    Ai,
    NetworkPending,
    NetworkPlaying,
}

#[derive(Debug, Clone)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub direction: Direction,
    /// Facing saved while the weapon is in flight
    pub backup_direction: Direction,
    pub lives: u32,
    pub kills: u32,
    pub wins: u32,
    pub role: Role,
    /// Role held before a network session took the character over
    pub backup_role: Option<Role>,
    /// Ticks left off-board before respawning
    pub recovery_timer: u32,
    pub weapon: Weapon,
    /// Impact tile of the most recent weapon run
    pub destroyed_tile: Option<usize>,
}

impl Character {
    pub fn new(id: CharacterId) -> Self {
        Self {
            id,
            name: id.label().to_string(),
            x: 0.0,
            y: 0.0,
            z: FALLEN_Z,
            direction: Direction::None,
            backup_direction: Direction::None,
            lives: 0,
            kills: 0,
            wins: 0,
            role: Role::default(),
            backup_role: None,
            recovery_timer: 0,
            weapon: Weapon::new(id),
            destroyed_tile: None,
        }
    }

    /// Standing on the board with lives left
    pub fn is_alive(&self) -> bool {
        self.lives > 0 && self.on_board()
    }

    pub fn on_board(&self) -> bool {
        (self.z - ALIVE_Z).abs() < f32::EPSILON
    }

    /// Out of lives; ignores all input until the next round
    pub fn is_inert(&self) -> bool {
        self.lives == 0
    }

    pub fn place(&mut self, x: f32, y: f32, direction: Direction) {
        self.x = x;
        self.y = y;
        self.z = ALIVE_Z;
        self.direction = direction;
        self.recovery_timer = 0;
    }

    /// Drops the character through the board and freezes it
    pub fn fall(&mut self, recovery_ticks: u32) {
        self.z = FALLEN_Z;
        self.direction = Direction::None;
        self.recovery_timer = if self.lives > 0 { recovery_ticks } else { 0 };
    }

    /// Switches role, remembering the first role that was replaced
    pub fn enter_role(&mut self, role: Role) {
        if self.backup_role.is_none() {
            self.backup_role = Some(self.role);
        }
        self.role = role;
    }

    pub fn restore_role(&mut self) {
        if let Some(role) = self.backup_role.take() {
            self.role = role;
        }
    }
}

/// Arena of exactly one character per identity
#[derive(Debug, Clone)]
pub struct Roster {
    characters: [Character; 4],
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    pub fn new() -> Self {
        Self {
            characters: CharacterId::ALL.map(Character::new),
        }
    }

    pub fn get(&self, id: CharacterId) -> &Character {
        &self.characters[id.slot()]
    }

    pub fn get_mut(&mut self, id: CharacterId) -> &mut Character {
        &mut self.characters[id.slot()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Character> {
        self.characters.iter_mut()
    }

    /// The three characters other than `id`, in roster order
    pub fn others(&self, id: CharacterId) -> [&Character; 3] {
        let [red, green, blue, pink] = &self.characters;
        match id {
            CharacterId::Red => [green, blue, pink],
            CharacterId::Green => [red, blue, pink],
            CharacterId::Blue => [red, green, pink],
            CharacterId::Pink => [red, green, blue],
        }
    }

    pub fn with_lives(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter().filter(|c| c.lives > 0)
    }

    /// Clears per-round state and hands every character a fresh stock of lives
    pub fn reset_for_round(&mut self, lives: u32) {
        for character in &mut self.characters {
            character.lives = lives;
            character.kills = 0;
            character.z = FALLEN_Z;
            character.direction = Direction::None;
            character.backup_direction = Direction::None;
            character.recovery_timer = 0;
            character.destroyed_tile = None;
            character.weapon.reset();
        }
    }

    /// Marks the given slots as awaiting a remote peer
    pub fn begin_hosting(&mut self, peer_slots: &[CharacterId]) {
        for &id in peer_slots {
            self.get_mut(id).enter_role(Role::NetworkPending);
        }
    }

    /// Hands every character to the network until the authority assigns ours
    pub fn begin_joining(&mut self) {
        for character in &mut self.characters {
            character.enter_role(Role::NetworkPlaying);
        }
    }

    pub fn restore_backups(&mut self) {
        for character in &mut self.characters {
            character.restore_role();
        }
    }
}
