//! The 8x8 checkerboard and its per-tile destruction state
//!
//! Tiles live in a flat array addressed 1..=64, row-major from the bottom-left
//! corner. Character coordinates run at twice the board resolution: tile
//! column `c` is centered on `x = 2c` and covers `[2c - 1, 2c + 1)`, with the
//! first column also taking the sliver `(-1, 0)`.

use crate::character::{CharacterId, Direction};
use std::collections::VecDeque;

pub const BOARD_SIZE: usize = 8;
pub const TILE_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// Largest truncated coordinate that still lands on the board
const MAX_AXIS: i32 = 2 * (BOARD_SIZE as i32 - 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileColor {
    Light,
    Dark,
    Owner(CharacterId),
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub index: usize,
    pub col: usize,
    pub row: usize,
    /// up, down, left, right
    neighbors: [Option<usize>; 4],
    pub color: TileColor,
    pub default_color: TileColor,
    pub claimed: bool,
    pub destroyed: bool,
    pub destroyed_by: Option<CharacterId>,
    /// Ticks until a destroyed tile is restored
    pub recovery: u32,
    /// Ticks until a claim fades; zero means it never does
    pub claim_expiry: u32,
}

impl Tile {
    fn new(index: usize) -> Self {
        let (col, row) = tile_coords(index).unwrap_or((0, 0));
        let default_color = if (col + row) % 2 == 0 {
            TileColor::Dark
        } else {
            TileColor::Light
        };
        let neighbor = |dc: i32, dr: i32| {
            let c = col as i32 + dc;
            let r = row as i32 + dr;
            let range = 0..BOARD_SIZE as i32;
            (range.contains(&c) && range.contains(&r))
                .then(|| c as usize + BOARD_SIZE * r as usize + 1)
        };

        Self {
            index,
            col,
            row,
            neighbors: [
                neighbor(0, 1),
                neighbor(0, -1),
                neighbor(-1, 0),
                neighbor(1, 0),
            ],
            color: default_color,
            default_color,
            claimed: false,
            destroyed: false,
            destroyed_by: None,
            recovery: 0,
            claim_expiry: 0,
        }
    }

    pub fn neighbor(&self, direction: Direction) -> Option<usize> {
        match direction {
            Direction::None => None,
            Direction::Up => self.neighbors[0],
            Direction::Down => self.neighbors[1],
            Direction::Left => self.neighbors[2],
            Direction::Right => self.neighbors[3],
        }
    }

    /// Center of the tile in character coordinates
    pub fn center(&self) -> (f32, f32) {
        ((2 * self.col) as f32, (2 * self.row) as f32)
    }

    fn restore(&mut self) {
        self.color = self.default_color;
        self.claimed = false;
        self.destroyed = false;
        self.destroyed_by = None;
        self.recovery = 0;
        self.claim_expiry = 0;
    }
}

/// Buckets one continuous coordinate into a board column or row
fn axis_bucket(value: f32) -> Option<usize> {
    if !value.is_finite() || value <= -1.0 {
        return None;
    }
    let truncated = value as i32;
    if truncated > MAX_AXIS {
        return None;
    }
    Some(((truncated + 1) / 2) as usize)
}

/// Maps a continuous position to its 1-based tile index
pub fn tile_index(x: f32, y: f32) -> Option<usize> {
    let col = axis_bucket(x)?;
    let row = axis_bucket(y)?;
    Some(col + BOARD_SIZE * row + 1)
}

/// Column and row (both zero-based) of a tile index
pub fn tile_coords(index: usize) -> Option<(usize, usize)> {
    (1..=TILE_COUNT)
        .contains(&index)
        .then(|| ((index - 1) % BOARD_SIZE, (index - 1) / BOARD_SIZE))
}

pub fn tile_center(index: usize) -> Option<(f32, f32)> {
    tile_coords(index).map(|(col, row)| ((2 * col) as f32, (2 * row) as f32))
}

/// Timing for a flood destruction run
#[derive(Debug, Clone, Copy)]
pub struct Destruction {
    pub recovery_ticks: u32,
    pub stagger: u32,
    pub max_tiles: usize,
}

#[derive(Debug, Clone)]
pub struct Board {
    tiles: Vec<Tile>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            tiles: (1..=TILE_COUNT).map(Tile::new).collect(),
        }
    }

    pub fn tile(&self, index: usize) -> Option<&Tile> {
        index.checked_sub(1).and_then(|slot| self.tiles.get(slot))
    }

    pub fn tile_mut(&mut self, index: usize) -> Option<&mut Tile> {
        index.checked_sub(1).and_then(|slot| self.tiles.get_mut(slot))
    }

    pub fn tile_at(&self, x: f32, y: f32) -> Option<&Tile> {
        tile_index(x, y).and_then(|index| self.tile(index))
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn is_destroyed(&self, index: usize) -> bool {
        self.tile(index).map_or(true, |tile| tile.destroyed)
    }

    pub fn reset(&mut self) {
        self.tiles.iter_mut().for_each(Tile::restore);
    }

    /// Colors a standing tile for `owner`. Destroyed tiles cannot be claimed.
    pub fn claim(&mut self, index: usize, owner: CharacterId, lifetime: u32) -> bool {
        match self.tile_mut(index) {
            Some(tile) if !tile.destroyed => {
                tile.color = TileColor::Owner(owner);
                tile.claimed = true;
                tile.claim_expiry = lifetime;
                true
            }
            _ => false,
        }
    }

    /// Destroys the connected run of same-colored tiles around `origin`.
    ///
    /// The walk is breadth-first from the impact tile, so the origin is always
    /// the first to fall and tiles further out recover later. Returns the
    /// destroyed indices in the order they fell.
    pub fn flood_destroy(
        &mut self,
        origin: usize,
        by: Option<CharacterId>,
        run: Destruction,
    ) -> Vec<usize> {
        let color = match self.tile(origin) {
            Some(tile) if !tile.destroyed => tile.color,
            _ => return Vec::new(),
        };

        let mut fallen = Vec::new();
        let mut queued = [false; TILE_COUNT + 1];
        let mut frontier = VecDeque::from([origin]);
        queued[origin] = true;

        while let Some(index) = frontier.pop_front() {
            if fallen.len() >= run.max_tiles {
                break;
            }
            let Some(tile) = self.tile_mut(index) else {
                continue;
            };

            tile.destroyed = true;
            tile.destroyed_by = by;
            tile.claimed = false;
            tile.claim_expiry = 0;
            tile.recovery = run.recovery_ticks + run.stagger * fallen.len() as u32;
            let neighbors = tile.neighbors;
            fallen.push(index);

            for next in neighbors.into_iter().flatten() {
                if queued[next] {
                    continue;
                }
                if let Some(candidate) = self.tile(next) {
                    if !candidate.destroyed && candidate.color == color {
                        queued[next] = true;
                        frontier.push_back(next);
                    }
                }
            }
        }

        fallen
    }

    /// Advances recovery and claim countdowns by one tick.
    ///
    /// Returns the tiles that were restored from destruction this tick.
    pub fn tick(&mut self) -> Vec<usize> {
        let mut recovered = Vec::new();
        for tile in &mut self.tiles {
            if tile.destroyed {
                tile.recovery = tile.recovery.saturating_sub(1);
                if tile.recovery == 0 {
                    tile.restore();
                    recovered.push(tile.index);
                }
            } else if tile.claimed && tile.claim_expiry > 0 {
                tile.claim_expiry -= 1;
                if tile.claim_expiry == 0 {
                    tile.restore();
                }
            }
        }
        recovered
    }
}
