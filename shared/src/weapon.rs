//! Thrown weapon bound to its owner

use crate::board::{tile_index, Board, TileColor};
use crate::character::{Character, CharacterId, Direction};
use crate::config::GameConfig;

/// Where a weapon's flight ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impact {
    pub tile: Option<usize>,
    pub victim: Option<CharacterId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weapon {
    pub owner: CharacterId,
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    /// Still visible, including the short linger after impact
    pub rendering: bool,
    /// In flight; the owner can neither move nor fire
    pub animating: bool,
    pub flight_left: u32,
    pub linger_left: u32,
}

impl Weapon {
    pub fn new(owner: CharacterId) -> Self {
        Self {
            owner,
            x: 0.0,
            y: 0.0,
            direction: Direction::None,
            rendering: false,
            animating: false,
            flight_left: 0,
            linger_left: 0,
        }
    }

    pub fn color(&self) -> TileColor {
        TileColor::Owner(self.owner)
    }

    pub fn launch(&mut self, x: f32, y: f32, direction: Direction, flight_ticks: u32) {
        self.x = x;
        self.y = y;
        self.direction = direction;
        self.rendering = true;
        self.animating = true;
        self.flight_left = flight_ticks.max(1);
        self.linger_left = 0;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.owner);
    }

    /// Moves the weapon one tick along its path.
    ///
    /// Flight ends on a direct hit, on entering a tile colored by an opponent,
    /// in front of a destroyed tile or the board edge, or when the range runs
    /// out. Returns the impact once, on the tick flight ends.
    pub fn advance(
        &mut self,
        board: &Board,
        targets: [&Character; 3],
        config: &GameConfig,
    ) -> Option<Impact> {
        if !self.animating {
            if self.rendering {
                self.linger_left = self.linger_left.saturating_sub(1);
                self.rendering = self.linger_left > 0;
            }
            return None;
        }

        let (dx, dy) = self.direction.delta();
        let next_x = self.x + dx * config.weapon_step;
        let next_y = self.y + dy * config.weapon_step;
        self.flight_left = self.flight_left.saturating_sub(1);

        let next_tile = tile_index(next_x, next_y).filter(|&index| !board.is_destroyed(index));
        let Some(tile) = next_tile else {
            return Some(self.land(tile_index(self.x, self.y), None, config));
        };

        self.x = next_x;
        self.y = next_y;

        let tolerance = config.collision.lateral_tolerance;
        let victim = targets
            .iter()
            .find(|target| {
                target.is_alive()
                    && (target.x - self.x).abs() < tolerance
                    && (target.y - self.y).abs() < tolerance
            })
            .map(|target| target.id);

        let enemy_tile = board
            .tile(tile)
            .map_or(false, |t| matches!(t.color, TileColor::Owner(id) if id != self.owner));

        if victim.is_some() || enemy_tile || self.flight_left == 0 {
            return Some(self.land(Some(tile), victim, config));
        }
        None
    }

    fn land(
        &mut self,
        tile: Option<usize>,
        victim: Option<CharacterId>,
        config: &GameConfig,
    ) -> Impact {
        self.animating = false;
        self.linger_left = config.weapon_linger_ticks;
        self.rendering = self.linger_left > 0;
        Impact { tile, victim }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tile_center;
    use crate::character::Roster;
    use assert_approx_eq::assert_approx_eq;

    fn fly(weapon: &mut Weapon, board: &Board, roster: &Roster) -> (Impact, u32) {
        let config = GameConfig::default();
        for tick in 1..=config.weapon_flight_ticks + 1 {
            if let Some(impact) = weapon.advance(board, roster.others(weapon.owner), &config) {
                return (impact, tick);
            }
        }
        panic!("weapon never landed");
    }

    #[test]
    fn test_flight_stops_at_board_edge() {
        let board = Board::new();
        let roster = Roster::new();
        let mut weapon = Weapon::new(CharacterId::Red);
        weapon.launch(10.0, 0.0, Direction::Right, 30);

        let (impact, _) = fly(&mut weapon, &board, &roster);
        assert_eq!(impact.tile, Some(8));
        assert_eq!(impact.victim, None);
        assert!(!weapon.animating);
        assert!(weapon.rendering);
    }

    #[test]
    fn test_flight_stops_on_opponent_color() {
        let mut board = Board::new();
        board.claim(4, CharacterId::Green, 0);
        let roster = Roster::new();
        let mut weapon = Weapon::new(CharacterId::Red);
        weapon.launch(0.0, 0.0, Direction::Right, 30);

        let (impact, ticks) = fly(&mut weapon, &board, &roster);
        assert_eq!(impact.tile, Some(4));
        // 5.0 is the first coordinate inside the fourth column
        assert_eq!(ticks, 7);
    }

    #[test]
    fn test_flight_passes_own_color() {
        let mut board = Board::new();
        board.claim(2, CharacterId::Red, 0);
        let roster = Roster::new();
        let mut weapon = Weapon::new(CharacterId::Red);
        weapon.launch(0.0, 0.0, Direction::Right, 4);

        let (impact, ticks) = fly(&mut weapon, &board, &roster);
        assert_eq!(ticks, 4);
        assert_approx_eq!(weapon.x, 3.0);
        assert_eq!(impact.tile, Some(3));
    }

    #[test]
    fn test_direct_hit_reports_victim() {
        let board = Board::new();
        let mut roster = Roster::new();
        let (x, y) = tile_center(2 + 8 * 2).unwrap();
        let blue = roster.get_mut(CharacterId::Blue);
        blue.lives = 3;
        blue.place(x, y, Direction::Left);

        let mut weapon = Weapon::new(CharacterId::Pink);
        weapon.launch(x, 0.0, Direction::Up, 30);

        let (impact, _) = fly(&mut weapon, &board, &roster);
        assert_eq!(impact.victim, Some(CharacterId::Blue));
        assert_eq!(impact.tile, tile_index(weapon.x, weapon.y));
    }

    #[test]
    fn test_destroyed_tile_stops_flight_before_it() {
        let mut board = Board::new();
        board.flood_destroy(
            3,
            None,
            crate::board::Destruction {
                recovery_ticks: 50,
                stagger: 0,
                max_tiles: 1,
            },
        );
        let roster = Roster::new();
        let mut weapon = Weapon::new(CharacterId::Green);
        weapon.launch(0.0, 0.0, Direction::Right, 30);

        let (impact, _) = fly(&mut weapon, &board, &roster);
        assert_eq!(impact.tile, Some(2));
    }

    #[test]
    fn test_linger_then_hide() {
        let board = Board::new();
        let roster = Roster::new();
        let config = GameConfig::default();
        let mut weapon = Weapon::new(CharacterId::Red);
        weapon.launch(14.0, 14.5, Direction::Up, 30);

        assert!(weapon.advance(&board, roster.others(CharacterId::Red), &config).is_some());
        for _ in 0..config.weapon_linger_ticks {
            assert!(weapon.rendering);
            weapon.advance(&board, roster.others(CharacterId::Red), &config);
        }
        assert!(!weapon.rendering);
    }
}
