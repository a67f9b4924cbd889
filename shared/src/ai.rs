//! Computer-controlled characters
//!
//! Each AI character wanders the board in a biased random walk: it keeps its
//! heading for one to two seconds, turns early when the validator refuses the
//! next step or the tile ahead has fallen, and alternates between horizontal
//! and vertical turns. It throws at opponents lined up ahead of it. AI input
//! goes through the same validator as everyone else.

use crate::board::Board;
use crate::character::{Character, CharacterId, Direction, Roster};
use crate::collision::can_move;
use crate::config::{Difficulty, GameConfig};
use crate::input::InputIntent;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, Copy, Default)]
struct Brain {
    turn_in: u32,
    fire_cooldown: u32,
    prefer_horizontal: bool,
}

#[derive(Debug, Clone)]
pub struct AiController {
    difficulty: Difficulty,
    brains: [Brain; 4],
}

impl AiController {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            brains: [Brain::default(); 4],
        }
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    /// Decides this tick's intent for character `id`
    pub fn decide<R: Rng>(
        &mut self,
        id: CharacterId,
        roster: &Roster,
        board: &Board,
        config: &GameConfig,
        rng: &mut R,
    ) -> InputIntent {
        let me = roster.get(id);
        if !me.is_alive() || me.direction == Direction::None || me.weapon.animating {
            return InputIntent::idle();
        }

        let others = roster.others(id);
        let brain = &mut self.brains[id.slot()];
        brain.turn_in = brain.turn_in.saturating_sub(1);
        brain.fire_cooldown = brain.fire_cooldown.saturating_sub(1);

        let tick_rate = config.tick_rate.max(1);
        let mut direction = me.direction;
        let blocked = !can_move(direction, me, others, board, &config.collision)
            || ahead_has_fallen(me, direction, board);

        if brain.turn_in == 0 || blocked {
            let primary = if brain.prefer_horizontal {
                [Direction::Left, Direction::Right]
            } else {
                [Direction::Up, Direction::Down]
            };
            let secondary = if brain.prefer_horizontal {
                [Direction::Up, Direction::Down]
            } else {
                [Direction::Left, Direction::Right]
            };
            brain.prefer_horizontal = !brain.prefer_horizontal;

            let open = |candidates: [Direction; 2]| -> Vec<Direction> {
                candidates
                    .into_iter()
                    .filter(|&d| {
                        can_move(d, me, others, board, &config.collision)
                            && !ahead_has_fallen(me, d, board)
                    })
                    .collect()
            };
            let mut choices = open(primary);
            if choices.is_empty() {
                choices = open(secondary);
            }
            direction = match choices.choose(rng) {
                Some(&choice) => choice,
                None if blocked => Direction::None,
                None => direction,
            };
            brain.turn_in = rng.gen_range(tick_rate..=2 * tick_rate);
        }

        let mut fire = false;
        if brain.fire_cooldown == 0 && target_in_line(me, others, me.direction) {
            brain.fire_cooldown = self.difficulty.fire_cooldown_secs() * tick_rate;
            fire = rng.gen_range(0..10) >= self.difficulty.hesitation();
        }

        InputIntent { direction, fire }
    }
}

/// Whether the tile in front of `character` has been destroyed
fn ahead_has_fallen(character: &Character, direction: Direction, board: &Board) -> bool {
    board
        .tile_at(character.x, character.y)
        .and_then(|tile| tile.neighbor(direction))
        .map_or(false, |next| board.is_destroyed(next))
}

/// Whether a live opponent shares `character`'s lane ahead of it
pub fn target_in_line(character: &Character, others: [&Character; 3], facing: Direction) -> bool {
    others.iter().any(|other| {
        if !other.is_alive() {
            return false;
        }
        let dx = other.x - character.x;
        let dy = other.y - character.y;
        match facing {
            Direction::Right => dx > 0.0 && dy.abs() < 1.0,
            Direction::Left => dx < 0.0 && dy.abs() < 1.0,
            Direction::Up => dy > 0.0 && dx.abs() < 1.0,
            Direction::Down => dy < 0.0 && dx.abs() < 1.0,
            Direction::None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Destruction;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn standing(roster: &mut Roster, id: CharacterId, x: f32, y: f32, direction: Direction) {
        let character = roster.get_mut(id);
        character.lives = 3;
        character.place(x, y, direction);
    }

    #[test]
    fn test_dead_character_stays_idle() {
        let roster = Roster::new();
        let board = Board::new();
        let mut ai = AiController::new(Difficulty::Hard);
        let mut rng = StdRng::seed_from_u64(1);

        let config = GameConfig::default();
        let intent = ai.decide(CharacterId::Red, &roster, &board, &config, &mut rng);
        assert_eq!(intent, InputIntent::idle());
    }

    #[test]
    fn test_chosen_directions_are_always_legal() {
        let config = GameConfig::default();
        let mut board = Board::new();
        board.flood_destroy(
            2,
            None,
            Destruction {
                recovery_ticks: 500,
                stagger: 0,
                max_tiles: 1,
            },
        );
        let mut roster = Roster::new();
        let mut ai = AiController::new(Difficulty::Medium);
        let mut rng = StdRng::seed_from_u64(99);

        // Hole to the right, edge below: only Up and Left remain open
        standing(&mut roster, CharacterId::Blue, 0.72, -0.72, Direction::Right);
        for _ in 0..50 {
            let intent = ai.decide(CharacterId::Blue, &roster, &board, &config, &mut rng);
            assert!(
                matches!(intent.direction, Direction::Up | Direction::Left),
                "picked {}",
                intent.direction
            );
        }
    }

    #[test]
    fn test_wandering_stays_on_board() {
        let config = GameConfig::default();
        let board = Board::new();
        let mut roster = Roster::new();
        let mut ai = AiController::new(Difficulty::Easy);
        let mut rng = StdRng::seed_from_u64(3);

        standing(&mut roster, CharacterId::Pink, 6.0, 6.0, Direction::Up);
        for _ in 0..2_000 {
            let intent = ai.decide(CharacterId::Pink, &roster, &board, &config, &mut rng);
            let pink = roster.get(CharacterId::Pink);
            let others = roster.others(pink.id);
            if can_move(intent.direction, pink, others, &board, &config.collision) {
                let (dx, dy) = intent.direction.delta();
                let pink = roster.get_mut(CharacterId::Pink);
                pink.direction = intent.direction;
                pink.x += dx * config.movement_step;
                pink.y += dy * config.movement_step;
            }
            let pink = roster.get(CharacterId::Pink);
            assert!(board.tile_at(pink.x, pink.y).is_some());
        }
    }

    #[test]
    fn test_target_in_line() {
        let mut roster = Roster::new();
        standing(&mut roster, CharacterId::Red, 2.0, 2.0, Direction::Right);
        standing(&mut roster, CharacterId::Green, 10.0, 2.4, Direction::Up);

        let red = roster.get(CharacterId::Red);
        assert!(target_in_line(red, roster.others(red.id), Direction::Right));
        assert!(!target_in_line(red, roster.others(red.id), Direction::Left));
        assert!(!target_in_line(red, roster.others(red.id), Direction::Up));
    }

    #[test]
    fn test_hard_ai_fires_at_lined_up_target() {
        let config = GameConfig::default();
        let board = Board::new();
        let mut roster = Roster::new();
        standing(&mut roster, CharacterId::Red, 2.0, 2.0, Direction::Right);
        standing(&mut roster, CharacterId::Green, 10.0, 2.0, Direction::Up);
        let mut rng = StdRng::seed_from_u64(5);

        let fired = (0..20).any(|_| {
            let mut ai = AiController::new(Difficulty::Hard);
            ai.decide(CharacterId::Red, &roster, &board, &config, &mut rng).fire
        });
        assert!(fired);
    }
}
