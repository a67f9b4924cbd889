//! Movement validation against the board and the other characters
//!
//! The validator is a pure function of its inputs: it never mutates the board
//! or the characters, and the pairwise checks are combined with a plain AND so
//! the order in which the other characters are supplied cannot matter.

use crate::board::{Board, TileColor};
use crate::character::{Character, Direction};
use crate::config::CollisionConfig;

/// Whether `other` stands in the way of `mover` travelling in `direction`
pub fn characters_collide(
    direction: Direction,
    mover: &Character,
    other: &Character,
    config: &CollisionConfig,
) -> bool {
    if mover.id == other.id || mover.is_inert() || other.is_inert() {
        return false;
    }
    if (mover.z - other.z).abs() > f32::EPSILON {
        return false;
    }

    let dx = other.x - mover.x;
    let dy = other.y - mover.y;
    let lateral = config.lateral_tolerance;

    match direction {
        Direction::Up => dy > 0.0 && dx.abs() < lateral && dy < config.vertical_reach,
        Direction::Down => dy < 0.0 && dx.abs() < lateral && -dy < config.vertical_reach,
        Direction::Right => dx > 0.0 && dy.abs() < lateral && dx < config.horizontal_reach,
        Direction::Left => dx < 0.0 && dy.abs() < lateral && -dx < config.horizontal_reach,
        Direction::None => false,
    }
}

/// Whether the board lets `mover` keep travelling in `direction`.
///
/// Leaving the current tile is refused when the neighbor is missing, destroyed
/// or (optionally) already carries the mover's color, but the mover may still
/// drift up to `boundary_slack` past its tile center before the stop applies.
pub fn board_allows(
    direction: Direction,
    mover: &Character,
    board: &Board,
    config: &CollisionConfig,
) -> bool {
    let Some(tile) = board.tile_at(mover.x, mover.y) else {
        return false;
    };
    if tile.destroyed {
        return false;
    }

    let neighbor_blocked = match tile.neighbor(direction).and_then(|i| board.tile(i)) {
        None => true,
        Some(next) => {
            next.destroyed
                || (config.own_color_blocks && next.color == TileColor::Owner(mover.id))
        }
    };
    if !neighbor_blocked {
        return true;
    }

    let (cx, cy) = tile.center();
    let slack = config.boundary_slack;
    match direction {
        Direction::Right => mover.x <= cx + slack,
        Direction::Left => mover.x >= cx - slack,
        Direction::Up => mover.y <= cy + slack,
        Direction::Down => mover.y >= cy - slack,
        Direction::None => false,
    }
}

/// Decides whether `mover` may take one step in `direction`.
///
/// A frozen or eliminated mover (no facing direction) is always refused, then
/// any of the three others can veto, then the board gets the final word.
pub fn can_move(
    direction: Direction,
    mover: &Character,
    others: [&Character; 3],
    board: &Board,
    config: &CollisionConfig,
) -> bool {
    if mover.direction == Direction::None || direction == Direction::None {
        return false;
    }
    if others
        .iter()
        .any(|other| characters_collide(direction, mover, other, config))
    {
        return false;
    }
    board_allows(direction, mover, board, config)
}
