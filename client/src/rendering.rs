//! Plain-text view of the board for the console
//!
//! Row 8 is printed first so that "up" on screen matches `UP` on the board.
//! Glyphs: `.`/`:` neutral tiles, lowercase letters claimed tiles, `#` holes,
//! `*` a weapon in flight, uppercase letters the characters themselves.

use shared::{Board, CharacterId, GameState, Round, TileColor, BOARD_SIZE};
use std::fmt::Write;

fn initial(id: CharacterId) -> char {
    id.label().chars().next().unwrap_or('?')
}

fn tile_glyph(board: &Board, col: usize, row: usize) -> char {
    let Some(tile) = board.tile(col + BOARD_SIZE * row + 1) else {
        return ' ';
    };
    if tile.destroyed {
        return '#';
    }
    match tile.color {
        TileColor::Light => '.',
        TileColor::Dark => ':',
        TileColor::Owner(id) => initial(id).to_ascii_lowercase(),
    }
}

/// Renders the board followed by one status line per character
pub fn render(game: &GameState, me: Option<CharacterId>) -> String {
    let board = game.board();
    let mut grid = [[' '; BOARD_SIZE]; BOARD_SIZE];
    for (row, cells) in grid.iter_mut().enumerate() {
        for (col, cell) in cells.iter_mut().enumerate() {
            *cell = tile_glyph(board, col, row);
        }
    }

    for character in game.roster().iter() {
        if character.weapon.animating {
            if let Some(tile) = board.tile_at(character.weapon.x, character.weapon.y) {
                grid[tile.row][tile.col] = '*';
            }
        }
    }
    for character in game.roster().iter().filter(|c| c.is_alive()) {
        if let Some(tile) = board.tile_at(character.x, character.y) {
            grid[tile.row][tile.col] = initial(character.id);
        }
    }

    let mut out = String::new();
    for row in (0..BOARD_SIZE).rev() {
        let line: String = grid[row].iter().flat_map(|&c| [c, ' ']).collect();
        let _ = writeln!(out, "{} {}", row + 1, line.trim_end());
    }

    let round = match game.round() {
        Round::Waiting => "waiting for players".to_string(),
        Round::Countdown { ticks_left } => {
            let rate = game.config().tick_rate.max(1);
            let seconds = (ticks_left + rate - 1) / rate;
            format!("starting in {}", seconds)
        }
        Round::Playing => "playing".to_string(),
        Round::Finished {
            winner: Some(id), ..
        } => format!("{} wins", game.character(id).name),
        Round::Finished { winner: None, .. } => "no winner".to_string(),
    };
    let _ = writeln!(out, "round: {}", round);

    for character in game.roster().iter() {
        let marker = if Some(character.id) == me { " (you)" } else { "" };
        let _ = writeln!(
            out,
            "{} {:<6} {:<12} lives {} kills {} wins {}{}",
            initial(character.id),
            character.id.label(),
            character.name,
            character.lives,
            character.kills,
            character.wins,
            marker
        );
    }
    out
}
