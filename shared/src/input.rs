//! Logical input consumed by the simulation, and the local sources of it

use crate::ai::AiController;
use crate::character::{CharacterId, Direction};
use crate::config::Difficulty;
use crate::game::GameState;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// One tick of intent for one character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputIntent {
    pub direction: Direction,
    pub fire: bool,
}

impl InputIntent {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn travel(direction: Direction) -> Self {
        Self {
            direction,
            fire: false,
        }
    }

    pub fn fire() -> Self {
        Self {
            direction: Direction::None,
            fire: true,
        }
    }
}

/// A typed console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    Travel(Direction),
    Stop,
    Fire,
    Quit,
}

/// Parses one console line such as `w`, `left` or `fire`
pub fn parse_command(line: &str) -> Option<InputCommand> {
    let command = match line.trim().to_ascii_lowercase().as_str() {
        "w" | "up" => InputCommand::Travel(Direction::Up),
        "s" | "down" => InputCommand::Travel(Direction::Down),
        "a" | "left" => InputCommand::Travel(Direction::Left),
        "d" | "right" => InputCommand::Travel(Direction::Right),
        "x" | "stop" => InputCommand::Stop,
        "f" | "fire" => InputCommand::Fire,
        "q" | "quit" => InputCommand::Quit,
        _ => return None,
    };
    Some(command)
}

enum InputSource {
    Commands(mpsc::UnboundedReceiver<InputCommand>),
    Autopilot { ai: AiController, rng: StdRng },
}

/// Turns typed commands or the autopilot into one intent per tick for the
/// character played on this machine
pub struct InputManager {
    source: InputSource,
    /// Direction the character keeps travelling in until told otherwise
    held: Direction,
    quit_requested: bool,
}

impl InputManager {
    /// Reads commands from stdin, one per line
    pub fn keyboard() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("Unknown command '{}'", line.trim()),
                }
            }
            debug!("Stopped reading commands");
        });
        Self::from_commands(rx)
    }

    pub fn from_commands(commands: mpsc::UnboundedReceiver<InputCommand>) -> Self {
        Self {
            source: InputSource::Commands(commands),
            held: Direction::None,
            quit_requested: false,
        }
    }

    /// Lets the local AI play the assigned character
    pub fn autopilot(difficulty: Difficulty, seed: u64) -> Self {
        Self {
            source: InputSource::Autopilot {
                ai: AiController::new(difficulty),
                rng: StdRng::seed_from_u64(seed),
            },
            held: Direction::None,
            quit_requested: false,
        }
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Intent for `id` this tick
    pub fn update(&mut self, id: CharacterId, game: &GameState) -> InputIntent {
        match &mut self.source {
            InputSource::Commands(commands) => {
                let mut fire = false;
                while let Ok(command) = commands.try_recv() {
                    match command {
                        InputCommand::Travel(direction) => self.held = direction,
                        InputCommand::Stop => self.held = Direction::None,
                        InputCommand::Fire => fire = true,
                        InputCommand::Quit => self.quit_requested = true,
                    }
                }
                InputIntent {
                    direction: self.held,
                    fire,
                }
            }
            InputSource::Autopilot { ai, rng } => {
                ai.decide(id, game.roster(), game.board(), game.config(), rng)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::Mode;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("w"), Some(InputCommand::Travel(Direction::Up)));
        assert_eq!(parse_command(" LEFT \n"), Some(InputCommand::Travel(Direction::Left)));
        assert_eq!(parse_command("fire"), Some(InputCommand::Fire));
        assert_eq!(parse_command("stop"), Some(InputCommand::Stop));
        assert_eq!(parse_command("q"), Some(InputCommand::Quit));
        assert_eq!(parse_command("jump"), None);
    }

    #[test]
    fn test_travel_is_held_until_stopped() {
        let game = GameState::new(GameConfig::default(), Mode::Replica, 0);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut input = InputManager::from_commands(rx);

        tx.send(InputCommand::Travel(Direction::Left)).unwrap();
        assert_eq!(
            input.update(CharacterId::Red, &game),
            InputIntent::travel(Direction::Left)
        );
        assert_eq!(
            input.update(CharacterId::Red, &game),
            InputIntent::travel(Direction::Left)
        );

        tx.send(InputCommand::Stop).unwrap();
        assert_eq!(input.update(CharacterId::Red, &game), InputIntent::idle());
    }

    #[test]
    fn test_fire_is_one_shot() {
        let game = GameState::new(GameConfig::default(), Mode::Replica, 0);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut input = InputManager::from_commands(rx);

        tx.send(InputCommand::Travel(Direction::Up)).unwrap();
        tx.send(InputCommand::Fire).unwrap();
        let intent = input.update(CharacterId::Blue, &game);
        assert!(intent.fire);
        assert_eq!(intent.direction, Direction::Up);
        assert!(!input.update(CharacterId::Blue, &game).fire);
    }

    #[test]
    fn test_quit_command() {
        let game = GameState::new(GameConfig::default(), Mode::Replica, 0);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut input = InputManager::from_commands(rx);

        tx.send(InputCommand::Quit).unwrap();
        input.update(CharacterId::Red, &game);
        assert!(input.quit_requested());
    }

    #[test]
    fn test_autopilot_idles_while_not_on_board() {
        let game = GameState::new(GameConfig::default(), Mode::Replica, 0);
        let mut input = InputManager::autopilot(Difficulty::Hard, 1);
        assert_eq!(input.update(CharacterId::Green, &game), InputIntent::idle());
    }
}
