//! Deterministic round simulation
//!
//! `GameState` is the only owner of the board and the roster. The authority
//! runs the full rule set and reports every change it makes as [`Outgoing`]
//! messages for fan-out. Replicas run the same movement, weapon and tile rules
//! locally, but take positions, eliminations and respawns from the authority.

use crate::ai::AiController;
use crate::board::{tile_index, Board, Destruction, Tile, TileColor};
use crate::character::{Character, CharacterId, Direction, Role, Roster};
use crate::collision::can_move;
use crate::config::GameConfig;
use crate::input::InputIntent;
use crate::protocol::Message;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Which side of the session this simulation runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Authority,
    Replica,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// Lobby; nothing moves
    Waiting,
    Countdown { ticks_left: u32 },
    Playing,
    Finished {
        winner: Option<CharacterId>,
        ticks_left: u32,
    },
}

/// A message to fan out to every peer except the one controlling `exclude`
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub message: Message,
    pub exclude: Option<CharacterId>,
}

impl Outgoing {
    pub fn all(message: Message) -> Self {
        Self {
            message,
            exclude: None,
        }
    }

    pub fn except(message: Message, exclude: Option<CharacterId>) -> Self {
        Self { message, exclude }
    }
}

pub struct GameState {
    config: GameConfig,
    mode: Mode,
    board: Board,
    roster: Roster,
    round: Round,
    tick: u64,
    ai: AiController,
    rng: StdRng,
    /// Latest `REMOTE_MOVE` per character, consumed by the next tick
    remote_moves: [Option<Direction>; 4],
}

impl GameState {
    pub fn new(config: GameConfig, mode: Mode, seed: u64) -> Self {
        Self {
            ai: AiController::new(config.difficulty),
            config,
            mode,
            board: Board::new(),
            roster: Roster::new(),
            round: Round::Waiting,
            tick: 0,
            rng: StdRng::seed_from_u64(seed),
            remote_moves: [None; 4],
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Role changes only; positions go through the simulation entry points
    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn character(&self, id: CharacterId) -> &Character {
        self.roster.get(id)
    }

    pub fn tile(&self, index: usize) -> Option<&Tile> {
        self.board.tile(index)
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn set_lives(&mut self, lives: u32) {
        self.config.lives = lives;
    }

    pub fn set_name(&mut self, id: CharacterId, name: String) {
        self.roster.get_mut(id).name = name;
    }

    fn snapshot(&self, id: CharacterId) -> Message {
        let c = self.roster.get(id);
        Message::Move {
            id,
            x: c.x,
            y: c.y,
            z: c.z,
            direction: c.direction,
        }
    }

    /// `MOVE` snapshots of all four characters
    pub fn snapshots(&self) -> Vec<Message> {
        CharacterId::ALL.iter().map(|&id| self.snapshot(id)).collect()
    }

    fn destruction(&self) -> Destruction {
        Destruction {
            recovery_ticks: self.config.tile_recovery_ticks,
            stagger: self.config.tile_recovery_stagger,
            max_tiles: self.config.max_flood_tiles,
        }
    }

    /// Round-start entry point: fresh board, full lives, everyone respawned,
    /// countdown running.
    pub fn start_round(&mut self) -> Vec<Outgoing> {
        self.clear_round();
        let mut out = vec![Outgoing::all(Message::Reset)];

        if self.mode == Mode::Authority {
            for id in CharacterId::ALL {
                self.spawn(id);
                out.push(Outgoing::all(self.snapshot(id)));
            }
        }

        let ticks_left = self.config.countdown_ticks();
        self.round = if ticks_left == 0 {
            Round::Playing
        } else {
            Round::Countdown { ticks_left }
        };
        out.push(Outgoing::all(Message::Countdown {
            seconds: self.config.countdown_seconds,
        }));
        info!("Round starting with {} lives each", self.config.lives);
        out
    }

    fn clear_round(&mut self) {
        self.board.reset();
        self.roster.reset_for_round(self.config.lives);
        self.remote_moves = [None; 4];
        self.ai.set_difficulty(self.config.difficulty);
    }

    /// Places `id` on a random free tile, preferring lanes no one else is in
    fn spawn(&mut self, id: CharacterId) -> (f32, f32) {
        let occupied: Vec<(usize, usize)> = self
            .roster
            .iter()
            .filter(|c| c.id != id && c.is_alive())
            .filter_map(|c| self.board.tile_at(c.x, c.y).map(|t| (t.col, t.row)))
            .collect();

        let free: Vec<&Tile> = self
            .board
            .tiles()
            .iter()
            .filter(|t| !t.destroyed && !t.claimed)
            .filter(|t| !occupied.contains(&(t.col, t.row)))
            .collect();
        let clear_lanes: Vec<&Tile> = free
            .iter()
            .copied()
            .filter(|t| occupied.iter().all(|&(col, row)| t.col != col && t.row != row))
            .collect();

        let pool = if clear_lanes.is_empty() { &free } else { &clear_lanes };
        let (x, y) = pool
            .choose(&mut self.rng)
            .map(|t| t.center())
            .unwrap_or((0.0, 0.0));
        let direction = Direction::MOVING
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Direction::Up);

        self.roster.get_mut(id).place(x, y, direction);
        (x, y)
    }

    /// Per-tick entry point.
    ///
    /// Tile recovery runs first, so a tile destroyed this tick stays down
    /// for its full countdown. Then intents for locally driven characters,
    /// queued remote steps (one per character), AI decisions, weapon flight,
    /// eliminations and the round check. Events received from the network
    /// must already have been applied for this tick.
    pub fn advance(&mut self, intents: &[(CharacterId, InputIntent)]) -> Vec<Outgoing> {
        self.tick += 1;
        let mut out = Vec::new();
        let remote_moves = std::mem::take(&mut self.remote_moves);

        match self.round {
            Round::Waiting => return out,
            Round::Countdown { ticks_left } => {
                let ticks_left = ticks_left.saturating_sub(1);
                let tick_rate = self.config.tick_rate.max(1);
                if ticks_left == 0 {
                    self.round = Round::Playing;
                } else {
                    self.round = Round::Countdown { ticks_left };
                }
                if self.mode == Mode::Authority && ticks_left % tick_rate == 0 {
                    out.push(Outgoing::all(Message::Countdown {
                        seconds: ticks_left / tick_rate,
                    }));
                }
                return out;
            }
            Round::Finished { winner, ticks_left } => {
                let ticks_left = ticks_left.saturating_sub(1);
                self.round = Round::Finished { winner, ticks_left };
                if ticks_left == 0 && self.mode == Mode::Authority {
                    out.extend(self.start_round());
                }
                return out;
            }
            Round::Playing => {}
        }

        self.board.tick();

        for &(id, intent) in intents {
            out.extend(self.apply_intent(id, intent, None));
        }

        for (id, direction) in CharacterId::ALL.into_iter().zip(remote_moves) {
            if let Some(direction) = direction {
                out.extend(self.apply_remote_step(id, direction));
            }
        }

        if self.mode == Mode::Authority {
            for id in CharacterId::ALL {
                if self.roster.get(id).role != Role::Ai {
                    continue;
                }
                let intent = self.ai.decide(
                    id,
                    &self.roster,
                    &self.board,
                    &self.config,
                    &mut self.rng,
                );
                out.extend(self.apply_intent(id, intent, None));
            }
        }

        let mut victims = Vec::new();
        for id in CharacterId::ALL {
            self.advance_weapon(id, &mut victims);
        }

        if self.mode == Mode::Authority {
            self.resolve_eliminations(victims, &mut out);
            self.advance_recovery(&mut out);
        } else {
            for character in self.roster.iter_mut() {
                character.recovery_timer = character.recovery_timer.saturating_sub(1);
            }
        }

        self.check_round_end();

        let interval = u64::from(self.config.snapshot_interval_ticks);
        if self.mode == Mode::Authority && interval > 0 && self.tick % interval == 0 {
            out.extend(self.snapshots().into_iter().map(Outgoing::all));
        }

        out
    }

    fn apply_intent(
        &mut self,
        id: CharacterId,
        intent: InputIntent,
        exclude: Option<CharacterId>,
    ) -> Vec<Outgoing> {
        if self.roster.get(id).is_inert() {
            return Vec::new();
        }
        if intent.fire {
            if let Some(fired) = self.fire(id, exclude) {
                return fired;
            }
        }
        if intent.direction != Direction::None && self.try_step(id, intent.direction) {
            if self.mode == Mode::Authority {
                return vec![Outgoing::except(self.snapshot(id), exclude)];
            }
        }
        Vec::new()
    }

    /// Moves `id` one step if the validator allows it, claiming the tile
    /// underneath. Returns whether the step happened.
    pub fn try_step(&mut self, id: CharacterId, direction: Direction) -> bool {
        if self.round != Round::Playing {
            return false;
        }
        let mover = self.roster.get(id);
        if !mover.is_alive() || mover.weapon.animating {
            return false;
        }
        if !can_move(
            direction,
            mover,
            self.roster.others(id),
            &self.board,
            &self.config.collision,
        ) {
            return false;
        }

        let (dx, dy) = direction.delta();
        let step = self.config.movement_step;
        let mover = self.roster.get_mut(id);
        mover.direction = direction;
        mover.x += dx * step;
        mover.y += dy * step;

        if let Some(index) = tile_index(mover.x, mover.y) {
            self.board.claim(index, id, self.config.claim_ticks);
        }
        true
    }

    /// Whether `id` may throw its weapon right now
    pub fn can_fire(&self, id: CharacterId) -> bool {
        let c = self.roster.get(id);
        self.round == Round::Playing
            && c.is_alive()
            && c.recovery_timer == 0
            && !c.weapon.animating
            && c.direction != Direction::None
            && self.board.tile_at(c.x, c.y).map_or(false, |t| !t.destroyed)
    }

    /// Throws the weapon of `id` if allowed. Returns whether it left the hand.
    pub fn try_fire(&mut self, id: CharacterId) -> bool {
        self.fire(id, None).is_some()
    }

    /// On the authority the messages hold the pre-throw snapshot followed by
    /// the fire event.
    fn fire(&mut self, id: CharacterId, exclude: Option<CharacterId>) -> Option<Vec<Outgoing>> {
        if !self.can_fire(id) {
            return None;
        }
        let snapshot = self.snapshot(id);
        self.launch(id);

        let out = match self.mode {
            Mode::Authority => vec![
                Outgoing::except(snapshot, exclude),
                Outgoing::except(Message::ShootWeapon { id }, exclude),
            ],
            Mode::Replica => Vec::new(),
        };
        Some(out)
    }

    /// Binds the weapon to its owner and freezes the owner until impact
    fn launch(&mut self, id: CharacterId) {
        let flight = self.config.weapon_flight_ticks;
        let c = self.roster.get_mut(id);
        let heading = if c.direction == Direction::None {
            c.backup_direction
        } else {
            c.direction
        };
        if heading == Direction::None {
            return;
        }
        c.weapon.launch(c.x, c.y, heading, flight);
        c.backup_direction = heading;
        c.direction = Direction::None;
    }

    fn advance_weapon(&mut self, id: CharacterId, victims: &mut Vec<(CharacterId, CharacterId)>) {
        let mut weapon = self.roster.get(id).weapon;
        let impact = weapon.advance(&self.board, self.roster.others(id), &self.config);
        self.roster.get_mut(id).weapon = weapon;

        let Some(impact) = impact else {
            return;
        };

        let owner = self.roster.get_mut(id);
        if owner.direction == Direction::None && owner.is_alive() {
            owner.direction = owner.backup_direction;
        }
        owner.destroyed_tile = impact.tile;

        if let Some(index) = impact.tile {
            let own_color = self
                .board
                .tile(index)
                .map_or(false, |t| t.color == TileColor::Owner(id));
            if !own_color {
                let run = self.destruction();
                let fallen = self.board.flood_destroy(index, Some(id), run);
                debug!("{} weapon destroyed tiles {:?}", id, fallen);
            }
        }
        if let Some(victim) = impact.victim {
            victims.push((victim, id));
        }
    }

    /// Drops every character standing on a hole or hit directly this tick
    fn resolve_eliminations(
        &mut self,
        direct_hits: Vec<(CharacterId, CharacterId)>,
        out: &mut Vec<Outgoing>,
    ) {
        for id in CharacterId::ALL {
            let c = self.roster.get(id);
            if !c.is_alive() {
                continue;
            }
            let under = self.board.tile_at(c.x, c.y);
            let killer = match under {
                None => Some(None),
                Some(tile) if tile.destroyed => Some(tile.destroyed_by),
                Some(_) => direct_hits
                    .iter()
                    .find(|(victim, _)| *victim == id)
                    .map(|&(_, shooter)| Some(shooter)),
            };
            if let Some(killer) = killer {
                self.eliminate(id, killer, out);
            }
        }
    }

    fn eliminate(&mut self, id: CharacterId, killer: Option<CharacterId>, out: &mut Vec<Outgoing>) {
        let recovery = self.config.character_recovery_ticks;
        let victim = self.roster.get_mut(id);
        victim.lives = victim.lives.saturating_sub(1);
        victim.fall(recovery);
        let lives = victim.lives;
        info!("{} fell ({} lives left)", id, lives);

        out.push(Outgoing::all(Message::Died { id, lives }));
        out.push(Outgoing::all(self.snapshot(id)));

        if let Some(killer) = killer.filter(|&k| k != id) {
            let shooter = self.roster.get_mut(killer);
            shooter.kills += 1;
            let kills = shooter.kills;
            out.push(Outgoing::all(Message::Kills { id: killer, kills }));
        }
    }

    /// Counts down fallen characters and respawns them when ready
    fn advance_recovery(&mut self, out: &mut Vec<Outgoing>) {
        for id in CharacterId::ALL {
            let c = self.roster.get_mut(id);
            if c.on_board() || c.lives == 0 || c.recovery_timer == 0 {
                continue;
            }
            c.recovery_timer -= 1;
            if c.recovery_timer == 0 {
                let (x, y) = self.spawn(id);
                out.push(Outgoing::all(Message::Spawn { id, x, y }));
                out.push(Outgoing::all(self.snapshot(id)));
            }
        }
    }

    fn check_round_end(&mut self) {
        if self.round != Round::Playing {
            return;
        }
        let (first, more) = {
            let mut standing = self.roster.with_lives();
            (standing.next().map(|c| c.id), standing.next().is_some())
        };
        if more {
            return;
        }

        if let Some(id) = first {
            self.roster.get_mut(id).wins += 1;
            info!("{} wins the round", id);
        } else {
            info!("Round ended with no survivors");
        }
        self.round = Round::Finished {
            winner: first,
            ticks_left: self.config.round_reset_ticks.max(1),
        };
    }

    /// Authority side of `REMOTE_MOVE`. Only the latest request per
    /// character is kept; the next `advance` validates it like any other
    /// intent, so a burst of datagrams still moves a character at most one
    /// step per tick.
    pub fn queue_remote_move(&mut self, id: CharacterId, direction: Direction) {
        self.remote_moves[id.slot()] = Some(direction);
    }

    /// Takes a queued remote step and rebroadcasts it to everyone but the
    /// requester. A refused step changes nothing and sends nothing.
    fn apply_remote_step(&mut self, id: CharacterId, direction: Direction) -> Vec<Outgoing> {
        if self.roster.get(id).is_inert() || !self.try_step(id, direction) {
            debug!("Refused {} step for {}", direction, id);
            return Vec::new();
        }
        vec![Outgoing::except(self.snapshot(id), Some(id))]
    }

    /// Authority side of `SHOOT_WEAPON` from a peer
    pub fn apply_remote_fire(&mut self, id: CharacterId) -> Vec<Outgoing> {
        if self.roster.get(id).is_inert() {
            return Vec::new();
        }
        self.fire(id, Some(id)).unwrap_or_default()
    }

    /// Replica side: applies an authority message without re-validating it
    pub fn apply_authoritative(&mut self, message: &Message) {
        match *message {
            Message::Move {
                id,
                x,
                y,
                z,
                direction,
            } => {
                let c = self.roster.get_mut(id);
                c.x = x;
                c.y = y;
                c.z = z;
                c.direction = direction;
                if c.is_alive() {
                    if let Some(index) = tile_index(x, y) {
                        self.board.claim(index, id, self.config.claim_ticks);
                    }
                }
            }
            Message::ShootWeapon { id } => self.launch(id),
            Message::Died { id, lives } => {
                let recovery = self.config.character_recovery_ticks;
                let c = self.roster.get_mut(id);
                c.lives = lives;
                c.fall(recovery);
            }
            Message::Kills { id, kills } => self.roster.get_mut(id).kills = kills,
            Message::Spawn { id, x, y } => {
                let c = self.roster.get_mut(id);
                let direction = c.backup_direction;
                c.place(x, y, direction);
            }
            Message::Name { id, ref name } => self.set_name(id, name.clone()),
            Message::Reset => {
                self.clear_round();
                self.round = Round::Waiting;
            }
            Message::Countdown { seconds } => {
                self.round = if seconds == 0 {
                    Round::Playing
                } else {
                    Round::Countdown {
                        ticks_left: seconds * self.config.tick_rate.max(1),
                    }
                };
            }
            _ => debug!("{} has no effect on the simulation", message.tag()),
        }
    }
}
