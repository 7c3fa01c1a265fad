//! Game session: grid, score, moves, level target, combo and the busy flag.

use crate::cascade::{Cascade, CascadeOutcome, CascadeRound};
use crate::grid::{Grid, MAX_COLORS, MAX_SIZE, MIN_COLORS, MIN_RUN, MoveError, Pos};
use crate::rng::SessionRng;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Popups drift up one row per this many ms.
const POPUP_RISE_MS: u32 = 150;
/// Popups disappear after this long.
const POPUP_LIFETIME_MS: u32 = 1500;

/// Engine-facing settings for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    pub size: usize,
    pub colors: u8,
    pub moves_per_level: u32,
    pub initial_target: u32,
    pub target_step: u32,
    /// Reshuffle the board when no swap can make a match.
    pub reshuffle_on_deadlock: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("board size {0} outside 3..=12")]
    Size(usize),
    #[error("colour count {0} outside 3..=6")]
    Colors(u8),
    #[error("a level needs at least one move")]
    NoMoves,
    #[error("the target score must be positive")]
    NoTarget,
}

impl Rules {
    /// Rejects settings no session can start from.
    pub fn validate(&self) -> Result<(), RulesError> {
        if !(MIN_RUN..=MAX_SIZE).contains(&self.size) {
            return Err(RulesError::Size(self.size));
        }
        if !(MIN_COLORS..=MAX_COLORS).contains(&self.colors) {
            return Err(RulesError::Colors(self.colors));
        }
        if self.moves_per_level == 0 {
            return Err(RulesError::NoMoves);
        }
        if self.initial_target == 0 {
            return Err(RulesError::NoTarget);
        }
        Ok(())
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            size: 8,
            colors: 5,
            moves_per_level: 30,
            initial_target: 1000,
            target_step: 500,
            reshuffle_on_deadlock: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Won,
    Lost,
}

/// Win is checked first, so hitting the target on the last move still wins.
/// Running out of moves only loses once the board has settled.
pub fn check_win_lose(score: u32, moves_left: u32, target: u32, resolving: bool) -> GameStatus {
    if score >= target {
        GameStatus::Won
    } else if moves_left == 0 && !resolving {
        GameStatus::Lost
    } else {
        GameStatus::Ongoing
    }
}

/// Floating "+points" label anchored at the first cleared cell of a round.
#[derive(Debug, Clone)]
pub struct ScorePopup {
    pub pos: Pos,
    pub amount: u32,
    pub multiplier: u32,
    pub age_ms: u32,
    /// Rows drifted upwards so far.
    pub rise: usize,
}

#[derive(Debug)]
pub struct GameState {
    pub rules: Rules,
    grid: Grid,
    rng: SessionRng,
    pub score: u32,
    pub moves_left: u32,
    pub level: u32,
    pub target_score: u32,
    /// Rounds scored so far in the running cascade; 0 when settled.
    pub combo: u32,
    /// Combo reached by the most recent cascade, for display.
    pub last_chain: u32,
    pub best_chain: u32,
    /// Cells the next round will clear; empty when settled.
    pub clearing: BTreeSet<Pos>,
    resolving: bool,
    pub reshuffles: u32,
    pub popups: Vec<ScorePopup>,
}

impl GameState {
    #[instrument(skip(rng), fields(seed = rng.seed()))]
    pub fn new(rules: Rules, mut rng: SessionRng) -> Result<Self, RulesError> {
        rules.validate()?;
        let grid = Grid::initialize(rules.size, rules.colors, &mut rng);
        let mut state = Self {
            moves_left: rules.moves_per_level,
            target_score: rules.initial_target,
            rules,
            grid,
            rng,
            score: 0,
            level: 1,
            combo: 0,
            last_chain: 0,
            best_chain: 0,
            clearing: BTreeSet::new(),
            resolving: false,
            reshuffles: 0,
            popups: Vec::new(),
        };
        state.ensure_playable();
        info!(level = state.level, target = state.target_score, "level started");
        Ok(state)
    }

    /// Session on a hand-built board.
    #[cfg(test)]
    pub(crate) fn with_grid(rules: Rules, grid: Grid, seed: u64) -> Self {
        let mut state = Self::new(rules, SessionRng::new(seed)).expect("test rules are valid");
        state.grid = grid;
        state
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// True while a cascade is running; swaps are refused until it settles.
    #[inline]
    pub fn is_resolving(&self) -> bool {
        self.resolving
    }

    pub fn status(&self) -> GameStatus {
        check_win_lose(self.score, self.moves_left, self.target_score, self.resolving)
    }

    /// Commits a swap if it makes a match and starts resolving it. Rejected
    /// swaps change nothing and cost no move.
    #[instrument(skip(self), fields(level = self.level, moves = self.moves_left))]
    pub fn try_swap(&mut self, a: Pos, b: Pos) -> Result<(), MoveError> {
        if self.resolving {
            return Err(MoveError::Busy);
        }
        if self.status() != GameStatus::Ongoing {
            return Err(MoveError::LevelOver);
        }
        if let Err(e) = self.grid.check_swap(a, b) {
            debug!(error = %e, "swap rejected");
            return Err(e);
        }
        self.grid.swap(a, b);
        self.moves_left = self.moves_left.saturating_sub(1);
        self.combo = 0;
        self.clearing = self.grid.find_matches();
        self.resolving = true;
        debug!(matched = self.clearing.len(), "swap committed");
        Ok(())
    }

    /// Clears the pending matches, scores them at the next combo step and
    /// queues whatever the refill matched. Returns `None` when settled.
    pub fn finish_round(&mut self) -> Option<CascadeRound> {
        if !self.resolving {
            return None;
        }
        let round = Cascade::new(&mut self.grid, &mut self.rng)
            .after(self.combo)
            .next();
        if let Some(round) = &round {
            self.combo = round.combo;
            self.score += round.points;
            if let Some(&pos) = round.matched.first() {
                self.popups.push(ScorePopup {
                    pos,
                    amount: round.points,
                    multiplier: round.combo,
                    age_ms: 0,
                    rise: 0,
                });
            }
        }
        self.clearing = self.grid.find_matches();
        if self.clearing.is_empty() {
            self.end_resolution();
        }
        round
    }

    /// Runs the pending cascade to the end without pacing.
    pub fn resolve_all(&mut self) -> CascadeOutcome {
        std::iter::from_fn(|| self.finish_round()).collect()
    }

    fn end_resolution(&mut self) {
        self.resolving = false;
        self.last_chain = self.combo;
        self.best_chain = self.best_chain.max(self.combo);
        self.combo = 0;
        match self.status() {
            GameStatus::Won => info!(level = self.level, score = self.score, "level cleared"),
            GameStatus::Lost => info!(level = self.level, score = self.score, "out of moves"),
            GameStatus::Ongoing => self.ensure_playable(),
        }
    }

    fn ensure_playable(&mut self) {
        if !self.rules.reshuffle_on_deadlock || self.grid.has_legal_move() {
            return;
        }
        if self.grid.reshuffle(&mut self.rng) {
            self.reshuffles += 1;
            info!(reshuffles = self.reshuffles, "no moves left, board reshuffled");
        } else {
            warn!(grid = %self.grid, "no moves left and no playable reshuffle found");
        }
    }

    /// A legal swap, if the board is settled and has one.
    pub fn hint(&self) -> Option<(Pos, Pos)> {
        if self.resolving {
            return None;
        }
        self.grid.find_hint()
    }

    /// Next level: higher target, full moves, fresh board, score and combo
    /// back to zero.
    pub fn advance_level(&mut self) {
        self.level += 1;
        self.target_score += self.rules.target_step;
        self.reset_board();
        info!(level = self.level, target = self.target_score, "level started");
    }

    /// Back to level 1 with the initial target.
    pub fn restart(&mut self) {
        self.level = 1;
        self.target_score = self.rules.initial_target;
        self.reset_board();
        info!(target = self.target_score, "game restarted");
    }

    fn reset_board(&mut self) {
        self.grid = Grid::initialize(self.rules.size, self.rules.colors, &mut self.rng);
        self.moves_left = self.rules.moves_per_level;
        self.score = 0;
        self.combo = 0;
        self.last_chain = 0;
        self.clearing.clear();
        self.resolving = false;
        self.popups.clear();
        self.ensure_playable();
    }

    pub fn tick_popups(&mut self, delta_ms: u32) {
        self.popups.retain_mut(|p| {
            p.age_ms += delta_ms;
            p.rise = (p.age_ms / POPUP_RISE_MS) as usize;
            p.age_ms < POPUP_LIFETIME_MS
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::fixtures::*;

    fn rules() -> Rules {
        Rules::default()
    }

    #[test]
    fn win_beats_lose_on_the_last_move() {
        assert_eq!(check_win_lose(1000, 0, 1000, false), GameStatus::Won);
        assert_eq!(check_win_lose(999, 0, 1000, false), GameStatus::Lost);
        assert_eq!(check_win_lose(999, 0, 1000, true), GameStatus::Ongoing);
        assert_eq!(check_win_lose(0, 5, 1000, false), GameStatus::Ongoing);
    }

    #[test]
    fn new_session_starts_at_level_one() {
        let s = GameState::new(rules(), SessionRng::new(42)).unwrap();
        assert_eq!(s.level, 1);
        assert_eq!(s.score, 0);
        assert_eq!(s.moves_left, 30);
        assert_eq!(s.target_score, 1000);
        assert!(!s.is_resolving());
        assert!(s.grid().find_matches().is_empty());
        assert!(s.grid().has_legal_move());
        assert_eq!(s.status(), GameStatus::Ongoing);
    }

    #[test]
    fn unplayable_rules_are_rejected() {
        let with = |f: fn(&mut Rules)| {
            let mut r = rules();
            f(&mut r);
            GameState::new(r, SessionRng::new(1)).err()
        };
        assert_eq!(with(|r| r.colors = 7), Some(RulesError::Colors(7)));
        assert_eq!(with(|r| r.colors = 2), Some(RulesError::Colors(2)));
        assert_eq!(with(|r| r.size = 2), Some(RulesError::Size(2)));
        assert_eq!(with(|r| r.size = 13), Some(RulesError::Size(13)));
        assert_eq!(with(|r| r.moves_per_level = 0), Some(RulesError::NoMoves));
        assert_eq!(with(|r| r.initial_target = 0), Some(RulesError::NoTarget));
        assert!(with(|r| r.size = 3).is_none());
    }

    #[test]
    fn committed_swap_costs_one_move_and_scores() {
        let mut s = GameState::with_grid(rules(), l_shape_setup(), 4);
        s.try_swap(Pos::new(2, 2), Pos::new(3, 2)).expect("L swap is legal");
        assert_eq!(s.moves_left, 29);
        assert!(s.is_resolving());
        assert_eq!(s.clearing.len(), 5);

        let first = s.finish_round().expect("first round");
        assert_eq!(first.combo, 1);
        assert_eq!(first.points, 50);
        assert_eq!(s.score, 50);

        let rest = s.resolve_all();
        assert_eq!(s.score, 50 + rest.score_delta);
        assert!(!s.is_resolving());
        assert_eq!(s.combo, 0);
        assert_eq!(s.last_chain, 1 + rest.rounds);
        assert!(s.grid().find_matches().is_empty());
        assert_eq!(s.moves_left, 29);
    }

    #[test]
    fn rejected_swap_costs_nothing() {
        let mut s = GameState::with_grid(rules(), l_shape_setup(), 4);
        let before = s.grid().clone();
        assert_eq!(
            s.try_swap(Pos::new(0, 0), Pos::new(0, 1)),
            Err(MoveError::NoMatch(Pos::new(0, 0), Pos::new(0, 1)))
        );
        assert_eq!(
            s.try_swap(Pos::new(0, 0), Pos::new(5, 5)),
            Err(MoveError::NotAdjacent(Pos::new(0, 0), Pos::new(5, 5)))
        );
        assert_eq!(
            s.try_swap(Pos::new(0, 0), Pos::new(0, 9)),
            Err(MoveError::OutOfBounds(Pos::new(0, 9)))
        );
        assert_eq!(s.moves_left, 30);
        assert_eq!(s.grid(), &before);
        assert!(!s.is_resolving());
    }

    #[test]
    fn swaps_are_refused_while_resolving() {
        let mut s = GameState::with_grid(rules(), l_shape_setup(), 4);
        s.try_swap(Pos::new(2, 2), Pos::new(3, 2)).expect("legal");
        assert_eq!(
            s.try_swap(Pos::new(2, 2), Pos::new(3, 2)),
            Err(MoveError::Busy)
        );
        assert_eq!(s.moves_left, 29);
        assert!(s.hint().is_none());
    }

    #[test]
    fn combo_counts_up_within_one_cascade() {
        let mut s = GameState::new(rules(), SessionRng::new(2024)).unwrap();
        for _ in 0..30 {
            let Some((a, b)) = s.hint() else { break };
            s.try_swap(a, b).expect("hint is legal");
            let mut expected = 0;
            while let Some(round) = s.finish_round() {
                expected += 1;
                assert_eq!(round.combo, expected);
                assert_eq!(round.points, round.matched.len() as u32 * 10 * expected);
            }
            assert_eq!(s.last_chain, expected);
            if s.status() != GameStatus::Ongoing {
                break;
            }
        }
    }

    #[test]
    fn last_move_without_target_loses() {
        let mut r = rules();
        r.moves_per_level = 1;
        let mut s = GameState::with_grid(r, l_shape_setup(), 4);
        s.try_swap(Pos::new(2, 2), Pos::new(3, 2)).expect("legal");
        assert_eq!(s.status(), GameStatus::Ongoing);
        s.resolve_all();
        assert_eq!(s.status(), GameStatus::Lost);
        assert_eq!(
            s.try_swap(Pos::new(0, 0), Pos::new(0, 1)),
            Err(MoveError::LevelOver)
        );
    }

    #[test]
    fn reaching_target_on_last_move_wins() {
        let mut r = rules();
        r.moves_per_level = 1;
        r.initial_target = 50;
        let mut s = GameState::with_grid(r, l_shape_setup(), 4);
        s.try_swap(Pos::new(2, 2), Pos::new(3, 2)).expect("legal");
        s.resolve_all();
        assert_eq!(s.moves_left, 0);
        assert_eq!(s.status(), GameStatus::Won);
    }

    #[test]
    fn advance_level_raises_target_and_resets() {
        let mut s = GameState::with_grid(rules(), l_shape_setup(), 4);
        s.try_swap(Pos::new(2, 2), Pos::new(3, 2)).expect("legal");
        s.resolve_all();
        s.advance_level();
        assert_eq!(s.level, 2);
        assert_eq!(s.target_score, 1500);
        assert_eq!(s.moves_left, 30);
        assert_eq!(s.score, 0);
        assert_eq!(s.combo, 0);
        assert!(s.popups.is_empty());
        assert!(s.grid().find_matches().is_empty());

        s.advance_level();
        assert_eq!(s.target_score, 2000);

        s.restart();
        assert_eq!(s.level, 1);
        assert_eq!(s.target_score, 1000);
    }

    #[test]
    fn deadlocked_board_is_reshuffled() {
        let mut s = GameState::with_grid(rules(), grid(&striped_rows()), 9);
        let before = s.reshuffles;
        assert!(!s.grid().has_legal_move());
        s.ensure_playable();
        assert_eq!(s.reshuffles, before + 1);
        assert!(s.grid().has_legal_move());
        assert!(s.grid().find_matches().is_empty());
    }

    #[test]
    fn reshuffle_can_be_turned_off() {
        let mut r = rules();
        r.reshuffle_on_deadlock = false;
        let s = GameState::with_grid(r, grid(&striped_rows()), 1);
        assert!(!s.grid().has_legal_move());
        assert!(s.hint().is_none());
    }

    #[test]
    fn popups_rise_and_expire() {
        let mut s = GameState::with_grid(rules(), l_shape_setup(), 4);
        s.try_swap(Pos::new(2, 2), Pos::new(3, 2)).expect("legal");
        s.finish_round();
        assert_eq!(s.popups.len(), 1);
        assert_eq!(s.popups[0].pos, Pos::new(0, 2));
        s.tick_popups(300);
        assert_eq!(s.popups[0].rise, 2);
        s.tick_popups(POPUP_LIFETIME_MS);
        assert!(s.popups.is_empty());
    }
}
