//! Cascade resolution: match, score, clear, drop, refill, repeat.

use crate::grid::{Grid, Pos};
use crate::rng::SessionRng;
use std::collections::BTreeSet;
use tracing::debug;

/// Base points per cleared tile, multiplied by the round's combo.
pub const POINTS_PER_TILE: u32 = 10;

/// One round of a cascade, reported after its tiles were cleared and refilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeRound {
    /// 1 for the round triggered by the swap itself, then 2, 3, ...
    pub combo: u32,
    pub matched: BTreeSet<Pos>,
    pub points: u32,
}

/// Points for clearing `tiles` tiles on combo round `combo`.
#[inline]
pub fn round_points(tiles: usize, combo: u32) -> u32 {
    tiles as u32 * POINTS_PER_TILE * combo
}

/// Rounds of one resolution, lazily. Each `next` mutates the grid by one
/// round; the iterator ends once the grid has no matches and cannot be
/// restarted.
pub struct Cascade<'a> {
    grid: &'a mut Grid,
    rng: &'a mut SessionRng,
    combo: u32,
    done: bool,
}

impl<'a> Cascade<'a> {
    pub fn new(grid: &'a mut Grid, rng: &'a mut SessionRng) -> Self {
        Self {
            grid,
            rng,
            combo: 0,
            done: false,
        }
    }

    /// Continues a cascade whose first `combo` rounds were already scored.
    pub fn after(mut self, combo: u32) -> Self {
        self.combo = combo;
        self
    }
}

impl Iterator for Cascade<'_> {
    type Item = CascadeRound;

    fn next(&mut self) -> Option<CascadeRound> {
        if self.done {
            return None;
        }
        let matched = self.grid.find_matches();
        if matched.is_empty() {
            self.done = true;
            return None;
        }
        self.combo += 1;
        let points = round_points(matched.len(), self.combo);
        self.grid.collapse_and_refill(&matched, self.rng);
        debug!(combo = self.combo, tiles = matched.len(), points, "cascade round");
        Some(CascadeRound {
            combo: self.combo,
            matched,
            points,
        })
    }
}

impl std::iter::FusedIterator for Cascade<'_> {}

/// Totals of a full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CascadeOutcome {
    pub score_delta: u32,
    pub max_combo: u32,
    pub rounds: u32,
}

impl FromIterator<CascadeRound> for CascadeOutcome {
    fn from_iter<I: IntoIterator<Item = CascadeRound>>(rounds: I) -> Self {
        rounds.into_iter().fold(Self::default(), |acc, round| Self {
            score_delta: acc.score_delta + round.points,
            max_combo: round.combo,
            rounds: acc.rounds + 1,
        })
    }
}
