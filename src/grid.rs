//! Tile grid: construction, match detection, swaps, gravity and refill.
//!
//! Cells are stored row-major as colour indices. Row 0 is the top; gravity
//! pulls towards the last row. A tile's coordinates are its storage position,
//! so there is nothing to keep in sync when tiles move.

use crate::rng::SessionRng;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Shortest run that counts as a match.
pub const MIN_RUN: usize = 3;

/// Fewer colours than this cannot always avoid runs during construction.
pub const MIN_COLORS: u8 = 3;

/// The theme has six tile colours.
pub const MAX_COLORS: u8 = 6;

/// Largest board side the sidebar layout leaves room for.
pub const MAX_SIZE: usize = 12;

/// Bounded retries for [`Grid::reshuffle`], per strategy.
const RESHUFFLE_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Up/down/left/right neighbour (Manhattan distance exactly 1).
    pub fn is_adjacent(self, other: Self) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Why a swap request was turned down. None of these are fatal: the grid is
/// left untouched and no move is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("position {0} is outside the board")]
    OutOfBounds(Pos),
    #[error("{0} and {1} are not adjacent")]
    NotAdjacent(Pos, Pos),
    #[error("a cascade is still resolving")]
    Busy,
    #[error("the level is already over")]
    LevelOver,
    #[error("swapping {0} and {1} does not create a match")]
    NoMatch(Pos, Pos),
}

/// Square board of colour indices in `0..colors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    size: usize,
    colors: u8,
    cells: Vec<u8>,
}

impl Grid {
    /// Random board with no pre-existing runs.
    ///
    /// Each cell redraws its colour while it would complete a run with its two
    /// left or two upper neighbours. With at least three colours some colour
    /// is always free, so the loop terminates.
    ///
    /// Panics on a colour count outside `MIN_COLORS..=MAX_COLORS`; sessions
    /// check this through `Rules::validate` first.
    pub fn initialize(size: usize, colors: u8, rng: &mut SessionRng) -> Self {
        assert!(
            (MIN_COLORS..=MAX_COLORS).contains(&colors),
            "colour count {colors} outside {MIN_COLORS}..={MAX_COLORS}"
        );
        let mut grid = Self {
            size,
            colors,
            cells: vec![0; size * size],
        };
        for row in 0..size {
            for col in 0..size {
                let color = loop {
                    let candidate = rng.color(colors);
                    if !grid.completes_run(row, col, candidate) {
                        break candidate;
                    }
                };
                grid.cells[row * size + col] = color;
            }
        }
        grid
    }

    /// Board from explicit rows. `None` unless the rows form a square and
    /// every colour is below `colors`.
    #[cfg(test)]
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R], colors: u8) -> Option<Self> {
        let size = rows.len();
        let mut cells = Vec::with_capacity(size * size);
        for row in rows {
            let row = row.as_ref();
            if row.len() != size || row.iter().any(|&c| c >= colors) {
                return None;
            }
            cells.extend_from_slice(row);
        }
        Some(Self {
            size,
            colors,
            cells,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn colors(&self) -> u8 {
        self.colors
    }

    #[inline]
    pub fn contains(&self, pos: Pos) -> bool {
        pos.row < self.size && pos.col < self.size
    }

    #[cfg(test)]
    pub fn get(&self, pos: Pos) -> Option<u8> {
        self.contains(pos).then(|| self.at(pos.row, pos.col))
    }

    /// Every cell with its position, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = (Pos, u8)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, &c)| (Pos::new(i / self.size, i % self.size), c))
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> u8 {
        self.cells[row * self.size + col]
    }

    fn completes_run(&self, row: usize, col: usize, color: u8) -> bool {
        let horizontal = col >= 2 && self.at(row, col - 1) == color && self.at(row, col - 2) == color;
        let vertical = row >= 2 && self.at(row - 1, col) == color && self.at(row - 2, col) == color;
        horizontal || vertical
    }

    /// Every cell that belongs to a horizontal or vertical run of three or
    /// more equal colours. Cells shared by two runs appear once.
    pub fn find_matches(&self) -> BTreeSet<Pos> {
        let mut matches = BTreeSet::new();
        self.scan_runs(&mut matches, |line, i| Pos::new(line, i));
        self.scan_runs(&mut matches, |line, i| Pos::new(i, line));
        matches
    }

    /// Slides a window of three along each line. On a hit it marks the window
    /// plus the cells three and four past its start when they carry the same
    /// colour. Each of the two is checked on its own, so in `G G G B G` the
    /// last gem is marked too.
    fn scan_runs(&self, matches: &mut BTreeSet<Pos>, pos: impl Fn(usize, usize) -> Pos) {
        let n = self.size;
        if n < MIN_RUN {
            return;
        }
        let color_at = |line: usize, i: usize| {
            let p = pos(line, i);
            self.at(p.row, p.col)
        };
        for line in 0..n {
            for start in 0..=n - MIN_RUN {
                let color = color_at(line, start);
                if color_at(line, start + 1) != color || color_at(line, start + 2) != color {
                    continue;
                }
                matches.extend((start..start + MIN_RUN).map(|i| pos(line, i)));
                for i in [start + 3, start + 4] {
                    if i < n && color_at(line, i) == color {
                        matches.insert(pos(line, i));
                    }
                }
            }
        }
    }

    /// Checks a swap without touching the board: both cells inside, adjacent,
    /// and the swapped copy has at least one match.
    pub fn check_swap(&self, a: Pos, b: Pos) -> Result<(), MoveError> {
        for p in [a, b] {
            if !self.contains(p) {
                return Err(MoveError::OutOfBounds(p));
            }
        }
        if !a.is_adjacent(b) {
            return Err(MoveError::NotAdjacent(a, b));
        }
        let mut swapped = self.clone();
        swapped.swap(a, b);
        if swapped.find_matches().is_empty() {
            return Err(MoveError::NoMatch(a, b));
        }
        Ok(())
    }

    pub fn validate_swap(&self, a: Pos, b: Pos) -> bool {
        self.check_swap(a, b).is_ok()
    }

    /// Exchanges the contents of two cells. Callers validate first.
    ///
    /// Panics if either position is outside the board.
    pub fn swap(&mut self, a: Pos, b: Pos) {
        let n = self.size;
        self.cells.swap(a.row * n + a.col, b.row * n + b.col);
    }

    /// Removes `matched`, lets each column's survivors fall keeping their
    /// order, then fills the vacated top cells with fresh random colours.
    /// Refills may form new runs; that is what drives cascades.
    pub fn collapse_and_refill(&mut self, matched: &BTreeSet<Pos>, rng: &mut SessionRng) {
        let n = self.size;
        for col in 0..n {
            let survivors: Vec<u8> = (0..n)
                .filter(|&row| !matched.contains(&Pos::new(row, col)))
                .map(|row| self.at(row, col))
                .collect();
            let vacated = n - survivors.len();
            for row in 0..vacated {
                self.cells[row * n + col] = rng.color(self.colors);
            }
            for (offset, color) in survivors.into_iter().enumerate() {
                self.cells[(vacated + offset) * n + col] = color;
            }
        }
    }

    /// First legal swap in row-major order, pairing each cell with its right
    /// then lower neighbour.
    pub fn find_hint(&self) -> Option<(Pos, Pos)> {
        for row in 0..self.size {
            for col in 0..self.size {
                let a = Pos::new(row, col);
                for b in [Pos::new(row, col + 1), Pos::new(row + 1, col)] {
                    if self.contains(b) && self.validate_swap(a, b) {
                        return Some((a, b));
                    }
                }
            }
        }
        None
    }

    /// False when no single swap anywhere can produce a match.
    pub fn has_legal_move(&self) -> bool {
        self.find_hint().is_some()
    }

    /// Replaces a deadlocked board with a playable one.
    ///
    /// First permutes the existing colours; if no permutation within the
    /// attempt budget is both match-free and playable, falls back to fresh
    /// boards. Returns false and leaves the board alone when both fail.
    pub fn reshuffle(&mut self, rng: &mut SessionRng) -> bool {
        let mut cells = self.cells.clone();
        for _ in 0..RESHUFFLE_ATTEMPTS {
            rng.shuffle(&mut cells);
            let candidate = Self {
                size: self.size,
                colors: self.colors,
                cells: cells.clone(),
            };
            if candidate.find_matches().is_empty() && candidate.has_legal_move() {
                *self = candidate;
                return true;
            }
        }
        for _ in 0..RESHUFFLE_ATTEMPTS {
            let candidate = Self::initialize(self.size, self.colors, rng);
            if candidate.has_legal_move() {
                *self = candidate;
                return true;
            }
        }
        false
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.size) {
            for &c in row {
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn striped_fixture_has_no_matches() {
        assert!(grid(&striped_rows()).find_matches().is_empty());
    }

    #[test]
    fn finds_exactly_the_green_triple() {
        let g = green_triple_on_top();
        let expected: BTreeSet<Pos> = [Pos::new(0, 2), Pos::new(0, 3), Pos::new(0, 4)].into();
        assert_eq!(g.find_matches(), expected);
    }

    #[test]
    fn runs_of_four_and_five_are_reported_whole() {
        let mut rows = striped_rows();
        rows[7] = vec![RED, RED, RED, RED, RED, BLUE, GREEN, YELLOW];
        rows[1][7] = PURPLE;
        rows[2][7] = PURPLE;
        rows[3][7] = PURPLE;
        rows[4][7] = PURPLE;
        let g = grid(&rows);
        let m = g.find_matches();
        for col in 0..5 {
            assert!(m.contains(&Pos::new(7, col)));
        }
        for row in 1..5 {
            assert!(m.contains(&Pos::new(row, 7)));
        }
        assert!(!m.contains(&Pos::new(7, 5)));
        assert!(!m.contains(&Pos::new(0, 7)));
        assert!(!m.contains(&Pos::new(5, 7)));
    }

    #[test]
    fn fifth_cell_past_a_gap_is_marked() {
        let mut rows = striped_rows();
        rows[7] = vec![RED, RED, RED, GREEN, RED, BLUE, GREEN, YELLOW];
        let m = grid(&rows).find_matches();
        let expected: BTreeSet<Pos> =
            [Pos::new(7, 0), Pos::new(7, 1), Pos::new(7, 2), Pos::new(7, 4)].into();
        assert_eq!(m, expected);
    }

    #[test]
    fn gap_in_a_column_marks_the_far_cell() {
        let mut rows = striped_rows();
        rows[2][0] = BLUE;
        rows[3][0] = BLUE;
        rows[4][0] = BLUE;
        rows[5][0] = RED;
        rows[6][0] = BLUE;
        let m = grid(&rows).find_matches();
        let expected: BTreeSet<Pos> = [
            Pos::new(2, 0),
            Pos::new(3, 0),
            Pos::new(4, 0),
            Pos::new(6, 0),
        ]
        .into();
        assert_eq!(m, expected);
    }

    #[test]
    fn intersecting_runs_share_the_corner_once() {
        let mut rows = l_shape_setup_rows();
        rows[2][2] = PURPLE;
        rows[3][2] = YELLOW;
        let m = grid(&rows).find_matches();
        assert_eq!(m.len(), 5);
    }

    fn l_shape_setup_rows() -> Vec<Vec<u8>> {
        let g = l_shape_setup();
        (0..8)
            .map(|r| (0..8).map(|c| g.get(Pos::new(r, c)).unwrap()).collect())
            .collect()
    }

    #[test]
    fn rejects_out_of_bounds_and_non_adjacent() {
        let g = l_shape_setup();
        assert_eq!(
            g.check_swap(Pos::new(0, 7), Pos::new(0, 8)),
            Err(MoveError::OutOfBounds(Pos::new(0, 8)))
        );
        assert_eq!(
            g.check_swap(Pos::new(2, 2), Pos::new(2, 2)),
            Err(MoveError::NotAdjacent(Pos::new(2, 2), Pos::new(2, 2)))
        );
        assert_eq!(
            g.check_swap(Pos::new(2, 2), Pos::new(3, 3)),
            Err(MoveError::NotAdjacent(Pos::new(2, 2), Pos::new(3, 3)))
        );
    }

    #[test]
    fn accepts_swap_that_forms_a_run_without_mutating() {
        let g = l_shape_setup();
        let before = g.clone();
        assert!(g.validate_swap(Pos::new(2, 2), Pos::new(3, 2)));
        assert!(g.validate_swap(Pos::new(3, 2), Pos::new(2, 2)));
        assert_eq!(g, before);
    }

    #[test]
    fn same_colour_swap_without_runs_is_rejected() {
        let mut rows = striped_rows();
        rows[5][6] = rows[5][5];
        let g = grid(&rows);
        let before = g.clone();
        assert_eq!(
            g.check_swap(Pos::new(5, 5), Pos::new(5, 6)),
            Err(MoveError::NoMatch(Pos::new(5, 5), Pos::new(5, 6)))
        );
        assert_eq!(g, before);
    }

    #[test]
    fn collapse_keeps_survivor_order_and_refills_top() {
        let mut g = green_triple_on_top();
        let below: Vec<Option<u8>> = (1..8).map(|r| g.get(Pos::new(r, 3))).collect();
        let matched = g.find_matches();
        let mut rng = SessionRng::new(3);
        g.collapse_and_refill(&matched, &mut rng);
        let after: Vec<Option<u8>> = (1..8).map(|r| g.get(Pos::new(r, 3))).collect();
        assert_eq!(below, after);
        assert_eq!(g.get(Pos::new(0, 0)), Some(RED));
        assert_eq!(g.get(Pos::new(0, 1)), Some(RED));
    }

    #[test]
    fn collapse_drops_tiles_above_a_vertical_gap() {
        let mut g = grid(&striped_rows());
        let column: Vec<u8> = (0..8).map(|r| g.get(Pos::new(r, 4)).unwrap()).collect();
        let matched: BTreeSet<Pos> = (3..6).map(|r| Pos::new(r, 4)).collect();
        let mut rng = SessionRng::new(9);
        g.collapse_and_refill(&matched, &mut rng);
        // rows 0..3 fell by three; rows 6..8 stayed.
        for r in 0..3 {
            assert_eq!(g.get(Pos::new(r + 3, 4)), Some(column[r]));
        }
        for r in 6..8 {
            assert_eq!(g.get(Pos::new(r, 4)), Some(column[r]));
        }
    }

    #[test]
    fn hint_is_a_legal_swap() {
        let g = l_shape_setup();
        let (a, b) = g.find_hint().expect("fixture has a move");
        assert!(g.validate_swap(a, b));
    }

    #[test]
    fn striped_board_is_deadlocked_and_reshuffles() {
        // shifting any one cell of the stripes never lines up three
        let mut g = grid(&striped_rows());
        assert!(!g.has_legal_move());
        let mut rng = SessionRng::new(11);
        assert!(g.reshuffle(&mut rng));
        assert!(g.has_legal_move());
        assert!(g.find_matches().is_empty());
    }

    #[test]
    fn from_rows_rejects_ragged_or_out_of_range() {
        assert!(Grid::from_rows(&[vec![0, 1], vec![1]], 3).is_none());
        assert!(Grid::from_rows(&[vec![0, 3], vec![1, 0]], 3).is_none());
        assert!(Grid::from_rows(&[vec![0, 2], vec![1, 0]], 3).is_some());
    }

    proptest! {
        #[test]
        fn fresh_boards_have_no_matches(seed in any::<u64>(), size in 3usize..=12, colors in 3u8..=6) {
            let mut rng = SessionRng::new(seed);
            let g = Grid::initialize(size, colors, &mut rng);
            prop_assert!(g.find_matches().is_empty());
            prop_assert!(g.tiles().all(|(_, c)| c < colors));
            prop_assert_eq!(g.tiles().count(), size * size);
        }

        #[test]
        fn rejected_swaps_leave_the_board_alone(seed in any::<u64>(), row in 0usize..8, col in 0usize..8, down in any::<bool>()) {
            let mut rng = SessionRng::new(seed);
            let g = Grid::initialize(8, 5, &mut rng);
            let a = Pos::new(row, col);
            let b = if down { Pos::new(row + 1, col) } else { Pos::new(row, col + 1) };
            let before = g.clone();
            let mut swapped = g.clone();
            if g.contains(b) {
                swapped.swap(a, b);
            }
            let forms_run = g.contains(b) && !swapped.find_matches().is_empty();
            prop_assert_eq!(g.validate_swap(a, b), forms_run);
            prop_assert_eq!(g, before);
        }

        #[test]
        fn non_adjacent_pairs_never_validate(seed in any::<u64>(), a in (0usize..8, 0usize..8), b in (0usize..8, 0usize..8)) {
            let (a, b) = (Pos::new(a.0, a.1), Pos::new(b.0, b.1));
            prop_assume!(!a.is_adjacent(b));
            let mut rng = SessionRng::new(seed);
            let g = Grid::initialize(8, 5, &mut rng);
            prop_assert!(!g.validate_swap(a, b));
        }
    }
}
