//! App: terminal init, main loop, cascade pacing and key handling.

use crate::GameConfig;
use crate::game::{GameState, GameStatus};
use crate::grid::Pos;
use crate::highscores::HighScores;
use crate::input::{Action, key_to_action};
use crate::theme::Theme;
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tachyonfx::Effect;
use tracing::{debug, info, warn};

/// Frame budget for the main loop (~60 fps).
const FRAME_MS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Title,
    Playing,
    LevelComplete,
    GameOver,
    QuitMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitOption {
    Resume,
    Restart,
    Exit,
}

impl QuitOption {
    fn next(self) -> Self {
        match self {
            Self::Resume => Self::Restart,
            Self::Restart => Self::Exit,
            Self::Exit => Self::Resume,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::Resume => Self::Exit,
            Self::Restart => Self::Resume,
            Self::Exit => Self::Restart,
        }
    }
}

/// Board cursor plus the tile picked as the first half of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub cursor: Pos,
    pub selected: Option<Pos>,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            cursor: Pos::new(0, 0),
            selected: None,
        }
    }
}

impl Selection {
    /// Moves the cursor one step, clamped to the board.
    pub fn move_cursor(&mut self, action: Action, size: usize) {
        let Pos { row, col } = self.cursor;
        let last = size.saturating_sub(1);
        self.cursor = match action {
            Action::Left => Pos::new(row, col.saturating_sub(1)),
            Action::Right => Pos::new(row, (col + 1).min(last)),
            Action::Up => Pos::new(row.saturating_sub(1), col),
            Action::Down => Pos::new((row + 1).min(last), col),
            _ => self.cursor,
        };
    }

    /// Picks the tile under the cursor. Picking the selected tile again
    /// deselects it, picking a neighbour yields the swap, picking anything
    /// else moves the selection there.
    pub fn pick(&mut self) -> Option<(Pos, Pos)> {
        match self.selected {
            None => {
                self.selected = Some(self.cursor);
                None
            }
            Some(first) if first == self.cursor => {
                self.selected = None;
                None
            }
            Some(first) if first.is_adjacent(self.cursor) => {
                self.selected = None;
                Some((first, self.cursor))
            }
            Some(_) => {
                self.selected = Some(self.cursor);
                None
            }
        }
    }
}

pub struct App {
    config: GameConfig,
    theme: Theme,
    state: GameState,
    screen: Screen,
    paused: bool,
    selection: Selection,
    hint: Option<(Pos, Pos)>,
    /// Short status line (rejected swap, no hint, new record).
    notice: Option<String>,
    quit_selected: QuitOption,
    high_scores: HighScores,
    high_scores_path: PathBuf,
    new_record: bool,
    /// When the pending cascade round was first shown.
    round_shown_at: Option<Instant>,
    /// TachyonFX fade for the cells of the pending round.
    clear_effect: Option<Effect>,
    clear_effect_process_time: Option<Instant>,
    last_frame: Instant,
}

impl App {
    pub fn new(config: GameConfig, theme: Theme, high_scores_path: PathBuf) -> Result<Self> {
        let state = GameState::new(config.rules.clone(), config.session_rng())?;
        info!(seed = state.seed(), "session seed");
        let high_scores = HighScores::load_from(&high_scores_path);
        let screen = if config.no_menu {
            Screen::Playing
        } else {
            Screen::Title
        };
        let mut app = Self {
            config,
            theme,
            state,
            screen,
            paused: false,
            selection: Selection::default(),
            hint: None,
            notice: None,
            quit_selected: QuitOption::Resume,
            high_scores,
            high_scores_path,
            new_record: false,
            round_shown_at: None,
            clear_effect: None,
            clear_effect_process_time: None,
            last_frame: Instant::now(),
        };
        app.sync_status();
        Ok(app)
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal =
            DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);

        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            let view = crate::ui::View {
                screen: self.screen,
                state: &self.state,
                theme: &self.theme,
                selection: self.selection,
                hint: self.hint,
                paused: self.paused,
                notice: self.notice.as_deref(),
                high_scores: self.high_scores,
                new_record: self.new_record,
                quit_selected: self.quit_selected,
                animate: !self.config.no_animation,
                fade_ms: self.config.cascade_delay_ms.min(u32::MAX as u64) as u32,
            };
            let effect = &mut self.clear_effect;
            let process_time = &mut self.clear_effect_process_time;
            terminal.draw(|f| crate::ui::draw(f, &view, effect, process_time, now))?;

            let elapsed = now.saturating_duration_since(self.last_frame);
            self.last_frame = now;
            if !self.paused {
                self.state.tick_popups(elapsed.as_millis().min(u32::MAX as u128) as u32);
                self.pace_cascade(now);
            }

            let timeout = Duration::from_millis(FRAME_MS).saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if !self.handle_action(key_to_action(key), Instant::now()) {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Clears the pending round once it has been on screen long enough.
    fn pace_cascade(&mut self, now: Instant) {
        if self.screen != Screen::Playing || !self.state.is_resolving() {
            return;
        }
        let delay = Duration::from_millis(self.config.cascade_delay_ms);
        let due = self.config.no_animation
            || self.clear_effect.as_ref().is_some_and(|e| e.done())
            || self
                .round_shown_at
                .is_some_and(|t| now.saturating_duration_since(t) >= delay);
        if !due {
            return;
        }
        if self.config.no_animation {
            let outcome = self.state.resolve_all();
            debug!(?outcome, "cascade resolved");
        } else if let Some(round) = self.state.finish_round() {
            debug!(combo = round.combo, points = round.points, "round cleared");
        }
        self.start_round_display(now);
        self.sync_status();
    }

    fn start_round_display(&mut self, now: Instant) {
        self.round_shown_at = self.state.is_resolving().then_some(now);
        self.clear_effect = None;
        self.clear_effect_process_time = None;
    }

    /// Moves to the level-end screens once the board has settled.
    fn sync_status(&mut self) {
        if self.screen == Screen::Title || self.state.is_resolving() {
            return;
        }
        let status = self.state.status();
        if status == GameStatus::Ongoing {
            return;
        }
        self.screen = match status {
            GameStatus::Won => Screen::LevelComplete,
            _ => Screen::GameOver,
        };
        self.hint = None;
        self.selection.selected = None;
        if self.high_scores.record(self.state.score, self.state.level) {
            self.new_record = true;
            if let Err(e) = self.high_scores.save_to(&self.high_scores_path) {
                warn!(error = %e, "could not save high scores");
            }
        }
    }

    fn reset_view(&mut self) {
        self.screen = Screen::Playing;
        self.paused = false;
        self.selection = Selection::default();
        self.hint = None;
        self.notice = None;
        self.new_record = false;
        self.start_round_display(Instant::now());
        self.sync_status();
    }

    fn restart(&mut self) {
        self.state.restart();
        self.reset_view();
    }

    fn next_level(&mut self) {
        self.state.advance_level();
        self.reset_view();
    }

    fn attempt_swap(&mut self, a: Pos, b: Pos, now: Instant) {
        match self.state.try_swap(a, b) {
            Ok(()) => {
                self.hint = None;
                self.notice = None;
                self.start_round_display(now);
                self.pace_cascade(now);
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    /// Applies one key action. Returns false when the app should exit.
    pub fn handle_action(&mut self, action: Action, now: Instant) -> bool {
        match self.screen {
            Screen::Title => match action {
                Action::Select => self.reset_view(),
                Action::Quit => return false,
                _ => {}
            },
            Screen::Playing if self.paused => match action {
                Action::Pause => self.paused = false,
                Action::Quit => {
                    self.screen = Screen::QuitMenu;
                    self.quit_selected = QuitOption::Resume;
                }
                _ => {}
            },
            Screen::Playing => match action {
                Action::Left | Action::Right | Action::Up | Action::Down => {
                    self.selection.move_cursor(action, self.state.grid().size());
                }
                Action::Select => {
                    if let Some((a, b)) = self.selection.pick() {
                        self.attempt_swap(a, b, now);
                    }
                }
                Action::Hint => {
                    self.hint = self.state.hint();
                    if self.hint.is_none() && !self.state.is_resolving() {
                        self.notice = Some("no moves available".to_string());
                    }
                }
                Action::Pause => self.paused = true,
                Action::Restart => self.restart(),
                Action::Quit => {
                    self.screen = Screen::QuitMenu;
                    self.quit_selected = QuitOption::Resume;
                }
                Action::NextLevel | Action::None => {}
            },
            Screen::LevelComplete => match action {
                Action::NextLevel | Action::Select => self.next_level(),
                Action::Restart => self.restart(),
                Action::Quit => return false,
                _ => {}
            },
            Screen::GameOver => match action {
                Action::Restart | Action::Select => self.restart(),
                Action::Quit => return false,
                _ => {}
            },
            Screen::QuitMenu => match action {
                Action::Down | Action::Right => self.quit_selected = self.quit_selected.next(),
                Action::Up | Action::Left => self.quit_selected = self.quit_selected.prev(),
                Action::Select => match self.quit_selected {
                    QuitOption::Resume => self.screen = Screen::Playing,
                    QuitOption::Restart => self.restart(),
                    QuitOption::Exit => return false,
                },
                Action::Pause | Action::Quit => self.screen = Screen::Playing,
                _ => {}
            },
        }
        true
    }
}
