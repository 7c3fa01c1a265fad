//! Layout and drawing: title, board, sidebar, pause, level complete, game over, quit menu.

use crate::app::{QuitOption, Screen, Selection};
use crate::game::GameState;
use crate::grid::Pos;
use crate::highscores::HighScores;
use crate::theme::{Theme, shade};
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget};
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Terminal cells per tile: ` ● ` with room for cursor brackets.
const TILE_W: u16 = 3;
const TILE_H: u16 = 1;

const SIDEBAR_WIDTH: u16 = 26;
/// Stats, progress, combo, colours and help stacked with one-row gaps.
const SIDEBAR_HEIGHT: u16 = 7 + 1 + 4 + 1 + 4 + 1 + 4 + 1 + 5;

/// Moves at or below this are shown as a warning.
const LOW_MOVES: u32 = 5;

/// Everything the renderer needs from the app for one frame.
pub struct View<'a> {
    pub screen: Screen,
    pub state: &'a GameState,
    pub theme: &'a Theme,
    pub selection: Selection,
    pub hint: Option<(Pos, Pos)>,
    pub paused: bool,
    pub notice: Option<&'a str>,
    pub high_scores: HighScores,
    pub new_record: bool,
    pub quit_selected: QuitOption,
    /// Fade matched cells while a cascade round is pending.
    pub animate: bool,
    pub fade_ms: u32,
}

/// Board size (border included) in terminal cells.
fn board_outer_size(size: usize) -> (u16, u16) {
    let n = size as u16;
    (n * TILE_W + 2, n * TILE_H + 2)
}

/// Board and sidebar rects, centred in `area` and clipped to it.
fn game_layout(area: Rect, size: usize) -> (Rect, Rect) {
    let (bw, bh) = board_outer_size(size);
    let total_w = bw + SIDEBAR_WIDTH;
    let total_h = bh.max(SIDEBAR_HEIGHT);

    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_h),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(bw), Constraint::Length(SIDEBAR_WIDTH)])
        .split(vert[1]);
    let board = Rect {
        height: bh.min(inner[0].height),
        ..inner[0]
    };
    (board, inner[1])
}

/// Tile grid inside the board border.
fn board_inner_rect(board_outer: Rect, size: usize) -> Rect {
    let inner = Block::default().borders(Borders::ALL).inner(board_outer);
    let n = size as u16;
    Rect {
        width: (n * TILE_W).min(inner.width),
        height: (n * TILE_H).min(inner.height),
        ..inner
    }
}

/// Top-left terminal cell of a tile.
fn tile_origin(board: Rect, pos: Pos) -> (u16, u16) {
    (
        board.x + pos.col as u16 * TILE_W,
        board.y + pos.row as u16 * TILE_H,
    )
}

/// Buffer positions covered by the given tiles.
fn clearing_buffer_positions(board: Rect, cells: &BTreeSet<Pos>) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for &pos in cells {
        let (x0, y0) = tile_origin(board, pos);
        for bx in x0..(x0 + TILE_W).min(board.right()) {
            for by in y0..(y0 + TILE_H).min(board.bottom()) {
                set.insert((bx, by));
            }
        }
    }
    set
}

/// Create or update the clear fade (TachyonFX: fade matched tiles to bg) and process it.
fn apply_clear_effect(
    frame: &mut Frame,
    view: &View,
    board: Rect,
    clear_effect: &mut Option<Effect>,
    process_time: &mut Option<Instant>,
    now: Instant,
) {
    let delta = process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    *process_time = Some(now);

    if clear_effect.is_none() {
        let clearing = clearing_buffer_positions(board, &view.state.clearing);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            clearing.contains(&(pos.x, pos.y))
        }));
        let bg = view.theme.bg;
        let effect = fx::fade_to(bg, bg, (view.fade_ms, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board);
        *clear_effect = Some(effect);
    }

    if let Some(effect) = clear_effect {
        frame.render_effect(effect, board, TfxDuration::from_millis(delta_ms));
    }
}

/// Draw the current screen. While a cascade round is pending and `view.animate`
/// is set, the matched tiles flash and fade out through `clear_effect`.
pub fn draw(
    frame: &mut Frame,
    view: &View,
    clear_effect: &mut Option<Effect>,
    process_time: &mut Option<Instant>,
    now: Instant,
) {
    let area = frame.area();
    let size = view.state.grid().size();
    let (board_outer, sidebar) = game_layout(area, size);
    let board = board_inner_rect(board_outer, size);

    draw_board(frame, view, board_outer, board);
    draw_sidebar(frame, view, sidebar);

    match view.screen {
        Screen::Title => draw_title(frame, view, area),
        Screen::Playing => {
            if view.paused {
                draw_pause_overlay(frame, view.theme, area);
            } else if view.animate
                && view.state.is_resolving()
                && !view.state.clearing.is_empty()
            {
                apply_clear_effect(frame, view, board, clear_effect, process_time, now);
            }
        }
        Screen::LevelComplete => draw_level_complete(frame, view, area),
        Screen::GameOver => draw_game_over(frame, view, area),
        Screen::QuitMenu => draw_quit_menu(frame, view.theme, view.quit_selected, area),
    }
}

fn set_cell(buf: &mut Buffer, clip: Rect, x: u16, y: u16, symbol: &str, style: Style) {
    if clip.contains(Position::new(x, y)) {
        if let Some(cell) = buf.cell_mut((x, y)) {
            cell.set_symbol(symbol).set_style(style);
        }
    }
}

fn draw_board(frame: &mut Frame, view: &View, outer: Rect, board: Rect) {
    let state = view.state;
    let theme = view.theme;
    let title = format!(" Gemcrush | Level {} ", state.level);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(title, theme.title));
    block.render(outer, frame.buffer_mut());

    let playing = view.screen == Screen::Playing;
    let flashing = view.animate && state.is_resolving();
    let hint: [Option<Pos>; 2] = match view.hint {
        Some((a, b)) => [Some(a), Some(b)],
        None => [None, None],
    };
    let buf = frame.buffer_mut();

    for (pos, color) in state.grid().tiles() {
        let (x, y) = tile_origin(board, pos);
        let tile = theme.tile_color(color);
        let mut bg = theme.bg;
        let mut fg = tile;
        if flashing && state.clearing.contains(&pos) {
            fg = Color::White;
        } else if playing && view.selection.selected == Some(pos) {
            bg = shade(tile, 0.45);
        }
        let (left, right, frame_style) = if playing && view.selection.cursor == pos {
            ("[", "]", Style::default().fg(theme.cursor).bg(bg).bold())
        } else if playing && hint.contains(&Some(pos)) {
            ("‹", "›", Style::default().fg(theme.title).bg(bg))
        } else {
            (" ", " ", Style::default().bg(bg))
        };
        set_cell(buf, board, x, y, left, frame_style);
        set_cell(buf, board, x + 1, y, Theme::tile_glyph(color), Style::default().fg(fg).bg(bg));
        set_cell(buf, board, x + 2, y, right, frame_style);
    }

    // Floating score popups drift upwards from the first cleared tile.
    for popup in &state.popups {
        let (x, y0) = tile_origin(board, popup.pos);
        let Some(y) = y0.checked_sub(popup.rise as u16) else {
            continue;
        };
        if !board.contains(Position::new(x, y)) {
            continue;
        }
        let label = if popup.multiplier > 1 {
            format!("+{} x{}", popup.amount, popup.multiplier)
        } else {
            format!("+{}", popup.amount)
        };
        let width = board.right().saturating_sub(x) as usize;
        let style = Style::default().fg(theme.title).bg(theme.bg).bold();
        buf.set_stringn(x, y, label, width, style);
    }
}

fn bordered(theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
}

fn draw_sidebar(frame: &mut Frame, view: &View, area: Rect) {
    let state = view.state;
    let theme = view.theme;
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7), // Stats
            Constraint::Length(1),
            Constraint::Length(4), // Progress
            Constraint::Length(1),
            Constraint::Length(4), // Combo
            Constraint::Length(1),
            Constraint::Length(4), // Colours
            Constraint::Length(1),
            Constraint::Length(5), // Help
        ])
        .split(area);

    let stat = |label: &'static str, value: String, style: Style| {
        Line::from(vec![Span::styled(label, title_style), Span::styled(value, style)])
    };
    let moves_style = if state.moves_left <= LOW_MOVES {
        Style::default().fg(Color::Red).bold()
    } else {
        fg_style
    };
    let stats = vec![
        stat("Level: ", state.level.to_string(), fg_style),
        stat("Score: ", state.score.to_string(), fg_style),
        stat("Target: ", state.target_score.to_string(), fg_style),
        stat("Moves: ", state.moves_left.to_string(), moves_style),
        stat(
            "Best: ",
            format!("{} (lvl {})", view.high_scores.best_score, view.high_scores.best_level),
            fg_style,
        ),
    ];
    let block = bordered(theme);
    let inner = block.inner(chunks[0]);
    block.render(chunks[0], frame.buffer_mut());
    Paragraph::new(Text::from(stats)).render(inner, frame.buffer_mut());

    // Progress towards the level target.
    let block = bordered(theme);
    let inner = block.inner(chunks[2]);
    block.render(chunks[2], frame.buffer_mut());
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);
    let ratio = if state.target_score == 0 {
        1.0
    } else {
        (state.score as f64 / state.target_score as f64).min(1.0)
    };
    Paragraph::new(Line::from(Span::styled("Progress", title_style)))
        .render(rows[0], frame.buffer_mut());
    let bar_color = if ratio >= 1.0 {
        Color::Green
    } else if ratio > 0.5 {
        Color::Yellow
    } else {
        theme.tile_color(1)
    };
    Gauge::default()
        .ratio(ratio)
        .gauge_style(Style::default().fg(bar_color))
        .render(rows[1], frame.buffer_mut());

    // Combo: live while resolving, otherwise the last chain.
    let block = bordered(theme);
    let inner = block.inner(chunks[4]);
    block.render(chunks[4], frame.buffer_mut());
    let chain = if state.is_resolving() {
        state.combo
    } else {
        state.last_chain
    };
    let combo_style = if chain > 1 {
        Style::default().fg(theme.title).bold()
    } else {
        fg_style
    };
    let combo_label = if chain > 1 {
        format!("x{chain} COMBO")
    } else {
        "Combo".to_string()
    };
    let combo_lines = vec![
        Line::from(Span::styled(combo_label, combo_style)),
        stat("Best chain: ", format!("x{}", state.best_chain), fg_style),
    ];
    Paragraph::new(Text::from(combo_lines)).render(inner, frame.buffer_mut());

    // Colours in play.
    let block = bordered(theme);
    let inner = block.inner(chunks[6]);
    block.render(chunks[6], frame.buffer_mut());
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);
    Paragraph::new(Line::from(Span::styled("Colours", title_style)))
        .render(rows[0], frame.buffer_mut());
    draw_colour_strip(frame, theme, state.grid().colors(), rows[1]);

    // Key help, with the latest notice on top.
    let block = bordered(theme);
    let inner = block.inner(chunks[8]);
    block.render(chunks[8], frame.buffer_mut());
    let mut help = Vec::new();
    if let Some(notice) = view.notice {
        help.push(Line::from(Span::styled(
            notice.to_string(),
            Style::default().fg(Color::Yellow),
        )));
    }
    help.push(Line::from(Span::styled("⏎ pick/swap  ? hint", fg_style)));
    help.push(Line::from(Span::styled("p pause  r restart  q quit", fg_style)));
    Paragraph::new(Text::from(help)).render(inner, frame.buffer_mut());
}

/// One glyph per colour in play, in its tile colour.
fn draw_colour_strip(frame: &mut Frame, theme: &Theme, colors: u8, area: Rect) {
    let step = (area.width / colors.max(1) as u16).max(1);
    let buf = frame.buffer_mut();
    for i in 0..colors {
        let x = area.x + i as u16 * step + step / 2;
        let style = Style::default().fg(theme.tile_color(i)).bold();
        set_cell(buf, area, x, area.y, Theme::tile_glyph(i), style);
    }
}

/// Popup rect of at most `w`×`h`, centred in `area`.
fn centered(area: Rect, w: u16, h: u16) -> Rect {
    let w = w.min(area.width);
    let h = h.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

fn draw_popup(frame: &mut Frame, theme: &Theme, rect: Rect, lines: Vec<Line>) {
    Clear.render(rect, frame.buffer_mut());
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .style(Style::default().bg(theme.bg))
        .block(bordered(theme))
        .render(rect, frame.buffer_mut());
}

fn draw_title(frame: &mut Frame, view: &View, area: Rect) {
    let theme = view.theme;
    let gems: Vec<Span> = (0..view.state.rules.colors)
        .map(|i| {
            Span::styled(
                format!(" {} ", Theme::tile_glyph(i)),
                Style::default().fg(theme.tile_color(i)).bold(),
            )
        })
        .collect();
    let fg = Style::default().fg(theme.main_fg);
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(" Gemcrush ", Style::default().fg(theme.title).bold())),
        Line::from(gems),
        Line::from(""),
        Line::from(Span::styled(
            format!(" Reach {} points in {} moves ", view.state.target_score, view.state.moves_left),
            fg,
        )),
    ];
    if view.high_scores.best_score > 0 {
        lines.push(Line::from(Span::styled(
            format!(" Best: {}  level {} ", view.high_scores.best_score, view.high_scores.best_level),
            fg,
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        " Enter: start game ",
        Style::default().fg(theme.bg).bg(theme.title).bold(),
    )));
    lines.push(Line::from(Span::styled(" Q: quit ", fg)));
    draw_popup(frame, theme, centered(area, 34, 11), lines);
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P: resume    Q: quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    draw_popup(frame, theme, centered(area, 28, 6), lines);
}

fn result_lines(view: &View, banner: String, banner_style: Style) -> Vec<Line<'static>> {
    let fg = Style::default().fg(view.theme.main_fg);
    let state = view.state;
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(banner, banner_style)),
        Line::from(""),
        Line::from(Span::styled(
            format!(" Score: {} / {} ", state.score, state.target_score),
            fg,
        )),
        Line::from(Span::styled(format!(" Best chain: x{} ", state.best_chain), fg)),
        Line::from(Span::styled(
            format!(" Best: {} ", view.high_scores.best_score),
            fg,
        )),
    ];
    if view.new_record {
        lines.push(Line::from(Span::styled(
            " New record! ",
            Style::default().fg(Color::Yellow).bold(),
        )));
    }
    lines.push(Line::from(""));
    lines
}

fn draw_level_complete(frame: &mut Frame, view: &View, area: Rect) {
    let banner = format!(" Level {} cleared! ", view.state.level);
    let style = Style::default().fg(Color::Black).bg(Color::Green);
    let mut lines = result_lines(view, banner, style);
    lines.push(Line::from(Span::styled(
        " N: next level    Q: quit ",
        Style::default().fg(view.theme.main_fg),
    )));
    draw_popup(frame, view.theme, centered(area, 32, 11), lines);
}

fn draw_game_over(frame: &mut Frame, view: &View, area: Rect) {
    let style = Style::default().fg(Color::White).bg(Color::Red);
    let mut lines = result_lines(view, " Out of moves ".to_string(), style);
    lines.push(Line::from(Span::styled(
        " R: restart    Q: quit ",
        Style::default().fg(view.theme.main_fg),
    )));
    draw_popup(frame, view.theme, centered(area, 32, 11), lines);
}

fn draw_quit_menu(frame: &mut Frame, theme: &Theme, selected: QuitOption, area: Rect) {
    let rect = centered(area, 24, 8);
    Clear.render(rect, frame.buffer_mut());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.title))
        .style(Style::default().bg(theme.bg))
        .title(" Quit? ");
    let inner = block.inner(rect);
    block.render(rect, frame.buffer_mut());

    let options = [
        (QuitOption::Resume, " Resume "),
        (QuitOption::Restart, " Restart "),
        (QuitOption::Exit, " Exit "),
    ];
    let buf = frame.buffer_mut();
    for (i, (opt, label)) in options.iter().enumerate() {
        let style = if *opt == selected {
            Style::default().fg(theme.bg).bg(theme.title).bold()
        } else {
            Style::default().fg(theme.title)
        };
        let x = inner.x + inner.width.saturating_sub(label.len() as u16) / 2;
        let y = inner.y + 1 + i as u16 * 2;
        if inner.contains(Position::new(x, y)) {
            let width = inner.right().saturating_sub(x) as usize;
            buf.set_stringn(x, y, label, width, style);
        }
    }
}
