//! Gemcrush: match-3 gem puzzle in the terminal.

mod app;
mod cascade;
mod game;
mod grid;
mod highscores;
mod input;
mod rng;
mod theme;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Options derived from CLI that affect the session (rules, seed, cascade pacing).
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub rules: game::Rules,
    pub seed: Option<u64>,
    pub cascade_delay_ms: u64,
    pub no_animation: bool,
    pub no_menu: bool,
}

impl GameConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            rules: game::Rules {
                size: args.size as usize,
                colors: args.colors,
                moves_per_level: args.moves,
                initial_target: args.target,
                target_step: args.target_step,
                reshuffle_on_deadlock: !args.no_reshuffle,
            },
            seed: args.seed,
            cascade_delay_ms: args.cascade_delay_ms,
            no_animation: args.no_animation,
            no_menu: args.no_menu,
        }
    }

    /// Fresh seeded random source for a session.
    pub fn session_rng(&self) -> rng::SessionRng {
        self.seed
            .map_or_else(rng::SessionRng::from_random, rng::SessionRng::new)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;
    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "theme not loaded, using defaults");
        theme::Theme::default()
    });
    let config = GameConfig::from_args(&args);
    info!(?config, "starting gemcrush");
    let mut app = App::new(config, theme, highscores::default_path())?;
    app.run()?;
    Ok(())
}

/// Log to a file so output never interferes with the TUI.
fn init_logging(path: &std::path::Path) -> Result<()> {
    let log_file = std::fs::File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Match-3 gem puzzle in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "gemcrush",
    version,
    about = "Match-3 gem puzzle in the terminal. Swap neighbours, line up three or more, chain cascades for combos.",
    long_about = "Gemcrush is a terminal match-3 puzzle.\n\n\
        Swap two neighbouring gems to line up three or more of one colour. Matched gems \
        vanish, the rest fall, new gems drop in, and every further match in the same move \
        scores a bigger combo multiplier. Reach the target score before your moves run out.\n\n\
        CONTROLS:\n  Arrows / hjkl  Move cursor    Enter / Space  Select, then swap with a neighbour\n  \
        ?              Hint           P              Pause\n  \
        R              Restart        N              Next level (after clearing one)\n  \
        Q / Esc        Quit menu\n\n\
        Use --theme to load a btop-style theme (e.g. onedark.theme)."
)]
pub struct Args {
    /// Board side length in tiles.
    #[arg(short, long, default_value_t = 8, value_name = "N",
          value_parser = clap::value_parser!(u16).range(3..=12))]
    pub size: u16,

    /// Number of gem colours.
    #[arg(short, long, default_value_t = 5, value_name = "N",
          value_parser = clap::value_parser!(u8).range(3..=6))]
    pub colors: u8,

    /// Moves per level.
    #[arg(short, long, default_value_t = 30, value_name = "N",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub moves: u32,

    /// Score needed to clear level 1.
    #[arg(long, default_value_t = 1000, value_name = "POINTS",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub target: u32,

    /// Target increase per level.
    #[arg(long, default_value_t = 500, value_name = "POINTS")]
    pub target_step: u32,

    /// Seed for boards and refills; random if not set.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Time each cascade round stays on screen before it is cleared.
    #[arg(long, default_value_t = 300, value_name = "MS")]
    pub cascade_delay_ms: u64,

    /// Disable the clear animation (cascades resolve instantly).
    #[arg(long)]
    pub no_animation: bool,

    /// Skip the title screen and start immediately.
    #[arg(long)]
    pub no_menu: bool,

    /// Leave a board with no possible move as it is instead of reshuffling it.
    #[arg(long)]
    pub no_reshuffle: bool,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Log file (filter with RUST_LOG).
    #[arg(long, default_value = "gemcrush.log", value_name = "PATH")]
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rules_default() {
        let args = Args::try_parse_from(["gemcrush"]).unwrap();
        let config = GameConfig::from_args(&args);
        assert_eq!(config.rules, game::Rules::default());
        assert_eq!(config.cascade_delay_ms, 300);
        assert!(config.seed.is_none());
    }

    #[test]
    fn out_of_range_board_is_rejected() {
        assert!(Args::try_parse_from(["gemcrush", "--size", "2"]).is_err());
        assert!(Args::try_parse_from(["gemcrush", "--size", "13"]).is_err());
        assert!(Args::try_parse_from(["gemcrush", "--colors", "7"]).is_err());
    }

    #[test]
    fn zero_moves_or_target_is_rejected() {
        assert!(Args::try_parse_from(["gemcrush", "--moves", "0"]).is_err());
        assert!(Args::try_parse_from(["gemcrush", "--target", "0"]).is_err());
        let args = Args::try_parse_from(["gemcrush", "--moves", "1", "--target", "1"]).unwrap();
        let config = GameConfig::from_args(&args);
        assert_eq!(config.rules.moves_per_level, 1);
        assert_eq!(config.rules.initial_target, 1);
        assert_eq!(config.rules.validate(), Ok(()));
    }

    #[test]
    fn title_screen_is_on_unless_skipped() {
        let args = Args::try_parse_from(["gemcrush"]).unwrap();
        assert!(!GameConfig::from_args(&args).no_menu);
        let args = Args::try_parse_from(["gemcrush", "--no-menu"]).unwrap();
        assert!(GameConfig::from_args(&args).no_menu);
    }

    #[test]
    fn flags_fold_into_rules() {
        let args = Args::try_parse_from([
            "gemcrush",
            "--size",
            "6",
            "--colors",
            "4",
            "--seed",
            "11",
            "--no-reshuffle",
            "--palette",
            "colourblind",
        ])
        .unwrap();
        let config = GameConfig::from_args(&args);
        assert_eq!(config.rules.size, 6);
        assert_eq!(config.rules.colors, 4);
        assert!(!config.rules.reshuffle_on_deadlock);
        assert_eq!(config.session_rng().seed(), 11);
        assert_eq!(args.palette, Palette::Colorblind);
    }
}
