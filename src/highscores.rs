//! Persist best score and highest level reached (XDG config or ~/.config/gemcrush).

use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const FILENAME: &str = "highscores";

/// Best results across sessions. Stored as two lines: score, then level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighScores {
    pub best_score: u32,
    pub best_level: u32,
}

/// Returns the path to the high scores file (config dir / gemcrush / highscores).
pub fn default_path() -> PathBuf {
    let home_config = || {
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".config"))
            .unwrap_or_else(|_| PathBuf::from("."))
    };
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => home_config(),
    };
    base.join("gemcrush").join(FILENAME)
}

impl HighScores {
    /// Unreadable or malformed lines read as 0.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        let mut numbers = content
            .lines()
            .map(|l| l.trim().parse::<u32>().unwrap_or(0));
        Self {
            best_score: numbers.next().unwrap_or(0),
            best_level: numbers.next().unwrap_or(0),
        }
    }

    /// Creates the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::File::create(path)?;
        writeln!(f, "{}", self.best_score)?;
        writeln!(f, "{}", self.best_level)?;
        Ok(())
    }

    /// Folds a finished level or session in; true if anything improved.
    pub fn record(&mut self, score: u32, level: u32) -> bool {
        let improved = score > self.best_score || level > self.best_level;
        self.best_score = self.best_score.max(score);
        self.best_level = self.best_level.max(level);
        improved
    }
}
