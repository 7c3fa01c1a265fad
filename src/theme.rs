//! Theme loading: btop-style `theme[key]="value"` and hex → ratatui Color.

use crate::Palette;
use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// One glyph per tile colour so tiles stay distinguishable without colour.
pub const TILE_GLYPHS: [&str; 6] = ["●", "◆", "▲", "■", "★", "✚"];

/// Tile palette and UI colours loaded from a theme file.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Tile colours by index: red, blue, green, yellow, purple, cyan.
    pub tiles: [Color; 6],
    /// Board background.
    pub bg: Color,
    /// Grid / border.
    pub div_line: Color,
    /// Text (score, moves).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Secondary text and hint markers.
    pub inactive_fg: Color,
    /// Cursor frame.
    pub cursor: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

const fn rgb(hex: u32) -> Color {
    Color::Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

const ONEDARK_TILES: [Color; 6] = [
    rgb(0xE0_6C_75),
    rgb(0x61_AF_EF),
    rgb(0x98_C3_79),
    rgb(0xE5_C0_7B),
    rgb(0xC6_78_DD),
    rgb(0x56_B6_C2),
];

const HIGH_CONTRAST_TILES: [Color; 6] = [
    rgb(0xFF_00_00),
    rgb(0x00_88_FF),
    rgb(0x00_FF_00),
    rgb(0xFF_FF_00),
    rgb(0xFF_00_FF),
    rgb(0x00_FF_FF),
];

/// Paul Tol's bright scheme, ordered to keep red/green apart.
const COLORBLIND_TILES: [Color; 6] = [
    rgb(0xCC_33_11),
    rgb(0x00_77_BB),
    rgb(0x00_99_88),
    rgb(0xEE_77_33),
    rgb(0xEE_33_77),
    rgb(0xBB_BB_00),
];

impl Default for Theme {
    fn default() -> Self {
        Self::onedark_default()
    }
}

impl Theme {
    pub fn onedark_default() -> Self {
        Self {
            tiles: ONEDARK_TILES,
            bg: rgb(0x28_2C_34),
            div_line: rgb(0x3F_44_4F),
            main_fg: rgb(0xAB_B2_BF),
            title: rgb(0xE5_C0_7B),
            inactive_fg: rgb(0x5C_63_70),
            cursor: Color::White,
        }
    }

    /// Load theme from a btop-style file: `theme[key]="value"` or `theme[key]='value'`.
    /// Falls back to One Dark defaults if path is None or the file is missing.
    /// `palette` then overrides the tile colours.
    pub fn load(path: Option<&Path>, palette: Palette) -> Result<Self, ThemeError> {
        let path = match path {
            Some(p) if p.exists() => p,
            _ => return Ok(Self::default_for_palette(palette)),
        };
        let s = std::fs::read_to_string(path)?;
        let map = parse_theme_file(&s);
        let mut theme = Self::from_map(&map);
        theme.apply_palette(palette);
        Ok(theme)
    }

    fn default_for_palette(palette: Palette) -> Self {
        let mut t = Self::onedark_default();
        t.apply_palette(palette);
        t
    }

    pub fn apply_palette(&mut self, palette: Palette) {
        match palette {
            Palette::Normal => {}
            Palette::HighContrast => {
                self.tiles = HIGH_CONTRAST_TILES;
                self.cursor = Color::White;
            }
            Palette::Colorblind => self.tiles = COLORBLIND_TILES,
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).and_then(|v| parse_hex(v).ok());
        let d = Self::onedark_default();
        // btop keys; each falls back to the One Dark value at the same slot.
        Self {
            tiles: [
                get("cpu_end").or_else(|| get("temp_end")).unwrap_or(d.tiles[0]),
                get("cpu_box").unwrap_or(d.tiles[1]),
                get("mem_box").or_else(|| get("cpu_start")).unwrap_or(d.tiles[2]),
                get("cpu_mid").or_else(|| get("title")).unwrap_or(d.tiles[3]),
                get("net_box").unwrap_or(d.tiles[4]),
                get("hi_fg").or_else(|| get("proc_misc")).unwrap_or(d.tiles[5]),
            ],
            bg: get("main_bg").or_else(|| get("meter_bg")).unwrap_or(d.bg),
            div_line: get("div_line").unwrap_or(d.div_line),
            main_fg: get("main_fg").unwrap_or(d.main_fg),
            title: get("title").unwrap_or(d.title),
            inactive_fg: get("inactive_fg").unwrap_or(d.inactive_fg),
            cursor: get("selected_fg").unwrap_or(d.cursor),
        }
    }

    /// Tile colour for a colour index.
    #[inline]
    pub fn tile_color(&self, index: u8) -> Color {
        self.tiles[(index as usize) % self.tiles.len()]
    }

    #[inline]
    pub fn tile_glyph(index: u8) -> &'static str {
        TILE_GLYPHS[(index as usize) % TILE_GLYPHS.len()]
    }
}

/// Parse btop-style theme file into key -> value map.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(stripped) = line.strip_prefix("theme[") else {
            continue;
        };
        let Some(end) = stripped.find(']') else {
            continue;
        };
        let key = stripped[..end].trim();
        let rest = stripped[end + 1..].trim();
        if let Some(value) = rest.strip_prefix('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB" into ratatui Color.
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let invalid = || ThemeError::InvalidHex(s.to_string());
    let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
    let (r, g, b) = match s.len() {
        6 => (channel(&s[0..2])?, channel(&s[2..4])?, channel(&s[4..6])?),
        3 => (
            channel(&s[0..1])? * 17,
            channel(&s[1..2])? * 17,
            channel(&s[2..3])? * 17,
        ),
        _ => return Err(invalid()),
    };
    Ok(Color::Rgb(r, g, b))
}

/// Scale an RGB colour's brightness; named colours pass through.
pub fn shade(color: Color, factor: f32) -> Color {
    match color {
        Color::Rgb(r, g, b) => {
            let scale = |c: u8| (c as f32 * factor).clamp(0.0, 255.0) as u8;
            Color::Rgb(scale(r), scale(g), scale(b))
        }
        other => other,
    }
}
