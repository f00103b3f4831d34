//! Theme loading: btop-style `theme[key]="value"` and hex → ratatui Color.

use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Neon palette and UI colours loaded from a theme file.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Cell colours for grid indices 1..=10: the seven piece colours
    /// (T, O, L, J, I, S, Z) followed by slow, bomb, laser.
    pub piece: [Color; 10],
    /// Playfield background.
    pub bg: Color,
    /// Grid / border.
    pub div_line: Color,
    /// Text (score, level).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Inactive / secondary text.
    pub inactive_fg: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::neon_default()
    }
}

impl Theme {
    /// Hardcoded neon defaults.
    pub fn neon_default() -> Self {
        Self {
            piece: [
                parse_hex("#00FFD5").unwrap(), // T / cyan-mint
                parse_hex("#FF2D95").unwrap(), // O / hot pink
                parse_hex("#7A5CFF").unwrap(), // L / violet
                parse_hex("#FFD54D").unwrap(), // J / amber
                parse_hex("#6AFF9C").unwrap(), // I / mint
                parse_hex("#4DD0FF").unwrap(), // S / sky
                parse_hex("#FF7AB6").unwrap(), // Z / rose
                parse_hex("#FFFFFF").unwrap(), // slow
                parse_hex("#FF0000").unwrap(), // bomb
                parse_hex("#0000FF").unwrap(), // laser
            ],
            bg: parse_hex("#05060A").unwrap(),
            div_line: parse_hex("#203040").unwrap(),
            main_fg: parse_hex("#CFE8FF").unwrap(),
            title: parse_hex("#00FFD5").unwrap(),
            inactive_fg: parse_hex("#5C6370").unwrap(),
        }
    }

    /// Load theme from a btop-style file: `theme[key]="value"` or `theme[key]='value'`.
    /// Falls back to neon defaults if path is None or file is missing/invalid.
    /// `palette` selects colour variant: Normal (theme), HighContrast, or Colorblind.
    pub fn load(path: Option<&Path>, palette: crate::Palette) -> Result<Self, ThemeError> {
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

    /// Default theme for a palette when no file is loaded.
    fn default_for_palette(palette: crate::Palette) -> Self {
        let mut t = Self::neon_default();
        t.apply_palette(palette);
        t
    }

    /// Override the seven piece colours for high-contrast or colorblind.
    /// The three power-up colours keep their fixed identities.
    pub fn apply_palette(&mut self, palette: crate::Palette) {
        let replacement: [&str; 7] = match palette {
            crate::Palette::Normal => return,
            crate::Palette::HighContrast => [
                "#00FF00", "#FFFF00", "#FF0000", "#0088FF", "#FF00FF", "#00FFFF", "#FFFFFF",
            ],
            crate::Palette::Colorblind => [
                "#0077BB", "#EE7733", "#009988", "#CC3311", "#EE3377", "#BBBB00", "#33BBEE",
            ],
        };
        for (slot, hex) in self.piece.iter_mut().zip(replacement) {
            *slot = parse_hex(hex).unwrap();
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            map.get(key)
                .and_then(|v| parse_hex(v.trim_matches('"').trim_matches('\'').trim()).ok())
        };
        // UI colours come from the usual btop keys; piece colours stay neon.
        let mut theme = Self::neon_default();
        if let Some(c) = get("meter_bg") {
            theme.bg = c;
        }
        if let Some(c) = get("div_line") {
            theme.div_line = c;
        }
        if let Some(c) = get("main_fg") {
            theme.main_fg = c;
        }
        if let Some(c) = get("title") {
            theme.title = c;
        }
        if let Some(c) = get("inactive_fg") {
            theme.inactive_fg = c;
        }
        theme
    }

    /// Colour for a nonzero grid cell value (1..=10).
    #[inline]
    pub fn piece_color(&self, index: u8) -> Color {
        let i = (index.max(1) as usize - 1) % self.piece.len();
        self.piece[i]
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
        if let Some(stripped) = line.strip_prefix("theme[") {
            if let Some(end) = stripped.find(']') {
                let key = stripped[..end].trim();
                let rest = stripped[end + 1..].trim();
                if let Some(eq) = rest.find('=') {
                    let value = rest[eq + 1..]
                        .trim()
                        .trim_matches('"')
                        .trim_matches('\'')
                        .to_string();
                    if !value.is_empty() {
                        map.insert(key.to_string(), value);
                    }
                }
            }
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB" into ratatui Color.
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let (r, g, b) = if s.len() == 6 {
        let r =
            u8::from_str_radix(&s[0..2], 16).map_err(|_| ThemeError::InvalidHex(s.to_string()))?;
        let g =
            u8::from_str_radix(&s[2..4], 16).map_err(|_| ThemeError::InvalidHex(s.to_string()))?;
        let b =
            u8::from_str_radix(&s[4..6], 16).map_err(|_| ThemeError::InvalidHex(s.to_string()))?;
        (r, g, b)
    } else if s.len() == 3 {
        let r = u8::from_str_radix(&s[0..1], 16)
            .map_err(|_| ThemeError::InvalidHex(s.to_string()))?
            * 17;
        let g = u8::from_str_radix(&s[1..2], 16)
            .map_err(|_| ThemeError::InvalidHex(s.to_string()))?
            * 17;
        let b = u8::from_str_radix(&s[2..3], 16)
            .map_err(|_| ThemeError::InvalidHex(s.to_string()))?
            * 17;
        (r, g, b)
    } else {
        return Err(ThemeError::InvalidHex(s.to_string()));
    };
    Ok(Color::Rgb(r, g, b))
}
