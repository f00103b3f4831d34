//! Neontris — neon falling-block puzzle with power-ups, in the terminal.

mod app;
mod game;
mod input;
mod theme;
mod ui;

use anyhow::Result;
use app::App;
use clap::{Parser, ValueEnum};

/// Options derived from CLI that affect game behaviour.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub seed: Option<u32>,
    pub time_limit_secs: u32,
    pub no_animation: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_default();
    let config = GameConfig {
        seed: args.seed,
        time_limit_secs: args.time_limit,
        no_animation: args.no_animation,
    };
    let mut app = App::new(args, config, theme)?;
    app.run()?;
    Ok(())
}

/// Neon falling-block puzzle in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "neontris",
    version,
    about = "Neon falling-block puzzle with power-ups in the terminal. Clear lines, chain combos, spend bombs, lasers and slow-downs.",
    long_about = "Neontris is a terminal falling-block puzzle.\n\n\
        Place falling pieces on a 10x20 grid; full horizontal lines clear and score. \
        Clearing more than one line at once builds a combo multiplier. Rare glowing pieces \
        carry power-ups: clear the line they land in to bank a Bomb, Laser or Slow.\n\n\
        CONTROLS:\n  Left/Right or h/l  Move       Up or k     Rotate\n  Down or j          Soft drop  Enter/Space Hard drop\n  1 / 2 / 3          Bomb / Laser / Slow\n  P                  Pause      Q / Esc     Quit\n\n\
        Hold a movement key to keep the piece moving. Use --theme to load a btop-style theme."
)]
pub struct Args {
    /// Game mode: endless (play until top-out) or timed (score within the time limit).
    #[arg(short, long, default_value = "endless")]
    pub mode: GameMode,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses the neon defaults if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<std::path::PathBuf>,

    /// In mode 'timed': time limit in seconds.
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub time_limit: u32,

    /// Disable the line-clear flash animation.
    #[arg(long)]
    pub no_animation: bool,

    /// Skip main menu and start game immediately.
    #[arg(long)]
    pub no_menu: bool,

    /// Seed for the piece generator (deterministic sequences; useful for practice).
    #[arg(long, value_name = "N")]
    pub seed: Option<u32>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GameMode {
    #[default]
    Endless,
    Timed,
}
