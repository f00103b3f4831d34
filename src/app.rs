//! App: terminal init, main loop, gravity timing and key handling.

use crate::game::{GameState, PowerUp};
use crate::input::{key_to_action, Action};
use crate::theme::Theme;
use crate::{Args, GameConfig, GameMode};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;

/// DAS (Delayed Auto-Shift): delay before movement starts repeating when you hold a key.
const REPEAT_DELAY_MS: u64 = 170;
/// ARR (Auto-Repeat Rate): time between repeated moves while holding. 50 ms ≈ 20 moves/sec.
const REPEAT_INTERVAL_MS: u64 = 50;

/// Advance the timed-mode countdown by one frame. Returns the remaining time
/// and whether the session just ran out.
fn tick_countdown(remaining: Duration, dt: Duration) -> (Duration, bool) {
    let remaining = remaining.saturating_sub(dt);
    let expired = remaining.is_zero();
    (remaining, expired)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Menu,
    Playing,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverReason {
    ToppedOut,
    TimeUp,
}

pub struct App {
    args: Args,
    config: GameConfig,
    theme: Theme,
    state: GameState,
    screen: Screen,
    paused: bool,
    game_over_reason: Option<GameOverReason>,
    /// Previous frame instant; re-armed across paused frames so paused time
    /// never enters gravity or countdown accounting.
    last_frame: Instant,
    gravity_acc: Duration,
    time_remaining: Duration,
    repeat_state: Option<(Action, Instant)>,
    last_repeat_fire: Option<Instant>,
    /// Rows awaiting the clear flash (cosmetic; the grid is already compacted).
    flash_rows: Vec<usize>,
    /// TachyonFX fade effect for the flash (created when rows arrive).
    clear_effect: Option<Effect>,
    /// Last time the flash effect was processed (for delta).
    clear_effect_process_time: Option<Instant>,
    menu_mode: GameMode,
}

impl App {
    pub fn new(args: Args, config: GameConfig, theme: Theme) -> Result<Self> {
        let state = GameState::new(config.seed);
        let screen = if args.no_menu {
            Screen::Playing
        } else {
            Screen::Menu
        };
        let menu_mode = args.mode;
        let time_remaining = Duration::from_secs(u64::from(config.time_limit_secs));
        Ok(Self {
            args,
            config,
            theme,
            state,
            screen,
            paused: false,
            game_over_reason: None,
            last_frame: Instant::now(),
            gravity_acc: Duration::ZERO,
            time_remaining,
            repeat_state: None,
            last_repeat_fire: None,
            flash_rows: Vec::new(),
            clear_effect: None,
            clear_effect_process_time: None,
            menu_mode,
        })
    }

    /// Fresh session. Pending slow effects die with the discarded state.
    fn reset_game(&mut self) {
        self.state = GameState::new(self.config.seed);
        self.screen = Screen::Playing;
        self.paused = false;
        self.game_over_reason = None;
        self.last_frame = Instant::now();
        self.gravity_acc = Duration::ZERO;
        self.time_remaining = Duration::from_secs(u64::from(self.config.time_limit_secs));
        self.repeat_state = None;
        self.last_repeat_fire = None;
        self.flash_rows.clear();
        self.clear_effect = None;
        self.clear_effect_process_time = None;
    }

    fn apply_action(&mut self, action: Action, now: Instant) {
        match action {
            Action::MoveLeft => {
                self.state.move_piece(-1);
            }
            Action::MoveRight => {
                self.state.move_piece(1);
            }
            Action::RotateCw => {
                self.state.rotate_cw();
            }
            Action::SoftDrop => {
                self.state.soft_drop();
            }
            Action::HardDrop => {
                self.state.hard_drop();
                self.repeat_state = None;
            }
            Action::Bomb => {
                self.state.activate_power_up(PowerUp::Bomb, now);
            }
            Action::Laser => {
                self.state.activate_power_up(PowerUp::Laser, now);
            }
            Action::Slow => {
                self.state.activate_power_up(PowerUp::Slow, now);
            }
            Action::Pause | Action::Restart | Action::Quit | Action::None => {}
        }
    }

    fn tick_repeat(&mut self) {
        let now = Instant::now();
        let Some((action, first)) = self.repeat_state else {
            return;
        };
        if !matches!(action, Action::MoveLeft | Action::MoveRight | Action::SoftDrop) {
            return;
        }
        if first.elapsed() < Duration::from_millis(REPEAT_DELAY_MS) {
            return;
        }
        let next =
            self.last_repeat_fire.unwrap_or(first) + Duration::from_millis(REPEAT_INTERVAL_MS);
        if now >= next {
            self.apply_action(action, now);
            self.last_repeat_fire = Some(now);
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        // Attempt to enable enhanced keyboard for Release events
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        );

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);

        // Restore
        let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            let dt = now.duration_since(self.last_frame);
            self.last_frame = now;

            if self.screen == Screen::Playing && !self.paused {
                self.state.tick_popups(dt.as_millis() as u32);
                self.tick_repeat();

                if self.args.mode == GameMode::Timed {
                    let (remaining, expired) = tick_countdown(self.time_remaining, dt);
                    self.time_remaining = remaining;
                    if expired {
                        self.screen = Screen::GameOver;
                        self.game_over_reason = Some(GameOverReason::TimeUp);
                    }
                }

                if self.screen == Screen::Playing {
                    if self.state.piece.is_none() && !self.state.game_over {
                        self.state.spawn_from_next();
                        self.gravity_acc = Duration::ZERO;
                    } else {
                        self.gravity_acc += dt;
                        if self.gravity_acc >= self.state.gravity_interval(now) {
                            self.state.apply_gravity();
                            self.gravity_acc = Duration::ZERO;
                        }
                    }

                    let cleared = self.state.take_cleared_rows();
                    if !cleared.is_empty() && !self.config.no_animation {
                        self.flash_rows = cleared;
                        self.clear_effect = None;
                        self.clear_effect_process_time = None;
                    }

                    if self.state.game_over {
                        self.screen = Screen::GameOver;
                        self.game_over_reason = Some(GameOverReason::ToppedOut);
                    }
                }
            }

            if self.clear_effect.as_ref().is_some_and(|e| e.done()) {
                self.flash_rows.clear();
                self.clear_effect = None;
                self.clear_effect_process_time = None;
            }

            terminal.draw(|f| {
                crate::ui::draw(
                    f,
                    self.screen,
                    &self.state,
                    &self.theme,
                    self.paused,
                    self.game_over_reason,
                    self.args.mode,
                    self.time_remaining,
                    self.config.time_limit_secs,
                    &self.flash_rows,
                    &mut self.clear_effect,
                    &mut self.clear_effect_process_time,
                    now,
                    self.config.no_animation,
                    self.menu_mode,
                );
            })?;

            let timeout = Duration::from_millis(16).saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    let action = key_to_action(key);

                    // Ignore OS repeats; stop our own repeat on Release.
                    if key.kind != KeyEventKind::Press {
                        if key.kind == KeyEventKind::Release
                            && self.repeat_state.map(|(a, _)| a) == Some(action)
                        {
                            self.repeat_state = None;
                            self.last_repeat_fire = None;
                        }
                        continue;
                    }
                    if self.repeat_state.map(|(a, _)| a) == Some(action) {
                        continue;
                    }

                    match self.screen {
                        Screen::Menu => match action {
                            Action::Quit => return Ok(()),
                            Action::MoveLeft | Action::MoveRight => {
                                self.menu_mode = match self.menu_mode {
                                    GameMode::Endless => GameMode::Timed,
                                    GameMode::Timed => GameMode::Endless,
                                };
                            }
                            Action::HardDrop => {
                                self.args.mode = self.menu_mode;
                                self.reset_game();
                            }
                            _ => {}
                        },
                        Screen::Playing => {
                            if self.paused {
                                match action {
                                    Action::Pause => self.paused = false,
                                    Action::Quit => self.screen = Screen::Menu,
                                    _ => {}
                                }
                            } else {
                                match action {
                                    Action::Pause => self.paused = true,
                                    Action::Quit => self.screen = Screen::Menu,
                                    Action::Restart => self.reset_game(),
                                    Action::None => {}
                                    _ => {
                                        self.apply_action(action, Instant::now());
                                        let repeatable = matches!(
                                            action,
                                            Action::MoveLeft
                                                | Action::MoveRight
                                                | Action::SoftDrop
                                        );
                                        if repeatable {
                                            self.repeat_state = Some((action, Instant::now()));
                                            self.last_repeat_fire = None;
                                        }
                                        // A lock ends any held-key repeat.
                                        if self.state.piece.is_none() {
                                            self.repeat_state = None;
                                        }
                                    }
                                }
                            }
                        }
                        Screen::GameOver => match action {
                            Action::Restart => self.reset_game(),
                            Action::Quit => self.screen = Screen::Menu,
                            _ => {}
                        },
                    }
                }
            }
        }
    }
}
