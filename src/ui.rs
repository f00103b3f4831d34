//! Layout and drawing: menu, playfield, ghost, sidebar, popups, pause, game over.

use crate::GameMode;
use crate::app::{GameOverReason, Screen};
use crate::game::{GameState, Piece, PowerUp, GRID_COLS, GRID_ROWS};
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Widget};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Each grid cell is two terminal columns wide ("██") and one row tall.
const CELL_W: u16 = 2;
const CELL_H: u16 = 1;

const SIDEBAR_WIDTH: u16 = 26;

/// Duration of the line-clear flash fade (TachyonFX) in ms.
const CLEAR_FLASH_MS: u32 = 350;

/// Playfield size in terminal cells (grid + border).
const fn playfield_pixel_size() -> (u16, u16) {
    (
        GRID_COLS as u16 * CELL_W + 2,
        GRID_ROWS as u16 * CELL_H + 2,
    )
}

/// Playfield inner rect (board only, no border); matches draw_game layout.
fn playfield_board_rect(area: Rect) -> Rect {
    let (pw, ph) = playfield_pixel_size();
    let total_w = pw + SIDEBAR_WIDTH;
    let x = area.x + area.width.saturating_sub(total_w) / 2;
    let y = area.y + area.height.saturating_sub(ph) / 2;
    Rect {
        x: x + 1,
        y: y + 1,
        width: (GRID_COLS as u16 * CELL_W).min(area.width.saturating_sub(2)),
        height: (GRID_ROWS as u16 * CELL_H).min(area.height.saturating_sub(2)),
    }
}

/// Buffer (x, y) positions covered by the flashing rows.
fn flash_buffer_positions(board_rect: Rect, rows: &[usize]) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for &gy in rows {
        let by = board_rect.y + gy as u16 * CELL_H;
        if by >= board_rect.y + board_rect.height {
            continue;
        }
        for bx in board_rect.x..board_rect.x + board_rect.width {
            set.insert((bx, by));
        }
    }
    set
}

/// Create or update the line-clear flash (fade the flashed rows to bg) and process it.
fn apply_clear_flash(
    frame: &mut Frame,
    theme: &Theme,
    area: Rect,
    flash_rows: &[usize],
    clear_effect: &mut Option<Effect>,
    clear_effect_process_time: &mut Option<Instant>,
    now: Instant,
) {
    let board_rect = playfield_board_rect(area);
    let delta = clear_effect_process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(Duration::ZERO);
    let tfx_delta = TfxDuration::from_millis(delta.as_millis().min(u128::from(u32::MAX)) as u32);
    *clear_effect_process_time = Some(now);

    if clear_effect.is_none() {
        let flash_set = flash_buffer_positions(board_rect, flash_rows);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            flash_set.contains(&(pos.x, pos.y))
        }));
        let bg = theme.bg;
        let effect = fx::fade_to(bg, bg, (CLEAR_FLASH_MS, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board_rect);
        *clear_effect = Some(effect);
    }

    if let Some(effect) = clear_effect {
        frame.render_effect(effect, board_rect, tfx_delta);
    }
}

/// Draw the current screen (menu, game, game over), with optional pause overlay.
/// While `flash_rows` is non-empty and animation is on, applies the TachyonFX
/// fade and updates `clear_effect` / `clear_effect_process_time`.
pub fn draw(
    frame: &mut Frame,
    screen: Screen,
    state: &GameState,
    theme: &Theme,
    paused: bool,
    game_over_reason: Option<GameOverReason>,
    mode: GameMode,
    time_remaining: Duration,
    time_limit_secs: u32,
    flash_rows: &[usize],
    clear_effect: &mut Option<Effect>,
    clear_effect_process_time: &mut Option<Instant>,
    now: Instant,
    no_animation: bool,
    menu_mode: GameMode,
) {
    let area = frame.area();
    match screen {
        Screen::Menu => draw_menu(frame, theme, menu_mode, area),
        Screen::Playing => {
            draw_game(
                frame,
                state,
                theme,
                area,
                mode,
                time_remaining,
                time_limit_secs,
                flash_rows,
            );
            if paused {
                draw_pause_overlay(frame, theme, area);
            }
            if !flash_rows.is_empty() && !no_animation {
                apply_clear_flash(
                    frame,
                    theme,
                    area,
                    flash_rows,
                    clear_effect,
                    clear_effect_process_time,
                    now,
                );
            }
        }
        Screen::GameOver => {
            draw_game(
                frame,
                state,
                theme,
                area,
                mode,
                time_remaining,
                time_limit_secs,
                &[],
            );
            draw_game_over(frame, state, theme, game_over_reason, time_limit_secs, area);
        }
    }
}

fn draw_menu(frame: &mut Frame, theme: &Theme, menu_mode: GameMode, area: Rect) {
    let popup_w = 46u16;
    let popup_h = 16u16;
    let popup = Rect {
        x: area.x + area.width.saturating_sub(popup_w) / 2,
        y: area.y + area.height.saturating_sub(popup_h) / 2,
        width: popup_w.min(area.width),
        height: popup_h.min(area.height),
    };

    let title = Line::from(vec![
        Span::styled(" Neon ", Style::default().fg(theme.piece_color(2)).bold()),
        Span::styled("tris ", Style::default().fg(theme.title).bold()),
    ]);

    let highlight_style = Style::default()
        .fg(Color::Black)
        .bg(theme.piece_color(1))
        .bold();
    let normal_style = Style::default().fg(theme.main_fg);

    let mode_endless = Span::styled(
        " ENDLESS ",
        if menu_mode == GameMode::Endless {
            highlight_style
        } else {
            normal_style
        },
    );
    let mode_timed = Span::styled(
        " TIMED ",
        if menu_mode == GameMode::Timed {
            highlight_style
        } else {
            normal_style
        },
    );

    let lines = vec![
        Line::from(""),
        title,
        Line::from(""),
        Line::from(Span::styled(
            " ─ MODE ─ ",
            Style::default().fg(theme.div_line),
        )),
        Line::from(vec![mode_endless, Span::from("  "), mode_timed]),
        Line::from(""),
        Line::from(Span::styled(" [ ENTER ] START ", highlight_style)),
        Line::from(""),
        Line::from(vec![
            Span::styled(" ↔ ", Style::default().fg(theme.piece_color(4))),
            Span::from("MODE   "),
            Span::styled(" 1/2/3 ", Style::default().fg(theme.piece_color(4))),
            Span::from("POWER-UPS"),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            " [Q] QUIT ",
            Style::default().fg(Color::Rgb(255, 80, 80)),
        )),
    ];

    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
    );
    p.render(popup, frame.buffer_mut());
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup_w = 30u16;
    let popup_h = 5u16;
    let popup = Rect {
        x: area.x + area.width.saturating_sub(popup_w) / 2,
        y: area.y + area.height.saturating_sub(popup_h) / 2,
        width: popup_w.min(area.width),
        height: popup_h.min(area.height),
    };
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P — Resume    Q — Menu ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
    );
    p.render(popup, frame.buffer_mut());
}

fn draw_game_over(
    frame: &mut Frame,
    state: &GameState,
    theme: &Theme,
    reason: Option<GameOverReason>,
    time_limit_secs: u32,
    area: Rect,
) {
    let popup_w = 34u16;
    let popup_h = 9u16;
    let popup = Rect {
        x: area.x + area.width.saturating_sub(popup_w) / 2,
        y: area.y + area.height.saturating_sub(popup_h) / 2,
        width: popup_w.min(area.width),
        height: popup_h.min(area.height),
    };
    let title = match reason {
        Some(GameOverReason::TimeUp) => " Time's up! ",
        _ => " Game Over ",
    };
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            title,
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!(" Score: {} ", state.score),
            Style::default().fg(theme.main_fg),
        )),
    ];
    if reason == Some(GameOverReason::TimeUp) {
        lines.push(Line::from(Span::styled(
            format!(" Time: {} sec ", time_limit_secs),
            Style::default().fg(theme.main_fg),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        " R — Restart    Q — Menu ",
        Style::default().fg(theme.main_fg),
    )));
    let p = Paragraph::new(lines).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
            .title(Span::styled(" Neontris ", theme.title)),
    );
    p.render(popup, frame.buffer_mut());
}

/// Draw game: playfield + sidebar; use full area and center the board.
fn draw_game(
    frame: &mut Frame,
    state: &GameState,
    theme: &Theme,
    area: Rect,
    mode: GameMode,
    time_remaining: Duration,
    time_limit_secs: u32,
    flash_rows: &[usize],
) {
    let (pw, ph) = playfield_pixel_size();
    let total_w = pw + SIDEBAR_WIDTH;

    let horiz_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);

    let vert_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(ph),
            Constraint::Fill(1),
        ])
        .split(horiz_chunks[1]);

    let active_area = vert_chunks[1];

    let (playfield_area, sidebar_area) = {
        let inner = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(pw), Constraint::Length(SIDEBAR_WIDTH)])
            .split(active_area);
        (inner[0], inner[1])
    };

    draw_playfield(frame, state, theme, playfield_area, flash_rows);
    draw_sidebar(
        frame,
        state,
        theme,
        sidebar_area,
        mode,
        time_remaining,
        time_limit_secs,
    );
}

fn draw_playfield(
    frame: &mut Frame,
    state: &GameState,
    theme: &Theme,
    area: Rect,
    flash_rows: &[usize],
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(" Neontris ", theme.title));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let board_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: (GRID_COLS as u16 * CELL_W).min(inner.width),
        height: (GRID_ROWS as u16 * CELL_H).min(inner.height),
    };

    let buf = frame.buffer_mut();

    // Committed cells. Power-up cells (index >= 8) render bold so they read
    // as charged even on themes with muted specials.
    for y in 0..GRID_ROWS {
        for x in 0..GRID_COLS {
            let rx = board_rect.x + x as u16 * CELL_W;
            let ry = board_rect.y + y as u16 * CELL_H;
            if rx + CELL_W > board_rect.x + board_rect.width
                || ry >= board_rect.y + board_rect.height
            {
                continue;
            }
            let v = state.grid.get(x, y);
            if v == 0 {
                buf.set_string(rx, ry, "  ", Style::default().bg(theme.bg));
                continue;
            }
            let c = theme.piece_color(v);
            let mut style = Style::default().fg(c).bg(theme.bg);
            if v >= 8 {
                style = style.bold();
            }
            if flash_rows.contains(&y) {
                style = Style::default().fg(Color::White).bg(theme.bg);
            }
            buf.set_string(rx, ry, "██", style);
        }
    }

    // Ghost projection under the active piece, then the piece itself on top.
    if let Some(piece) = &state.piece {
        if let Some(gy0) = state.ghost_y() {
            if gy0 != piece.y {
                draw_piece_cells(buf, board_rect, piece, piece.x, gy0, theme, true);
            }
        }
        draw_piece_cells(buf, board_rect, piece, piece.x, piece.y, theme, false);
    }

    // Floating score popups.
    for popup in &state.popups {
        let rx = board_rect.x + popup.x as u16 * CELL_W;
        let ry = board_rect.y + popup.y as u16 * CELL_H;
        if rx < board_rect.x + board_rect.width && ry < board_rect.y + board_rect.height {
            let label = if popup.multiplier > 1 {
                format!("+{} (x{})", popup.amount, popup.multiplier)
            } else {
                format!("+{}", popup.amount)
            };
            let style = Style::default().fg(popup.color).bg(theme.bg).bold();
            buf.set_string(rx, ry, label, style);
        }
    }
}

fn draw_piece_cells(
    buf: &mut ratatui::buffer::Buffer,
    board_rect: Rect,
    piece: &Piece,
    x0: i32,
    y0: i32,
    theme: &Theme,
    ghost: bool,
) {
    let color = theme.piece_color(piece.color);
    for (r, row) in piece.shape.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            if v == 0 {
                continue;
            }
            let gx = x0 + c as i32;
            let gy = y0 + r as i32;
            if gx < 0 || gx >= GRID_COLS as i32 || gy < 0 || gy >= GRID_ROWS as i32 {
                continue;
            }
            let rx = board_rect.x + gx as u16 * CELL_W;
            let ry = board_rect.y + gy as u16 * CELL_H;
            if rx + CELL_W > board_rect.x + board_rect.width
                || ry >= board_rect.y + board_rect.height
            {
                continue;
            }
            let (symbol, mut style) = if ghost {
                ("░░", Style::default().fg(color).bg(theme.bg))
            } else {
                ("██", Style::default().fg(color).bg(theme.bg))
            };
            if !ghost && piece.special.is_some() {
                style = style.bold();
            }
            buf.set_string(rx, ry, symbol, style);
        }
    }
}

fn draw_sidebar(
    frame: &mut Frame,
    state: &GameState,
    theme: &Theme,
    area: Rect,
    mode: GameMode,
    time_remaining: Duration,
    time_limit_secs: u32,
) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let border_style = Style::default().fg(theme.div_line).bg(theme.bg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6), // Next (border + title + 3 preview rows)
            Constraint::Length(1), // gap
            Constraint::Length(5), // Stats (border + score, level, combo)
            Constraint::Length(1), // gap
            Constraint::Length(5), // Power-ups (border + one line per kind)
            Constraint::Length(4), // Timer (timed mode only)
        ])
        .split(area);

    // --- Next (own border) ---
    let next_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let next_inner = next_block.inner(chunks[0]);
    next_block.render(chunks[0], frame.buffer_mut());
    let next_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(3)])
        .split(next_inner);
    Paragraph::new(Line::from(Span::styled("Next", title_style)))
        .render(next_layout[0], frame.buffer_mut());
    draw_next_preview(frame, state, theme, next_layout[1]);

    // --- Stats (own border) ---
    let stats_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let stats_inner = stats_block.inner(chunks[2]);
    stats_block.render(chunks[2], frame.buffer_mut());
    let stats_lines = vec![
        Line::from(vec![
            Span::styled("Score: ", title_style),
            Span::styled(state.score.to_string(), fg_style),
        ]),
        Line::from(vec![
            Span::styled("Level: ", title_style),
            Span::styled(state.level.to_string(), fg_style),
        ]),
        Line::from(vec![
            Span::styled("Combo: ", title_style),
            Span::styled(format!("x{}", state.combo_display()), fg_style),
        ]),
    ];
    Paragraph::new(ratatui::text::Text::from(stats_lines))
        .render(stats_inner, frame.buffer_mut());

    // --- Power-ups (own border): one line per kind with hotkey and count ---
    let power_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let power_inner = power_block.inner(chunks[4]);
    power_block.render(chunks[4], frame.buffer_mut());
    let power_lines: Vec<Line> = PowerUp::ALL
        .iter()
        .enumerate()
        .map(|(i, &kind)| {
            let count = state.inventory.count(kind);
            let count_style = if count > 0 {
                Style::default().fg(theme.piece_color(kind.color_index())).bold()
            } else {
                Style::default().fg(theme.inactive_fg)
            };
            Line::from(vec![
                Span::styled(format!("[{}] ", i + 1), title_style),
                Span::styled(format!("{:<6}", kind.name()), fg_style),
                Span::styled(format!("x{count}"), count_style),
            ])
        })
        .collect();
    Paragraph::new(ratatui::text::Text::from(power_lines))
        .render(power_inner, frame.buffer_mut());

    // --- Timer (timed mode) ---
    if mode == GameMode::Timed {
        let timer_block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style);
        let timer_inner = timer_block.inner(chunks[5]);
        timer_block.render(chunks[5], frame.buffer_mut());
        let timer_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(timer_inner);
        let secs = time_remaining.as_secs();
        Paragraph::new(Line::from(vec![
            Span::styled("Time: ", title_style),
            Span::styled(format!("{:02}:{:02}", secs / 60, secs % 60), fg_style),
        ]))
        .render(timer_layout[0], frame.buffer_mut());
        let ratio = if time_limit_secs > 0 {
            (time_remaining.as_secs_f64() / f64::from(time_limit_secs)).min(1.0)
        } else {
            0.0
        };
        let bar_color = if ratio > 0.5 {
            Color::Green
        } else if ratio > 0.2 {
            Color::Yellow
        } else {
            Color::Red
        };
        Gauge::default()
            .ratio(ratio)
            .gauge_style(Style::default().fg(bar_color))
            .render(timer_layout[1], frame.buffer_mut());
    }
}

/// Next piece as a small block preview (actual template shape, centered).
fn draw_next_preview(frame: &mut Frame, state: &GameState, theme: &Theme, area: Rect) {
    let piece = &state.next_piece;
    let color = theme.piece_color(piece.color);
    let bw = piece.width() as u16 * CELL_W;
    let bh = piece.shape.len() as u16 * CELL_H;
    let off_x = area.width.saturating_sub(bw) / 2;
    let off_y = area.height.saturating_sub(bh) / 2;

    for (r, row) in piece.shape.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            if v == 0 {
                continue;
            }
            let rect = Rect {
                x: area.x + off_x + c as u16 * CELL_W,
                y: area.y + off_y + r as u16 * CELL_H,
                width: CELL_W.min(area.width),
                height: CELL_H,
            };
            if rect.x + rect.width <= area.x + area.width && rect.y < area.y + area.height {
                let p = Paragraph::new("██").style(Style::default().fg(color).bg(theme.bg));
                p.render(rect, frame.buffer_mut());
            }
        }
    }
}
