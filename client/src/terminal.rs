use std::io::{stdout, Stdout, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{
        self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use shared::game_state::PlayerStatus;
use tracing::{debug, warn};

use crate::{
    input::TouchButton,
    mapper::{RENDER_HEIGHT, RENDER_WIDTH},
    render::{PauseButton, Scene, StartButton, Surface},
};

pub const BOARD_COLS: u16 = 80;
pub const BOARD_ROWS: u16 = 24;

const HEADER_ROWS: u16 = 1;
const FOOTER_ROWS: u16 = 2;
const BUTTON_WIDTH: u16 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub col: u16,
    pub row: u16,
    pub width: u16,
}

impl Rect {
    pub fn contains(&self, col: u16, row: u16) -> bool {
        row == self.row && col >= self.col && col < self.col + self.width
    }
}

/// where the game view sits in the terminal. `None` from [`Layout::fit`] means the view is unbound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    /// left edge of the view, including the board border.
    pub left: u16,
    /// terminal cell of the board's top-left playing cell.
    pub origin: (u16, u16),
    pub controls_row: u16,
    pub legend_row: u16,
    pub up_button: Rect,
    pub down_button: Rect,
}

impl Layout {
    pub const MIN_COLS: u16 = BOARD_COLS + 2;
    pub const MIN_ROWS: u16 = HEADER_ROWS + BOARD_ROWS + 2 + FOOTER_ROWS;

    pub fn fit(cols: u16, rows: u16) -> Option<Self> {
        if cols < Self::MIN_COLS || rows < Self::MIN_ROWS {
            return None;
        }
        let left = (cols - Self::MIN_COLS) / 2;
        let controls_row = HEADER_ROWS + BOARD_ROWS + 2;
        let right = left + Self::MIN_COLS;
        Some(Self {
            left,
            origin: (left + 1, HEADER_ROWS + 1),
            controls_row,
            legend_row: controls_row + 1,
            up_button: Rect {
                col: right - 2 * BUTTON_WIDTH - 1,
                row: controls_row,
                width: BUTTON_WIDTH,
            },
            down_button: Rect {
                col: right - BUTTON_WIDTH,
                row: controls_row,
                width: BUTTON_WIDTH,
            },
        })
    }

    pub fn button_at(&self, col: u16, row: u16) -> Option<TouchButton> {
        if self.up_button.contains(col, row) {
            Some(TouchButton::Up)
        } else if self.down_button.contains(col, row) {
            Some(TouchButton::Down)
        } else {
            None
        }
    }

    /// the terminal cell covering a render-space point, clamped onto the board.
    pub fn cell(&self, x: f64, y: f64) -> (u16, u16) {
        let col = to_cells(x, RENDER_WIDTH / BOARD_COLS as f64, BOARD_COLS);
        let row = to_cells(y, RENDER_HEIGHT / BOARD_ROWS as f64, BOARD_ROWS);
        (self.origin.0 + col, self.origin.1 + row)
    }

    fn centre_col(&self) -> u16 {
        self.origin.0 + BOARD_COLS / 2
    }
}

fn to_cells(value: f64, cell_size: f64, cells: u16) -> u16 {
    (value / cell_size).floor().clamp(0.0, (cells - 1) as f64) as u16
}

/// puts the terminal into game mode and restores it when dropped.
pub struct TerminalGuard {
    enhanced_keys: bool,
}

impl TerminalGuard {
    pub fn enter() -> std::io::Result<Self> {
        enable_raw_mode()?;
        let mut out = stdout();
        execute!(
            out,
            EnterAlternateScreen,
            Hide,
            EnableMouseCapture,
            EnableFocusChange
        )?;
        // key releases are only reported by terminals with the enhanced keyboard protocol.
        let enhanced_keys = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced_keys {
            execute!(
                out,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        debug!(enhanced_keys, "terminal ready");
        Ok(Self { enhanced_keys })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut out = stdout();
        if self.enhanced_keys {
            let _ = execute!(out, PopKeyboardEnhancementFlags);
        }
        let _ = execute!(
            out,
            DisableFocusChange,
            DisableMouseCapture,
            LeaveAlternateScreen,
            Show
        );
        if let Err(err) = disable_raw_mode() {
            warn!("failed to leave raw mode: {err}");
        }
    }
}

pub struct TerminalSurface {
    out: Stdout,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self { out: stdout() }
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for TerminalSurface {
    fn present(&mut self, scene: &Scene) -> std::io::Result<()> {
        let (cols, rows) = terminal::size()?;
        queue!(self.out, Clear(ClearType::All))?;
        let Some(layout) = Layout::fit(cols, rows) else {
            queue!(
                self.out,
                MoveTo(0, 0),
                Print(format!(
                    "enlarge the terminal to at least {}x{}",
                    Layout::MIN_COLS,
                    Layout::MIN_ROWS
                ))
            )?;
            return self.out.flush();
        };
        draw_header(&mut self.out, &layout, scene)?;
        draw_board(&mut self.out, &layout)?;
        draw_pieces(&mut self.out, &layout, scene)?;
        draw_controls(&mut self.out, &layout, scene)?;
        if let Some(overlay) = scene.pause_overlay {
            let message = if overlay.paused_by_me {
                "Press space to resume"
            } else {
                "Waiting for the other player"
            };
            draw_card(&mut self.out, &layout, &["Game paused".to_owned(), message.to_owned()])?;
        }
        if let Some(card) = &scene.game_over {
            draw_card(
                &mut self.out,
                &layout,
                &[
                    format!("{} wins!", card.winner),
                    format!(
                        "{}  {} - {}  {}",
                        card.player1, card.score_left, card.score_right, card.player2
                    ),
                    format!("[enter] {}", card.return_label),
                ],
            )?;
        }
        self.out.flush()
    }
}

fn badge(status: Option<PlayerStatus>) -> (&'static str, Color) {
    match status {
        Some(PlayerStatus::Ready) => ("●", Color::Green),
        Some(PlayerStatus::Connected) => ("●", Color::DarkYellow),
        Some(PlayerStatus::Disconnected) => ("●", Color::Red),
        Some(PlayerStatus::Unknown) | None => (" ", Color::Reset),
    }
}

fn draw_header<W: Write>(w: &mut W, layout: &Layout, scene: &Scene) -> std::io::Result<()> {
    let [player1, player2] = &scene.players;
    let (badge1, colour1) = badge(player1.badge);
    let (badge2, colour2) = badge(player2.badge);
    queue!(
        w,
        MoveTo(layout.left, 0),
        SetForegroundColor(colour1),
        Print(badge1),
        ResetColor,
        Print(format!(" {}", player1.name)),
    )?;
    let score = format!("{} : {}", scene.score_left, scene.score_right);
    queue!(
        w,
        MoveTo(layout.centre_col() - score.chars().count() as u16 / 2, 0),
        Print(score)
    )?;
    let right = layout.left + Layout::MIN_COLS;
    let name = format!("{} ", player2.name);
    let name_width = name.chars().count() as u16 + 1;
    queue!(
        w,
        MoveTo(right.saturating_sub(name_width), 0),
        Print(name),
        SetForegroundColor(colour2),
        Print(badge2),
        ResetColor,
    )
}

fn draw_board<W: Write>(w: &mut W, layout: &Layout) -> std::io::Result<()> {
    let edge = format!("+{}+", "-".repeat(BOARD_COLS as usize));
    queue!(w, MoveTo(layout.left, HEADER_ROWS), Print(&edge))?;
    for row in 0..BOARD_ROWS {
        let y = layout.origin.1 + row;
        queue!(
            w,
            MoveTo(layout.left, y),
            Print('|'),
            MoveTo(layout.origin.0 + BOARD_COLS, y),
            Print('|'),
        )?;
        // dashed net.
        if row % 2 == 0 {
            queue!(w, MoveTo(layout.centre_col(), y), Print(':'))?;
        }
    }
    queue!(w, MoveTo(layout.left, layout.origin.1 + BOARD_ROWS), Print(&edge))
}

fn draw_pieces<W: Write>(w: &mut W, layout: &Layout, scene: &Scene) -> std::io::Result<()> {
    for (x, y) in [(0.0, scene.left_paddle_y), (RENDER_WIDTH, scene.right_paddle_y)] {
        let (col, top) = layout.cell(x, y);
        let (_, bottom) = layout.cell(x, y + scene.paddle_height - 1.0);
        for row in top..=bottom.max(top) {
            queue!(w, MoveTo(col, row), Print('█'))?;
        }
    }
    let (col, row) = layout.cell(scene.ball.0, scene.ball.1);
    queue!(w, MoveTo(col, row), Print('o'))
}

fn draw_controls<W: Write>(w: &mut W, layout: &Layout, scene: &Scene) -> std::io::Result<()> {
    let start = match scene.start_button {
        StartButton::Locked => Some("connecting..."),
        StartButton::Ready => Some("[r] Start"),
        StartButton::Waiting => Some("Waiting..."),
        StartButton::Hidden => None,
    };
    let pause = match scene.pause_button {
        PauseButton::Pause => Some("[space] Pause game"),
        PauseButton::Resume => Some("[space] Resume game"),
        PauseButton::PausedByOpponent => Some("Game paused"),
        PauseButton::Hidden => None,
    };
    let label = [start, pause].into_iter().flatten().collect::<Vec<_>>().join("   ");
    queue!(
        w,
        MoveTo(layout.left, layout.controls_row),
        Print(label),
        MoveTo(layout.up_button.col, layout.up_button.row),
        Print("[ ▲ ]"),
        MoveTo(layout.down_button.col, layout.down_button.row),
        Print("[ ▼ ]"),
        MoveTo(layout.left, layout.legend_row),
        SetForegroundColor(Color::DarkGrey),
        Print("w/s or arrows: move   space: pause   r: ready   q: leave"),
        ResetColor,
    )
}

/// a bordered box in the middle of the board.
fn draw_card<W: Write>(w: &mut W, layout: &Layout, lines: &[String]) -> std::io::Result<()> {
    let inner = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0)
        .min(BOARD_COLS as usize - 6);
    let width = inner as u16 + 4;
    let col = layout.origin.0 + (BOARD_COLS - width) / 2;
    let top = layout.origin.1 + (BOARD_ROWS - lines.len() as u16 - 2) / 2;
    let edge = format!("+{}+", "-".repeat(inner + 2));
    queue!(w, MoveTo(col, top), Print(&edge))?;
    for (i, line) in lines.iter().enumerate() {
        let text = line.chars().take(inner).collect::<String>();
        queue!(
            w,
            MoveTo(col, top + 1 + i as u16),
            Print(format!("| {text:^inner$} |"))
        )?;
    }
    queue!(w, MoveTo(col, top + 1 + lines.len() as u16), Print(&edge))
}

#[cfg(test)]
mod tests {
    use crate::{
        input::TouchButton,
        mapper::{RENDER_HEIGHT, RENDER_WIDTH},
        terminal::{Layout, BOARD_COLS, BOARD_ROWS},
    };

    #[test]
    fn too_small_terminal_is_unbound() {
        assert_eq!(Layout::fit(Layout::MIN_COLS - 1, 100), None);
        assert_eq!(Layout::fit(200, Layout::MIN_ROWS - 1), None);
        assert!(Layout::fit(Layout::MIN_COLS, Layout::MIN_ROWS).is_some());
    }

    #[test]
    fn board_is_centred() {
        let layout = Layout::fit(Layout::MIN_COLS + 10, 40).unwrap();
        assert_eq!(layout.left, 5);
        assert_eq!(layout.origin, (6, 2));
    }

    #[test]
    fn render_space_maps_onto_cells() {
        let layout = Layout::fit(Layout::MIN_COLS, Layout::MIN_ROWS).unwrap();
        assert_eq!(layout.cell(0.0, 0.0), layout.origin);
        assert_eq!(
            layout.cell(RENDER_WIDTH, RENDER_HEIGHT),
            (
                layout.origin.0 + BOARD_COLS - 1,
                layout.origin.1 + BOARD_ROWS - 1
            )
        );
        assert_eq!(layout.cell(-20.0, 1e9).0, layout.origin.0);
        assert_eq!(layout.cell(RENDER_WIDTH / 2.0, 0.0).0, layout.origin.0 + BOARD_COLS / 2);
    }

    #[test]
    fn buttons_do_not_overlap() {
        let layout = Layout::fit(Layout::MIN_COLS, Layout::MIN_ROWS).unwrap();
        let up = layout.up_button;
        let down = layout.down_button;
        assert!(up.col + up.width <= down.col);
        assert_eq!(layout.button_at(up.col, up.row), Some(TouchButton::Up));
        assert_eq!(layout.button_at(down.col, down.row), Some(TouchButton::Down));
        assert_eq!(layout.button_at(up.col + up.width, up.row), None);
        assert_eq!(layout.button_at(up.col, up.row + 1), None);
    }
}
