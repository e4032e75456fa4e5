use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    thread::{Builder, JoinHandle},
    time::Duration,
};

use crossterm::{
    event::{
        self, Event as TerminalEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
        MouseButton, MouseEvent, MouseEventKind,
    },
    terminal,
};
use shared::client_msg::Move;
use tracing::{debug, error};

use crate::{event::Event, terminal::Layout};

/// how often the listener checks whether it has been stopped.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    MoveUp,
    MoveDown,
    TogglePause,
    Ready,
    Confirm,
    Leave,
}

impl Control {
    pub fn movement(self) -> Option<Move> {
        match self {
            Control::MoveUp => Some(Move::Up),
            Control::MoveDown => Some(Move::Down),
            _ => None,
        }
    }
}

/// on-screen stand-ins for the mobile up/down buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchButton {
    Up,
    Down,
}

impl TouchButton {
    pub fn control(self) -> Control {
        match self {
            TouchButton::Up => Control::MoveUp,
            TouchButton::Down => Control::MoveDown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Press(Control),
    Release(Control),
    /// a touch button (or anything else) was let go.
    PointerUp,
    Visibility {
        hidden: bool,
    },
    Resized,
}

pub fn control_for(code: KeyCode, modifiers: KeyModifiers) -> Option<Control> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') => Some(Control::Leave),
            _ => None,
        };
    }
    match code {
        KeyCode::Char('w') | KeyCode::Char('W') | KeyCode::Up => Some(Control::MoveUp),
        KeyCode::Char('s') | KeyCode::Char('S') | KeyCode::Down => Some(Control::MoveDown),
        KeyCode::Char(' ') => Some(Control::TogglePause),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(Control::Ready),
        KeyCode::Enter => Some(Control::Confirm),
        KeyCode::Char('q') | KeyCode::Esc => Some(Control::Leave),
        _ => None,
    }
}

pub fn translate(event: &TerminalEvent, layout: Option<&Layout>) -> Option<InputEvent> {
    match event {
        TerminalEvent::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) => {
            let control = control_for(*code, *modifiers)?;
            match kind {
                KeyEventKind::Press | KeyEventKind::Repeat => Some(InputEvent::Press(control)),
                KeyEventKind::Release => Some(InputEvent::Release(control)),
            }
        }
        TerminalEvent::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            ..
        }) => layout?
            .button_at(*column, *row)
            .map(|button| InputEvent::Press(button.control())),
        TerminalEvent::Mouse(MouseEvent {
            kind: MouseEventKind::Up(_),
            ..
        }) => Some(InputEvent::PointerUp),
        TerminalEvent::FocusLost => Some(InputEvent::Visibility { hidden: true }),
        TerminalEvent::FocusGained => Some(InputEvent::Visibility { hidden: false }),
        TerminalEvent::Resize(..) => Some(InputEvent::Resized),
        _ => None,
    }
}

/// reads terminal events on its own thread until dropped.
pub struct InputListener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputListener {
    pub fn spawn(events: Sender<Event>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let handle = Builder::new()
            .name("input_listener".to_owned())
            .spawn(move || {
                while !stop_clone.load(Ordering::Relaxed) {
                    let terminal_event = match event::poll(POLL_INTERVAL) {
                        Ok(false) => continue,
                        Ok(true) => event::read(),
                        Err(err) => Err(err),
                    };
                    let terminal_event = match terminal_event {
                        Ok(terminal_event) => terminal_event,
                        Err(err) => {
                            error!("failed to read terminal input: {err}");
                            break;
                        }
                    };
                    let layout = terminal::size()
                        .ok()
                        .and_then(|(cols, rows)| Layout::fit(cols, rows));
                    if let Some(input) = translate(&terminal_event, layout.as_ref()) {
                        debug!(?input, "input");
                        if events.send(Event::Input(input)).is_err() {
                            break;
                        }
                    }
                }
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for InputListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
