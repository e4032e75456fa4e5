use shared::game_state::{PlayerStatus, Snapshot};
use tracing::warn;

use crate::mapper::{CoordinateMapper, RENDER_HEIGHT, RENDER_WIDTH};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerCard {
    pub name: String,
    /// kept for surfaces that can draw images.
    pub avatar: Option<String>,
    pub badge: Option<PlayerStatus>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartButton {
    /// no game config yet.
    #[default]
    Locked,
    Ready,
    Waiting,
    Hidden,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PauseButton {
    #[default]
    Hidden,
    Pause,
    Resume,
    /// paused by the opponent, only they can resume.
    PausedByOpponent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PauseOverlay {
    pub paused_by_me: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameOverCard {
    pub winner: String,
    pub player1: String,
    pub player2: String,
    pub score_left: u32,
    pub score_right: u32,
    pub return_label: &'static str,
}

/// everything currently on screen, in render-space.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub left_paddle_y: f64,
    pub right_paddle_y: f64,
    pub paddle_height: f64,
    pub ball: (f64, f64),
    pub score_left: u32,
    pub score_right: u32,
    pub players: [PlayerCard; 2],
    pub start_button: StartButton,
    pub pause_button: PauseButton,
    pub pause_overlay: Option<PauseOverlay>,
    pub game_over: Option<GameOverCard>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            left_paddle_y: 0.0,
            right_paddle_y: 0.0,
            paddle_height: 0.0,
            ball: (RENDER_WIDTH / 2.0, RENDER_HEIGHT / 2.0),
            score_left: 0,
            score_right: 0,
            players: Default::default(),
            start_button: StartButton::default(),
            pause_button: PauseButton::default(),
            pause_overlay: None,
            game_over: None,
        }
    }
}

impl Scene {
    pub fn with_players(player1: String, player2: String) -> Self {
        let mut scene = Self::default();
        scene.players[0].name = player1;
        scene.players[1].name = player2;
        scene
    }

    /// resets positions to the resting layout of a freshly configured game.
    pub fn configure(&mut self, mapper: &CoordinateMapper) {
        self.paddle_height = mapper.paddle_height();
        self.left_paddle_y = mapper.centred_paddle_y();
        self.right_paddle_y = mapper.centred_paddle_y();
        self.ball = (RENDER_WIDTH / 2.0, RENDER_HEIGHT / 2.0);
    }

    /// copies the fields present in `snapshot`. absent fields keep what is on screen.
    pub fn apply(&mut self, snapshot: &Snapshot, mapper: &CoordinateMapper) {
        if let Some(y) = snapshot.left_paddle {
            self.left_paddle_y = mapper.paddle_y(y);
        }
        if let Some(y) = snapshot.right_paddle {
            self.right_paddle_y = mapper.paddle_y(y);
        }
        if let Some((x, y)) = snapshot.ball() {
            self.ball = mapper.ball(x, y);
        }
        if let Some(score) = snapshot.score_left {
            apply_score(&mut self.score_left, score, "left");
        }
        if let Some(score) = snapshot.score_right {
            apply_score(&mut self.score_right, score, "right");
        }
    }

    pub fn has_winner(&self, win_score: u32) -> bool {
        self.score_left >= win_score || self.score_right >= win_score
    }
}

fn apply_score(current: &mut u32, incoming: u32, side: &str) {
    if incoming < *current {
        warn!(side, current = *current, incoming, "ignoring score that went backwards");
        return;
    }
    *current = incoming;
}

/// something that can show a [`Scene`].
pub trait Surface {
    fn present(&mut self, scene: &Scene) -> std::io::Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{cell::RefCell, rc::Rc};

    use crate::render::{Scene, Surface};

    /// keeps every presented scene.
    #[derive(Clone, Default)]
    pub struct RecordingSurface {
        pub frames: Rc<RefCell<Vec<Scene>>>,
    }

    impl Surface for RecordingSurface {
        fn present(&mut self, scene: &Scene) -> std::io::Result<()> {
            self.frames.borrow_mut().push(scene.clone());
            Ok(())
        }
    }
}
