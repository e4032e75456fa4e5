use serde::{Deserialize, Serialize};

/// size of the server's logical playing field. field names follow the server's constants.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Dimensions {
    #[serde(rename = "WIDTH")]
    pub width: f64,
    #[serde(rename = "HEIGHT")]
    pub height: f64,
    #[serde(rename = "PADDLE_HEIGHT")]
    pub paddle_height: f64,
}

/// per-session constants declared by the server before the first snapshot.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GameConfig {
    /// which side this client controls, echoed back in paddle moves.
    pub player_type: String,
    pub win_score: u32,
    pub config: Dimensions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Waiting,
    Playing,
    Paused,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    Ready,
    Connected,
    Disconnected,
    #[serde(other)]
    Unknown,
}

/// one server-pushed update. the server only sends the fields that changed.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_paddle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_paddle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ball_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ball_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_left: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_right: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_over: Option<bool>,
}

impl Snapshot {
    pub fn is_game_over(&self) -> bool {
        self.game_over == Some(true)
    }

    pub fn ball(&self) -> Option<(f64, f64)> {
        self.ball_x.zip(self.ball_y)
    }
}
