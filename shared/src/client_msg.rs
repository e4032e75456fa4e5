use serde::{Deserialize, Serialize};

use crate::EncodeError;

/// direction of a paddle move as the server expects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Move {
    Up,
    Stop,
    Down,
}

impl Move {
    pub fn as_i8(self) -> i8 {
        match self {
            Move::Up => -1,
            Move::Stop => 0,
            Move::Down => 1,
        }
    }
}

/// every message the client sends up the socket, as `{"type": ..., "data": ...}`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    PlayerReady {},
    PaddleMove {
        player: String,
        #[serde(rename = "move")]
        direction: i8,
    },
    PauseGame {
        pause: bool,
    },
    VisibilityChange {
        hidden: bool,
    },
    Ping,
    Pong,
}

impl ClientMessage {
    pub fn paddle_move(player: &str, direction: Move) -> Self {
        ClientMessage::PaddleMove {
            player: player.to_owned(),
            direction: direction.as_i8(),
        }
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        assert_encode,
        client_msg::{ClientMessage, Move},
    };

    #[test]
    fn player_ready_encode() {
        assert_encode!(
            ClientMessage::PlayerReady {},
            json!({"type": "player_ready", "data": {}}),
        );
    }

    #[test]
    fn paddle_move_encode() {
        assert_encode!(
            ClientMessage::paddle_move("player1", Move::Up),
            json!({"type": "paddle_move", "data": {"player": "player1", "move": -1}}),
        );
        assert_encode!(
            ClientMessage::paddle_move("player2", Move::Stop),
            json!({"type": "paddle_move", "data": {"player": "player2", "move": 0}}),
        );
        assert_encode!(
            ClientMessage::paddle_move("player2", Move::Down),
            json!({"type": "paddle_move", "data": {"player": "player2", "move": 1}}),
        );
    }

    #[test]
    fn control_encode() {
        assert_encode!(
            ClientMessage::PauseGame { pause: true },
            json!({"type": "pause_game", "data": {"pause": true}}),
        );
        assert_encode!(
            ClientMessage::VisibilityChange { hidden: false },
            json!({"type": "visibility_change", "data": {"hidden": false}}),
        );
        assert_encode!(ClientMessage::Ping, json!({"type": "ping"}));
    }
}
