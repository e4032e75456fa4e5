use serde::{Deserialize, Serialize};

use crate::{
    game_state::{GameConfig, GameStatus, PlayerStatus, Snapshot},
    DecodeError, EncodeError, TournamentId,
};

/// every message the game server pushes down the socket, discriminated by its `type` field.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameConfig {
        data: GameConfig,
    },
    PlayerReady {
        #[serde(default)]
        data: PlayerStatuses,
    },
    PlayerDisconnected {
        #[serde(default)]
        data: PlayerStatuses,
    },
    PlayerUpdate {
        #[serde(default)]
        data: PlayerProfiles,
    },
    GameState {
        data: Snapshot,
    },
    GameStatus {
        data: StatusChange,
    },
    TournamentUpdate {
        #[serde(default)]
        message: Option<TournamentEvent>,
    },
    Ping,
    Pong,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PlayerStatuses {
    pub player1_status: Option<PlayerStatus>,
    pub player2_status: Option<PlayerStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PlayerProfiles {
    pub player1_name: Option<String>,
    pub player2_name: Option<String>,
    pub player1_avatar: Option<String>,
    pub player2_avatar: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StatusChange {
    pub status: GameStatus,
    #[serde(default)]
    pub paused_by: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentEvent {
    MatchCompleted,
    NewRound {
        #[serde(default)]
        data: Option<RoundInfo>,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RoundInfo {
    pub tournament_id: Option<TournamentId>,
}

impl TournamentEvent {
    pub fn tournament_id(&self) -> Option<TournamentId> {
        match self {
            TournamentEvent::NewRound {
                data: Some(RoundInfo { tournament_id }),
            } => *tournament_id,
            _ => None,
        }
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl TryFrom<&str> for ServerMessage {
    type Error = DecodeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(DecodeError::EmptyMessage);
        }
        Ok(serde_json::from_str(value)?)
    }
}
