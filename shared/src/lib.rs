use thiserror::Error;

pub mod client_msg;
pub mod game_state;
pub mod server_msg;

pub type GameId = u64;

pub type TournamentId = u64;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty message")]
    EmptyMessage,
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("failed to encode message: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

#[cfg(test)]
#[macro_export]
macro_rules! assert_encode {
    ($message:expr, $expected:expr $(,)?) => {
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&$message.encode().unwrap()).unwrap(),
            $expected
        )
    };
}

#[cfg(test)]
#[macro_export]
macro_rules! assert_decode {
    ($text:expr, $expected:expr $(,)?) => {
        assert_eq!(
            $crate::server_msg::ServerMessage::try_from($text.to_string().as_str()).unwrap(),
            $expected
        )
    };
}
