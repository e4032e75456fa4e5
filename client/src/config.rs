use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use shared::{GameId, TournamentId};

use crate::game::{GameSettings, KEEPALIVE_INTERVAL, MAX_RECONNECT_ATTEMPTS};

#[derive(Debug, Parser)]
#[command(name = "pong", about = "Play online pong in the terminal")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "PONG_SERVER",
        default_value = "http://127.0.0.1:8000",
        help = "Base URL of the pong backend"
    )]
    pub server: String,

    #[arg(
        long = "session-file",
        global = true,
        value_name = "PATH",
        env = "PONG_SESSION_FILE",
        default_value = ".pong-session.json"
    )]
    pub session_file: PathBuf,

    /// Store this access token in the session file before starting.
    #[arg(long = "access-token", global = true, env = "PONG_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    #[arg(long = "refresh-token", global = true, env = "PONG_REFRESH_TOKEN")]
    pub refresh_token: Option<String>,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "PONG_LOG_FILE",
        default_value = "pong-client.log"
    )]
    pub log_file: PathBuf,

    /// The tournament this game belongs to.
    #[arg(long, global = true, env = "PONG_TOURNAMENT")]
    pub tournament: Option<TournamentId>,

    #[arg(long = "reconnect-attempts", global = true, default_value_t = MAX_RECONNECT_ATTEMPTS)]
    pub reconnect_attempts: u32,

    #[arg(long = "reconnect-delay-ms", global = true, default_value_t = 3000)]
    pub reconnect_delay_ms: u64,

    #[command(subcommand)]
    pub command: Start,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Subcommand)]
pub enum Start {
    /// Create a new game and play it
    New,
    /// Join an existing game
    Join { game_id: GameId },
    /// Resume a game you already joined
    Play { game_id: GameId },
}

/// everything the client needs once the command line has been read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub http_base: String,
    pub ws_base: String,
    pub session_file: PathBuf,
    pub game: GameSettings,
}

impl ClientConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let http_base = cli.server.trim_end_matches('/').to_owned();
        Self {
            ws_base: ws_base(&http_base),
            http_base,
            session_file: cli.session_file.clone(),
            game: GameSettings {
                max_reconnect_attempts: cli.reconnect_attempts,
                reconnect_delay: Duration::from_millis(cli.reconnect_delay_ms),
                keepalive_interval: KEEPALIVE_INTERVAL,
                tournament_id: cli.tournament,
            },
        }
    }

    pub fn ws_url(&self, game_id: GameId, token: &str) -> String {
        format!("{}/ws/pong/{game_id}/?token={token}", self.ws_base)
    }
}

/// the socket lives on the same host, over ws when the page would be http.
fn ws_base(http_base: &str) -> String {
    if let Some(rest) = http_base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        http_base.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use crate::config::{ws_base, Cli, ClientConfig, Start};

    #[test]
    fn ws_scheme_follows_http_scheme() {
        assert_eq!(ws_base("http://localhost:8000"), "ws://localhost:8000");
        assert_eq!(ws_base("https://pong.example"), "wss://pong.example");
        assert_eq!(ws_base("ws://already"), "ws://already");
    }

    #[test]
    fn config_from_command_line() {
        let cli = Cli::try_parse_from([
            "pong",
            "--server",
            "https://pong.example/",
            "--tournament",
            "4",
            "--reconnect-delay-ms",
            "500",
            "join",
            "12",
        ])
        .unwrap();
        assert_eq!(cli.command, Start::Join { game_id: 12 });
        let config = ClientConfig::from_cli(&cli);
        assert_eq!(config.http_base, "https://pong.example");
        assert_eq!(
            config.ws_url(12, "abc"),
            "wss://pong.example/ws/pong/12/?token=abc"
        );
        assert_eq!(config.game.tournament_id, Some(4));
        assert_eq!(config.game.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.game.max_reconnect_attempts, 5);
    }

    #[test]
    fn game_id_must_be_numeric() {
        assert!(Cli::try_parse_from(["pong", "play", "abc"]).is_err());
        assert!(Cli::try_parse_from(["pong"]).is_err());
    }
}
