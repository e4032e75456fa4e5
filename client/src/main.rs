use std::{fs::File, sync::mpsc::channel, sync::Mutex, time::SystemTime};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{Api, ApiError},
    channel::GameChannel,
    config::{Cli, ClientConfig, Start},
    game::GameController,
    input::InputListener,
    render::Scene,
    router::{Route, Router},
    scheduler::TimerThread,
    session::{
        refresh_if_needed, SessionRefresher, SessionStore, StoredTokens, CHECK_INTERVAL,
        STARTUP_THRESHOLD,
    },
    terminal::{TerminalGuard, TerminalSurface},
    ws_client::WsConnector,
};

mod api;
mod channel;
mod config;
mod event;
mod game;
mod input;
mod mapper;
mod render;
mod router;
mod scheduler;
mod session;
mod terminal;
mod ws_client;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    let config = ClientConfig::from_cli(&cli);
    let api = Api::new(&config.http_base).context("failed to build the http client")?;
    let store = SessionStore::new(&config.session_file);
    if let Some(access_token) = &cli.access_token {
        store
            .save(&StoredTokens {
                access_token: access_token.clone(),
                refresh_token: cli.refresh_token.clone(),
            })
            .with_context(|| format!("failed to write {}", store.path().display()))?;
    }
    let token = start_session(&store, &api)?;
    let _refresher = SessionRefresher::spawn(store.clone(), api.clone(), CHECK_INTERVAL)
        .context("failed to start the session refresher")?;

    let game_id = match cli.command {
        Start::New => {
            let game = api.create_game(&token).context("failed to create a game")?;
            info!(game = game.id, "game created");
            game.id
        }
        Start::Join { game_id } => {
            api.join_game(&token, game_id)
                .with_context(|| format!("failed to join game {game_id}"))?;
            info!(game = game_id, "game joined");
            game_id
        }
        Start::Play { game_id } => game_id,
    };
    let details = api
        .get_game(&token, game_id)
        .with_context(|| format!("failed to load game {game_id}"))?;
    let scene = Scene::with_players(
        details.player1_name.unwrap_or_else(|| "Player 1".to_owned()),
        details.player2_name.unwrap_or_else(|| "Player 2".to_owned()),
    );

    let route = {
        let _terminal = TerminalGuard::enter().context("failed to prepare the terminal")?;
        let (events_tx, events_rx) = channel();
        let _input = InputListener::spawn(events_tx.clone()).context("failed to read input")?;
        let timers = TimerThread::spawn(events_tx.clone()).context("failed to start timers")?;
        let channel = GameChannel::new(
            Box::new(WsConnector::new(events_tx)),
            config.ws_url(game_id, &token),
        );
        let mut game = GameController::new(
            channel,
            TerminalSurface::new(),
            timers,
            config.game.clone(),
            scene,
        );
        game.start();
        let mut router = Router::new(Route::Home);
        router.mount(Route::Game(game_id), Box::new(game));
        loop {
            let Ok(event) = events_rx.recv() else {
                error!("every event source is gone");
                break None;
            };
            if let Some(route) = router.dispatch(event) {
                break Some(route);
            }
        }
    };

    match route {
        Some(Route::GamesList) => println!("lost the connection to game {game_id}"),
        Some(Route::Tournament(id)) => println!("back to tournament {id}"),
        Some(route) => println!("left game {game_id} ({route})"),
        None => println!("game {game_id} ended unexpectedly"),
    }
    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    // the terminal belongs to the game, logs go to a file.
    let file = File::create(&cli.log_file)
        .with_context(|| format!("failed to open {}", cli.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .init();
    Ok(())
}

/// makes sure a usable access token is stored and returns it.
fn start_session(store: &SessionStore, api: &Api) -> anyhow::Result<String> {
    if store.load().context("failed to read the session")?.is_none() {
        bail!("not logged in, pass --access-token");
    }
    refresh_if_needed(store, api, SystemTime::now(), STARTUP_THRESHOLD)
        .context("failed to refresh the session")?;
    let token = store.access_token()?;
    match api.me(&token) {
        Ok(user) => {
            info!(user = %user.display_name.unwrap_or(user.username), "logged in");
            Ok(token)
        }
        Err(ApiError::LoginExpired) => {
            store.clear()?;
            bail!("login expired, sign in again")
        }
        Err(err) => Err(err).context("failed to check the session"),
    }
}
