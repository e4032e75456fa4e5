use std::time::Duration;

use shared::{
    client_msg::{ClientMessage, Move},
    game_state::{GameConfig, GameStatus, Snapshot},
    server_msg::{PlayerProfiles, PlayerStatuses, ServerMessage, StatusChange, TournamentEvent},
    TournamentId,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    channel::{
        ChannelEvent, ChannelEventKind, CloseReason, ConnectionState, GameChannel,
        GAME_FINISHED_REASON, NORMAL_CLOSURE,
    },
    event::Event,
    input::{Control, InputEvent},
    mapper::CoordinateMapper,
    render::{GameOverCard, PauseButton, PauseOverlay, Scene, StartButton, Surface},
    router::{Flow, Page, Route},
    scheduler::{Scheduler, Timer, TimerId, FRAME_INTERVAL},
};

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// leaves the final score on screen before the result card.
const EXPLICIT_FINISH_DELAY: Duration = Duration::from_millis(500);
const INFERRED_FINISH_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameSettings {
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub keepalive_interval: Duration,
    /// where the result card sends the player, when the game is part of a tournament.
    pub tournament_id: Option<TournamentId>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
            keepalive_interval: KEEPALIVE_INTERVAL,
            tournament_id: None,
        }
    }
}

/// the game view: owns the channel, the scene and every timer a running game needs.
pub struct GameController<S, T> {
    channel: GameChannel,
    surface: S,
    scheduler: T,
    settings: GameSettings,
    config: Option<GameConfig>,
    mapper: Option<CoordinateMapper>,
    scene: Scene,
    paused: bool,
    reconnect_attempts: u32,
    round_tournament: Option<TournamentId>,
    pending_frame: Option<TimerId>,
    reconnect_timer: Option<TimerId>,
    finish_timer: Option<TimerId>,
    keepalive_timer: Option<TimerId>,
    game_over_shown: bool,
    torn_down: bool,
}

impl<S: Surface, T: Scheduler> GameController<S, T> {
    pub fn new(
        channel: GameChannel,
        surface: S,
        scheduler: T,
        settings: GameSettings,
        scene: Scene,
    ) -> Self {
        Self {
            channel,
            surface,
            scheduler,
            settings,
            config: None,
            mapper: None,
            scene,
            paused: false,
            reconnect_attempts: 0,
            round_tournament: None,
            pending_frame: None,
            reconnect_timer: None,
            finish_timer: None,
            keepalive_timer: None,
            game_over_shown: false,
            torn_down: false,
        }
    }

    /// opens the stream and draws the empty board.
    pub fn start(&mut self) {
        self.channel.connect();
        self.request_frame();
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn handle(&mut self, event: Event) -> Flow {
        if self.torn_down {
            trace!(?event, "game torn down, ignoring event");
            return Flow::Stay;
        }
        match event {
            Event::Channel(event) => self.on_channel(event),
            Event::Input(input) => self.on_input(input),
            Event::Timer(id, timer) => self.on_timer(id, timer),
        }
    }

    /// stops every timer and closes the stream. later calls do nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let timers = [
            self.pending_frame.take(),
            self.reconnect_timer.take(),
            self.finish_timer.take(),
            self.keepalive_timer.take(),
        ];
        for id in timers.into_iter().flatten() {
            self.scheduler.cancel(id);
        }
        self.channel.close(NORMAL_CLOSURE, "");
        debug!("game view torn down");
    }

    fn on_channel(&mut self, event: ChannelEvent) -> Flow {
        if !self.channel.accepts(&event) {
            trace!(generation = event.generation, "ignoring event from a detached socket");
            return Flow::Stay;
        }
        match event.kind {
            ChannelEventKind::Opened => {
                info!("connected to game server");
                self.channel.mark_open();
                self.reconnect_attempts = 0;
                self.schedule_keepalive();
            }
            ChannelEventKind::Message(text) => match ServerMessage::try_from(text.as_str()) {
                Ok(message) => self.on_message(message),
                Err(err) => warn!("dropping message from game server: {err}"),
            },
            ChannelEventKind::Error(err) => error!("websocket error: {err}"),
            ChannelEventKind::Closed(reason) => return self.on_closed(reason),
        }
        Flow::Stay
    }

    fn on_closed(&mut self, reason: CloseReason) -> Flow {
        info!(code = reason.code, reason = %reason.reason, "websocket connection closed");
        self.channel.mark_closed();
        self.cancel(Timer::Keepalive);
        if self.game_over_shown {
            return Flow::Stay;
        }
        let decided = self
            .config
            .as_ref()
            .is_some_and(|config| self.scene.has_winner(config.win_score));
        if decided || self.finish_timer.is_some() {
            // the result is known, no point waiting for the finish timer.
            self.cancel(Timer::FinishGame);
            self.show_game_over();
            return Flow::Stay;
        }
        if !reason.is_game_finished()
            && self.reconnect_attempts < self.settings.max_reconnect_attempts
        {
            self.reconnect_attempts += 1;
            warn!(
                attempt = self.reconnect_attempts,
                max = self.settings.max_reconnect_attempts,
                "connection lost, reconnecting"
            );
            self.reconnect_timer = Some(
                self.scheduler
                    .schedule(self.settings.reconnect_delay, Timer::Reconnect),
            );
            return Flow::Stay;
        }
        warn!("max reconnection attempts reached or game finished");
        self.teardown();
        Flow::Navigate(Route::GamesList)
    }

    fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::GameConfig { data } => self.on_config(data),
            ServerMessage::PlayerReady { data } | ServerMessage::PlayerDisconnected { data } => {
                self.on_player_statuses(data)
            }
            ServerMessage::PlayerUpdate { data } => self.on_player_update(data),
            ServerMessage::GameState { data } => self.on_snapshot(data),
            ServerMessage::GameStatus { data } => self.on_status(data),
            ServerMessage::TournamentUpdate { message } => self.on_tournament(message),
            ServerMessage::Ping => {
                self.channel.send(&ClientMessage::Pong);
            }
            ServerMessage::Pong => trace!("keepalive acknowledged"),
        }
    }

    fn on_config(&mut self, config: GameConfig) {
        let mapper = match CoordinateMapper::new(&config.config) {
            Ok(mapper) => mapper,
            Err(err) => {
                warn!("dropping game config: {err}");
                return;
            }
        };
        info!(
            player = %config.player_type,
            win_score = config.win_score,
            "game configured"
        );
        if self.mapper.is_none() {
            self.scene.configure(&mapper);
        } else {
            // a reconnect resends the config, positions come with the next state.
            self.scene.paddle_height = mapper.paddle_height();
        }
        if self.scene.start_button == StartButton::Locked {
            self.scene.start_button = StartButton::Ready;
        }
        self.mapper = Some(mapper);
        self.config = Some(config);
        self.request_frame();
    }

    fn on_player_statuses(&mut self, statuses: PlayerStatuses) {
        if let Some(status) = statuses.player1_status {
            self.scene.players[0].badge = Some(status);
        }
        if let Some(status) = statuses.player2_status {
            self.scene.players[1].badge = Some(status);
        }
        self.request_frame();
    }

    fn on_player_update(&mut self, profiles: PlayerProfiles) {
        let PlayerProfiles {
            player1_name,
            player2_name,
            player1_avatar,
            player2_avatar,
        } = profiles;
        let [player1, player2] = &mut self.scene.players;
        for (card, name, avatar) in [
            (player1, player1_name, player1_avatar),
            (player2, player2_name, player2_avatar),
        ] {
            if let Some(name) = name.filter(|name| !name.is_empty()) {
                card.name = name;
            }
            if let Some(avatar) = avatar.filter(|avatar| !avatar.is_empty()) {
                card.avatar = Some(avatar);
            }
        }
        self.request_frame();
    }

    fn on_snapshot(&mut self, snapshot: Snapshot) {
        let (Some(mapper), Some(win_score)) =
            (self.mapper, self.config.as_ref().map(|config| config.win_score))
        else {
            warn!("game state before game config, dropping it");
            return;
        };
        self.scene.apply(&snapshot, &mapper);
        self.request_frame();
        if snapshot.is_game_over() {
            info!("server reported game over");
            self.begin_finish(EXPLICIT_FINISH_DELAY);
            return;
        }
        if snapshot.status == Some(GameStatus::Playing) {
            self.show_playing();
        }
        if snapshot.status == Some(GameStatus::Finished) || self.scene.has_winner(win_score) {
            info!(
                score_left = self.scene.score_left,
                score_right = self.scene.score_right,
                "game decided"
            );
            self.begin_finish(INFERRED_FINISH_DELAY);
        }
    }

    fn on_status(&mut self, change: StatusChange) {
        let StatusChange { status, paused_by } = change;
        if self.game_over_shown {
            debug!(?status, "game over, ignoring status change");
            return;
        }
        let paused_by_me = matches!(
            (paused_by.as_deref(), self.player()),
            (Some(by), Some(me)) if by == me
        );
        debug!(?status, ?paused_by, "game status changed");
        match status {
            GameStatus::Playing => self.show_playing(),
            GameStatus::Paused => {
                self.paused = true;
                self.scene.start_button = StartButton::Hidden;
                self.scene.pause_button = if paused_by_me {
                    PauseButton::Resume
                } else {
                    PauseButton::PausedByOpponent
                };
            }
            GameStatus::Waiting => {
                self.scene.start_button = StartButton::Ready;
                self.scene.pause_button = PauseButton::Hidden;
            }
            GameStatus::Finished => {}
        }
        self.scene.pause_overlay = self.paused.then_some(PauseOverlay { paused_by_me });
        self.request_frame();
    }

    fn on_tournament(&mut self, event: Option<TournamentEvent>) {
        match event {
            Some(TournamentEvent::MatchCompleted) => {
                info!("tournament match completed");
                self.begin_finish(INFERRED_FINISH_DELAY);
            }
            Some(event @ TournamentEvent::NewRound { .. }) => {
                if let Some(id) = event.tournament_id() {
                    debug!(tournament = id, "new tournament round");
                    self.round_tournament = Some(id);
                }
            }
            Some(TournamentEvent::Other) | None => debug!("ignoring tournament update"),
        }
    }

    fn show_playing(&mut self) {
        if self.game_over_shown {
            return;
        }
        self.paused = false;
        self.scene.start_button = StartButton::Hidden;
        self.scene.pause_button = PauseButton::Pause;
        self.scene.pause_overlay = None;
    }

    fn on_input(&mut self, input: InputEvent) -> Flow {
        match input {
            InputEvent::Press(control) => return self.on_press(control),
            InputEvent::Release(control) => {
                if control.movement().is_some() {
                    self.send_move(Move::Stop);
                }
            }
            InputEvent::PointerUp => self.send_move(Move::Stop),
            InputEvent::Visibility { hidden } => {
                debug!(hidden, "visibility changed");
                self.channel.send(&ClientMessage::VisibilityChange { hidden });
            }
            InputEvent::Resized => self.request_frame(),
        }
        Flow::Stay
    }

    fn on_press(&mut self, control: Control) -> Flow {
        match control {
            Control::MoveUp | Control::MoveDown => {
                if self.paused {
                    trace!("paused, movement suppressed");
                } else if let Some(movement) = control.movement() {
                    self.send_move(movement);
                }
            }
            Control::TogglePause => match self.scene.pause_button {
                PauseButton::Pause => {
                    self.channel.send(&ClientMessage::PauseGame { pause: true });
                }
                PauseButton::Resume => {
                    self.channel.send(&ClientMessage::PauseGame { pause: false });
                }
                PauseButton::Hidden | PauseButton::PausedByOpponent => {
                    debug!("pause not available")
                }
            },
            Control::Ready => {
                if self.scene.start_button == StartButton::Ready
                    && self.channel.send(&ClientMessage::PlayerReady {})
                {
                    self.scene.start_button = StartButton::Waiting;
                    self.request_frame();
                }
            }
            Control::Confirm => {
                if self.game_over_shown {
                    return self.leave_to(self.return_route());
                }
            }
            Control::Leave => return self.leave(),
        }
        Flow::Stay
    }

    fn leave(&mut self) -> Flow {
        if self.game_over_shown {
            return self.leave_to(self.return_route());
        }
        if let Some(config) = &self.config {
            if self.scene.has_winner(config.win_score) {
                info!("game already decided, showing the result first");
                self.finish_game();
                return Flow::Stay;
            }
        }
        self.channel
            .send(&ClientMessage::VisibilityChange { hidden: true });
        self.leave_to(Route::Home)
    }

    fn leave_to(&mut self, route: Route) -> Flow {
        self.teardown();
        Flow::Navigate(route)
    }

    fn on_timer(&mut self, id: TimerId, timer: Timer) -> Flow {
        if *self.slot(timer) != Some(id) {
            trace!(?id, ?timer, "stale timer");
            return Flow::Stay;
        }
        *self.slot(timer) = None;
        match timer {
            Timer::Frame => {
                if let Err(err) = self.surface.present(&self.scene) {
                    warn!("failed to draw game: {err}");
                }
            }
            Timer::Reconnect => {
                info!(attempt = self.reconnect_attempts, "reconnecting");
                self.channel.connect();
            }
            Timer::FinishGame => self.finish_game(),
            Timer::Keepalive => {
                if self.channel.send(&ClientMessage::Ping) {
                    self.schedule_keepalive();
                }
            }
        }
        Flow::Stay
    }

    /// the two ways a game can end both land here. retries stop once it starts.
    fn begin_finish(&mut self, delay: Duration) {
        if self.game_over_shown || self.finish_timer.is_some() {
            return;
        }
        self.reconnect_attempts = self.settings.max_reconnect_attempts;
        self.cancel(Timer::Reconnect);
        self.finish_timer = Some(self.scheduler.schedule(delay, Timer::FinishGame));
    }

    /// closes the stream as finished and shows the result.
    fn finish_game(&mut self) {
        self.cancel(Timer::FinishGame);
        self.cancel(Timer::Keepalive);
        self.channel.close(NORMAL_CLOSURE, GAME_FINISHED_REASON);
        self.show_game_over();
    }

    fn show_game_over(&mut self) {
        if self.game_over_shown {
            return;
        }
        self.game_over_shown = true;
        let (left, right) = (self.scene.score_left, self.scene.score_right);
        let player1_won = match &self.config {
            Some(config) => left >= config.win_score,
            None => left > right,
        };
        let [player1, player2] = &self.scene.players;
        let winner = if player1_won { player1 } else { player2 };
        info!(winner = %winner.name, left, right, "game over");
        let return_label = if self.tournament().is_some() {
            "Return to Tournament"
        } else {
            "Return to Main Page"
        };
        self.scene.game_over = Some(GameOverCard {
            winner: winner.name.clone(),
            player1: player1.name.clone(),
            player2: player2.name.clone(),
            score_left: left,
            score_right: right,
            return_label,
        });
        self.scene.pause_overlay = None;
        self.scene.start_button = StartButton::Hidden;
        self.scene.pause_button = PauseButton::Hidden;
        self.request_frame();
    }

    fn tournament(&self) -> Option<TournamentId> {
        self.settings.tournament_id.or(self.round_tournament)
    }

    fn return_route(&self) -> Route {
        self.tournament().map_or(Route::Home, Route::Tournament)
    }

    fn player(&self) -> Option<&str> {
        self.config.as_ref().map(|config| config.player_type.as_str())
    }

    fn send_move(&mut self, movement: Move) {
        match &self.config {
            Some(config) => {
                self.channel
                    .send(&ClientMessage::paddle_move(&config.player_type, movement));
            }
            None => trace!(?movement, "no game config yet, not moving"),
        }
    }

    /// at most one frame is ever pending, everything in between is coalesced into it.
    fn request_frame(&mut self) {
        if self.pending_frame.is_none() && !self.torn_down {
            self.pending_frame = Some(self.scheduler.schedule(FRAME_INTERVAL, Timer::Frame));
        }
    }

    fn schedule_keepalive(&mut self) {
        self.cancel(Timer::Keepalive);
        self.keepalive_timer = Some(
            self.scheduler
                .schedule(self.settings.keepalive_interval, Timer::Keepalive),
        );
    }

    fn cancel(&mut self, timer: Timer) {
        if let Some(id) = self.slot(timer).take() {
            self.scheduler.cancel(id);
        }
    }

    fn slot(&mut self, timer: Timer) -> &mut Option<TimerId> {
        match timer {
            Timer::Frame => &mut self.pending_frame,
            Timer::Reconnect => &mut self.reconnect_timer,
            Timer::FinishGame => &mut self.finish_timer,
            Timer::Keepalive => &mut self.keepalive_timer,
        }
    }
}

impl<S: Surface, T: Scheduler> Page for GameController<S, T> {
    fn handle(&mut self, event: Event) -> Flow {
        GameController::handle(self, event)
    }

    fn teardown(&mut self) {
        GameController::teardown(self)
    }
}

impl<S, T> Drop for GameController<S, T> {
    fn drop(&mut self) {
        if !self.torn_down {
            self.channel.close(NORMAL_CLOSURE, "");
        }
    }
}
