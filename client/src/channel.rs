use shared::client_msg::ClientMessage;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const NORMAL_CLOSURE: u16 = 1000;
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// close reason the server and client use once a match has been decided.
pub const GAME_FINISHED_REASON: &str = "Game finished";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn abnormal() -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        }
    }

    pub fn is_game_finished(&self) -> bool {
        self.reason == GAME_FINISHED_REASON
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEventKind {
    Opened,
    Message(String),
    Error(String),
    Closed(CloseReason),
}

/// a callback from one particular connection. `generation` ties it to the socket that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEvent {
    pub generation: u64,
    pub kind: ChannelEventKind,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("socket is gone")]
    Disconnected,
    #[error(transparent)]
    Encode(#[from] shared::EncodeError),
}

/// the writing half of one live connection.
pub trait Transport {
    fn send(&mut self, text: String) -> Result<(), ChannelError>;

    fn close(&mut self, code: u16, reason: &str);
}

/// opens connections whose callbacks come back as [`ChannelEvent`]s tagged with `generation`.
pub trait Connector {
    fn open(&mut self, url: &str, generation: u64) -> Box<dyn Transport>;
}

/// the duplex game stream. holds at most one transport at a time.
pub struct GameChannel {
    connector: Box<dyn Connector>,
    url: String,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    generation: u64,
}

impl GameChannel {
    pub fn new(connector: Box<dyn Connector>, url: String) -> Self {
        Self {
            connector,
            url,
            transport: None,
            state: ConnectionState::Closed,
            generation: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn connect(&mut self) {
        // never two sockets for one game.
        self.detach();
        self.generation += 1;
        info!(generation = self.generation, "connecting to game server");
        self.transport = Some(self.connector.open(&self.url, self.generation));
        self.state = ConnectionState::Connecting;
    }

    /// whether the event came from the transport currently attached.
    pub fn accepts(&self, event: &ChannelEvent) -> bool {
        self.transport.is_some() && event.generation == self.generation
    }

    pub fn mark_open(&mut self) {
        self.state = ConnectionState::Open;
    }

    pub fn mark_closed(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Closed;
    }

    /// silently dropped unless the stream is open.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if self.state != ConnectionState::Open {
            debug!(?message, "channel not open, dropping message");
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match message.encode().map_err(ChannelError::from).and_then(|text| transport.send(text)) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to send {message:?}: {err}");
                false
            }
        }
    }

    /// closes the stream and ignores anything it still reports.
    pub fn close(&mut self, code: u16, reason: &str) {
        if let Some(mut transport) = self.transport.take() {
            info!(code, reason, "closing game channel");
            transport.close(code, reason);
        }
        self.state = ConnectionState::Closed;
        self.generation += 1;
    }

    fn detach(&mut self) {
        if self.transport.is_some() {
            self.close(NORMAL_CLOSURE, "");
        }
    }
}


#[cfg(test)]
mod tests {
    use shared::client_msg::{ClientMessage, Move};

    use crate::channel::{
        testing::RecordingConnector, ChannelEvent, ChannelEventKind, ConnectionState, GameChannel,
        GAME_FINISHED_REASON, NORMAL_CLOSURE,
    };

    fn channel() -> (GameChannel, RecordingConnector) {
        let connector = RecordingConnector::default();
        let channel = GameChannel::new(
            Box::new(connector.clone()),
            "ws://localhost/ws/pong/1/?token=t".to_owned(),
        );
        (channel, connector)
    }

    #[test]
    fn send_before_open_is_a_noop() {
        let (mut channel, connector) = channel();
        assert!(!channel.send(&ClientMessage::paddle_move("player1", Move::Up)));
        channel.connect();
        assert_eq!(channel.state(), ConnectionState::Connecting);
        assert!(!channel.send(&ClientMessage::paddle_move("player1", Move::Up)));
        assert!(connector.wire.borrow().sent.is_empty());
        channel.mark_open();
        assert!(channel.send(&ClientMessage::paddle_move("player1", Move::Up)));
        assert_eq!(connector.wire.borrow().sent.len(), 1);
    }

    #[test]
    fn reconnect_detaches_previous_socket() {
        let (mut channel, connector) = channel();
        channel.connect();
        let stale = ChannelEvent {
            generation: 1,
            kind: ChannelEventKind::Opened,
        };
        assert!(channel.accepts(&stale));
        channel.connect();
        assert!(!channel.accepts(&stale));
        let wire = connector.wire.borrow();
        assert_eq!(wire.opened.len(), 2);
        assert_eq!(wire.closed, vec![(NORMAL_CLOSURE, String::new())]);
    }

    #[test]
    fn close_ignores_later_callbacks() {
        let (mut channel, connector) = channel();
        channel.connect();
        channel.mark_open();
        channel.close(NORMAL_CLOSURE, GAME_FINISHED_REASON);
        channel.close(NORMAL_CLOSURE, GAME_FINISHED_REASON);
        assert_eq!(channel.state(), ConnectionState::Closed);
        assert!(!channel.accepts(&ChannelEvent {
            generation: 1,
            kind: ChannelEventKind::Message("{}".to_owned()),
        }));
        assert_eq!(connector.wire.borrow().closed.len(), 1);
        assert!(!channel.send(&ClientMessage::Ping));
    }
}
