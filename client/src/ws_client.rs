use std::{
    borrow::Cow,
    io::{self, ErrorKind},
    net::{TcpStream, ToSocketAddrs},
    sync::mpsc::{channel, Receiver, Sender, TryRecvError},
    thread::Builder,
    time::{Duration, Instant},
};

use tracing::{debug, error, trace, warn};
use tungstenite::{
    client::IntoClientRequest,
    error::UrlError,
    protocol::{frame::coding::CloseCode, CloseFrame},
    stream::MaybeTlsStream,
    HandshakeError, Message, WebSocket,
};

use crate::{
    channel::{ChannelError, ChannelEvent, ChannelEventKind, CloseReason, Connector, Transport},
    event::Event,
};

/// how long a read may block before outbound messages get a turn.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// how long to wait for the server to acknowledge our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// bounds both the tcp connect and the websocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// opens one socket thread per connection attempt.
pub struct WsConnector {
    events: Sender<Event>,
}

impl WsConnector {
    pub fn new(events: Sender<Event>) -> Self {
        Self { events }
    }
}

pub struct WsTransport {
    outbound: Sender<Outbound>,
}

impl Connector for WsConnector {
    fn open(&mut self, url: &str, generation: u64) -> Box<dyn Transport> {
        let (outbound_tx, outbound_rx) = channel();
        let events = self.events.clone();
        let url = url.to_owned();
        let spawned = Builder::new()
            .name(format!("game_socket_{generation}"))
            .spawn(move || SocketLoop::new(events, generation).run(&url, outbound_rx));
        if let Err(err) = spawned {
            error!("failed to spawn socket thread: {err}");
            let reporter = SocketLoop::new(self.events.clone(), generation);
            reporter.emit(ChannelEventKind::Error(err.to_string()));
            reporter.emit(ChannelEventKind::Closed(CloseReason::abnormal()));
        }
        Box::new(WsTransport {
            outbound: outbound_tx,
        })
    }
}

impl Transport for WsTransport {
    fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| ChannelError::Disconnected)
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

struct SocketLoop {
    events: Sender<Event>,
    generation: u64,
}

impl SocketLoop {
    fn new(events: Sender<Event>, generation: u64) -> Self {
        Self { events, generation }
    }

    fn emit(&self, kind: ChannelEventKind) {
        let _ = self.events.send(Event::Channel(ChannelEvent {
            generation: self.generation,
            kind,
        }));
    }

    fn run(self, url: &str, outbound: Receiver<Outbound>) {
        let mut socket = match open_socket(url) {
            Ok(socket) => socket,
            Err(err) => {
                self.emit(ChannelEventKind::Error(err.to_string()));
                self.emit(ChannelEventKind::Closed(CloseReason::abnormal()));
                return;
            }
        };
        if let Err(err) = set_poll_timeout(&socket) {
            warn!("failed to set socket read timeout: {err}");
        }
        self.emit(ChannelEventKind::Opened);
        let mut received_close = None;
        let mut closing_since = None;
        loop {
            match closing_since {
                None => {
                    if let Some(close) = self.drain_outbound(&mut socket, &outbound) {
                        let frame = CloseFrame {
                            code: CloseCode::from(close.code),
                            reason: Cow::Owned(close.reason),
                        };
                        if let Err(err) = socket.close(Some(frame)) {
                            debug!("close handshake failed: {err}");
                        }
                        closing_since = Some(Instant::now());
                    }
                }
                Some(since) if since.elapsed() > CLOSE_GRACE => {
                    debug!("server never acknowledged close");
                    break;
                }
                Some(_) => {}
            }
            match socket.read() {
                Ok(Message::Text(text)) => {
                    trace!(%text, "received");
                    self.emit(ChannelEventKind::Message(text));
                }
                Ok(Message::Close(frame)) => {
                    received_close = Some(match frame {
                        Some(frame) => CloseReason {
                            code: frame.code.into(),
                            reason: frame.reason.into_owned(),
                        },
                        None => CloseReason {
                            code: CloseCode::Status.into(),
                            reason: String::new(),
                        },
                    });
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break;
                }
                Err(err) => {
                    self.emit(ChannelEventKind::Error(err.to_string()));
                    break;
                }
            }
        }
        self.emit(ChannelEventKind::Closed(
            received_close.unwrap_or_else(CloseReason::abnormal),
        ));
    }

    /// writes queued messages. returns the close request if one was queued
    /// or if the writing half was dropped.
    fn drain_outbound(
        &self,
        socket: &mut Socket,
        outbound: &Receiver<Outbound>,
    ) -> Option<OutboundClose> {
        loop {
            match outbound.try_recv() {
                Ok(Outbound::Text(text)) => {
                    if let Err(err) = socket.send(Message::Text(text)) {
                        warn!("failed to write to server: {err}");
                    }
                }
                Ok(Outbound::Close { code, reason }) => {
                    return Some(OutboundClose { code, reason });
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    return Some(OutboundClose {
                        code: CloseCode::Normal.into(),
                        reason: String::new(),
                    })
                }
            }
        }
    }
}

struct OutboundClose {
    code: u16,
    reason: String,
}

fn open_socket(url: &str) -> Result<Socket, tungstenite::Error> {
    let request = url.into_client_request()?;
    let uri = request.uri();
    let host = uri
        .host()
        .ok_or(tungstenite::Error::Url(UrlError::NoHostName))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_owned();
    let port = uri
        .port_u16()
        .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });
    let stream = connect_with_timeout(&host, port)?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;
    stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
    match tungstenite::client_tls(request, stream) {
        Ok((socket, _)) => Ok(socket),
        Err(HandshakeError::Failure(err)) => Err(err),
        Err(HandshakeError::Interrupted(_)) => Err(tungstenite::Error::Io(io::Error::new(
            ErrorKind::TimedOut,
            "websocket handshake timed out",
        ))),
    }
}

fn connect_with_timeout(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_err = io::Error::new(ErrorKind::NotFound, format!("{host} did not resolve"));
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!(%addr, "connect failed: {err}");
                last_err = err;
            }
        }
    }
    Err(last_err)
}

fn set_poll_timeout(socket: &Socket) -> io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(POLL_INTERVAL)),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_read_timeout(Some(POLL_INTERVAL)),
        _ => Ok(()),
    }
}
