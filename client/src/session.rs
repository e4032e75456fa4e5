use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::mpsc::{channel, RecvTimeoutError, Sender},
    thread::{Builder, JoinHandle},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, TokenPair};

/// how often a running client looks at its access token.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// tokens with less than this left are refreshed by the periodic check.
pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(10 * 60);
/// tokens about to expire are refreshed before the client starts.
pub const STARTUP_THRESHOLD: Duration = Duration::from_secs(15);

/// demo tokens are not JWTs and never expire.
const MOCK_PREFIX: &str = "mock_";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("no refresh token stored")]
    MissingRefreshToken,
    #[error("login expired, sign in again")]
    LoginExpired,
    #[error("access token is not a JWT")]
    MalformedToken,
    #[error(transparent)]
    Api(ApiError),
    #[error("session file: {0}")]
    Io(#[from] io::Error),
    #[error("session file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::LoginExpired => SessionError::LoginExpired,
            err => SessionError::Api(err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// the tokens of the logged in user, kept in a json file between runs.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredTokens>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, tokens: &StoredTokens) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(tokens)?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    pub fn access_token(&self) -> Result<String, SessionError> {
        self.load()?
            .map(|tokens| tokens.access_token)
            .ok_or(SessionError::NotLoggedIn)
    }
}

pub trait TokenRefresher {
    fn refresh_token(&self, refresh: &str) -> Result<TokenPair, ApiError>;
}

#[derive(Deserialize)]
struct Claims {
    exp: u64,
}

/// `None` for tokens that never expire.
pub fn expires_at(token: &str) -> Result<Option<SystemTime>, SessionError> {
    if token.starts_with(MOCK_PREFIX) {
        return Ok(None);
    }
    let payload = token.split('.').nth(1).ok_or(SessionError::MalformedToken)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| SessionError::MalformedToken)?;
    let claims: Claims = serde_json::from_slice(&bytes).map_err(|_| SessionError::MalformedToken)?;
    UNIX_EPOCH
        .checked_add(Duration::from_secs(claims.exp))
        .map(Some)
        .ok_or(SessionError::MalformedToken)
}

pub fn needs_refresh(token: &str, now: SystemTime, threshold: Duration) -> Result<bool, SessionError> {
    Ok(match expires_at(token)? {
        None => false,
        // an error here means the token has already expired.
        Some(expiry) => expiry
            .duration_since(now)
            .map_or(true, |left| left < threshold),
    })
}

/// exchanges the stored refresh token for a new pair. an expired login clears the session.
///
/// a request that never reaches the backend leaves the session in place on purpose,
/// so a network hiccup does not log the player out mid-game.
pub fn refresh(store: &SessionStore, refresher: &impl TokenRefresher) -> Result<StoredTokens, SessionError> {
    let tokens = store.load()?.ok_or(SessionError::NotLoggedIn)?;
    let Some(refresh_token) = tokens.refresh_token else {
        store.clear()?;
        return Err(SessionError::MissingRefreshToken);
    };
    match refresher.refresh_token(&refresh_token) {
        Ok(TokenPair { access, refresh }) => {
            let tokens = StoredTokens {
                access_token: access,
                refresh_token: refresh.or(Some(refresh_token)),
            };
            store.save(&tokens)?;
            info!("session refreshed");
            Ok(tokens)
        }
        Err(ApiError::LoginExpired) => {
            warn!("refresh token rejected, logging out");
            store.clear()?;
            Err(SessionError::LoginExpired)
        }
        Err(err) => Err(err.into()),
    }
}

/// returns whether a refresh happened.
pub fn refresh_if_needed(
    store: &SessionStore,
    refresher: &impl TokenRefresher,
    now: SystemTime,
    threshold: Duration,
) -> Result<bool, SessionError> {
    let access_token = store.access_token()?;
    if !needs_refresh(&access_token, now, threshold)? {
        debug!("session still fresh");
        return Ok(false);
    }
    refresh(store, refresher)?;
    Ok(true)
}

/// keeps the stored session fresh while the client runs.
pub struct SessionRefresher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SessionRefresher {
    pub fn spawn<R>(store: SessionStore, refresher: R, interval: Duration) -> io::Result<Self>
    where
        R: TokenRefresher + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::<()>();
        let handle = Builder::new()
            .name("session_refresher".to_owned())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
                if let Err(err) =
                    refresh_if_needed(&store, &refresher, SystemTime::now(), REFRESH_THRESHOLD)
                {
                    warn!("periodic session check failed: {err}");
                }
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for SessionRefresher {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        path::PathBuf,
        time::{Duration, SystemTime, UNIX_EPOCH},
    };

    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use reqwest::StatusCode;
    use serde_json::json;

    use crate::{
        api::{ApiError, TokenPair},
        session::{
            expires_at, needs_refresh, refresh, refresh_if_needed, SessionError, SessionStore,
            StoredTokens, TokenRefresher,
        },
    };

    fn jwt(exp: u64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(json!({"exp": exp, "user_id": 1}).to_string());
        format!("eyJhbGciOiJIUzI1NiJ9.{payload}.signature")
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn store(name: &str) -> SessionStore {
        let path: PathBuf = std::env::temp_dir().join(format!(
            "pong-session-{}-{name}.json",
            std::process::id()
        ));
        let store = SessionStore::new(path);
        store.clear().unwrap();
        store
    }

    fn tokens(access: String) -> StoredTokens {
        StoredTokens {
            access_token: access,
            refresh_token: Some("refresh-1".to_owned()),
        }
    }

    enum Reply {
        Pair(TokenPair),
        Expired,
        Down,
    }

    struct FakeRefresher {
        reply: Reply,
        seen: RefCell<Vec<String>>,
    }

    impl FakeRefresher {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl TokenRefresher for FakeRefresher {
        fn refresh_token(&self, refresh: &str) -> Result<TokenPair, ApiError> {
            self.seen.borrow_mut().push(refresh.to_owned());
            match &self.reply {
                Reply::Pair(pair) => Ok(pair.clone()),
                Reply::Expired => Err(ApiError::LoginExpired),
                Reply::Down => Err(ApiError::Rejected {
                    status: StatusCode::BAD_GATEWAY,
                    message: "down".to_owned(),
                }),
            }
        }
    }

    #[test]
    fn expiry_is_read_from_the_payload() {
        assert_eq!(expires_at(&jwt(1_700_000_000)).unwrap(), Some(at(1_700_000_000)));
        assert_eq!(expires_at("mock_abc").unwrap(), None);
        assert!(matches!(expires_at("nodots"), Err(SessionError::MalformedToken)));
        assert!(matches!(expires_at("a.%%%.c"), Err(SessionError::MalformedToken)));
        assert!(matches!(expires_at(&jwt(u64::MAX)), Err(SessionError::MalformedToken)));
    }

    #[test]
    fn refresh_decisions() {
        let token = jwt(10_000);
        let ten_minutes = Duration::from_secs(600);
        assert!(!needs_refresh(&token, at(9_000), ten_minutes).unwrap());
        assert!(needs_refresh(&token, at(9_500), ten_minutes).unwrap());
        // already expired.
        assert!(needs_refresh(&token, at(20_000), ten_minutes).unwrap());
        assert!(!needs_refresh("mock_token", at(20_000), ten_minutes).unwrap());
    }

    #[test]
    fn store_round_trip_and_clear() {
        let store = store("round-trip");
        assert_eq!(store.load().unwrap(), None);
        assert!(matches!(store.access_token(), Err(SessionError::NotLoggedIn)));
        store.save(&tokens("abc".to_owned())).unwrap();
        assert_eq!(store.access_token().unwrap(), "abc");
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn fresh_tokens_are_left_alone() {
        let store = store("fresh");
        store.save(&tokens(jwt(10_000))).unwrap();
        let refresher = FakeRefresher::new(Reply::Expired);
        assert!(!refresh_if_needed(&store, &refresher, at(1_000), Duration::from_secs(15)).unwrap());
        assert!(refresher.seen.borrow().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn refresh_keeps_refresh_token_when_not_rotated() {
        let store = store("rotate");
        store.save(&tokens(jwt(10_000))).unwrap();
        let refresher = FakeRefresher::new(Reply::Pair(TokenPair {
            access: "new-access".to_owned(),
            refresh: None,
        }));
        assert!(refresh_if_needed(&store, &refresher, at(9_990), Duration::from_secs(15)).unwrap());
        assert_eq!(refresher.seen.borrow().as_slice(), ["refresh-1"]);
        assert_eq!(
            store.load().unwrap(),
            Some(StoredTokens {
                access_token: "new-access".to_owned(),
                refresh_token: Some("refresh-1".to_owned()),
            })
        );
        store.clear().unwrap();
    }

    #[test]
    fn expired_login_clears_the_session() {
        let store = store("expired");
        store.save(&tokens(jwt(10))).unwrap();
        let refresher = FakeRefresher::new(Reply::Expired);
        assert!(matches!(
            refresh(&store, &refresher),
            Err(SessionError::LoginExpired)
        ));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn unreachable_backend_keeps_the_session() {
        let store = store("down");
        store.save(&tokens(jwt(10))).unwrap();
        let refresher = FakeRefresher::new(Reply::Down);
        assert!(matches!(refresh(&store, &refresher), Err(SessionError::Api(_))));
        assert!(store.load().unwrap().is_some());
        store.clear().unwrap();
    }

    #[test]
    fn missing_refresh_token_logs_out() {
        let store = store("missing");
        store
            .save(&StoredTokens {
                access_token: jwt(10),
                refresh_token: None,
            })
            .unwrap();
        let refresher = FakeRefresher::new(Reply::Expired);
        assert!(matches!(
            refresh(&store, &refresher),
            Err(SessionError::MissingRefreshToken)
        ));
        assert_eq!(store.load().unwrap(), None);
    }
}
