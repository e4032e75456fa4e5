use std::time::Duration;

use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::GameId;
use thiserror::Error;
use tracing::debug;

use crate::session::TokenRefresher;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// error code the backend uses for expired or revoked tokens.
const TOKEN_NOT_VALID: &str = "token_not_valid";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("login expired, sign in again")]
    LoginExpired,
    #[error("server answered {status}: {message}")]
    Rejected { status: StatusCode, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GameDetails {
    pub id: GameId,
    #[serde(default)]
    pub player1_name: Option<String>,
    #[serde(default)]
    pub player2_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access: String,
    /// only present when the backend rotates refresh tokens.
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    error: Option<String>,
    detail: Option<String>,
}

/// the REST side of the backend.
#[derive(Clone, Debug)]
pub struct Api {
    http: Client,
    base: String,
}

impl Api {
    pub fn new(base: &str) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_owned(),
        })
    }

    pub fn me(&self, token: &str) -> Result<UserProfile, ApiError> {
        self.json(self.http.get(self.url("/api/users/me/")).bearer_auth(token))
    }

    pub fn create_game(&self, token: &str) -> Result<GameDetails, ApiError> {
        self.json(
            self.http
                .post(self.url("/api/pong/game/create/"))
                .bearer_auth(token),
        )
    }

    pub fn join_game(&self, token: &str, game_id: GameId) -> Result<(), ApiError> {
        self.send(
            self.http
                .post(self.url(&format!("/api/pong/game/{game_id}/join/")))
                .bearer_auth(token),
        )?;
        Ok(())
    }

    pub fn get_game(&self, token: &str, game_id: GameId) -> Result<GameDetails, ApiError> {
        self.json(
            self.http
                .get(self.url(&format!("/api/pong/game/{game_id}/")))
                .bearer_auth(token),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send()?;
        let status = response.status();
        debug!(url = %response.url(), %status, "api response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify(status, &body))
    }

    fn json<D: DeserializeOwned>(&self, request: RequestBuilder) -> Result<D, ApiError> {
        Ok(self.send(request)?.json()?)
    }
}

impl TokenRefresher for Api {
    fn refresh_token(&self, refresh: &str) -> Result<TokenPair, ApiError> {
        self.json(
            self.http
                .post(self.url("/api/token/refresh/"))
                .json(&RefreshRequest { refresh }),
        )
    }
}

fn classify(status: StatusCode, body: &str) -> ApiError {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    if parsed.code.as_deref() == Some(TOKEN_NOT_VALID) {
        return ApiError::LoginExpired;
    }
    let message = parsed
        .error
        .or(parsed.detail)
        .unwrap_or_else(|| body.trim().to_owned());
    ApiError::Rejected { status, message }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use crate::api::{classify, Api, ApiError, GameDetails, TokenPair};

    #[test]
    fn expired_tokens_are_recognised() {
        let body = json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid"
        });
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, &body.to_string()),
            ApiError::LoginExpired
        ));
    }

    #[test]
    fn rejection_keeps_the_servers_reason() {
        let body = json!({"error": "Game is full"}).to_string();
        match classify(StatusCode::BAD_REQUEST, &body) {
            ApiError::Rejected { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Game is full");
            }
            other => panic!("unexpected {other:?}"),
        }
        match classify(StatusCode::BAD_GATEWAY, " upstream down\n") {
            ApiError::Rejected { message, .. } => assert_eq!(message, "upstream down"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn game_details_tolerate_missing_names() {
        let details: GameDetails = serde_json::from_value(json!({"id": 7})).unwrap();
        assert_eq!(details.id, 7);
        assert_eq!(details.player2_name, None);

        let pair: TokenPair = serde_json::from_value(json!({"access": "a"})).unwrap();
        assert_eq!(pair.refresh, None);
    }

    #[test]
    fn urls_join_cleanly() {
        let api = Api::new("http://localhost:8000/").unwrap();
        assert_eq!(api.url("/api/users/me/"), "http://localhost:8000/api/users/me/");
    }
}
