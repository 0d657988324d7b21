use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_session::{Claimer, Session, SessionExchange};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::claims::AccountClaims;
use crate::hooks::LoginPrincipal;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("username and password are required")]
    MissingCredentials,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingCredentials => (StatusCode::BAD_REQUEST, "missing_credentials"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        let mut response = (status, Json(ErrorBody { code, message })).into_response();
        response
            .headers_mut()
            .insert("X-Error-Code", HeaderValue::from_static(code));
        response
    }
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(login): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let LoginRequest { username, password } = login;
    if username.trim().is_empty() || password.is_empty() {
        state.metrics.login("rejected");
        return Err(ApiError::MissingCredentials);
    }

    let Some(account) = state.accounts.authenticate(&username, &password) else {
        warn!(username = %username.trim(), "login failed");
        state.metrics.login("invalid_credentials");
        return Err(ApiError::InvalidCredentials);
    };

    let mut exchange = SessionExchange::from_request_headers(headers);
    exchange
        .extensions_mut()
        .insert(LoginPrincipal(account.clone()));

    let claims = match state.engine.generate(&mut exchange).await {
        Ok(claims) => claims,
        Err(err) => {
            error!(code = err.code(), error = %err, "failed to issue session");
            state.metrics.login("error");
            return Err(ApiError::Internal(err.to_string()));
        }
    };

    info!(user_id = %account.id, jti = claims.id(), "login succeeded");
    state.metrics.login("success");
    Ok(with_issued_cookies(
        (StatusCode::OK, Json(claims.render())).into_response(),
        &exchange,
    ))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut exchange = SessionExchange::from_request_headers(headers);
    if let Some(token) = state.engine.revoke(&mut exchange) {
        state.refresh_tokens.revoke(&token);
    }
    with_issued_cookies(StatusCode::NO_CONTENT.into_response(), &exchange)
}

pub async fn current_session(Session(claims): Session<AccountClaims>) -> Json<Value> {
    Json(claims.render())
}

pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    state
        .metrics
        .render()
        .map_err(|err| ApiError::Internal(err.to_string()))
}

pub async fn health() -> &'static str {
    "ok"
}

fn with_issued_cookies(mut response: Response, exchange: &SessionExchange) -> Response {
    for cookie in exchange.response_headers().get_all(SET_COOKIE) {
        response.headers_mut().append(SET_COOKIE, cookie.clone());
    }
    response
}
