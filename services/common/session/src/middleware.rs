use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::claims::Claimer;
use crate::engine::SessionEngine;
use crate::exchange::SessionExchange;

/// Validated claims of the current request.
///
/// Inserted into the request extensions by [`require_session`] and usable as
/// an extractor in any handler behind it.
#[derive(Debug, Clone)]
pub struct Session<C>(pub C);

impl<C> Session<C> {
    pub fn into_claims(self) -> C {
        self.0
    }
}

#[async_trait]
impl<S, C> FromRequestParts<S> for Session<C>
where
    C: Claimer,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session<C>>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Rejects requests without a valid session with a bare 401.
///
/// Install with `axum::middleware::from_fn_with_state(engine, require_session::<C>)`.
/// On success the downstream handler sees the rotated cookie header (if a
/// refresh happened) and a [`Session<C>`] extension; any `Set-Cookie` headers
/// produced while authenticating are appended to its response.
pub async fn require_session<C: Claimer>(
    State(engine): State<SessionEngine<C>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let mut exchange = SessionExchange::from_request_headers(parts.headers.clone());

    if let Err(err) = engine.parse(&mut exchange).await {
        debug!(code = err.code(), error = %err, "rejecting request without valid session");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let (request_headers, issued, extensions) = exchange.into_parts();
    parts.headers = request_headers;
    parts.extensions.extend(extensions);

    let mut response = next.run(Request::from_parts(parts, body)).await;
    for cookie in issued.get_all(SET_COOKIE) {
        response.headers_mut().append(SET_COOKIE, cookie.clone());
    }
    response
}
