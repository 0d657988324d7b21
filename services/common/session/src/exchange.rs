use axum::http::header::COOKIE;
use axum::http::{Extensions, HeaderMap, HeaderValue};

use crate::cookie;
use crate::error::SessionResult;

/// Request-scoped transport handle the engine reads cookies from and writes
/// cookies to.
///
/// It holds a working copy of the inbound request headers, the response headers
/// produced so far and the request extensions. Nothing here is shared between
/// requests; the caller applies the parts back onto the real request/response
/// with [`SessionExchange::into_parts`].
#[derive(Default)]
pub struct SessionExchange {
    request: HeaderMap,
    response: HeaderMap,
    extensions: Extensions,
}

impl SessionExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_request_headers(request: HeaderMap) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn cookie(&self, name: &'static str) -> SessionResult<String> {
        cookie::read_cookie(&self.request, name)
    }

    pub fn has_cookie(&self, name: &'static str) -> bool {
        self.cookie(name).is_ok()
    }

    pub(crate) fn replace_cookie_header(&mut self, value: HeaderValue) {
        self.request.remove(COOKIE);
        self.request.insert(COOKIE, value);
    }

    /// Splits into (rewritten request headers, response headers, extensions).
    pub fn into_parts(self) -> (HeaderMap, HeaderMap, Extensions) {
        (self.request, self.response, self.extensions)
    }
}
