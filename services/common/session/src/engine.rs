use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::SET_COOKIE;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::{OsRng, RngCore};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::claims::Claimer;
use crate::config::{SigningAlgorithm, TokenConfig};
use crate::cookie::{self, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::error::{BoxError, CallbackOrigin, ClaimViolation, SessionError, SessionResult};
use crate::exchange::SessionExchange;
use crate::middleware::Session;

/// Host hook run on every issuance, before the claims are signed.
///
/// `refresh_token` is the value about to be handed to the client, so the host
/// can record it. Returning an error aborts issuance with no cookies set.
#[async_trait]
pub trait ClaimEnricher<C: Claimer>: Send + Sync {
    async fn enrich(
        &self,
        exchange: &mut SessionExchange,
        claims: &mut C,
        refresh_token: &str,
    ) -> Result<(), BoxError>;
}

/// Host hook deciding whether an expired session may be renewed.
#[async_trait]
pub trait RefreshApprover<C: Claimer>: Send + Sync {
    async fn approve(&self, exchange: &mut SessionExchange, claims: &C) -> Result<(), BoxError>;
}

struct EngineInner<C: Claimer> {
    config: TokenConfig,
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    enricher: Option<Arc<dyn ClaimEnricher<C>>>,
    approver: Option<Arc<dyn RefreshApprover<C>>>,
}

/// Issues and verifies cookie-borne session tokens for claim type `C`.
///
/// Immutable once built; clones share the same key material and callbacks.
pub struct SessionEngine<C: Claimer> {
    inner: Arc<EngineInner<C>>,
}

impl<C: Claimer> Clone for SessionEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Claimer> SessionEngine<C> {
    pub fn new(config: TokenConfig) -> SessionResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: TokenConfig) -> SessionEngineBuilder<C> {
        SessionEngineBuilder::new(config)
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.inner.algorithm
    }

    /// Mints a new claim, signs it and queues the access/refresh cookie pair.
    ///
    /// When the request already carried a refresh cookie its value is rewritten
    /// in the exchange's request headers. The exchange is only modified once
    /// every fallible step has succeeded.
    pub async fn generate(&self, exchange: &mut SessionExchange) -> SessionResult<C> {
        let inner = &self.inner;
        let now = Utc::now().timestamp();

        let mut claims = C::default();
        claims.set_id(Uuid::new_v4().to_string());
        claims.set_issued_at(now);
        claims.set_not_before(now);
        claims.set_expires_at(now.saturating_add(ttl_seconds(inner.config.access_token_ttl)));
        claims.set_issuer(inner.config.issuer.clone());
        claims.set_subject(inner.config.subject.clone());
        claims.set_audience(inner.config.audience.clone());

        let refresh_token = generate_refresh_token();

        if let Some(enricher) = &inner.enricher {
            enricher
                .enrich(exchange, &mut claims, &refresh_token)
                .await
                .map_err(|source| SessionError::callback(CallbackOrigin::Enrichment, source))?;
        }

        let header = Header::new(inner.algorithm.jwt_algorithm());
        let token = encode(&header, &claims, &inner.encoding_key)
            .map_err(|err| SessionError::Signing(err.to_string()))?;

        // Both cookies outlive the signed token so an expired access token
        // still reaches the refresh path.
        let cookie_ttl = inner.config.refresh_token_ttl;
        let issued_at = Utc::now();
        let refresh_cookie =
            cookie::set_cookie_value(REFRESH_TOKEN_COOKIE, &refresh_token, cookie_ttl, issued_at)?;
        let access_cookie =
            cookie::set_cookie_value(ACCESS_TOKEN_COOKIE, &token, cookie_ttl, issued_at)?;
        let rotated =
            cookie::replace_cookie(exchange.request_headers(), REFRESH_TOKEN_COOKIE, &refresh_token)?;

        exchange
            .response_headers_mut()
            .append(SET_COOKIE, refresh_cookie);
        if let Some(rotated) = rotated {
            exchange.replace_cookie_header(rotated);
        }
        exchange
            .response_headers_mut()
            .append(SET_COOKIE, access_cookie);

        debug!(jti = claims.id(), exp = claims.expires_at(), "issued session token");
        Ok(claims)
    }

    /// Authenticates the exchange's access cookie.
    ///
    /// An expired token is renewed through [`generate`](Self::generate) when a
    /// refresh cookie is present and the registered approver accepts it; this
    /// happens at most once per call. The resulting claim is stored in the
    /// exchange's extensions as [`Session<C>`].
    pub async fn parse(&self, exchange: &mut SessionExchange) -> SessionResult<C> {
        let token = exchange.cookie(ACCESS_TOKEN_COOKIE)?;
        let claims = self.verify(&token)?;

        let claims = if Utc::now().timestamp() > claims.expires_at() {
            self.refresh(exchange, claims).await?
        } else {
            debug!(jti = claims.id(), "verified session token");
            claims
        };

        exchange.extensions_mut().insert(Session(claims.clone()));
        Ok(claims)
    }

    /// Checks signature, temporal claims other than `exp`, the configured
    /// issuer/subject/audience, the header algorithm and the claim's own
    /// `valid()` hook.
    pub fn verify(&self, token: &str) -> SessionResult<C> {
        let inner = &self.inner;

        let header = decode_header(token).map_err(|err| unverifiable_header(token, err))?;
        if !SigningAlgorithm::ALL
            .iter()
            .any(|algorithm| algorithm.jwt_algorithm() == header.alg)
        {
            return Err(SessionError::UnsupportedSigningMethod(format!(
                "{:?}",
                header.alg
            )));
        }

        let token_data = decode::<C>(token, &inner.decoding_key, &inner.validation)?;
        let claims = token_data.claims;
        let now = Utc::now().timestamp();

        if now < claims.not_before() {
            return Err(ClaimViolation::NotYetValid.into());
        }
        if now < claims.issued_at() {
            return Err(ClaimViolation::IssuedInFuture.into());
        }
        if claims.issuer() != inner.config.issuer {
            return Err(ClaimViolation::IssuerMismatch(claims.issuer().to_string()).into());
        }
        if claims.subject() != inner.config.subject {
            return Err(ClaimViolation::SubjectMismatch(claims.subject().to_string()).into());
        }
        if claims.audience() != inner.config.audience {
            return Err(ClaimViolation::AudienceMismatch(claims.audience().to_string()).into());
        }
        if token_data.header.alg != inner.algorithm.jwt_algorithm() {
            warn!(
                expected = inner.algorithm.as_str(),
                found = ?token_data.header.alg,
                "session token signed with unexpected algorithm"
            );
            return Err(ClaimViolation::AlgorithmMismatch {
                expected: inner.algorithm.as_str(),
                found: format!("{:?}", token_data.header.alg),
            }
            .into());
        }
        claims
            .valid()
            .map_err(|err| ClaimViolation::Domain(err.to_string()))?;

        Ok(claims)
    }

    /// Expires both session cookies and returns the refresh token the client
    /// presented, if any, so the host can forget it.
    pub fn revoke(&self, exchange: &mut SessionExchange) -> Option<String> {
        let presented = exchange.cookie(REFRESH_TOKEN_COOKIE).ok();
        cookie::expire_cookie(exchange.response_headers_mut(), ACCESS_TOKEN_COOKIE);
        cookie::expire_cookie(exchange.response_headers_mut(), REFRESH_TOKEN_COOKIE);
        exchange.extensions_mut().remove::<Session<C>>();
        presented
    }

    async fn refresh(&self, exchange: &mut SessionExchange, expired: C) -> SessionResult<C> {
        let approver = match &self.inner.approver {
            Some(approver) if exchange.has_cookie(REFRESH_TOKEN_COOKIE) => Arc::clone(approver),
            _ => {
                debug!(jti = expired.id(), "session token expired");
                return Err(SessionError::TokenExpired);
            }
        };

        if let Err(source) = approver.approve(exchange, &expired).await {
            warn!(jti = expired.id(), error = %source, "session refresh denied");
            return Err(SessionError::callback(
                CallbackOrigin::RefreshApproval,
                source,
            ));
        }

        let renewed = self.generate(exchange).await?;
        debug!(
            previous = expired.id(),
            jti = renewed.id(),
            "rotated session tokens"
        );
        Ok(renewed)
    }
}

pub struct SessionEngineBuilder<C: Claimer> {
    config: TokenConfig,
    enricher: Option<Arc<dyn ClaimEnricher<C>>>,
    approver: Option<Arc<dyn RefreshApprover<C>>>,
}

impl<C: Claimer> SessionEngineBuilder<C> {
    fn new(config: TokenConfig) -> Self {
        Self {
            config,
            enricher: None,
            approver: None,
        }
    }

    pub fn with_enricher(mut self, enricher: impl ClaimEnricher<C> + 'static) -> Self {
        self.enricher = Some(Arc::new(enricher));
        self
    }

    pub fn with_refresh_approver(mut self, approver: impl RefreshApprover<C> + 'static) -> Self {
        self.approver = Some(Arc::new(approver));
        self
    }

    pub fn build(self) -> SessionResult<SessionEngine<C>> {
        if !self.config.is_valid() {
            warn!(config = ?self.config, "rejecting invalid session token configuration");
            return Err(SessionError::ConfigInvalid);
        }
        let algorithm: SigningAlgorithm = self
            .config
            .algorithm
            .parse()
            .map_err(|_| SessionError::ConfigInvalid)?;

        let secret = self.config.sign_key.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret);
        let decoding_key = DecodingKey::from_secret(secret);

        // Temporal and registered-claim checks run in `verify` instead, and any
        // HMAC algorithm is let through so the header comparison there decides.
        let mut validation = Validation::new(algorithm.jwt_algorithm());
        validation.algorithms = SigningAlgorithm::ALL
            .iter()
            .map(SigningAlgorithm::jwt_algorithm)
            .collect();
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(SessionEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                algorithm,
                encoding_key,
                decoding_key,
                validation,
                enricher: self.enricher,
                approver: self.approver,
            }),
        })
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

/// Header algorithms outside jsonwebtoken's enum (`none` among them) fail to
/// deserialize; report those as unsupported rather than malformed.
fn unverifiable_header(token: &str, err: jsonwebtoken::errors::Error) -> SessionError {
    if !matches!(err.kind(), ErrorKind::Json(_)) {
        return err.into();
    }
    let declared = token
        .split('.')
        .next()
        .and_then(|segment| URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok())
        .and_then(|raw| serde_json::from_slice::<Value>(&raw).ok())
        .and_then(|header| header.get("alg").and_then(Value::as_str).map(str::to_string));
    match declared {
        Some(alg) if !SigningAlgorithm::ALL.iter().any(|known| known.as_str() == alg) => {
            SessionError::UnsupportedSigningMethod(alg)
        }
        _ => err.into(),
    }
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let random = URL_SAFE_NO_PAD.encode(bytes);
    format!("{}.{}", Uuid::new_v4(), random)
}
