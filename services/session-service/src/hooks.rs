use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_session::{
    BoxError, ClaimEnricher, RefreshApprover, SessionExchange, REFRESH_TOKEN_COOKIE,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::claims::AccountClaims;
use crate::metrics::SessionMetrics;
use crate::store::{Account, AccountDirectory, RefreshRecord, RefreshTokenStore};

/// Server-side lifetime of refresh tokens handed out in browser-session
/// cookies, which carry no expiry of their own.
const BROWSER_SESSION_REFRESH_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Account the session is being issued for. Placed in the exchange
/// extensions by the login handler or by [`AccountRefreshApprover`].
#[derive(Debug, Clone)]
pub struct LoginPrincipal(pub Account);

#[derive(Debug, Error)]
pub enum HookError {
    #[error("no authenticated account attached to the exchange")]
    MissingPrincipal,
    #[error("refresh token is unknown, expired or already used")]
    UnknownRefreshToken,
    #[error("refresh token was issued to a different account")]
    AccountMismatch,
    #[error("account is missing or deactivated")]
    AccountUnavailable,
}

/// Copies the principal's identity into the claims and remembers the refresh
/// token handed out alongside them.
pub struct AccountEnricher {
    refresh_tokens: RefreshTokenStore,
    refresh_ttl: Duration,
}

impl AccountEnricher {
    pub fn new(refresh_tokens: RefreshTokenStore, refresh_ttl: Duration) -> Self {
        Self {
            refresh_tokens,
            refresh_ttl,
        }
    }
}

#[async_trait]
impl ClaimEnricher<AccountClaims> for AccountEnricher {
    async fn enrich(
        &self,
        exchange: &mut SessionExchange,
        claims: &mut AccountClaims,
        refresh_token: &str,
    ) -> Result<(), BoxError> {
        let LoginPrincipal(account) = exchange
            .extensions()
            .get::<LoginPrincipal>()
            .cloned()
            .ok_or(HookError::MissingPrincipal)?;

        claims.uid = account.id;
        claims.username = account.username;
        claims.roles = account.roles;

        let issued_at = Utc::now();
        let lifetime = if self.refresh_ttl.is_zero() {
            BROWSER_SESSION_REFRESH_LIFETIME
        } else {
            self.refresh_ttl
        };
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.refresh_tokens.record(
            refresh_token,
            RefreshRecord {
                user_id: account.id,
                issued_at,
                expires_at,
            },
        );
        Ok(())
    }
}

/// Renews a session only for the refresh token most recently issued to the
/// same, still active, account.
pub struct AccountRefreshApprover {
    accounts: AccountDirectory,
    refresh_tokens: RefreshTokenStore,
    metrics: Arc<SessionMetrics>,
}

impl AccountRefreshApprover {
    pub fn new(
        accounts: AccountDirectory,
        refresh_tokens: RefreshTokenStore,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            accounts,
            refresh_tokens,
            metrics,
        }
    }

    fn check(
        &self,
        exchange: &mut SessionExchange,
        claims: &AccountClaims,
    ) -> Result<(), HookError> {
        let presented = exchange
            .cookie(REFRESH_TOKEN_COOKIE)
            .map_err(|_| HookError::UnknownRefreshToken)?;
        let record = self
            .refresh_tokens
            .consume(&presented)
            .ok_or(HookError::UnknownRefreshToken)?;
        if record.user_id != claims.uid {
            return Err(HookError::AccountMismatch);
        }
        let account = self
            .accounts
            .get(record.user_id)
            .filter(|account| account.is_active)
            .ok_or(HookError::AccountUnavailable)?;

        exchange.extensions_mut().insert(LoginPrincipal(account));
        Ok(())
    }
}

#[async_trait]
impl RefreshApprover<AccountClaims> for AccountRefreshApprover {
    async fn approve(
        &self,
        exchange: &mut SessionExchange,
        claims: &AccountClaims,
    ) -> Result<(), BoxError> {
        match self.check(exchange, claims) {
            Ok(()) => {
                debug!(user_id = %claims.uid, "approved session refresh");
                self.metrics.refresh("approved");
                Ok(())
            }
            Err(err) => {
                warn!(user_id = %claims.uid, error = %err, "refusing session refresh");
                self.metrics.refresh("denied");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use axum::http::{HeaderMap, HeaderValue};
    use uuid::Uuid;

    fn exchange_with_refresh(token: &str) -> SessionExchange {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{REFRESH_TOKEN_COOKIE}={token}")).expect("header"),
        );
        SessionExchange::from_request_headers(headers)
    }

    fn claims_for(account: &Account) -> AccountClaims {
        AccountClaims {
            uid: account.id,
            username: account.username.clone(),
            ..AccountClaims::default()
        }
    }

    struct Fixture {
        accounts: AccountDirectory,
        refresh_tokens: RefreshTokenStore,
        metrics: Arc<SessionMetrics>,
        account: Account,
    }

    fn fixture() -> Fixture {
        let accounts = AccountDirectory::new();
        let account = accounts
            .insert("alice", "password", vec!["cashier".to_string()])
            .expect("insert");
        Fixture {
            accounts,
            refresh_tokens: RefreshTokenStore::new(),
            metrics: Arc::new(SessionMetrics::new().expect("metrics")),
            account,
        }
    }

    impl Fixture {
        fn approver(&self) -> AccountRefreshApprover {
            AccountRefreshApprover::new(
                self.accounts.clone(),
                self.refresh_tokens.clone(),
                self.metrics.clone(),
            )
        }

        fn enricher(&self) -> AccountEnricher {
            AccountEnricher::new(self.refresh_tokens.clone(), Duration::from_secs(60))
        }
    }

    #[tokio::test]
    async fn enricher_copies_account_and_records_refresh_token() {
        let fx = fixture();
        let mut exchange = SessionExchange::new();
        exchange
            .extensions_mut()
            .insert(LoginPrincipal(fx.account.clone()));

        let mut claims = AccountClaims::default();
        fx.enricher()
            .enrich(&mut exchange, &mut claims, "refresh-1")
            .await
            .expect("enrich");

        assert_eq!(claims.uid, fx.account.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, vec!["cashier".to_string()]);
        let record = fx.refresh_tokens.consume("refresh-1").expect("recorded");
        assert_eq!(record.user_id, fx.account.id);
        assert!(record.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn browser_session_tokens_still_lapse_server_side() {
        let fx = fixture();
        let mut exchange = SessionExchange::new();
        exchange
            .extensions_mut()
            .insert(LoginPrincipal(fx.account.clone()));

        AccountEnricher::new(fx.refresh_tokens.clone(), Duration::ZERO)
            .enrich(&mut exchange, &mut AccountClaims::default(), "browser")
            .await
            .expect("enrich");

        let record = fx.refresh_tokens.consume("browser").expect("recorded");
        assert!(record.expires_at <= Utc::now() + chrono::Duration::hours(24));
    }

    #[tokio::test]
    async fn enricher_without_principal_fails() {
        let fx = fixture();
        let mut claims = AccountClaims::default();
        let err = fx
            .enricher()
            .enrich(&mut SessionExchange::new(), &mut claims, "refresh")
            .await
            .expect_err("principal required");
        assert!(err.to_string().contains("no authenticated account"));
        assert!(fx.refresh_tokens.is_empty());
    }

    #[tokio::test]
    async fn approver_consumes_token_and_attaches_principal() {
        let fx = fixture();
        fx.refresh_tokens.record(
            "refresh-1",
            RefreshRecord {
                user_id: fx.account.id,
                issued_at: Utc::now(),
                expires_at: Utc::now() + chrono::Duration::minutes(5),
            },
        );
        let mut exchange = exchange_with_refresh("refresh-1");

        fx.approver()
            .approve(&mut exchange, &claims_for(&fx.account))
            .await
            .expect("approved");

        let LoginPrincipal(principal) = exchange
            .extensions()
            .get::<LoginPrincipal>()
            .cloned()
            .expect("principal");
        assert_eq!(principal.id, fx.account.id);
        assert!(fx.refresh_tokens.is_empty());

        let replay = fx
            .approver()
            .approve(&mut exchange_with_refresh("refresh-1"), &claims_for(&fx.account))
            .await;
        assert!(replay.is_err());
    }

    #[tokio::test]
    async fn approver_rejects_foreign_and_deactivated_accounts() {
        let fx = fixture();
        fx.refresh_tokens.record(
            "someone-else",
            RefreshRecord {
                user_id: Uuid::new_v4(),
                issued_at: Utc::now(),
                expires_at: Utc::now() + chrono::Duration::minutes(5),
            },
        );
        let err = fx
            .approver()
            .approve(
                &mut exchange_with_refresh("someone-else"),
                &claims_for(&fx.account),
            )
            .await
            .expect_err("mismatch");
        assert!(err.to_string().contains("different account"));

        fx.refresh_tokens.record(
            "mine",
            RefreshRecord {
                user_id: fx.account.id,
                issued_at: Utc::now(),
                expires_at: Utc::now() + chrono::Duration::minutes(5),
            },
        );
        fx.accounts.set_active(fx.account.id, false);
        let err = fx
            .approver()
            .approve(&mut exchange_with_refresh("mine"), &claims_for(&fx.account))
            .await
            .expect_err("inactive");
        assert!(err.to_string().contains("deactivated"));
    }
}
