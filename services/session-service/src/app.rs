use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use common_session::{require_session, SessionEngine};
use tracing::info;

use crate::claims::AccountClaims;
use crate::config::ServiceConfig;
use crate::handlers::{current_session, health, login, logout, metrics};
use crate::hooks::{AccountEnricher, AccountRefreshApprover};
use crate::metrics::SessionMetrics;
use crate::store::{AccountDirectory, RefreshTokenStore};

#[derive(Clone)]
pub struct AppState {
    pub engine: SessionEngine<AccountClaims>,
    pub accounts: AccountDirectory,
    pub refresh_tokens: RefreshTokenStore,
    pub metrics: Arc<SessionMetrics>,
    pub config: Arc<ServiceConfig>,
}

impl FromRef<AppState> for SessionEngine<AccountClaims> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl AppState {
    /// Wires the stores and session hooks into a ready engine and seeds the
    /// demo account when one is configured.
    pub fn build(config: ServiceConfig) -> Result<Self> {
        let accounts = AccountDirectory::new();
        let refresh_tokens = RefreshTokenStore::new();
        let metrics = Arc::new(SessionMetrics::new()?);

        let engine = SessionEngine::<AccountClaims>::builder(config.token.clone())
            .with_enricher(AccountEnricher::new(
                refresh_tokens.clone(),
                config.token.refresh_token_ttl,
            ))
            .with_refresh_approver(AccountRefreshApprover::new(
                accounts.clone(),
                refresh_tokens.clone(),
                metrics.clone(),
            ))
            .build()
            .context("Failed to build session engine")?;

        if let Some(demo) = &config.demo_account {
            let account = accounts
                .insert(&demo.username, &demo.password, vec!["user".to_string()])
                .context("Failed to seed demo account")?;
            info!(username = %account.username, user_id = %account.id, "seeded demo account");
        }

        Ok(Self {
            engine,
            accounts,
            refresh_tokens,
            metrics,
            config: Arc::new(config),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/session", get(current_session))
        .route_layer(from_fn_with_state(
            state.clone(),
            require_session::<AccountClaims>,
        ))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/metrics", get(metrics))
        .route("/healthz", get(health))
        .with_state(state)
}
