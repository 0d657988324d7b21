use anyhow::{anyhow, bail, Context, Result};
use common_session::TokenConfig;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_PORT: u16 = 8090;

/// Account seeded at startup so the service can be exercised without an
/// external user store.
#[derive(Clone)]
pub struct DemoAccount {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DemoAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemoAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub token: TokenConfig,
    pub demo_account: Option<DemoAccount>,
}

impl ServiceConfig {
    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).and_then(|raw| normalize_optional(&raw));

        let sign_key = value("SESSION_JWT_SECRET")
            .ok_or_else(|| anyhow!("SESSION_JWT_SECRET must be set"))?;

        let token = TokenConfig {
            algorithm: value("SESSION_JWT_ALGORITHM").unwrap_or_else(|| "HS256".to_string()),
            issuer: value("SESSION_JWT_ISSUER").unwrap_or_else(|| "session-service".to_string()),
            audience: value("SESSION_JWT_AUDIENCE")
                .unwrap_or_else(|| "session-clients".to_string()),
            subject: value("SESSION_JWT_SUBJECT").unwrap_or_else(|| "session".to_string()),
            access_token_ttl: seconds(
                value("SESSION_ACCESS_TTL_SECS"),
                DEFAULT_ACCESS_TTL_SECS,
            )
            .context("Failed to parse SESSION_ACCESS_TTL_SECS")?,
            sign_key,
            refresh_token_ttl: seconds(
                value("SESSION_REFRESH_TTL_SECS"),
                DEFAULT_REFRESH_TTL_SECS,
            )
            .context("Failed to parse SESSION_REFRESH_TTL_SECS")?,
        };

        if !token.is_valid() {
            bail!(
                "Session token configuration is invalid (algorithm '{}'). \
                 Check SESSION_JWT_* and SESSION_ACCESS_TTL_SECS.",
                token.algorithm
            );
        }

        let host = value("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = value("PORT")
            .map(|raw| raw.parse::<u16>())
            .transpose()
            .context("Failed to parse PORT")?
            .unwrap_or(DEFAULT_PORT);

        let demo_account = match (
            value("SESSION_DEMO_USERNAME"),
            value("SESSION_DEMO_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(DemoAccount { username, password }),
            (None, None) => None,
            _ => bail!("SESSION_DEMO_USERNAME and SESSION_DEMO_PASSWORD must be set together"),
        };

        Ok(Self {
            host,
            port,
            token,
            demo_account,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid HOST '{}'", self.host))?;
        Ok(SocketAddr::from((ip, self.port)))
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    ServiceConfig::from_lookup(|key| env::var(key).ok())
}

fn seconds(raw: Option<String>, default: u64) -> Result<Duration> {
    match raw {
        Some(raw) => {
            let secs = raw
                .parse::<u64>()
                .with_context(|| format!("'{raw}' is not a whole number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
        None => Ok(Duration::from_secs(default)),
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
