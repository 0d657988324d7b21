use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;

/// HMAC variants the engine can sign and verify with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    pub const ALL: [SigningAlgorithm; 3] = [
        SigningAlgorithm::Hs256,
        SigningAlgorithm::Hs384,
        SigningAlgorithm::Hs512,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::Hs256 => "HS256",
            SigningAlgorithm::Hs384 => "HS384",
            SigningAlgorithm::Hs512 => "HS512",
        }
    }

    pub fn jwt_algorithm(&self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::Hs256),
            "HS384" => Ok(SigningAlgorithm::Hs384),
            "HS512" => Ok(SigningAlgorithm::Hs512),
            other => Err(format!(
                "Unsupported signing algorithm '{other}'. Use HS256, HS384, or HS512."
            )),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings a [`SessionEngine`](crate::SessionEngine) is built from.
///
/// Everything except `refresh_token_ttl` is mandatory. A zero refresh lifetime
/// turns both session cookies into browser-session cookies.
#[derive(Clone, Default)]
pub struct TokenConfig {
    /// One of HS256, HS384, HS512 (any case).
    pub algorithm: String,
    pub issuer: String,
    pub audience: String,
    pub subject: String,
    /// Lifetime baked into the signed `exp` claim.
    pub access_token_ttl: Duration,
    /// HMAC secret.
    pub sign_key: String,
    /// Lifetime of both cookies and of the refresh token.
    pub refresh_token_ttl: Duration,
}

impl TokenConfig {
    pub fn is_valid(&self) -> bool {
        let required = [
            &self.algorithm,
            &self.issuer,
            &self.audience,
            &self.subject,
            &self.sign_key,
        ];
        if required.iter().any(|value| value.is_empty()) {
            return false;
        }
        if self.access_token_ttl.is_zero() {
            return false;
        }
        self.algorithm.parse::<SigningAlgorithm>().is_ok()
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("subject", &self.subject)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("sign_key", &"<redacted>")
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> TokenConfig {
        TokenConfig {
            algorithm: "HS256".to_string(),
            issuer: "issuer".to_string(),
            audience: "audience".to_string(),
            subject: "subject".to_string(),
            access_token_ttl: Duration::from_secs(60),
            sign_key: "secret".to_string(),
            refresh_token_ttl: Duration::from_secs(3600),
        }
    }

    #[test]
    fn complete_config_is_valid() {
        assert!(valid_config().is_valid());
    }

    #[test]
    fn refresh_ttl_is_optional() {
        let config = TokenConfig {
            refresh_token_ttl: Duration::ZERO,
            ..valid_config()
        };
        assert!(config.is_valid());
    }

    #[test]
    fn each_missing_field_is_rejected() {
        let mutations: [fn(&mut TokenConfig); 6] = [
            |c| c.algorithm.clear(),
            |c| c.issuer.clear(),
            |c| c.audience.clear(),
            |c| c.subject.clear(),
            |c| c.sign_key.clear(),
            |c| c.access_token_ttl = Duration::ZERO,
        ];
        for (index, mutate) in mutations.iter().enumerate() {
            let mut config = valid_config();
            mutate(&mut config);
            assert!(!config.is_valid(), "mutation {index} should invalidate config");
        }
    }

    #[test]
    fn algorithm_whitelist_is_case_insensitive() {
        for name in ["HS256", "hs256", "Hs384", "hS512"] {
            let config = TokenConfig {
                algorithm: name.to_string(),
                ..valid_config()
            };
            assert!(config.is_valid(), "{name} should be accepted");
        }
        for name in ["RS256", "none", "HS1024", "ES256", " HS256 ", "HS256\n"] {
            let config = TokenConfig {
                algorithm: name.to_string(),
                ..valid_config()
            };
            assert!(!config.is_valid(), "{name} should be rejected");
        }
    }

    #[test]
    fn debug_redacts_sign_key() {
        let rendered = format!("{:?}", valid_config());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("secret"));
    }
}
