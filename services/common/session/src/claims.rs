use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::BoxError;

/// Registered JWT claims shared by every session claim type.
///
/// Application claim types embed this with `#[serde(flatten)]` so the signed
/// payload keeps the registered names at the top level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    #[serde(default)]
    pub jti: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub nbf: i64,
    #[serde(default)]
    pub exp: i64,
}

/// Capabilities the engine needs from a claim type.
///
/// Only `registered` and `registered_mut` must be written by hand; the
/// accessors, `valid` and `render` have defaults. New instances are always made
/// through `Default`, never by copying another claim.
pub trait Claimer:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    fn registered(&self) -> &RegisteredClaims;

    fn registered_mut(&mut self) -> &mut RegisteredClaims;

    fn id(&self) -> &str {
        &self.registered().jti
    }

    fn set_id(&mut self, id: String) {
        self.registered_mut().jti = id;
    }

    fn issuer(&self) -> &str {
        &self.registered().iss
    }

    fn set_issuer(&mut self, issuer: String) {
        self.registered_mut().iss = issuer;
    }

    fn audience(&self) -> &str {
        &self.registered().aud
    }

    fn set_audience(&mut self, audience: String) {
        self.registered_mut().aud = audience;
    }

    fn subject(&self) -> &str {
        &self.registered().sub
    }

    fn set_subject(&mut self, subject: String) {
        self.registered_mut().sub = subject;
    }

    fn issued_at(&self) -> i64 {
        self.registered().iat
    }

    fn set_issued_at(&mut self, timestamp: i64) {
        self.registered_mut().iat = timestamp;
    }

    fn not_before(&self) -> i64 {
        self.registered().nbf
    }

    fn set_not_before(&mut self, timestamp: i64) {
        self.registered_mut().nbf = timestamp;
    }

    fn expires_at(&self) -> i64 {
        self.registered().exp
    }

    fn set_expires_at(&mut self, timestamp: i64) {
        self.registered_mut().exp = timestamp;
    }

    /// Domain-specific invariants checked after the registered claims pass.
    fn valid(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Fields safe to hand to an untrusted caller.
    fn render(&self) -> Value {
        let registered = self.registered();
        json!({
            "sub": registered.sub,
            "iat": registered.iat,
            "exp": registered.exp,
        })
    }
}

impl Claimer for RegisteredClaims {
    fn registered(&self) -> &RegisteredClaims {
        self
    }

    fn registered_mut(&mut self) -> &mut RegisteredClaims {
        self
    }
}
