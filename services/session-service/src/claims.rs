use chrono::{SecondsFormat, TimeZone, Utc};
use common_session::{BoxError, Claimer, RegisteredClaims};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Session claims issued to an authenticated account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountClaims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
    #[serde(default)]
    pub uid: Uuid,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claimer for AccountClaims {
    fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }

    fn registered_mut(&mut self) -> &mut RegisteredClaims {
        &mut self.registered
    }

    fn valid(&self) -> Result<(), BoxError> {
        if self.uid.is_nil() {
            return Err("session carries no account id".into());
        }
        if self.username.is_empty() {
            return Err("session carries no username".into());
        }
        Ok(())
    }

    fn render(&self) -> Value {
        let expires_at = Utc
            .timestamp_opt(self.registered.exp, 0)
            .single()
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true));
        json!({
            "user_id": self.uid,
            "username": self.username,
            "roles": self.roles,
            "expires_at": expires_at,
        })
    }
}
