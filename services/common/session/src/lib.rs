pub mod claims;
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod middleware;

pub use claims::{Claimer, RegisteredClaims};
pub use config::{SigningAlgorithm, TokenConfig};
pub use cookie::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use engine::{ClaimEnricher, RefreshApprover, SessionEngine, SessionEngineBuilder};
pub use error::{BoxError, CallbackOrigin, ClaimViolation, SessionError, SessionResult};
pub use exchange::SessionExchange;
pub use middleware::{require_session, Session};
