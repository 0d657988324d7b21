pub mod app;
pub mod claims;
pub mod config;
pub mod handlers;
pub mod hooks;
pub mod metrics;
pub mod store;

pub use app::{router, AppState};
