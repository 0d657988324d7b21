use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct SessionMetrics {
    registry: Registry,
    logins: IntCounterVec,
    refreshes: IntCounterVec,
}

impl SessionMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let logins = IntCounterVec::new(
            Opts::new("session_logins_total", "Count of logins grouped by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(logins.clone()))?;

        let refreshes = IntCounterVec::new(
            Opts::new(
                "session_refreshes_total",
                "Count of expired-session refresh attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(refreshes.clone()))?;

        Ok(Self {
            registry,
            logins,
            refreshes,
        })
    }

    pub fn login(&self, outcome: &str) {
        self.logins.with_label_values(&[outcome]).inc();
    }

    pub fn refresh(&self, outcome: &str) {
        self.refreshes.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_exported_with_outcome_label() {
        let metrics = SessionMetrics::new().expect("metrics");
        metrics.login("success");
        metrics.login("success");
        metrics.refresh("denied");

        let families = metrics.registry.gather();
        let logins = families
            .iter()
            .find(|family| family.get_name() == "session_logins_total")
            .expect("logins family");
        assert_eq!(logins.get_metric()[0].get_counter().get_value(), 2.0);
        assert!(families
            .iter()
            .any(|family| family.get_name() == "session_refreshes_total"));
    }
}
