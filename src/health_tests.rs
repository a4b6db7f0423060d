// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `health.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::metrics;
    use std::time::Duration;

    async fn start(state: Arc<HealthState>) -> (String, CancellationToken) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let token = CancellationToken::new();
        tokio::spawn(serve(listener, state, token.clone()));
        (base, token)
    }

    #[tokio::test]
    async fn test_healthz_and_readiness() {
        let state = Arc::new(HealthState::new());
        let (base, token) = start(Arc::clone(&state)).await;
        let client = reqwest::Client::new();

        let live = client.get(format!("{base}/healthz")).send().await.unwrap();
        assert_eq!(live.status().as_u16(), 200);

        let ready = client.get(format!("{base}/readyz")).send().await.unwrap();
        assert_eq!(ready.status().as_u16(), 503);

        state.set_ready(true);
        let ready = client.get(format!("{base}/readyz")).send().await.unwrap();
        assert_eq!(ready.status().as_u16(), 200);

        token.cancel();
    }

    #[tokio::test]
    async fn test_metrics_endpoint_exposes_operator_metrics() {
        metrics::set_active_monitors(2);
        let (base, token) = start(Arc::new(HealthState::new())).await;

        let body = reqwest::Client::new()
            .get(format!("{base}/metrics"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("vault_operator_active_monitors"));
        token.cancel();
    }
}
