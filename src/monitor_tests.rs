// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `monitor.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::reconcilers::status::{failure_status, find_condition};
    use crate::status_reasons::CONDITION_TYPE_FAILURE;
    use crate::test_support::{running_pod, vault_server, FakeCluster, FakeProbe};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NS: &str = "vault-system";

    fn seal(initialized: bool, sealed: bool, standby: bool) -> SealStatus {
        SealStatus {
            initialized,
            sealed,
            standby,
        }
    }

    fn tls_secret(vs: &VaultServer) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(
            TLS_CA_CERT_KEY.to_string(),
            ByteString(b"-----BEGIN CERTIFICATE-----\nca\n-----END CERTIFICATE-----\n".to_vec()),
        );
        Secret {
            metadata: ObjectMeta {
                name: Some(vs.tls_secret_name()),
                namespace: Some(NS.to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    struct Harness {
        cluster: Arc<FakeCluster>,
        probe: Arc<FakeProbe>,
        monitor: HealthMonitor<FakeCluster>,
    }

    fn harness(pods: &[(&str, &str)]) -> Harness {
        let vs = vault_server("vault-1", NS);
        let cluster = FakeCluster::new();
        cluster.insert(&vs);
        cluster.insert(&tls_secret(&vs));
        cluster.set_pods(
            pods.iter()
                .map(|(name, ip)| running_pod(name, NS, ip, vs.selector_labels()))
                .collect(),
        );
        let probe = Arc::new(FakeProbe::default());
        let monitor = HealthMonitor::new(
            Arc::clone(&cluster),
            probe.clone(),
            vs,
            Duration::from_secs(3600),
        );
        Harness {
            cluster,
            probe,
            monitor,
        }
    }

    fn stored_status(cluster: &FakeCluster) -> VaultServerStatus {
        cluster
            .vault_server(NS, "vault-1")
            .and_then(|vs| vs.status)
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_registry_starts_one_monitor_per_key() {
        let registry = MonitorRegistry::new();
        let started = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let started = Arc::clone(&started);
            registry.ensure_started("ns/a", move |token| async move {
                started.fetch_add(1, Ordering::SeqCst);
                token.cancelled().await;
            });
        }
        registry.ensure_started("ns/b", |token| async move { token.cancelled().await });

        assert_eq!(registry.len(), 2);
        assert!(registry.is_running("ns/a"));
        tokio::task::yield_now().await;
        assert!(started.load(Ordering::SeqCst) <= 1);

        registry.shutdown().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registry_stop_cancels_the_task() {
        let registry = MonitorRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        registry.ensure_started("ns/a", move |token| async move {
            token.cancelled().await;
            let _ = tx.send(());
        });

        assert!(registry.stop("ns/a"));
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(!registry.is_running("ns/a"));
        assert!(!registry.stop("ns/a"), "second stop is a no-op");
    }

    #[tokio::test]
    async fn test_registry_replaces_finished_monitor() {
        let registry = MonitorRegistry::new();
        registry.ensure_started("ns/a", |_| async {});
        for _ in 0..100 {
            if !registry.is_running("ns/a") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!registry.is_running("ns/a"));

        assert!(registry.ensure_started("ns/a", |token| async move {
            token.cancelled().await;
        }));
        assert!(registry.is_running("ns/a"));
        assert_eq!(registry.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_monitor_run_exits_on_cancellation() {
        let h = harness(&[]);
        let token = CancellationToken::new();
        let task = tokio::spawn(h.monitor.run(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.cluster.status_writes(), 0);
    }

    // ------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------

    #[test]
    fn test_summarize_all_unsealed() {
        let obs = summarize(&[
            ("vault-1-b".to_string(), seal(true, false, true)),
            ("vault-1-a".to_string(), seal(true, false, false)),
        ]);

        assert!(obs.initialized);
        assert_eq!(obs.vault_status.active.as_deref(), Some("vault-1-a"));
        assert_eq!(obs.vault_status.standby, vec!["vault-1-b"]);
        assert_eq!(obs.vault_status.unsealed, vec!["vault-1-a", "vault-1-b"]);
        assert!(obs.vault_status.sealed.is_empty());
        assert_eq!(obs.unsealed.status, CONDITION_STATUS_TRUE);
        assert_eq!(obs.unsealed.reason.as_deref(), Some(REASON_ALL_UNSEALED));
        assert_eq!(obs.unsealed.message.as_deref(), Some("2 of 2 pods unsealed"));
    }

    #[test]
    fn test_summarize_some_sealed() {
        let obs = summarize(&[
            ("p1".to_string(), seal(true, true, false)),
            ("p0".to_string(), seal(true, false, false)),
            ("p2".to_string(), seal(true, true, false)),
        ]);

        assert_eq!(obs.vault_status.sealed, vec!["p1", "p2"]);
        assert_eq!(obs.vault_status.active.as_deref(), Some("p0"));
        assert_eq!(obs.unsealed.status, CONDITION_STATUS_FALSE);
        assert_eq!(obs.unsealed.reason.as_deref(), Some(REASON_SOME_SEALED));
        assert_eq!(obs.unsealed.message.as_deref(), Some("2 of 3 pods sealed"));
    }

    #[test]
    fn test_summarize_uninitialized() {
        let obs = summarize(&[("p0".to_string(), seal(false, true, false))]);
        assert!(!obs.initialized);
        assert!(obs.vault_status.active.is_none());
        assert_eq!(obs.unsealed.reason.as_deref(), Some(REASON_NOT_INITIALIZED));
    }

    #[test]
    fn test_apply_observation_keeps_reconciler_conditions() {
        let status = failure_status(VaultServerStatus::default(), "FailedToDeployVault", "boom");
        let obs = summarize(&[("p0".to_string(), seal(true, false, false))]);

        let status = apply_observation(status, &obs, "vault-1");

        assert_eq!(status.phase.as_deref(), Some(PHASE_RUNNING));
        assert_eq!(status.service_name.as_deref(), Some("vault-1"));
        assert_eq!(status.client_port, Some(8200));
        assert!(find_condition(&status.conditions, CONDITION_TYPE_FAILURE).is_some());
        assert!(find_condition(&status.conditions, CONDITION_TYPE_UNSEALED).is_some());
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_observe_publishes_seal_state() {
        let h = harness(&[("vault-1-a", "10.0.0.1"), ("vault-1-b", "10.0.0.2")]);
        h.probe.set("vault-1-a", seal(true, false, false));
        h.probe.set("vault-1-b", seal(true, true, false));

        h.monitor.observe_once().await.unwrap();

        let status = stored_status(&h.cluster);
        assert!(status.initialized);
        assert_eq!(status.vault_status.sealed, vec!["vault-1-b"]);
        let unsealed = find_condition(&status.conditions, CONDITION_TYPE_UNSEALED).unwrap();
        assert_eq!(unsealed.reason.as_deref(), Some(REASON_SOME_SEALED));
    }

    #[tokio::test]
    async fn test_observe_is_quiet_when_nothing_changes() {
        let h = harness(&[("vault-1-a", "10.0.0.1")]);
        h.probe.set("vault-1-a", seal(true, false, false));

        h.monitor.observe_once().await.unwrap();
        h.monitor.observe_once().await.unwrap();

        assert_eq!(h.cluster.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_observe_without_running_pods() {
        let h = harness(&[]);
        let obs = h.monitor.observe().await.unwrap();
        assert_eq!(obs.unsealed.status, CONDITION_STATUS_FALSE);
        assert_eq!(obs.unsealed.reason.as_deref(), Some(REASON_NO_RUNNING_PODS));
    }

    #[tokio::test]
    async fn test_observe_skips_terminating_and_pending_pods() {
        let h = harness(&[("vault-1-a", "10.0.0.1")]);
        let labels = h.monitor.vs.selector_labels();
        let mut pending = running_pod("vault-1-b", NS, "10.0.0.2", labels.clone());
        pending.status.as_mut().unwrap().phase = Some("Pending".to_string());
        let mut terminating = running_pod("vault-1-c", NS, "10.0.0.3", labels.clone());
        terminating.metadata.deletion_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(k8s_openapi::jiff::Timestamp::now()),
        );
        h.cluster.set_pods(vec![
            running_pod("vault-1-a", NS, "10.0.0.1", labels),
            pending,
            terminating,
        ]);
        h.probe.set("vault-1-a", seal(true, false, false));

        let obs = h.monitor.observe().await.unwrap();

        assert_eq!(obs.vault_status.unsealed, vec!["vault-1-a"]);
        assert_eq!(obs.unsealed.message.as_deref(), Some("1 of 1 pods unsealed"));
    }

    #[tokio::test]
    async fn test_failed_probes_publish_unknown_condition() {
        let h = harness(&[("vault-1-a", "10.0.0.1")]);

        let err = h.monitor.observe().await.unwrap_err();
        assert!(matches!(err, ObservationError::AllProbesFailed { count: 1, .. }));

        h.monitor.observe_once().await.unwrap();
        let status = stored_status(&h.cluster);
        let unsealed = find_condition(&status.conditions, CONDITION_TYPE_UNSEALED).unwrap();
        assert_eq!(unsealed.status, CONDITION_STATUS_UNKNOWN);
        assert_eq!(unsealed.reason.as_deref(), Some(REASON_HEALTH_CHECK_FAILED));
    }

    #[tokio::test]
    async fn test_missing_ca_bundle_is_an_observation_error() {
        let vs = vault_server("vault-1", NS);
        let cluster = FakeCluster::new();
        cluster.insert(&vs);
        cluster.set_pods(vec![running_pod("vault-1-a", NS, "10.0.0.1", vs.selector_labels())]);
        let monitor = HealthMonitor::new(
            cluster,
            Arc::new(FakeProbe::default()),
            vs,
            Duration::from_secs(3600),
        );

        let err = monitor.observe().await.unwrap_err();
        assert!(matches!(err, ObservationError::CaBundle(_)));
    }

    #[tokio::test]
    async fn test_list_failure_is_published_as_unknown() {
        let h = harness(&[("vault-1-a", "10.0.0.1")]);
        h.cluster.fail_kind("Pod", 500);

        h.monitor.observe_once().await.unwrap();

        let status = stored_status(&h.cluster);
        let unsealed = find_condition(&status.conditions, CONDITION_TYPE_UNSEALED).unwrap();
        assert_eq!(unsealed.status, CONDITION_STATUS_UNKNOWN);
    }

    #[tokio::test]
    async fn test_publish_error_is_returned() {
        let h = harness(&[]);
        h.cluster.fail_kind("VaultServer", 409);
        assert!(h.monitor.observe_once().await.is_err());
    }

    // ------------------------------------------------------------------
    // HTTP probe
    // ------------------------------------------------------------------

    fn target(ip: &str) -> ProbeTarget {
        ProbeTarget {
            pod_name: "vault-1-a".to_string(),
            pod_ip: ip.to_string(),
            namespace: NS.to_string(),
            ca_pem: String::new(),
        }
    }

    #[test]
    fn test_health_url_uses_pod_dns_name() {
        let url = HttpSealProbe::new().health_url(&target("10.1.2.3"));
        assert_eq!(
            url,
            "https://10-1-2-3.vault-system.pod:8200/v1/sys/health?standbyok=true&sealedcode=200&uninitcode=200&perfstandbyok=true"
        );
    }

    #[tokio::test]
    async fn test_http_probe_reads_health_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .and(query_param("sealedcode", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "initialized": true,
                "sealed": false,
                "standby": true,
                "version": "1.15.4"
            })))
            .mount(&server)
            .await;

        let probe = HttpSealProbe::plain_http(server.address().port());
        let status = probe.probe(&target("127.0.0.1")).await.unwrap();

        assert_eq!(status, seal(true, false, true));
    }

    #[tokio::test]
    async fn test_http_probe_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HttpSealProbe::plain_http(server.address().port());
        let err = probe.probe(&target("127.0.0.1")).await.unwrap_err();

        assert!(matches!(err, ProbeError::UnexpectedStatus { status: 503, .. }));
    }
}
