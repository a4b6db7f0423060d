// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::try_parse_from(["vault-operator"]).unwrap();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.max_requeues, DEFAULT_MAX_REQUEUES);
        assert_eq!(config.monitor_interval(), Duration::from_secs(10));
        assert_eq!(config.unsealer_image, DEFAULT_UNSEALER_IMAGE);
        assert_eq!(config.health_addr.port(), 8080);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = OperatorConfig::try_parse_from([
            "vault-operator",
            "--workers",
            "8",
            "--max-requeues",
            "1",
            "--monitor-interval-secs",
            "30",
            "--unsealer-image",
            "registry.local/unsealer:dev",
            "--health-addr",
            "127.0.0.1:9090",
            "--log-format",
            "JSON",
        ])
        .unwrap();

        assert_eq!(config.worker_count(), 8);
        assert_eq!(config.max_requeues, 1);
        assert_eq!(config.monitor_interval(), Duration::from_secs(30));
        assert_eq!(
            config.image_settings().unsealer_image,
            "registry.local/unsealer:dev"
        );
        assert_eq!(config.health_addr.to_string(), "127.0.0.1:9090");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = OperatorConfig::try_parse_from([
            "vault-operator",
            "--workers",
            "0",
            "--monitor-interval-secs",
            "0",
        ])
        .unwrap();
        assert_eq!(config.worker_count(), 1);
        assert_eq!(config.monitor_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_health_addr_is_rejected() {
        assert!(OperatorConfig::try_parse_from(["vault-operator", "--health-addr", "nope"]).is_err());
    }
}
