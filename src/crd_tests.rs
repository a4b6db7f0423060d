// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::constants::{API_GROUP, API_GROUP_VERSION, API_VERSION};
    use crate::crd::*;
    use crate::test_support::vault_server;
    use kube::CustomResourceExt;

    #[test]
    fn test_key_and_derived_names() {
        let vs = vault_server("vault-1", "vault-system");
        assert_eq!(vs.key(), "vault-system/vault-1");
        assert_eq!(vs.tls_secret_name(), "vault-1-vault-tls");
        assert_eq!(vs.config_map_name(), "vault-1-vault-config");
        assert_eq!(vs.service_account_name(), "vault-1");
        assert_eq!(vs.display_identity(), "VaultServer vault-system/vault-1");
        assert!(!vs.uses_external_tls());
    }

    #[test]
    fn test_user_tls_secret_overrides_name() {
        let mut vs = vault_server("vault-1", "vault-system");
        vs.spec.tls = Some(TlsPolicy {
            tls_secret: Some("corp-tls".to_string()),
        });
        assert_eq!(vs.tls_secret_name(), "corp-tls");
        assert!(vs.uses_external_tls());

        vs.spec.tls = Some(TlsPolicy::default());
        assert!(!vs.uses_external_tls());
    }

    #[test]
    fn test_replicas_default() {
        let mut vs = vault_server("vault-1", "vault-system");
        vs.spec.replicas = None;
        assert_eq!(vs.replicas(), 1);
        vs.spec.replicas = Some(3);
        assert_eq!(vs.replicas(), 3);
    }

    #[test]
    fn test_offshoot_labels_contain_selector_labels() {
        let vs = vault_server("vault-1", "vault-system");
        let selector = vs.selector_labels();
        let offshoot = vs.offshoot_labels();
        for (k, v) in &selector {
            assert_eq!(offshoot.get(k), Some(v));
        }
        assert!(offshoot.len() > selector.len());
    }

    #[test]
    fn test_unsealer_share_defaults() {
        let spec = UnsealerSpec::default();
        assert_eq!(spec.secret_shares(), 5);
        assert_eq!(spec.secret_threshold(), 3);

        let spec = UnsealerSpec {
            secret_shares: Some(7),
            secret_threshold: Some(4),
            ..Default::default()
        };
        assert_eq!(spec.secret_shares(), 7);
        assert_eq!(spec.secret_threshold(), 4);
    }

    #[test]
    fn test_spec_deserializes_from_camel_case_yaml() {
        let yaml = r"
replicas: 3
version: 1.15.4
backend:
  etcd:
    address: https://etcd-0.etcd:2379
    tlsSecretName: etcd-client
unsealer:
  secretShares: 4
  storeRootToken: true
  mode:
    awsKmsSsm:
      kmsKeyId: alias/vault
tls:
  tlsSecret: corp-tls
";
        let spec: VaultServerSpec = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(spec.replicas, Some(3));
        let etcd = spec.backend.etcd.unwrap();
        assert_eq!(etcd.tls_secret_name.as_deref(), Some("etcd-client"));
        let unsealer = spec.unsealer.unwrap();
        assert_eq!(unsealer.secret_shares, Some(4));
        assert!(unsealer.store_root_token);
        assert_eq!(unsealer.mode.aws_kms_ssm.unwrap().kms_key_id, "alias/vault");
        assert_eq!(spec.tls.unwrap().tls_secret.as_deref(), Some("corp-tls"));
    }

    #[test]
    fn test_status_serialization_skips_unset_fields() {
        let status = VaultServerStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("observedGeneration").is_none());
        assert!(json.get("phase").is_none());
        assert_eq!(json["initialized"], false);
        assert_eq!(json["conditions"], serde_json::json!([]));
    }

    #[test]
    fn test_condition_serialization() {
        let condition = Condition {
            r#type: "Unsealed".to_string(),
            status: "True".to_string(),
            reason: Some("AllUnsealed".to_string()),
            message: None,
            last_transition_time: Some("2025-01-01T00:00:00Z".to_string()),
        };
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "Unsealed");
        assert_eq!(json["lastTransitionTime"], "2025-01-01T00:00:00Z");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_crd_definition() {
        let crd = VaultServer::crd();
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.names.kind, "VaultServer");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, API_VERSION);
        assert_eq!(VaultServer::api_resource().api_version, API_GROUP_VERSION);
        assert!(crd.spec.versions[0].subresources.is_some());
    }
}
