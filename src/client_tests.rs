// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use crate::client::{status_merge_patch, ClusterClient};
    use crate::crd::{VaultServerStatus, VaultStatus};
    use crate::test_support::{apply_merge_patch, vault_server, FakeCluster};
    use serde_json::json;

    fn status_with_active(active: &str) -> VaultServerStatus {
        VaultServerStatus {
            initialized: true,
            vault_status: VaultStatus {
                active: Some(active.to_string()),
                unsealed: vec![active.to_string()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_patch_nulls_cleared_fields() {
        let current = status_with_active("vault-1-abc");
        let desired = VaultServerStatus::default();

        let patch = status_merge_patch(&current, &desired).unwrap();
        assert_eq!(patch["vaultStatus"]["active"], serde_json::Value::Null);

        let mut persisted = serde_json::to_value(&current).unwrap();
        apply_merge_patch(&mut persisted, &patch);
        let persisted: VaultServerStatus = serde_json::from_value(persisted).unwrap();
        assert_eq!(persisted, desired);
    }

    #[test]
    fn test_merge_patch_leaves_out_unchanged_fields() {
        let current = status_with_active("vault-1-abc");
        let mut desired = current.clone();
        desired.phase = Some("Running".to_string());

        let patch = status_merge_patch(&current, &desired).unwrap();
        assert_eq!(patch, json!({ "phase": "Running" }));
    }

    #[test]
    fn test_merge_patch_identical_status_is_empty() {
        let current = status_with_active("vault-1-abc");
        let patch = status_merge_patch(&current, &current).unwrap();
        assert_eq!(patch, json!({}));
    }

    #[tokio::test]
    async fn test_cleared_active_pod_settles_after_one_write() {
        let cluster = FakeCluster::new();
        let mut vs = vault_server("vault-1", "vault-system");
        vs.status = Some(status_with_active("vault-1-abc"));
        cluster.insert(&vs);

        let updated = cluster
            .update_status(&vs, |mut status| {
                status.vault_status = VaultStatus::default();
                status
            })
            .await
            .unwrap();
        let persisted = updated.status.unwrap().vault_status;
        assert!(persisted.active.is_none());
        assert!(persisted.unsealed.is_empty());

        cluster
            .update_status(&vs, |mut status| {
                status.vault_status = VaultStatus::default();
                status
            })
            .await
            .unwrap();
        assert_eq!(cluster.status_writes(), 1, "second write is a no-op");
    }
}
