//! # Recovery and Lease Lifecycle Tests
//!
//! Replay of uncommitted intents, rollback sweeps across a restart, and the
//! renew/revoke callbacks.

mod common;

use common::{harness, harness_with};
use k8s_secrets_engine::backend::{Backend, IssueRequest, ReplayRequest};
use k8s_secrets_engine::cluster::memory::ClusterOperation;
use k8s_secrets_engine::cluster::MemoryCluster;
use k8s_secrets_engine::connection::ConfigWriteRequest;
use k8s_secrets_engine::error::Error;
use k8s_secrets_engine::storage::{FileStorage, Storage};
use k8s_secrets_engine::wal::WalId;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_replay_revokes_even_if_secret_was_never_created() {
    let h = harness();
    h.configure(100, 200).await;

    h.backend
        .replay(ReplayRequest {
            kind: "secret".to_string(),
            payload: json!({"name": "vault-y-abcd1234", "namespace": "x"}),
        })
        .await
        .unwrap();

    assert_eq!(
        h.cluster.journal(),
        vec![ClusterOperation::Delete {
            namespace: "x".to_string(),
            name: "vault-y-abcd1234".to_string(),
            existed: false,
        }]
    );
}

#[tokio::test]
async fn test_replay_rejects_malformed_payload() {
    let h = harness();
    h.configure(100, 200).await;

    let err = h
        .backend
        .replay(ReplayRequest {
            kind: "secret".to_string(),
            payload: json!({"namespace": "x"}),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Codec(_)));
    assert!(h.cluster.journal().is_empty());
}

#[tokio::test]
async fn test_replay_without_config_fails() {
    let h = harness();
    let err = h
        .backend
        .replay(ReplayRequest {
            kind: "secret".to_string(),
            payload: json!({"name": "vault-y-abcd1234", "namespace": "x"}),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unconfigured));
}

#[tokio::test]
async fn test_rollback_removes_orphan_left_by_timeout() {
    let h = harness_with(MemoryCluster::with_populate_delay(u32::MAX));
    h.configure(100, 200).await;
    h.bind("b1", "x", "y").await;

    h.backend
        .issue("b1", IssueRequest::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(h.cluster.secrets().len(), 1);

    // Too young for the default sweep
    let report = h.backend.rollback(Duration::from_secs(300)).await.unwrap();
    assert!(report.replayed.is_empty());
    assert_eq!(h.wal_keys().await.len(), 1);

    let report = h.backend.rollback(Duration::ZERO).await.unwrap();
    assert_eq!(report.replayed.len(), 1);
    assert!(report.failed.is_empty());
    assert!(h.cluster.secrets().is_empty());
    assert!(h.wal_keys().await.is_empty());
}

#[tokio::test]
async fn test_undecodable_entry_does_not_block_rollback() {
    let h = harness_with(MemoryCluster::with_populate_delay(u32::MAX));
    h.configure(100, 200).await;
    h.bind("b1", "x", "y").await;
    h.backend
        .issue("b1", IssueRequest::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(h.cluster.secrets().len(), 1);

    h.storage
        .put(
            "wal/zzzz",
            serde_json::to_vec(&json!({
                "kind": "user",
                "data": {},
                "created_at": "2020-01-01T00:00:00Z"
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let report = h.backend.rollback(Duration::ZERO).await.unwrap();
    assert_eq!(report.replayed.len(), 1);
    assert_eq!(report.failed, vec![WalId::from("zzzz".to_string())]);
    assert!(h.cluster.secrets().is_empty());
    assert_eq!(h.wal_keys().await, vec!["zzzz"]);
}

#[tokio::test]
async fn test_failed_clear_is_reported_and_sweep_continues() {
    let h = harness_with(MemoryCluster::with_populate_delay(u32::MAX));
    h.configure(100, 200).await;
    h.bind("b1", "x", "y").await;
    for _ in 0..2 {
        h.backend
            .issue("b1", IssueRequest::default(), &CancellationToken::new())
            .await
            .unwrap_err();
    }
    assert_eq!(h.wal_keys().await.len(), 2);

    h.storage.fail_deletes_under("wal/");
    let report = h.backend.rollback(Duration::ZERO).await.unwrap();
    assert!(report.replayed.is_empty());
    assert_eq!(report.failed.len(), 2);
    // Both Secrets were revoked even though neither intent could be cleared
    assert!(h.cluster.secrets().is_empty());
    assert_eq!(h.wal_keys().await.len(), 2);

    h.storage.clear_failures();
    let report = h.backend.rollback(Duration::ZERO).await.unwrap();
    assert_eq!(report.replayed.len(), 2);
    assert!(report.failed.is_empty());
    assert!(h.wal_keys().await.is_empty());
}

#[tokio::test]
async fn test_intent_survives_restart_and_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = MemoryCluster::with_populate_delay(u32::MAX);

    {
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let backend = Backend::builder(Arc::new(storage), Arc::new(cluster.clone()))
            .poll(common::fast_poll())
            .build();
        backend
            .write_config(ConfigWriteRequest {
                ca: Some(common::TEST_CA.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        backend
            .write_binding(
                "b1",
                k8s_secrets_engine::binding::BindingWriteRequest {
                    namespace: Some("x".to_string()),
                    service_account_name: Some("y".to_string()),
                },
            )
            .await
            .unwrap();
        backend
            .issue("b1", IssueRequest::default(), &CancellationToken::new())
            .await
            .unwrap_err();
    }
    assert_eq!(cluster.secrets().len(), 1);

    let storage = FileStorage::open(dir.path()).await.unwrap();
    assert_eq!(storage.list("wal/").await.unwrap().len(), 1);
    let backend = Backend::builder(Arc::new(storage.clone()), Arc::new(cluster.clone())).build();

    let report = backend.rollback(Duration::ZERO).await.unwrap();
    assert_eq!(report.replayed.len(), 1);
    assert!(cluster.secrets().is_empty());
    assert!(storage.list("wal/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let h = harness();
    h.configure(100, 200).await;
    h.bind("b1", "x", "y").await;
    let keep = h
        .backend
        .issue("b1", IssueRequest::default(), &CancellationToken::new())
        .await
        .unwrap();
    let lease = h
        .backend
        .issue("b1", IssueRequest::default(), &CancellationToken::new())
        .await
        .unwrap();

    h.backend.revoke(&lease).await.unwrap();
    h.backend.revoke(&lease).await.unwrap();

    assert_eq!(
        h.cluster.secrets(),
        vec![("x".to_string(), keep.internal.secret_name.clone())]
    );
}

#[tokio::test]
async fn test_renew_follows_current_config_without_touching_cluster() {
    let h = harness();
    h.configure(100, 200).await;
    h.bind("b1", "x", "y").await;
    let lease = h
        .backend
        .issue("b1", IssueRequest::default(), &CancellationToken::new())
        .await
        .unwrap();
    let operations = h.cluster.journal().len();

    h.backend
        .write_config(ConfigWriteRequest {
            ttl: Some(150),
            max_ttl: Some(300),
            ..Default::default()
        })
        .await
        .unwrap();
    let renewed = h.backend.renew(lease.clone()).await.unwrap();

    assert_eq!(renewed.ttl, Duration::from_secs(150));
    assert_eq!(renewed.max_ttl, Duration::from_secs(300));
    assert_eq!(renewed.data, lease.data);
    assert_eq!(renewed.internal, lease.internal);
    assert_eq!(h.cluster.journal().len(), operations);
}
