use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gh_org_secrets::errors::ReconcileError;
use gh_org_secrets::item::Scope;
use gh_org_secrets::key_cache::{KeyCache, KeyFetcher, KeyRecord, KeyTarget};
use tokio_test::{assert_err, assert_ok};

/// Hands out `k1`, `k2`, ... and counts calls. Owners starting with `missing`
/// are rejected the way GitHub rejects an unknown repository.
struct CountingFetcher {
    calls: AtomicUsize,
}

impl CountingFetcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyFetcher for CountingFetcher {
    async fn fetch_public_key(&self, target: &KeyTarget) -> Result<KeyRecord, ReconcileError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(50)).await;
        if target.owner.starts_with("missing") {
            return Err(ReconcileError::RequestRejected {
                status: 404,
                body: "Not Found".to_string(),
            });
        }
        Ok(KeyRecord {
            target: target.clone(),
            key_id: format!("k{}", call),
            key: "AAAA".to_string(),
        })
    }
}

#[tokio::test]
async fn test_concurrent_resolves_share_one_fetch() {
    let fetcher = CountingFetcher::new();
    let cache = Arc::new(KeyCache::new(fetcher.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.resolve(Scope::Organization, "acme").await })
        })
        .collect();

    for handle in handles {
        let record = assert_ok!(handle.await.unwrap());
        assert_eq!(record.key_id, "k1");
    }
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_targets_are_cached_independently() {
    let fetcher = CountingFetcher::new();
    let cache = KeyCache::new(fetcher.clone());

    let org = assert_ok!(cache.resolve(Scope::Organization, "acme").await);
    let repo = assert_ok!(cache.resolve(Scope::Repository, "acme/app").await);
    let org_again = assert_ok!(cache.resolve(Scope::Organization, "acme").await);

    assert_eq!(org.target, KeyTarget::new(Scope::Organization, "acme"));
    assert_eq!(repo.target, KeyTarget::new(Scope::Repository, "acme/app"));
    assert_eq!(org, org_again);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let fetcher = CountingFetcher::new();
    let cache = KeyCache::new(fetcher.clone());

    let first = assert_ok!(cache.resolve(Scope::Repository, "acme/app").await);
    cache.invalidate(Scope::Repository, "acme/app");
    let second = assert_ok!(cache.resolve(Scope::Repository, "acme/app").await);

    assert_eq!(first.key_id, "k1");
    assert_eq!(second.key_id, "k2");
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_rejected_fetch_is_key_unavailable_and_not_cached() {
    let fetcher = CountingFetcher::new();
    let cache = KeyCache::new(fetcher.clone());

    let err = assert_err!(cache.resolve(Scope::Repository, "missing/repo").await);
    match err {
        ReconcileError::KeyUnavailable { target, reason } => {
            assert_eq!(target, "repository missing/repo");
            assert!(reason.contains("404"));
        }
        other => panic!("expected KeyUnavailable, got {other:?}"),
    }

    assert_err!(cache.resolve(Scope::Repository, "missing/repo").await);
    assert_eq!(fetcher.calls(), 2);
}
