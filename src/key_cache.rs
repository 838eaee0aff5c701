//! Per-target cache of GitHub Actions public keys.
//!
//! One entry per (scope, owner). Concurrent first resolvers of the same target
//! share a single fetch; entries live for the run unless invalidated.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::ReconcileError;
use crate::item::Scope;

/// The organization or repository a public key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyTarget {
    pub scope: Scope,
    /// Organization login, or `owner/repo`.
    pub owner: String,
}

impl KeyTarget {
    pub fn new(scope: Scope, owner: impl Into<String>) -> Self {
        Self {
            scope,
            owner: owner.into(),
        }
    }
}

impl fmt::Display for KeyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.scope, self.owner)
    }
}

/// A target's public key as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub target: KeyTarget,
    pub key_id: String,
    /// Base64-encoded X25519 public key.
    pub key: String,
}

/// Source of public keys (the GitHub API in production).
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_public_key(&self, target: &KeyTarget) -> Result<KeyRecord, ReconcileError>;
}

type Entries = HashMap<KeyTarget, Arc<OnceCell<KeyRecord>>>;

pub struct KeyCache {
    fetcher: Arc<dyn KeyFetcher>,
    entries: Mutex<Entries>,
}

impl KeyCache {
    pub fn new(fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached key for the target, fetching it on first use.
    ///
    /// A rejected key request (unknown target, missing permission) surfaces as
    /// `KeyUnavailable`; nothing is cached on failure.
    pub async fn resolve(&self, scope: Scope, owner: &str) -> Result<KeyRecord, ReconcileError> {
        let target = KeyTarget::new(scope, owner);
        let cell = {
            let mut entries = self.lock();
            entries.entry(target.clone()).or_default().clone()
        };

        let record = cell
            .get_or_try_init(|| async {
                debug!(target = %target, "fetching public key");
                self.fetcher
                    .fetch_public_key(&target)
                    .await
                    .map_err(|e| match e {
                        ReconcileError::RequestRejected { status, body } => {
                            ReconcileError::KeyUnavailable {
                                target: target.to_string(),
                                reason: format!("status {}: {}", status, body),
                            }
                        }
                        other => other,
                    })
            })
            .await?;

        Ok(record.clone())
    }

    /// Drop the cached key so the next `resolve` refetches it.
    pub fn invalidate(&self, scope: Scope, owner: &str) {
        self.lock().remove(&KeyTarget::new(scope, owner));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
