//! The reconciliation engine.
//!
//! Apply mode turns declarative rows into create-or-update calls, one
//! [`ApplyOutcome`] per row in input order. Fetch mode lists what exists into
//! the same [`Item`] shape.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::errors::{ReconcileError, ValidationError};
use crate::github::{GitHubClient, RemoteItem, Upsert};
use crate::item::{Item, ItemType, ItemValue, Kind, Row, Scope, SecretValue, Visibility};
use crate::key_cache::KeyCache;
use crate::rate_limit::RateLimitedClient;
use crate::{sealer, validation, visibility};

/// Which scopes a run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScopeFilter {
    #[value(name = "org")]
    Organization,
    #[value(name = "repo")]
    Repository,
    Both,
}

impl ScopeFilter {
    pub fn includes(self, scope: Scope) -> bool {
        match self {
            ScopeFilter::Both => true,
            ScopeFilter::Organization => scope == Scope::Organization,
            ScopeFilter::Repository => scope == Scope::Repository,
        }
    }
}

/// Result of applying one row.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Skipped(String),
    Failed(ReconcileError),
}

impl ApplyOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ApplyOutcome::Failed(_))
    }
}

impl From<Upsert> for ApplyOutcome {
    fn from(upsert: Upsert) -> Self {
        match upsert {
            Upsert::Created => ApplyOutcome::Created,
            Upsert::Updated => ApplyOutcome::Updated,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Carry variable values in the fetched items.
    pub include_values: bool,
    /// Also list each repository's deployment environments.
    pub include_environments: bool,
}

pub enum Mode {
    Apply(Vec<Row>),
    Fetch(FetchOptions),
}

/// A listing that failed during fetch; the fetch carried on without it.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub target: String,
    pub error: ReconcileError,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub items: Vec<Item>,
    pub failures: Vec<FetchFailure>,
    /// Set when cancellation stopped the fetch before every repository was listed.
    pub cancelled: bool,
}

#[derive(Debug)]
pub enum Reconciliation {
    Applied(Vec<ApplyOutcome>),
    Fetched(FetchReport),
}

pub struct ReconciliationEngine {
    github: Arc<GitHubClient>,
    keys: KeyCache,
    repository_ids: Mutex<HashMap<String, u64>>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl ReconciliationEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, ReconcileError> {
        let http = RateLimitedClient::new(
            config.token.clone(),
            config.api_url.as_deref(),
            config.retry.clone(),
        )?;
        let github = GitHubClient::new(http, config.organization.clone());
        Ok(Self::from_client(github, config.concurrency))
    }

    pub fn from_client(github: GitHubClient, concurrency: usize) -> Self {
        let github = Arc::new(github);
        Self {
            keys: KeyCache::new(github.clone()),
            github,
            repository_ids: Mutex::new(HashMap::new()),
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new rows (and new repository listings) once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn organization(&self) -> &str {
        self.github.organization()
    }

    /// Run one reconciliation pass.
    ///
    /// Fails only with `RunFatal`, when the organization cannot be reached
    /// before any row is attempted. Every per-row problem is reported in the
    /// returned outcomes instead.
    pub async fn reconcile(&self, mode: Mode, filter: ScopeFilter) -> Result<Reconciliation, ReconcileError> {
        if let Err(e) = self.github.check_access().await {
            error!(organization = self.organization(), error = %e, "cannot reach organization");
            return Err(ReconcileError::RunFatal(e.to_string()));
        }

        match mode {
            Mode::Apply(rows) => Ok(Reconciliation::Applied(self.apply_rows(rows, filter).await)),
            Mode::Fetch(options) => Ok(Reconciliation::Fetched(self.fetch(filter, options).await)),
        }
    }

    /// Decode and apply rows. Undecodable rows become `Failed` outcomes.
    pub async fn apply_rows(&self, rows: Vec<Row>, filter: ScopeFilter) -> Vec<ApplyOutcome> {
        let organization = self.organization().to_string();
        let items = rows
            .into_iter()
            .map(|row| Item::from_row(row, &organization))
            .collect();
        self.apply(items, filter).await
    }

    pub async fn apply_items(&self, items: Vec<Item>, filter: ScopeFilter) -> Vec<ApplyOutcome> {
        self.apply(items.into_iter().map(Ok).collect(), filter).await
    }

    async fn apply(
        &self,
        items: Vec<Result<Item, ValidationError>>,
        filter: ScopeFilter,
    ) -> Vec<ApplyOutcome> {
        // `buffered` yields in input order whatever order rows finish in.
        stream::iter(items)
            .map(|item| self.apply_one(item, filter))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn apply_one(&self, item: Result<Item, ValidationError>, filter: ScopeFilter) -> ApplyOutcome {
        if self.cancel.is_cancelled() {
            return ApplyOutcome::Skipped("run cancelled".to_string());
        }

        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "rejected row");
                return ApplyOutcome::Failed(e.into());
            }
        };
        let label = item.label();

        if !filter.includes(item.item_type.scope) {
            return ApplyOutcome::Skipped("outside requested scope".to_string());
        }
        if item.environment.is_some() {
            return ApplyOutcome::Skipped("environment items are fetch-only".to_string());
        }

        match self.apply_item(item).await {
            Ok(outcome) => {
                info!(item = %label, ?outcome, "applied");
                outcome
            }
            Err(e) => {
                warn!(item = %label, error = %e, "failed to apply");
                ApplyOutcome::Failed(e)
            }
        }
    }

    async fn apply_item(&self, item: Item) -> Result<ApplyOutcome, ReconcileError> {
        let mut item = visibility::normalize(item)?;
        item.name = item.name.trim().to_string();
        validation::validate_item_name(&item.name)
            .map_err(|e| ValidationError::Name(e.to_string()))?;
        let value = item
            .value
            .take()
            .ok_or_else(|| ValidationError::MissingValue(item.name.clone()))?;

        let ItemType { kind, scope } = item.item_type;
        let value = match (kind, value) {
            (Kind::Secret, ItemValue::Plain(plain)) => ItemValue::Secret(SecretValue::new(plain)),
            (Kind::Variable, ItemValue::Secret(_)) => {
                return Err(ValidationError::SecretValueForVariable(item.name.clone()).into());
            }
            (_, value) => value,
        };
        let selected = scope == Scope::Organization && item.visibility == Some(Visibility::Selected);

        // Resolved before the upsert so an unknown repository mutates nothing.
        let repository_ids = if selected {
            Some(self.resolve_repository_ids(&item.selected_repositories).await?)
        } else {
            None
        };

        let upsert = match value {
            ItemValue::Secret(secret) => self.upsert_secret(&item, &secret).await?,
            ItemValue::Plain(plain) => {
                self.github
                    .upsert_variable(scope, &item.owner, &item.name, item.visibility, &plain)
                    .await?
            }
        };

        if let Some(ids) = repository_ids {
            self.github
                .set_selected_repositories(kind, &item.name, &ids)
                .await?;
        }

        Ok(upsert.into())
    }

    /// Seal and put a secret. A 422 may mean the target's key rotated during
    /// the run: the key is refetched and, if its id changed, the secret is
    /// resealed and put once more.
    async fn upsert_secret(&self, item: &Item, secret: &SecretValue) -> Result<Upsert, ReconcileError> {
        let scope = item.item_type.scope;
        let key = self.keys.resolve(scope, &item.owner).await?;
        let payload = sealer::seal(secret, &key)?;

        match self
            .github
            .upsert_secret(scope, &item.owner, &item.name, item.visibility, &payload)
            .await
        {
            Err(rejected) if rejected.status() == Some(422) => {
                self.keys.invalidate(scope, &item.owner);
                let fresh = self.keys.resolve(scope, &item.owner).await?;
                if fresh.key_id == key.key_id {
                    return Err(rejected);
                }
                info!(target = %fresh.target, old = %key.key_id, new = %fresh.key_id, "public key rotated, resealing");
                let payload = sealer::seal(secret, &fresh)?;
                self.github
                    .upsert_secret(scope, &item.owner, &item.name, item.visibility, &payload)
                    .await
            }
            other => other,
        }
    }

    async fn resolve_repository_ids(&self, names: &BTreeSet<String>) -> Result<Vec<u64>, ReconcileError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let full_name = if name.contains('/') {
                name.clone()
            } else {
                format!("{}/{}", self.organization(), name)
            };

            let cached = self.cached_repository_id(&full_name);
            let id = match cached {
                Some(id) => id,
                None => {
                    let id = self.github.repository_id(&full_name).await?;
                    self.repository_ids
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .insert(full_name, id);
                    id
                }
            };
            ids.push(id);
        }
        Ok(ids)
    }

    fn cached_repository_id(&self, full_name: &str) -> Option<u64> {
        self.repository_ids
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(full_name)
            .copied()
    }

    /// List existing items. Organization items come first (variables, then
    /// secrets), then each repository's in listing order.
    pub async fn fetch(&self, filter: ScopeFilter, options: FetchOptions) -> FetchReport {
        let mut report = FetchReport::default();
        let organization = self.organization().to_string();

        if filter.includes(Scope::Organization) {
            for kind in [Kind::Variable, Kind::Secret] {
                self.fetch_organization_items(kind, options, &mut report).await;
            }
        }

        if !filter.includes(Scope::Repository) {
            return report;
        }

        let repositories = match self.github.list_repositories().await {
            Ok(repositories) => repositories,
            Err(e) => {
                report.record(format!("repositories of {}", organization), e);
                return report;
            }
        };
        info!(count = repositories.len(), "listing repository items");

        for (index, repository) in repositories.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            info!(repository = %repository.full_name, "{}/{}", index + 1, repositories.len());

            for kind in [Kind::Variable, Kind::Secret] {
                match self
                    .github
                    .list_items(kind, Scope::Repository, &repository.full_name)
                    .await
                {
                    Ok(remote) => report.items.extend(remote.into_iter().map(|r| {
                        to_item(ItemType::new(kind, Scope::Repository), &repository.full_name, r, options)
                    })),
                    Err(e) => report.record(format!("{} {}", repository.full_name, kind.collection()), e),
                }
            }

            if options.include_environments {
                self.fetch_environment_items(&repository.full_name, options, &mut report)
                    .await;
            }
        }

        report
    }

    /// List one kind of organization item. A failed selected-repositories
    /// lookup is recorded against that item, which is still reported.
    async fn fetch_organization_items(&self, kind: Kind, options: FetchOptions, report: &mut FetchReport) {
        let organization = self.organization();
        let remote = match self.github.list_items(kind, Scope::Organization, organization).await {
            Ok(remote) => remote,
            Err(e) => {
                report.record(format!("organization {} {}", organization, kind.collection()), e);
                return;
            }
        };

        let item_type = ItemType::new(kind, Scope::Organization);
        for r in remote {
            let selected = r.visibility.as_deref() == Some("selected");
            let name = r.name.clone();
            let mut item = to_item(item_type, organization, r, options);
            if selected {
                match self.github.list_selected_repositories(kind, &name).await {
                    Ok(repositories) => item.selected_repositories = repositories.into_iter().collect(),
                    Err(e) => report.record(format!("{} {} repositories", item_type, name), e),
                }
            }
            report.items.push(item);
        }
    }

    async fn fetch_environment_items(&self, repository: &str, options: FetchOptions, report: &mut FetchReport) {
        let environments = match self.github.list_environments(repository).await {
            Ok(environments) => environments,
            Err(e) => {
                report.record(format!("{} environments", repository), e);
                return;
            }
        };

        for environment in environments {
            for kind in [Kind::Variable, Kind::Secret] {
                match self
                    .github
                    .list_environment_items(kind, repository, &environment)
                    .await
                {
                    Ok(remote) => report.items.extend(remote.into_iter().map(|r| {
                        let mut item = to_item(ItemType::new(kind, Scope::Repository), repository, r, options);
                        item.environment = Some(environment.clone());
                        item
                    })),
                    Err(e) => report.record(
                        format!("{} environment {} {}", repository, environment, kind.collection()),
                        e,
                    ),
                }
            }
        }
    }
}

impl FetchReport {
    fn record(&mut self, target: String, error: ReconcileError) {
        error!(target = %target, error = %error, "listing failed");
        self.failures.push(FetchFailure { target, error });
    }
}

fn to_item(item_type: ItemType, owner: &str, remote: RemoteItem, options: FetchOptions) -> Item {
    let mut item = Item::new(item_type, remote.name, owner);
    if item_type.kind == Kind::Variable
        && options.include_values
        && let Some(value) = remote.value
    {
        item.value = Some(ItemValue::Plain(value));
    }
    item.visibility = match item_type.scope {
        Scope::Organization => remote.visibility.as_deref().and_then(|v| v.parse().ok()),
        Scope::Repository => None,
    };
    item.updated_at = remote.updated_at;
    item
}
