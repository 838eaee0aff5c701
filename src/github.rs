use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ReconcileError;
use crate::item::{Kind, Scope, Visibility};
use crate::key_cache::{KeyFetcher, KeyRecord, KeyTarget};
use crate::rate_limit::RateLimitedClient;
use crate::sealer::SealedPayload;

#[derive(Debug, Deserialize)]
struct PublicKey {
    key_id: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    id: u64,
}

/// A repository as listed for an organization.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    pub id: u64,
    pub name: String,
    pub full_name: String,
}

/// A secret or variable as listed by GitHub.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteItem {
    pub name: String,
    /// Only variables carry a value.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Environment {
    name: String,
}

/// Whether an upsert created a new item or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

#[derive(Serialize)]
struct SecretBody<'a> {
    encrypted_value: &'a str,
    key_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<&'a str>,
}

#[derive(Serialize)]
struct VariableBody<'a> {
    name: &'a str,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<&'a str>,
}

#[derive(Serialize)]
struct SelectedRepositoriesBody<'a> {
    selected_repository_ids: &'a [u64],
}

/// Typed access to the Actions secrets/variables endpoints of one organization.
#[derive(Clone)]
pub struct GitHubClient {
    http: RateLimitedClient,
    organization: String,
}

impl GitHubClient {
    pub fn new(http: RateLimitedClient, organization: String) -> Self {
        Self { http, organization }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Confirm the organization is reachable with the current credential.
    pub async fn check_access(&self) -> Result<(), ReconcileError> {
        let path = format!("/orgs/{}", segment(&self.organization));
        self.http.get_json::<Value>(&path).await.map(|_| ())
    }

    /// Collection path for a kind of item under a scope, e.g.
    /// `/orgs/acme/actions/secrets` or `/repos/acme/app/actions/variables`.
    fn collection_path(&self, kind: Kind, scope: Scope, owner: &str) -> String {
        match scope {
            Scope::Organization => format!("/orgs/{}/actions/{}", segment(owner), kind.collection()),
            Scope::Repository => format!("/repos/{}/actions/{}", repository_segments(owner), kind.collection()),
        }
    }

    /// Put a sealed secret. GitHub answers 201 for a new secret and 204 for a
    /// replaced one.
    pub async fn upsert_secret(
        &self,
        scope: Scope,
        owner: &str,
        name: &str,
        visibility: Option<Visibility>,
        payload: &SealedPayload,
    ) -> Result<Upsert, ReconcileError> {
        let path = format!("{}/{}", self.collection_path(Kind::Secret, scope, owner), segment(name));
        let body = SecretBody {
            encrypted_value: &payload.encrypted_value,
            key_id: &payload.key_id,
            visibility: visibility.and_then(Visibility::as_api_str),
        };
        let status = self.http.put(&path, &body).await?;
        Ok(if status == StatusCode::CREATED {
            Upsert::Created
        } else {
            Upsert::Updated
        })
    }

    /// Update a variable in place, creating it when GitHub reports it missing.
    pub async fn upsert_variable(
        &self,
        scope: Scope,
        owner: &str,
        name: &str,
        visibility: Option<Visibility>,
        value: &str,
    ) -> Result<Upsert, ReconcileError> {
        let collection = self.collection_path(Kind::Variable, scope, owner);
        let body = VariableBody {
            name,
            value,
            visibility: visibility.and_then(Visibility::as_api_str),
        };

        match self.http.patch(&format!("{}/{}", collection, segment(name)), &body).await {
            Ok(_) => Ok(Upsert::Updated),
            Err(e) if e.status() == Some(404) => {
                self.http.post(&collection, &body).await?;
                Ok(Upsert::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the repositories that may read an organization item.
    pub async fn set_selected_repositories(
        &self,
        kind: Kind,
        name: &str,
        repository_ids: &[u64],
    ) -> Result<(), ReconcileError> {
        let path = format!(
            "{}/{}/repositories",
            self.collection_path(kind, Scope::Organization, &self.organization),
            segment(name)
        );
        let body = SelectedRepositoriesBody {
            selected_repository_ids: repository_ids,
        };
        self.http.put(&path, &body).await.map(|_| ())
    }

    /// Numeric id of `owner/name`.
    pub async fn repository_id(&self, full_name: &str) -> Result<u64, ReconcileError> {
        let path = format!("/repos/{}", repository_segments(full_name));
        let repo: RepositoryRef = self.http.get_json(&path).await?;
        Ok(repo.id)
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositoryInfo>, ReconcileError> {
        let path = format!("/orgs/{}/repos", segment(&self.organization));
        let values = self.http.get(&path, &[("type", "all")]).collect_items(None).await?;
        decode_all(values)
    }

    pub async fn list_items(
        &self,
        kind: Kind,
        scope: Scope,
        owner: &str,
    ) -> Result<Vec<RemoteItem>, ReconcileError> {
        let path = self.collection_path(kind, scope, owner);
        let values = self
            .http
            .get(&path, &[])
            .collect_items(Some(kind.collection()))
            .await?;
        decode_all(values)
    }

    /// Names of the repositories selected for an organization item.
    pub async fn list_selected_repositories(
        &self,
        kind: Kind,
        name: &str,
    ) -> Result<Vec<String>, ReconcileError> {
        let path = format!(
            "{}/{}/repositories",
            self.collection_path(kind, Scope::Organization, &self.organization),
            segment(name)
        );
        let values = self.http.get(&path, &[]).collect_items(Some("repositories")).await?;
        let repos: Vec<RepositoryInfo> = decode_all(values)?;
        Ok(repos.into_iter().map(|r| r.name).collect())
    }

    pub async fn list_environments(&self, repository: &str) -> Result<Vec<String>, ReconcileError> {
        let path = format!("/repos/{}/environments", repository_segments(repository));
        let values = self.http.get(&path, &[]).collect_items(Some("environments")).await?;
        let environments: Vec<Environment> = decode_all(values)?;
        Ok(environments.into_iter().map(|e| e.name).collect())
    }

    pub async fn list_environment_items(
        &self,
        kind: Kind,
        repository: &str,
        environment: &str,
    ) -> Result<Vec<RemoteItem>, ReconcileError> {
        let path = format!(
            "/repos/{}/environments/{}/{}",
            repository_segments(repository),
            segment(environment),
            kind.collection()
        );
        let values = self
            .http
            .get(&path, &[])
            .collect_items(Some(kind.collection()))
            .await?;
        decode_all(values)
    }
}

#[async_trait]
impl KeyFetcher for GitHubClient {
    async fn fetch_public_key(&self, target: &KeyTarget) -> Result<KeyRecord, ReconcileError> {
        let path = format!(
            "{}/public-key",
            self.collection_path(Kind::Secret, target.scope, &target.owner)
        );
        let key: PublicKey = self.http.get_json(&path).await?;
        Ok(KeyRecord {
            target: target.clone(),
            key_id: key.key_id,
            key: key.key,
        })
    }
}

/// Percent-encode one URL path segment.
fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Encode `owner/name` segment by segment, keeping the separator.
fn repository_segments(full_name: &str) -> String {
    full_name.split('/').map(segment).collect::<Vec<_>>().join("/")
}

fn decode_all<T: serde::de::DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>, ReconcileError> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(ReconcileError::from))
        .collect()
}
