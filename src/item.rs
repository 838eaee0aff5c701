//! The reconciliation data model.
//!
//! An [`Item`] is one secret or variable, either read from a declarative row
//! (apply) or listed from GitHub (fetch). [`Row`] is the flat, tabular shape
//! exchanged with row sources and sinks; it is decoded into an [`Item`] exactly
//! once at ingestion.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::errors::ValidationError;

/// Whether an item is encrypted at rest (secret) or stored in plaintext (variable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Secret,
    Variable,
}

impl Kind {
    /// Path segment used by the Actions API (`secrets` / `variables`).
    pub fn collection(self) -> &'static str {
        match self {
            Kind::Secret => "secrets",
            Kind::Variable => "variables",
        }
    }
}

/// Whether an item belongs to the organization or to one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Organization,
    Repository,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Organization => f.write_str("organization"),
            Scope::Repository => f.write_str("repository"),
        }
    }
}

/// The decoded `type` column: `org_secret`, `org_variable`, `repo_secret` or `repo_variable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemType {
    pub kind: Kind,
    pub scope: Scope,
}

impl ItemType {
    pub const ORG_SECRET: ItemType = ItemType::new(Kind::Secret, Scope::Organization);
    pub const ORG_VARIABLE: ItemType = ItemType::new(Kind::Variable, Scope::Organization);
    pub const REPO_SECRET: ItemType = ItemType::new(Kind::Secret, Scope::Repository);
    pub const REPO_VARIABLE: ItemType = ItemType::new(Kind::Variable, Scope::Repository);

    pub const fn new(kind: Kind, scope: Scope) -> Self {
        Self { kind, scope }
    }
}

impl FromStr for ItemType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "org_secret" => Ok(ItemType::ORG_SECRET),
            "org_variable" => Ok(ItemType::ORG_VARIABLE),
            "repo_secret" => Ok(ItemType::REPO_SECRET),
            "repo_variable" => Ok(ItemType::REPO_VARIABLE),
            _ => Err(ValidationError::UnknownType(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            Scope::Organization => "org",
            Scope::Repository => "repo",
        };
        let kind = match self.kind {
            Kind::Secret => "secret",
            Kind::Variable => "variable",
        };
        write!(f, "{}_{}", scope, kind)
    }
}

/// Which repositories of an organization may read an organization-level item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    All,
    Private,
    Selected,
    /// Repository-scoped items have no visibility.
    NotApplicable,
}

impl Visibility {
    /// Wire value for the API, `None` for [`Visibility::NotApplicable`].
    pub fn as_api_str(self) -> Option<&'static str> {
        match self {
            Visibility::All => Some("all"),
            Visibility::Private => Some("private"),
            Visibility::Selected => Some("selected"),
            Visibility::NotApplicable => None,
        }
    }
}

impl FromStr for Visibility {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Visibility::All),
            "private" => Ok(Visibility::Private),
            "selected" => Ok(Visibility::Selected),
            _ => Err(ValidationError::UnknownVisibility(s.trim().to_string())),
        }
    }
}

/// Write-only secret plaintext.
///
/// The only reader is the sealer; the value cannot be serialized, cloned or
/// printed, and its buffer is zeroed on drop.
pub struct SecretValue(Zeroizing<String>);

impl SecretValue {
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self(Zeroizing::new(plaintext.into()))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

/// An item's value: sealed before transmission for secrets, plaintext for variables.
#[derive(Debug)]
pub enum ItemValue {
    Secret(SecretValue),
    Plain(String),
}

/// One secret or variable.
#[derive(Debug)]
pub struct Item {
    pub item_type: ItemType,
    pub name: String,
    /// Organization login, or `owner/repo` for repository-scoped items.
    pub owner: String,
    /// Absent for every fetched secret: GitHub never discloses secret plaintext.
    pub value: Option<ItemValue>,
    pub visibility: Option<Visibility>,
    pub selected_repositories: BTreeSet<String>,
    /// Deployment environment, set only on fetched environment items.
    pub environment: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(item_type: ItemType, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            item_type,
            name: name.into(),
            owner: owner.into(),
            value: None,
            visibility: None,
            selected_repositories: BTreeSet::new(),
            environment: None,
            updated_at: None,
        }
    }

    /// Attach a value, wrapping it as a [`SecretValue`] for secrets.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(match self.item_type.kind {
            Kind::Secret => ItemValue::Secret(SecretValue::new(value)),
            Kind::Variable => ItemValue::Plain(value.into()),
        });
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_selected_repositories<I, S>(mut self, repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_repositories = repositories.into_iter().map(Into::into).collect();
        self
    }

    /// Short label for logs and summaries, e.g. `repo_variable org/app:ENV`.
    pub fn label(&self) -> String {
        match &self.environment {
            Some(env) => format!("{} {}[{}]:{}", self.item_type, self.owner, env, self.name),
            None => format!("{} {}:{}", self.item_type, self.owner, self.name),
        }
    }

    /// Decode a tabular row for the given organization.
    ///
    /// Bare repository names are qualified with `organization`; a
    /// `selectedrepositories` cell is split on commas with blanks dropped.
    pub fn from_row(row: Row, organization: &str) -> Result<Item, ValidationError> {
        let item_type: ItemType = row.item_type.parse()?;
        let name = row.name.trim().to_string();

        let owner = match item_type.scope {
            Scope::Organization => organization.to_string(),
            Scope::Repository => {
                let repository = row
                    .repository
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| {
                        ValidationError::Repository(format!("'{}' has no repository", name))
                    })?;
                qualify_repository(repository, organization)?
            }
        };

        let visibility = match row.visibility.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(v.parse()?),
        };

        let selected_repositories = row
            .selected_repositories
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect();

        let mut item = Item::new(item_type, name, owner);
        item.visibility = visibility;
        item.selected_repositories = selected_repositories;
        item.environment = row.environment.filter(|e| !e.trim().is_empty());
        if let Some(value) = row.value {
            item = item.with_value(value);
        }
        Ok(item)
    }

    /// Flatten into the tabular shape. Secret values are never written out.
    pub fn to_row(&self) -> Row {
        let value = match &self.value {
            Some(ItemValue::Plain(v)) => Some(v.clone()),
            Some(ItemValue::Secret(_)) | None => None,
        };
        let repository = match self.item_type.scope {
            Scope::Repository => Some(self.owner.clone()),
            Scope::Organization => None,
        };
        let selected = if self.selected_repositories.is_empty() {
            None
        } else {
            Some(
                self.selected_repositories
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };

        Row {
            item_type: self.item_type.to_string(),
            name: self.name.clone(),
            value,
            visibility: self
                .visibility
                .and_then(Visibility::as_api_str)
                .map(String::from),
            selected_repositories: selected,
            repository,
            environment: self.environment.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Qualify `name` as `organization/name` unless it already names an owner.
fn qualify_repository(repository: &str, organization: &str) -> Result<String, ValidationError> {
    let (owner, name) = match repository.split_once('/') {
        Some((owner, name)) => (owner, name),
        None => (organization, repository),
    };
    crate::validation::validate_repo_owner(owner)
        .map_err(|e| ValidationError::Repository(e.to_string()))?;
    crate::validation::validate_repo_name(name)
        .map_err(|e| ValidationError::Repository(e.to_string()))?;
    Ok(format!("{}/{}", owner, name))
}

/// A flat record as read from, or written to, a tabular file.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "type")]
    pub item_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(
        default,
        rename = "selectedrepositories",
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_repositories: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("type", &self.item_type)
            .field("name", &self.name)
            .field("value", &self.value.as_ref().map(|_| "***"))
            .field("visibility", &self.visibility)
            .field("selectedrepositories", &self.selected_repositories)
            .field("repository", &self.repository)
            .field("environment", &self.environment)
            .finish()
    }
}
