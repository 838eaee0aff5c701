//! Input validation utilities.
//!
//! This module provides validation functions for secret/variable names,
//! repository names, repository owners, and GitHub tokens to ensure they meet
//! GitHub API requirements before any request is made.

use anyhow::{Context, Result};
use regex::Regex;
use crate::constants;

/// Validate a secret or variable name according to GitHub API requirements.
///
/// # Errors
///
/// Returns an error if:
/// - The name is empty
/// - The name exceeds the maximum length
/// - The name contains characters other than letters, digits and underscores
/// - The name starts with a digit
/// - The name starts with the reserved `GITHUB_` prefix
pub fn validate_item_name(name: &str) -> Result<()> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        anyhow::bail!("Name cannot be empty");
    }

    if trimmed.len() > constants::validation::MAX_ITEM_NAME_LENGTH {
        anyhow::bail!(
            "Name cannot exceed {} characters (got {})",
            constants::validation::MAX_ITEM_NAME_LENGTH,
            trimmed.len()
        );
    }

    let re = Regex::new(constants::validation::VALID_ITEM_NAME_PATTERN)
        .context("Failed to compile validation regex")?;

    if !re.is_match(trimmed) {
        anyhow::bail!(
            "Name can only contain letters, numbers and underscores, and cannot start with a number. Got: '{}'",
            trimmed
        );
    }

    if trimmed
        .to_ascii_uppercase()
        .starts_with(constants::validation::RESERVED_NAME_PREFIX)
    {
        anyhow::bail!(
            "Name cannot start with the reserved prefix {}. Got: '{}'",
            constants::validation::RESERVED_NAME_PREFIX,
            trimmed
        );
    }

    Ok(())
}

/// Validate a repository owner (user or organization) name.
pub fn validate_repo_owner(owner: &str) -> Result<()> {
    let trimmed = owner.trim();

    if trimmed.is_empty() {
        anyhow::bail!("Repository owner cannot be empty");
    }

    if trimmed.len() > constants::repo::MAX_OWNER_LENGTH {
        anyhow::bail!(
            "Repository owner cannot exceed {} characters (got {})",
            constants::repo::MAX_OWNER_LENGTH,
            trimmed.len()
        );
    }

    Ok(())
}

/// Validate a repository name.
pub fn validate_repo_name(name: &str) -> Result<()> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        anyhow::bail!("Repository name cannot be empty");
    }

    if trimmed.len() > constants::repo::MAX_REPO_NAME_LENGTH {
        anyhow::bail!(
            "Repository name cannot exceed {} characters (got {})",
            constants::repo::MAX_REPO_NAME_LENGTH,
            trimmed.len()
        );
    }

    if trimmed.contains('/') {
        anyhow::bail!("Repository name cannot contain '/'. Got: '{}'", trimmed);
    }

    Ok(())
}

/// Validate a GitHub token format (basic checks).
///
/// GitHub tokens typically start with "ghp_" for personal access tokens
/// or "ghs_" for app installation tokens, but only length is checked here.
pub fn validate_token(token: &str) -> Result<()> {
    let trimmed = token.trim();

    if trimmed.is_empty() {
        anyhow::bail!("GitHub token cannot be empty");
    }

    if trimmed.len() < 20 {
        anyhow::bail!("GitHub token appears too short (minimum 20 characters)");
    }

    if trimmed.len() > 255 {
        anyhow::bail!("GitHub token appears too long (maximum 255 characters)");
    }

    Ok(())
}
