//! Error formatting utilities.
//!
//! This module provides helper functions for formatting error chains
//! into human-readable messages.

use anyhow::Error;

/// Format an error and its source chain into a single line.
///
/// Messages are joined with " → ", outermost context first.
///
/// # Example
///
/// ```
/// use gh_org_secrets::error::format_error_chain;
///
/// let err = anyhow::anyhow!("invalid token")
///     .context("Failed to create GitHub client");
/// assert_eq!(
///     format_error_chain(&err),
///     "Failed to create GitHub client → invalid token"
/// );
/// ```
pub fn format_error_chain(error: &Error) -> String {
    error
        .chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" → ")
}
