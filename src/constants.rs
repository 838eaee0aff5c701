//! Application constants for API endpoints, validation rules, and retry behaviour.
//!
//! This module contains all constant values used throughout the application,
//! including GitHub API defaults, name validation constraints, and the
//! rate-limit/backoff parameters used by the HTTP layer.

/// GitHub API constants.
pub mod api {
    /// Public GitHub REST API base URL.
    pub const DEFAULT_BASE_URI: &str = "https://api.github.com";

    /// Page size requested from every list endpoint (GitHub maximum).
    pub const PER_PAGE: u32 = 100;

    /// Header carrying the remaining request budget of the current window.
    pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

    /// Header carrying the epoch second at which the window resets.
    pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

    /// Header carrying a relative wait in seconds (secondary limits, 429s).
    pub const RETRY_AFTER_HEADER: &str = "retry-after";
}

/// Item name validation constants.
pub mod validation {
    /// Maximum length for a secret or variable name.
    pub const MAX_ITEM_NAME_LENGTH: usize = 100;

    /// Letters, digits and underscores, not starting with a digit.
    pub const VALID_ITEM_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

    /// Prefix GitHub reserves for its own secrets and variables.
    pub const RESERVED_NAME_PREFIX: &str = "GITHUB_";
}

/// Retry and rate-limit constants for the GitHub API client.
pub mod retry {
    /// Attempts per request before giving up with `ExhaustedRetries`.
    pub const MAX_ATTEMPTS: u32 = 5;

    /// First backoff delay after a transient failure (in milliseconds).
    pub const BASE_DELAY_MS: u64 = 500;

    /// Upper bound for a single backoff delay (in milliseconds).
    pub const MAX_DELAY_MS: u64 = 30_000;

    /// Pause applied when a rate-limit response carries no reset hint (in seconds).
    pub const RATE_LIMIT_WAIT_SECS: u64 = 60;

    /// Longest pause honoured for a rate-limit reset (in seconds).
    pub const MAX_RATE_LIMIT_WAIT_SECS: u64 = 3600;
}

/// Reconciliation engine constants.
pub mod engine {
    /// Rows applied concurrently when no concurrency is configured.
    pub const DEFAULT_CONCURRENCY: usize = 4;
}

/// Repository validation constants.
pub mod repo {
    /// Maximum length for repository owner name.
    pub const MAX_OWNER_LENGTH: usize = 39; // GitHub username limit

    /// Maximum length for repository name.
    pub const MAX_REPO_NAME_LENGTH: usize = 100;
}
