//! XDG-compliant path resolution for configuration files.
//!
//! This module provides functions to locate the configuration and environment
//! files following the XDG Base Directory Specification, with fallback to the
//! current directory.

use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "gh-org-secrets";
const LOCAL_CONFIG_FILE: &str = "gh-org-secrets.toml";

/// Find the configuration file.
/// Priority:
/// 1. CONFIG_PATH from environment (if set and present)
/// 2. Current directory/gh-org-secrets.toml
/// 3. ~/.config/gh-org-secrets/config.toml (default XDG location)
/// 4. XDG_CONFIG_HOME/gh-org-secrets/config.toml (if XDG_CONFIG_HOME is set)
///
/// When nothing exists, the XDG creation path is returned; callers treat a
/// missing file as "no configuration".
pub fn find_config_file() -> PathBuf {
    if let Ok(config_path) = env::var("CONFIG_PATH") {
        let path = PathBuf::from(&config_path);
        if path.exists() {
            return path;
        }
    }

    if let Ok(current_dir) = env::current_dir() {
        let local = current_dir.join(LOCAL_CONFIG_FILE);
        if local.exists() {
            return local;
        }
    }

    if let Some(home) = dirs::home_dir() {
        let default_xdg_config = home.join(".config").join(APP_DIR).join("config.toml");
        if default_xdg_config.exists() {
            return default_xdg_config;
        }
    }

    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        let xdg_config_path = PathBuf::from(xdg_config_home)
            .join(APP_DIR)
            .join("config.toml");
        if xdg_config_path.exists() {
            return xdg_config_path;
        }
    }

    get_config_creation_path()
}

/// Get the path where a new config file should be created.
pub fn get_config_creation_path() -> PathBuf {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config_home)
            .join(APP_DIR)
            .join("config.toml");
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".config").join(APP_DIR).join("config.toml");
    }

    PathBuf::from(LOCAL_CONFIG_FILE)
}

/// Load the first `.env` file found (current directory, then the XDG locations).
pub fn load_env_file() {
    let mut candidates = vec![PathBuf::from(".env")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".config").join(APP_DIR).join(".env"));
    }
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(xdg_config_home).join(APP_DIR).join(".env"));
    }

    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        let _ = dotenv::from_path(&path);
    }
}
