pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, parse_config, ConfigError};
pub use types::{
    Config, EmailConfig, HourlySummaryConfig, IngestorConfig, LoggingConfig, MonitorConfig,
    ShipperConfig, TimeWindowConfig,
};

/// Matches `$env{VAR_NAME}` placeholders.
pub(crate) const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Substitutes `$env{VAR}` placeholders with the variable's value.
/// Placeholders naming unset variables are left in place so validation can report them.
pub fn expand_env_vars(text: &str) -> String {
    let Ok(re) = Regex::new(ENV_VAR_PATTERN) else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &regex::Captures| {
        let whole = &caps[0];
        std::env::var(&caps[1]).unwrap_or_else(|_| whole.to_string())
    })
    .into_owned()
}

/// Expands a leading `~` to the current user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(home_dir) = dirs::home_dir() else {
        return path.to_path_buf();
    };

    match path.strip_prefix("~") {
        Ok(rest) => home_dir.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Candidate config locations, searched in order when `--config` is absent.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(".config/logsync/config.yml"));
    }
    paths.push(PathBuf::from("/etc/logsync/config.yml"));
    paths.push(PathBuf::from("./config.yml"));
    paths
}

/// Returns the explicit path (tilde-expanded) or the first default location that exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    default_config_paths().into_iter().find(|p| p.exists())
}
