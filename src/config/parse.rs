use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use regex::Regex;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("config section '{0}' is missing")]
    MissingSection(&'static str),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(inner) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), inner),
        )),
        other => other,
    })
}

/// Parse and validate config text. Environment placeholders are expanded first.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    // Full-line comments are skipped.
    let mut unexpanded: Vec<String> = yaml
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| re.captures_iter(line))
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    Err(ConfigError::Validation(format!(
        "environment variable(s) not set: {}. Export them or replace the $env{{..}} placeholders with literal values",
        unexpanded.join(", ")
    )))
}

fn expand_paths(config: &mut Config) {
    if let Some(shipper) = config.shipper.as_mut() {
        shipper.log_file = expand_tilde(&shipper.log_file);
        shipper.offset_file = expand_tilde(&shipper.offset_file);
    }

    if let Some(ingestor) = config.ingestor.as_mut() {
        ingestor.base_dir = expand_tilde(&ingestor.base_dir);
    }

    if let Some(monitor) = config.monitor.as_mut() {
        monitor.log_base_dir = expand_tilde(&monitor.log_base_dir);
        monitor.status_file = expand_tilde(&monitor.status_file);
        monitor.report_file = expand_tilde(&monitor.report_file);
        monitor.linecount_file = expand_tilde(&monitor.linecount_file);
        monitor.hour_state_file = expand_tilde(&monitor.hour_state_file);
    }

    if let Some(file) = config.logging.file.as_mut() {
        *file = expand_tilde(file);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if let Some(shipper) = &config.shipper {
        validate_shipper(shipper, &mut errors);
    }
    if let Some(ingestor) = &config.ingestor {
        validate_ingestor(ingestor, &mut errors);
    }
    if let Some(monitor) = &config.monitor {
        validate_monitor(monitor, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_shipper(shipper: &ShipperConfig, errors: &mut Vec<String>) {
    if shipper.chunk_size == 0 {
        errors.push("shipper.chunk_size must be at least 1".to_string());
    }
    if shipper.retry_attempts == 0 {
        errors.push("shipper.retry_attempts must be at least 1".to_string());
    }
    match reqwest::Url::parse(&shipper.receiver_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!(
            "shipper.receiver_url must use http or https, got '{}'",
            url.scheme()
        )),
        Err(e) => errors.push(format!(
            "shipper.receiver_url '{}' is not a valid URL: {}",
            shipper.receiver_url, e
        )),
    }
}

fn validate_ingestor(ingestor: &IngestorConfig, errors: &mut Vec<String>) {
    if ingestor.time_windows.is_empty() {
        errors.push("ingestor.time_windows must contain at least one window".to_string());
    }

    for (i, window) in ingestor.time_windows.iter().enumerate() {
        if window.start > window.end || window.end > 59 {
            errors.push(format!(
                "ingestor.time_windows[{}]: range {}..={} must satisfy start <= end <= 59",
                i, window.start, window.end
            ));
        }
        if !is_path_safe_label(&window.label) {
            errors.push(format!(
                "ingestor.time_windows[{}]: label '{}' must be non-empty and contain no path separators",
                i, window.label
            ));
        }
    }

    if !is_path_safe_label(&ingestor.fallback_window) {
        errors.push(format!(
            "ingestor.fallback_window '{}' must be non-empty and contain no path separators",
            ingestor.fallback_window
        ));
    }
    if !is_path_safe_label(&ingestor.file_prefix) {
        errors.push(format!(
            "ingestor.file_prefix '{}' must be non-empty and contain no path separators",
            ingestor.file_prefix
        ));
    }

    let uncovered: Vec<u32> = (0..60)
        .filter(|minute| {
            !ingestor
                .time_windows
                .iter()
                .any(|w| w.start <= *minute && *minute <= w.end)
        })
        .collect();
    if !uncovered.is_empty() {
        tracing::warn!(
            uncovered = ?uncovered,
            fallback = %ingestor.fallback_window,
            "time windows do not cover every minute; uncovered minutes use the fallback window"
        );
    }
}

fn validate_monitor(monitor: &MonitorConfig, errors: &mut Vec<String>) {
    if monitor.email.recipients.is_empty() {
        errors.push("monitor.email.recipients must list at least one address".to_string());
    }
    if monitor.hourly_summary.send_after_minutes > 59 {
        errors.push(format!(
            "monitor.hourly_summary.send_after_minutes must be at most 59, got {}",
            monitor.hourly_summary.send_after_minutes
        ));
    }
}

fn is_path_safe_label(label: &str) -> bool {
    !label.is_empty() && !label.contains(['/', '\\']) && label != "." && label != ".."
}
