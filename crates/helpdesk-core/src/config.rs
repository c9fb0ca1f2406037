use std::path::Path;

use anyhow::{anyhow, Context, Result};
use helpdesk_service::ServiceConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelpdeskConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Directory for the daily rolling log file.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

/// Replace every `${VAR}` with the value of the environment variable, or the
/// empty string when it is unset. An unclosed `${` is kept verbatim.
pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

pub fn load_config(path: &Path) -> Result<HelpdeskConfig> {
    let mut config: HelpdeskConfig = read_yaml_file(path)?;
    resolve_service_env(&mut config.service);
    config.logging.dir = resolve_env_var(&config.logging.dir);
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &HelpdeskConfig) -> Result<()> {
    let base_url = config.service.base_url.trim();
    if base_url.is_empty() {
        return Err(anyhow!("service.base_url must not be empty"));
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(anyhow!(
            "service.base_url must be an http(s) URL: {base_url}"
        ));
    }
    if config.service.timeout_secs == 0 {
        return Err(anyhow!("service.timeout_secs must be greater than zero"));
    }
    if config.service.history_limit == 0 {
        return Err(anyhow!("service.history_limit must be greater than zero"));
    }
    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_service_env(service: &mut ServiceConfig) {
    service.base_url = resolve_env_var(&service.base_url);
    // An api_key that resolves to nothing means "no auth".
    service.api_key = service
        .api_key
        .as_deref()
        .map(resolve_env_var)
        .filter(|key| !key.is_empty());
}
