use anyhow::{bail, Context, Result};
use listener_engine::{BackoffPolicy, BufferPolicy, ChannelRegistry, ForwardMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One pump variant, fully described by its config file. The engine itself
/// is variant-agnostic; everything that differs between pump A and pump B
/// lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    pub variant: String,
    /// Explicit sink base URL; when absent, taken from the env var named by
    /// `base_url_env` (`BASE_URL` for pump A, `BASE_URL_B` for pump B).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,
    /// Route of the consolidated-record endpoint, appended to the base URL.
    #[serde(default = "default_record_route")]
    pub record_route: String,
    pub channels: Vec<ChannelConf>,
    pub required_fields: Vec<String>,
    pub threshold: usize,
    #[serde(default)]
    pub default_values: HashMap<String, f64>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_forward_timeout_secs")]
    pub forward_timeout_secs: u64,
    #[serde(default)]
    pub forward_mode: ForwardMode,
    #[serde(default)]
    pub per_channel_forward: bool,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConf {
    pub channel: String,
    pub field: String,
    #[serde(default)]
    pub route: Option<String>,
}

fn default_base_url_env() -> String {
    "BASE_URL".into()
}

fn default_record_route() -> String {
    "/prediccion_conjunto".into()
}

fn default_capacity() -> usize {
    10
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_forward_timeout_secs() -> u64 {
    30
}

fn default_health_port() -> u16 {
    8081
}

impl VariantConfig {
    pub fn registry(&self) -> ChannelRegistry {
        let mut registry = ChannelRegistry::new();
        for conf in &self.channels {
            registry.insert(conf.channel.clone(), conf.field.clone(), conf.route.clone());
        }
        registry
    }

    pub fn buffer_policy(&self) -> BufferPolicy {
        BufferPolicy {
            required_fields: self.required_fields.clone(),
            threshold: self.threshold,
            default_values: self.default_values.clone(),
            capacity: self.capacity,
        }
    }

    pub fn resolve_base_url(&self) -> Result<String> {
        let url = match &self.base_url {
            Some(url) => url.clone(),
            None => std::env::var(&self.base_url_env)
                .with_context(|| format!("{} is not set", self.base_url_env))?,
        };
        Ok(url.trim_end_matches('/').to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            bail!("variant '{}' has no channels", self.variant);
        }
        if self.threshold == 0 || self.threshold > self.required_fields.len() {
            bail!(
                "threshold {} is outside 1..={} required fields",
                self.threshold,
                self.required_fields.len()
            );
        }
        // Every required field must be producible by some channel.
        for field in &self.required_fields {
            if !self.channels.iter().any(|c| &c.field == field) {
                bail!("required field '{field}' has no channel mapped to it");
            }
        }
        Ok(())
    }
}

/// Load the variant config from the path in `PUMP_LISTENER_CONFIG`
/// (defaults to pump A). A missing or invalid file is fatal: without the
/// channel table there is nothing to listen to.
pub fn load_variant_config() -> Result<VariantConfig> {
    let path =
        std::env::var("PUMP_LISTENER_CONFIG").unwrap_or_else(|_| "configs/pump_a.yaml".into());
    let text = std::fs::read_to_string(Path::new(&path))
        .with_context(|| format!("failed to read config file '{path}'"))?;
    let cfg: VariantConfig =
        serde_yaml::from_str(&text).with_context(|| format!("invalid config file '{path}'"))?;
    Ok(cfg)
}

/// Postgres connection string from the same env variables the original
/// deployment used (loaded from `.env` by dotenvy).
pub fn database_dsn() -> Result<String> {
    let name = std::env::var("DB_NAME").context("DB_NAME is not set")?;
    let user = std::env::var("DB_USER").context("DB_USER is not set")?;
    let password = std::env::var("DB_PASSWORD").context("DB_PASSWORD is not set")?;
    let host = std::env::var("DB_HOST").context("DB_HOST is not set")?;
    let port: u16 = std::env::var("DB_PORT")
        .unwrap_or_else(|_| "5432".into())
        .parse()
        .context("DB_PORT must be a port number")?;
    Ok(format!(
        "host={host} port={port} user={user} password={password} dbname={name}"
    ))
}

/// Health port, overridable per process with HEALTH_PORT so two variants can
/// run side by side without touching the config files.
pub fn health_port(cfg: &VariantConfig) -> u16 {
    std::env::var("HEALTH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(cfg.health_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
variant: pump_test
base_url: http://backend:8000/
channels:
  - channel: canal_presion_agua
    field: presion_agua
    route: /prediccion_presion_agua
  - channel: canal_voltaje_barra
    field: voltaje_barra
required_fields:
  - presion_agua
  - voltaje_barra
threshold: 1
default_values:
  voltaje_barra: 13.8
backoff:
  base_delay_ms: 500
  initial_retry_budget: 5
"#;

    #[test]
    fn test_parse_sample_config() {
        let cfg: VariantConfig = serde_yaml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.variant, "pump_test");
        assert_eq!(cfg.channels.len(), 2);
        assert_eq!(cfg.threshold, 1);
        assert_eq!(cfg.default_values["voltaje_barra"], 13.8);
        // Defaults fill what the file omits.
        assert_eq!(cfg.capacity, 10);
        assert_eq!(cfg.poll_timeout_secs, 10);
        assert_eq!(cfg.forward_mode, ForwardMode::Blocking);
        assert!(!cfg.per_channel_forward);
        assert_eq!(cfg.backoff.base_delay_ms, 500);
        assert_eq!(cfg.backoff.initial_retry_budget, 5);
        // Struct-level default applies to omitted backoff fields.
        assert_eq!(cfg.backoff.max_delay_ms, 60_000);
    }

    #[test]
    fn test_registry_and_policy_from_config() {
        let cfg: VariantConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let registry = cfg.registry();
        assert_eq!(registry.field_for("canal_presion_agua"), Some("presion_agua"));
        assert_eq!(registry.route_for("canal_voltaje_barra"), None);

        let policy = cfg.buffer_policy();
        assert_eq!(policy.required_fields.len(), 2);
        assert_eq!(policy.threshold, 1);
    }

    #[test]
    fn test_explicit_base_url_wins_and_is_trimmed() {
        let cfg: VariantConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.resolve_base_url().unwrap(), "http://backend:8000");
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut cfg: VariantConfig = serde_yaml::from_str(SAMPLE).unwrap();
        cfg.threshold = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unmapped_required_field() {
        let mut cfg: VariantConfig = serde_yaml::from_str(SAMPLE).unwrap();
        cfg.required_fields.push("caudal_fantasma".into());
        assert!(cfg.validate().is_err());
    }
}
