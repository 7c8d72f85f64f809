use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment variable naming a TOML config file.
pub const ENV_CONFIG_PATH: &str = "OPSHUB_CONFIG";

const ENV_NLQ_BASE: &str = "OPSHUB_NLQ_BASE";
const ENV_ORBIT_BASE: &str = "OPSHUB_ORBIT_BASE";
const ENV_METABASE_BASE: &str = "OPSHUB_METABASE_BASE";
const ENV_NLQ_MODEL: &str = "OPSHUB_NLQ_MODEL";
const ENV_NLQ_DATABASE: &str = "OPSHUB_NLQ_DATABASE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(String),
    #[error("invalid config: {}", .0.join(", "))]
    Invalid(Vec<String>),
}

/// Body naming used for `POST /query/stream`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStyle {
    /// `{question, selected_llm_model, selected_llm_api_base}`
    #[default]
    Current,
    /// `{question, database, model, api_base}`
    Legacy,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct NlqConfig {
    pub base_url: String,
    pub default_database: String,
    pub default_model: String,
    pub request_style: RequestStyle,
    /// Seconds without a chunk before a stream counts as stalled; 0 disables.
    pub stream_idle_timeout_secs: u64,
    /// Database pod id to ClickHouse host.
    pub databases: BTreeMap<String, String>,
    /// Model id to OpenAI-compatible api base.
    pub models: BTreeMap<String, String>,
}

impl Default for NlqConfig {
    fn default() -> Self {
        let databases = [
            ("p43_eng_sjc01", "clickhouse01.p43.eng.sjc01.qualys.com"),
            ("p05_eng_sjc01", "clickhouse11.p05.eng.sjc01.qualys.com"),
            ("p07_eng_sjc01", "clickhouse105.p07.eng.sjc01.qualys.com"),
        ];
        let models = [
            (
                "phi-4-mini-instruct",
                "https://kubeingress.p31.eng.sjc01.qualys.com/cpu/phi4mini/v1",
            ),
            (
                "mistral12b",
                "https://kubeingress.p31.eng.sjc01.qualys.com/mistral12b/v1",
            ),
        ];
        Self {
            base_url: "http://localhost:8004".to_string(),
            default_database: "p43_eng_sjc01".to_string(),
            default_model: "mistral12b".to_string(),
            request_style: RequestStyle::Current,
            stream_idle_timeout_secs: 120,
            databases: databases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            models: models
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl NlqConfig {
    pub fn host_for(&self, database: &str) -> Option<&str> {
        self.databases.get(database).map(String::as_str)
    }

    pub fn api_base_for(&self, model: &str) -> Option<&str> {
        self.models.get(model).map(String::as_str)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.stream_idle_timeout_secs))
    }
}

/// A present `[orbit]` or `[metabase]` table must name its `base_url`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ServiceConfig {
    pub base_url: String,
}

impl ServiceConfig {
    fn with_base(base: &str) -> Self {
        Self {
            base_url: base.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for plain request/response calls. Streams are not bounded by it.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(default)]
pub struct HubConfig {
    pub nlq: NlqConfig,
    pub orbit: ServiceConfig,
    pub metabase: ServiceConfig,
    pub http: HttpConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            nlq: NlqConfig::default(),
            orbit: ServiceConfig::with_base(
                "http://kubenode01-cpu-vllm-oci.p31.eng.sjc01.qualys.com:8000",
            ),
            metabase: ServiceConfig::with_base("http://localhost:8000"),
            http: HttpConfig::default(),
        }
    }
}

impl HubConfig {
    /// Resolve the config file (explicit path, then `OPSHUB_CONFIG`, then defaults)
    /// and apply environment overrides.
    pub fn load_effective(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var(ENV_CONFIG_PATH)
            .ok()
            .filter(|s| !s.trim().is_empty());
        let mut cfg = match (path, from_env) {
            (Some(p), _) => load_config(p)?,
            (None, Some(p)) => load_config(Path::new(p.trim()))?,
            (None, None) => HubConfig::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        fn env_value(key: &str) -> Option<String> {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        if let Some(v) = env_value(ENV_NLQ_BASE) {
            self.nlq.base_url = v;
        }
        if let Some(v) = env_value(ENV_ORBIT_BASE) {
            self.orbit.base_url = v;
        }
        if let Some(v) = env_value(ENV_METABASE_BASE) {
            self.metabase.base_url = v;
        }
        if let Some(v) = env_value(ENV_NLQ_MODEL) {
            self.nlq.default_model = v;
        }
        if let Some(v) = env_value(ENV_NLQ_DATABASE) {
            self.nlq.default_database = v;
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs.max(1))
    }
}

/// Returns the JSON schema describing the configuration structure.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(HubConfig);
    serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}))
}

pub fn load_config(path: &Path) -> Result<HubConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let raw: toml::Value =
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let json_value = serde_json::to_value(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let validator = jsonschema::validator_for(&config_schema_json())
        .map_err(|e| ConfigError::Parse(format!("config schema: {e}")))?;
    let validation_errors: Vec<String> = validator
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Invalid(validation_errors));
    }
    let cfg: HubConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}
