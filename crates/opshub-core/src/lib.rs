mod config;

pub use config::{
    config_schema_json, load_config, ConfigError, HttpConfig, HubConfig, NlqConfig, RequestStyle,
    ServiceConfig, ENV_CONFIG_PATH,
};
