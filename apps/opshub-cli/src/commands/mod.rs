pub mod config;
pub mod metabase;
pub mod nlq;
pub mod orbit;
mod util;

pub use config::ConfigCmd;
pub use metabase::MetabaseCmd;
pub use nlq::NlqCmd;
pub use orbit::OrbitCmd;

use anyhow::Result;
use opshub_client::Clients;
use opshub_core::HubConfig;
use serde::Serialize;

/// Resolved configuration plus global output flags.
pub struct AppContext {
    pub config: HubConfig,
    pub json: bool,
    pub pretty: bool,
}

impl AppContext {
    pub fn clients(&self) -> Result<Clients> {
        Ok(Clients::from_config(&self.config)?)
    }

    pub fn emit_json<T: Serialize>(&self, value: &T) -> Result<()> {
        util::print_json(value, self.pretty)
    }
}
