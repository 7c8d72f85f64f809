//! HTTP clients for the NLQ, ORBIT and Metabase services.

mod error;
mod http;
pub mod metabase;
pub mod nlq;
pub mod orbit;
pub mod shape;

pub use error::ClientError;
pub use metabase::MetabaseClient;
pub use nlq::NlqClient;
pub use orbit::OrbitClient;
pub use shape::{coerce_list, coerce_object};

use opshub_core::HubConfig;

/// The three clients built from one resolved configuration.
#[derive(Clone)]
pub struct Clients {
    pub nlq: NlqClient,
    pub orbit: OrbitClient,
    pub metabase: MetabaseClient,
}

impl Clients {
    pub fn from_config(cfg: &HubConfig) -> Result<Self, ClientError> {
        let timeout = cfg.http_timeout();
        Ok(Self {
            nlq: NlqClient::new(cfg.nlq.clone(), timeout)?,
            orbit: OrbitClient::new(cfg.orbit.base_url.clone(), timeout)?,
            metabase: MetabaseClient::new(cfg.metabase.base_url.clone(), timeout)?,
        })
    }
}
