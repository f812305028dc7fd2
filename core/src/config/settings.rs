use super::BrokerConfig;
use crate::{RecordHubError, Result};
use ::config::{Config, Environment};

impl BrokerConfig {
    /// Build a configuration from `RECORDHUB_*` environment variables
    /// (`RECORDHUB_PORT`, `RECORDHUB_STORE_PATH`, ...), falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder()
            .add_source(Environment::with_prefix("RECORDHUB").try_parsing(true))
            .build()
            .map_err(|e| RecordHubError::Config(e.to_string()))?;

        let config = settings
            .try_deserialize::<BrokerConfig>()
            .map_err(|e| RecordHubError::Config(e.to_string()))?;

        config.validate().map_err(RecordHubError::Config)?;
        Ok(config)
    }
}
