use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::settings::Settings;

const ENV_PREFIX: &str = "PANEL";

/// Process configuration: defaults, then an optional TOML file, then
/// `PANEL__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    pub server: ServerSettings,
    pub agent: Settings,
    pub paper: PaperSettings,
}

impl PanelConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            info!("Loading configuration from {}", path);
        } else {
            debug!("No configuration file at {}, using defaults", path);
        }

        let loaded: PanelConfig = Config::builder()
            .add_source(Config::try_from(&PanelConfig::default())?)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("agent.target_coins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate().map_err(|errors| anyhow::anyhow!(errors.join(", ")))?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(agent_errors) = self.agent.validate() {
            errors.extend(agent_errors.into_iter().map(|e| format!("agent: {}", e)));
        }
        if self.paper.initial_cash <= Decimal::ZERO {
            errors.push("paper: initial_cash must be > 0".to_string());
        }
        if self.server.port == 0 {
            errors.push("server: port must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub port: u16,
    /// Pause after a control action before the view is re-read.
    pub settle_delay_ms: u64,
}

impl ServerSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            settle_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSettings {
    /// Starting quote-currency balance of the simulated wallet.
    pub initial_cash: Decimal,
    /// Seed for the simulated price walk.
    pub seed: u64,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            initial_cash: dec!(1000000),
            seed: 7,
        }
    }
}
