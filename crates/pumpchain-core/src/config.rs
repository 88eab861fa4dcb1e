//! Driver configuration
//!
//! A chain and the pumps on it can be described in JSON:
//!
//! ```json
//! {
//!   "chain": { "port_name": "/dev/ttyUSB0" },
//!   "pumps": [
//!     { "name": "reagent", "address": 1, "family": "model33" },
//!     { "name": "buffer", "address": 2, "family": "infuse_refill" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::protocol::{
    Address, Chain, PumpError, Result, Transport, DEFAULT_BAUD_RATE, DEFAULT_READ_BUDGET,
    DEFAULT_TIMEOUT_MS,
};
use crate::pump::{FamilyKind, Pump};

/// Serial settings for one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub port_name: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_read_budget")]
    pub read_budget: usize,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_read_budget() -> usize {
    DEFAULT_READ_BUDGET
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl ChainConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            read_budget: DEFAULT_READ_BUDGET,
        }
    }
}

/// One pump on the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpConfig {
    pub name: String,
    pub address: Address,
    pub family: FamilyKind,
}

impl PumpConfig {
    /// Attach to the configured pump on `chain`
    pub fn attach<'c, T: Transport>(
        &self,
        chain: &'c Chain<T>,
        read_budget: usize,
    ) -> Result<Pump<'c, T>> {
        let mut pump = Pump::new(chain, self.address, self.name.clone(), self.family.profile())
            .with_read_budget(read_budget);
        pump.identify()?;
        tracing::info!(pump = %pump.name(), "attached as {}", self.family.profile().name);
        Ok(pump)
    }
}

/// A chain plus its pumps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub chain: ChainConfig,
    #[serde(default)]
    pub pumps: Vec<PumpConfig>,
}

impl DriverConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: DriverConfig =
            serde_json::from_str(text).map_err(|e| PumpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| PumpError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PumpError::Config(e.to_string()))
    }

    /// Addresses and names must be unique on one chain
    pub fn validate(&self) -> Result<()> {
        if self.chain.port_name.trim().is_empty() {
            return Err(PumpError::Config("chain port_name is empty".to_string()));
        }
        if self.chain.read_budget == 0 {
            return Err(PumpError::Config("read_budget must be positive".to_string()));
        }
        let mut addresses = HashSet::new();
        let mut names = HashSet::new();
        for pump in &self.pumps {
            if !addresses.insert(pump.address) {
                return Err(PumpError::Config(format!(
                    "address {} is used by more than one pump",
                    pump.address
                )));
            }
            if !names.insert(pump.name.as_str()) {
                return Err(PumpError::Config(format!(
                    "pump name {:?} is used more than once",
                    pump.name
                )));
            }
        }
        Ok(())
    }

    /// Attach every configured pump on an already open chain
    pub fn attach_all<'c, T: Transport>(&self, chain: &'c Chain<T>) -> Result<Vec<Pump<'c, T>>> {
        self.pumps
            .iter()
            .map(|p| p.attach(chain, self.chain.read_budget))
            .collect()
    }
}
