//! # Pumpchain Core Library
//!
//! Driver core for daisy-chained laboratory syringe pumps.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A serial chain shared by up to 100 addressed pumps
//! - Command encoding and reply classification for the pumps' ASCII protocol
//! - One pump state machine driven by per-family firmware profiles
//! - Flow and volume unit conversion
//! - JSON configuration of a chain and its pumps
//!
//! ## Supported families
//!
//! - Model 33 twin-syringe pumps
//! - Infuse-only single-syringe firmware
//! - Infuse/refill single-syringe firmware
//!
//! ## Example
//!
//! ```rust,no_run
//! use pumpchain_core::prelude::*;
//!
//! # fn main() -> pumpchain_core::protocol::Result<()> {
//! let chain = Chain::open(&ChainConfig::new("/dev/ttyUSB0"))?;
//! let mut pump = Pump::attach(&chain, Address::new(1)?, "reagent", &MODEL_33)?;
//!
//! pump.set_diameter(18.08, Syringe::A)?;
//! pump.set_rate(1200.2, RateUnit::MicroPerHour, Syringe::A)?;
//! pump.run()?;
//! pump.wait_with_heartbeat(&Heartbeat::new(std::time::Duration::from_secs(30)))?;
//! pump.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! Logging goes through `tracing`; install whatever subscriber the
//! application uses. Every event from a pump carries a `pump` field.

pub mod codec;
pub mod config;
pub mod protocol;
pub mod pump;
pub mod unit_conversion;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ChainConfig, DriverConfig, PumpConfig};
    pub use crate::protocol::{Address, Chain, MockTransport, PumpError, SerialTransport, Transport};
    pub use crate::pump::{
        Direction, FamilyKind, FlowRate, Heartbeat, Mode, OperatingState, Pump, Syringe, Volume,
        INFUSE_ONLY, INFUSE_REFILL, MODEL_33,
    };
    pub use crate::unit_conversion::{FlowUnit, RateUnit, TimeUnit, VolumeUnit};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
