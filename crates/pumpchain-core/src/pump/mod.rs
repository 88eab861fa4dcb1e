//! Pump state machine
//!
//! One generic [`Pump`] drives every firmware family. Family differences
//! (selectors, status symbols, mode vocabulary, optional operations) come
//! from the injected [`FamilyProfile`]. State is never set speculatively:
//! the cached [`OperatingState`] only changes when a successful reply
//! carries a prompt symbol.

pub mod family;
mod heartbeat;
pub mod types;

pub use family::{
    Capabilities, DiameterCheck, FamilyKind, FamilyProfile, RateEncoding, INFUSE_ONLY,
    INFUSE_REFILL, MODEL_33,
};
pub use heartbeat::{Heartbeat, HeartbeatReport};
pub use types::{Direction, FlowRate, Mode, OperatingState, Syringe, Volume};

use std::fmt;

use crate::codec::{decode_field, encode_field};
use crate::protocol::{
    Address, Chain, CommandEngine, Mnemonic, PumpError, Reply, Result, Transport,
};
use crate::unit_conversion::{RateUnit, VolumeUnit};

/// Tolerance when comparing a read-back against the encoded field
const READBACK_EPSILON: f64 = 1e-9;

/// Everything [`Pump::refresh`] could read back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub state: OperatingState,
    pub mode: Option<Mode>,
    pub direction: Option<Direction>,
    pub parallel: Option<bool>,
}

/// A pump at one address on a chain
pub struct Pump<'c, T: Transport> {
    engine: CommandEngine<'c, T>,
    profile: &'static FamilyProfile,
    firmware: Option<String>,
    state: Option<OperatingState>,
}

impl<'c, T: Transport> Pump<'c, T> {
    /// Bind a pump to `address` without talking to it
    pub fn new(
        chain: &'c Chain<T>,
        address: Address,
        name: impl Into<String>,
        profile: &'static FamilyProfile,
    ) -> Self {
        Self {
            engine: CommandEngine::new(chain, address, name, profile.syringes),
            profile,
            firmware: None,
            state: None,
        }
    }

    /// Bind a pump and confirm it answers at `address`
    pub fn attach(
        chain: &'c Chain<T>,
        address: Address,
        name: impl Into<String>,
        profile: &'static FamilyProfile,
    ) -> Result<Self> {
        let mut pump = Self::new(chain, address, name, profile);
        pump.identify()?;
        tracing::info!(
            pump = %pump.name(),
            "created at address {} on {}",
            address,
            chain.name()
        );
        Ok(pump)
    }

    /// Override how many bytes one reply may occupy
    pub fn with_read_budget(mut self, bytes: usize) -> Self {
        self.engine = self.engine.with_read_budget(bytes);
        self
    }

    pub fn name(&self) -> &str {
        self.engine.pump_name()
    }

    pub fn address(&self) -> Address {
        self.engine.address()
    }

    pub fn profile(&self) -> &'static FamilyProfile {
        self.profile
    }

    /// Last state observed on the wire, if any
    pub fn state(&self) -> Option<OperatingState> {
        self.state
    }

    /// Firmware string read by [`Pump::identify`]
    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    fn issue(
        &mut self,
        mnemonic: Mnemonic,
        value: &str,
        syringe: Syringe,
        unit_suffix: &str,
    ) -> Result<Reply> {
        let reply = self.engine.issue(mnemonic, value, syringe, unit_suffix)?;
        self.observe(&reply);
        Ok(reply)
    }

    fn query(&mut self, mnemonic: Mnemonic) -> Result<Reply> {
        self.issue(mnemonic, "", Syringe::Default, "")
    }

    fn observe(&mut self, reply: &Reply) {
        let Some(prompt) = reply.prompt() else {
            return;
        };
        match self.profile.decode_status(prompt.symbol) {
            Some(state) => {
                if self.state != Some(state) {
                    tracing::debug!(pump = %self.name(), "state is now {}", state);
                }
                self.state = Some(state);
            }
            None => {
                tracing::debug!(pump = %self.name(), "unknown status symbol {:?}", prompt.symbol);
            }
        }
    }

    fn unsupported(&self, operation: &'static str) -> PumpError {
        PumpError::Capability {
            pump: self.name().to_string(),
            family: self.profile.name,
            operation,
        }
    }

    fn unexpected(&self, message: String) -> PumpError {
        PumpError::UnexpectedState {
            pump: self.name().to_string(),
            message,
        }
    }

    /// Query the firmware version and record the observed state
    pub fn identify(&mut self) -> Result<String> {
        let version = self.version()?;
        if let Some(prefix) = self.profile.firmware_prefix {
            if !version.contains(prefix) {
                tracing::warn!(
                    pump = %self.name(),
                    "firmware version {} indicates this is probably not a {} pump",
                    version,
                    self.profile.name
                );
            }
        }
        self.firmware = Some(version.clone());
        Ok(version)
    }

    pub fn version(&mut self) -> Result<String> {
        let reply = self.query(Mnemonic::Version)?;
        let version = reply.payload().trim().to_string();
        tracing::debug!(pump = %self.name(), "firmware version is {}", version);
        Ok(version)
    }

    /// Ask the pump for its state
    pub fn get_state(&mut self) -> Result<OperatingState> {
        let reply = self.query(self.profile.state_query)?;
        let prompt = reply
            .prompt()
            .ok_or_else(|| PumpError::Decode(reply.lines().join("\\n")))?;
        let state = self
            .profile
            .decode_status(prompt.symbol)
            .ok_or_else(|| PumpError::Decode(prompt.symbol.to_string()))?;
        if state == OperatingState::Stalled {
            tracing::warn!(pump = %self.name(), "pump is stalled, check the syringe!");
        }
        Ok(state)
    }

    /// Start pumping. A pump that is already running counts as success.
    pub fn run(&mut self) -> Result<()> {
        self.start(true)
    }

    /// Start pumping, failing with `NotApplicable` if already running
    pub fn run_strict(&mut self) -> Result<()> {
        self.start(false)
    }

    fn start(&mut self, already_running_ok: bool) -> Result<()> {
        let issued = match self.query(Mnemonic::Run) {
            Err(e) if e.is_retryable() => {
                tracing::warn!(pump = %self.name(), "no answer to RUN, retrying once");
                self.query(Mnemonic::Run)
            }
            other => other,
        };
        match issued {
            Ok(_) => {}
            Err(PumpError::NotApplicable { .. }) if already_running_ok => {
                tracing::info!(pump = %self.name(), "pump is already running, continuing");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let state = self.get_state()?;
        if !self.profile.is_running(state) {
            return Err(self.unexpected(format!("pump is not running: {}", state)));
        }
        tracing::info!(pump = %self.name(), "pump has started running");
        Ok(())
    }

    /// Stop pumping. A pump that is already stopped counts as success.
    pub fn stop(&mut self) -> Result<()> {
        self.halt(true)
    }

    /// Stop pumping, failing with `NotApplicable` if already stopped
    pub fn stop_strict(&mut self) -> Result<()> {
        self.halt(false)
    }

    fn halt(&mut self, already_stopped_ok: bool) -> Result<()> {
        match self.query(Mnemonic::Stop) {
            Ok(_) => {}
            Err(PumpError::NotApplicable { .. }) if already_stopped_ok => {
                tracing::info!(pump = %self.name(), "pump is already stopped, continuing");
            }
            Err(e) => return Err(e),
        }

        let state = self.get_state()?;
        if !self.profile.is_stopped(state) {
            return Err(self.unexpected(format!("pump has not stopped: {}", state)));
        }
        tracing::info!(pump = %self.name(), "stopped pump");
        Ok(())
    }

    /// Set the syringe diameter in mm and return what the pump reports back
    pub fn set_diameter(&mut self, diameter: f64, syringe: Syringe) -> Result<f64> {
        if !self.profile.diameter_in_range(diameter) {
            let (lo, hi) = self.profile.diameter_range;
            return Err(PumpError::InvalidArgument(format!(
                "{}: diameter {} mm is outside ({}, {})",
                self.name(),
                diameter,
                lo,
                hi
            )));
        }
        self.engine.selector(syringe)?;
        if syringe == Syringe::B && self.profile.capabilities.syringe_b_needs_proportional {
            let mode = self.get_mode()?;
            if mode != Mode::Proportional {
                return Err(self.unexpected(format!(
                    "can only set diameter of syringe B in {} mode, pump is in {}",
                    Mode::Proportional,
                    mode
                )));
            }
        }
        let state = self.get_state()?;
        if self.profile.is_running(state) || self.profile.is_stalled(state) {
            return Err(self.unexpected(format!(
                "cannot set diameter while pump is {}, stop it first",
                state
            )));
        }

        let field = encode_field(diameter)?;
        self.issue(self.profile.diameter_set, &field, syringe, "")?;
        let expected = decode_field(&field)?;
        let reported = self.get_diameter(syringe)?;

        if (reported - expected).abs() > READBACK_EPSILON {
            match self.profile.diameter_check {
                DiameterCheck::Log => tracing::error!(
                    pump = %self.name(),
                    "set diameter ({} mm) does not match diameter returned by pump ({} mm)",
                    field,
                    reported
                ),
                DiameterCheck::Fail => {
                    return Err(self.unexpected(format!(
                        "set diameter ({} mm) does not match diameter returned by pump ({} mm)",
                        field, reported
                    )))
                }
            }
        } else {
            tracing::info!(pump = %self.name(), "diameter of syringe <{}> set to {} mm", syringe.index(), reported);
        }
        Ok(reported)
    }

    pub fn get_diameter(&mut self, syringe: Syringe) -> Result<f64> {
        let reply = self.issue(self.profile.diameter_query, "", syringe, "")?;
        let diameter = decode_field(reply.payload())?;
        tracing::debug!(pump = %self.name(), "diameter of syringe <{}> is {} mm", syringe.index(), diameter);
        Ok(diameter)
    }

    /// Set the flow rate and verify both magnitude and unit on read-back
    pub fn set_rate(&mut self, value: f64, unit: RateUnit, syringe: Syringe) -> Result<FlowRate> {
        let field = encode_field(value)?;
        match self.profile.rate_encoding {
            RateEncoding::UnitCode => {
                self.issue(Mnemonic::Rate, &field, syringe, unit.abbreviate())?;
            }
            RateEncoding::UnitMnemonic => {
                self.issue(Mnemonic::RateIn(unit), &field, syringe, "")?;
            }
        }
        let expected = FlowRate::new(decode_field(&field)?, unit);
        let reported = self.get_rate(syringe)?;
        self.confirm_rate("flow rate", syringe, expected, reported)
    }

    pub fn get_rate(&mut self, syringe: Syringe) -> Result<FlowRate> {
        let rate = match self.profile.rate_encoding {
            RateEncoding::UnitCode => {
                let reply = self.issue(Mnemonic::Rate, "", syringe, "")?;
                FlowRate::from_reply_line(reply.payload())?
            }
            RateEncoding::UnitMnemonic => {
                let reply = self.issue(Mnemonic::Rate, "", syringe, "")?;
                let value = decode_field(reply.payload())?;
                let reply = self.issue(Mnemonic::Range, "", syringe, "")?;
                let unit = reply
                    .payload()
                    .trim()
                    .parse::<RateUnit>()
                    .map_err(|_| PumpError::Decode(reply.payload().to_string()))?;
                FlowRate::new(value, unit)
            }
        };
        tracing::debug!(pump = %self.name(), "flow rate of syringe <{}> is {}", syringe.index(), rate);
        Ok(rate)
    }

    fn confirm_rate(
        &self,
        what: &str,
        syringe: Syringe,
        expected: FlowRate,
        reported: FlowRate,
    ) -> Result<FlowRate> {
        if (reported.value - expected.value).abs() <= READBACK_EPSILON
            && reported.unit == expected.unit
        {
            tracing::info!(pump = %self.name(), "{} of syringe <{}> set to {}", what, syringe.index(), reported);
            Ok(reported)
        } else {
            Err(self.unexpected(format!(
                "{} of syringe <{}> not set correctly, requested {}, pump reports {}",
                what,
                syringe.index(),
                expected,
                reported
            )))
        }
    }

    /// Set the refill (withdraw) rate
    pub fn set_refill_rate(&mut self, value: f64, unit: RateUnit) -> Result<FlowRate> {
        if !self.profile.capabilities.refill_rate {
            return Err(self.unsupported("refill rate"));
        }
        let field = encode_field(value)?;
        self.issue(Mnemonic::RefillRate, &field, Syringe::Default, unit.abbreviate())?;
        let expected = FlowRate::new(decode_field(&field)?, unit);
        let reported = self.refill_rate()?;
        self.confirm_rate("refill rate", Syringe::Default, expected, reported)
    }

    pub fn refill_rate(&mut self) -> Result<FlowRate> {
        if !self.profile.capabilities.refill_rate {
            return Err(self.unsupported("refill rate"));
        }
        let reply = self.query(Mnemonic::RefillRate)?;
        FlowRate::from_reply_line(reply.payload())
    }

    /// Set the operating mode; `Program` is always refused
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        if mode == Mode::Program {
            return Err(self.unsupported("stored-program mode"));
        }
        if !self.profile.supports_mode(mode) {
            return Err(PumpError::InvalidArgument(format!(
                "{}: mode {} is not one of {:?}",
                self.name(),
                mode,
                self.profile.modes
            )));
        }
        self.issue(Mnemonic::Mode, mode.code(), Syringe::Default, "")?;
        let reported = self.get_mode()?;
        if reported != mode {
            return Err(self.unexpected(format!(
                "mode not set correctly, requested {}, pump reports {}",
                mode, reported
            )));
        }
        tracing::info!(pump = %self.name(), "mode set to {}", mode);
        Ok(())
    }

    pub fn get_mode(&mut self) -> Result<Mode> {
        let reply = self.query(Mnemonic::Mode)?;
        reply
            .payload()
            .parse::<Mode>()
            .map_err(|_| PumpError::Decode(reply.payload().to_string()))
    }

    /// Set the pumping direction; `Reverse` flips the current one
    pub fn set_direction(&mut self, direction: Direction) -> Result<Direction> {
        if !self.profile.capabilities.direction {
            return Err(self.unsupported("direction control"));
        }
        let before = self.get_direction()?;
        self.issue(Mnemonic::Direction, direction.code(), Syringe::Default, "")?;
        let after = self.get_direction()?;

        let ok = match direction {
            Direction::Reverse => after != before,
            wanted => after == wanted,
        };
        if !ok {
            return Err(self.unexpected(format!(
                "direction not set correctly, requested {}, pump reports {}",
                direction, after
            )));
        }
        tracing::info!(pump = %self.name(), "direction set to {}", after);
        Ok(after)
    }

    pub fn get_direction(&mut self) -> Result<Direction> {
        if !self.profile.capabilities.direction {
            return Err(self.unsupported("direction control"));
        }
        let reply = self.query(Mnemonic::Direction)?;
        reply
            .payload()
            .parse::<Direction>()
            .map_err(|_| PumpError::Decode(reply.payload().to_string()))
    }

    /// Parallel (`true`) or reciprocal (`false`) twin-syringe operation
    pub fn set_parallel(&mut self, parallel: bool) -> Result<()> {
        if !self.profile.capabilities.parallel {
            return Err(self.unsupported("parallel/reciprocal"));
        }
        self.issue(Mnemonic::Parallel, on_off(parallel), Syringe::Default, "")?;
        let reported = self.parallel()?;
        if reported != parallel {
            return Err(self.unexpected(format!(
                "parallel/reciprocal not set correctly, requested {}, pump reports {}",
                on_off(parallel),
                on_off(reported)
            )));
        }
        tracing::info!(pump = %self.name(), "parallel/reciprocal set to {}", on_off(parallel));
        Ok(())
    }

    pub fn parallel(&mut self) -> Result<bool> {
        if !self.profile.capabilities.parallel {
            return Err(self.unsupported("parallel/reciprocal"));
        }
        let reply = self.query(Mnemonic::Parallel)?;
        parse_on_off(reply.payload())
    }

    /// Turn automatic refill at end of infusion on or off
    pub fn set_autofill(&mut self, enabled: bool) -> Result<()> {
        if !self.profile.capabilities.autofill {
            return Err(self.unsupported("autofill"));
        }
        self.issue(Mnemonic::Autofill, on_off(enabled), Syringe::Default, "")?;
        let reported = self.autofill()?;
        if reported != enabled {
            return Err(self.unexpected(format!(
                "autofill not set correctly, requested {}, pump reports {}",
                on_off(enabled),
                on_off(reported)
            )));
        }
        tracing::info!(pump = %self.name(), "autofill set to {}", on_off(enabled));
        Ok(())
    }

    pub fn autofill(&mut self) -> Result<bool> {
        if !self.profile.capabilities.autofill {
            return Err(self.unsupported("autofill"));
        }
        let reply = self.query(Mnemonic::Autofill)?;
        parse_on_off(reply.payload())
    }

    /// Set the volume after which the pump stops (in volume-target mode)
    pub fn set_target_volume(&mut self, volume: Volume) -> Result<Volume> {
        let Some(commands) = self.profile.target else {
            return Err(self.unsupported("target volume"));
        };
        let field = encode_field(volume.to_ml())?;
        self.issue(commands.set, &field, Syringe::Default, "")?;
        let expected = decode_field(&field)?;
        let reported = self.target_volume()?;
        if (reported.to_ml() - expected).abs() > READBACK_EPSILON {
            return Err(self.unexpected(format!(
                "target volume not set correctly, requested {} ml, pump reports {}",
                field, reported
            )));
        }
        tracing::info!(pump = %self.name(), "target volume set to {}", reported);
        Ok(reported)
    }

    pub fn target_volume(&mut self) -> Result<Volume> {
        let Some(commands) = self.profile.target else {
            return Err(self.unsupported("target volume"));
        };
        let reply = self.query(commands.query)?;
        Volume::from_reply_line(reply.payload(), VolumeUnit::Milliliter)
    }

    pub fn clear_target_volume(&mut self) -> Result<()> {
        let Some(clear) = self.profile.target.and_then(|t| t.clear) else {
            return Err(self.unsupported("clearing the target volume"));
        };
        self.query(clear)?;
        tracing::info!(pump = %self.name(), "target volume cleared");
        Ok(())
    }

    /// Volume pumped since the accumulator was last cleared
    pub fn delivered_volume(&mut self) -> Result<Volume> {
        let Some(commands) = self.profile.accumulator else {
            return Err(self.unsupported("delivered volume"));
        };
        let reply = self.query(commands.query)?;
        Volume::from_reply_line(reply.payload(), VolumeUnit::Milliliter)
    }

    pub fn clear_delivered_volume(&mut self) -> Result<()> {
        let Some(commands) = self.profile.accumulator else {
            return Err(self.unsupported("delivered volume"));
        };
        self.query(commands.clear)?;
        tracing::info!(pump = %self.name(), "delivered volume cleared");
        Ok(())
    }

    /// Re-read state plus every setting this family can report
    pub fn refresh(&mut self) -> Result<Snapshot> {
        let state = self.get_state()?;
        let mode = if self.profile.modes.is_empty() {
            None
        } else {
            Some(self.get_mode()?)
        };
        let direction = if self.profile.capabilities.direction {
            Some(self.get_direction()?)
        } else {
            None
        };
        let parallel = if self.profile.capabilities.parallel {
            Some(self.parallel()?)
        } else {
            None
        };
        Ok(Snapshot {
            state,
            mode,
            direction,
            parallel,
        })
    }

    /// Log every readable parameter, per addressable syringe
    pub fn log_parameters(&mut self) -> Result<Snapshot> {
        let snapshot = self.refresh()?;
        tracing::info!(
            pump = %self.name(),
            "firmware: {}, state: {}, mode: {:?}, direction: {:?}, parallel: {:?}",
            self.firmware.as_deref().unwrap_or("unknown"),
            snapshot.state,
            snapshot.mode,
            snapshot.direction,
            snapshot.parallel
        );

        let named: Vec<Syringe> = self
            .profile
            .syringes
            .iter()
            .map(|(s, _)| *s)
            .filter(|s| *s != Syringe::Default)
            .collect();
        let syringes = if named.is_empty() {
            vec![Syringe::Default]
        } else {
            named
        };
        for syringe in syringes {
            let diameter = self.get_diameter(syringe)?;
            let rate = self.get_rate(syringe)?;
            tracing::info!(
                pump = %self.name(),
                "syringe <{}> diameter: {} mm, flow rate: {}",
                syringe.index(),
                diameter,
                rate
            );
        }
        Ok(snapshot)
    }
}

impl<T: Transport> fmt::Debug for Pump<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pump")
            .field("name", &self.name())
            .field("address", &self.address())
            .field("family", &self.profile.name)
            .field("firmware", &self.firmware)
            .field("state", &self.state)
            .finish()
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}

fn parse_on_off(text: &str) -> Result<bool> {
    match text.trim().to_uppercase().as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(PumpError::Decode(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MockTransport;

    fn chain(replies: &[&str]) -> Chain<MockTransport> {
        let mut mock = MockTransport::new();
        for r in replies {
            mock.push_reply(r.as_bytes());
        }
        Chain::new(mock).unwrap()
    }

    #[test]
    fn test_state_changes_only_on_observed_prompts() {
        let chain = chain(&["\r\nPRO\r\n01>", "\r\nOOR\r\n01:"]);
        let mut pump = Pump::new(&chain, Address::new(1).unwrap(), "p1", &MODEL_33);
        assert_eq!(pump.state(), None);

        assert_eq!(pump.get_state().unwrap(), OperatingState::Infusing);
        assert_eq!(pump.state(), Some(OperatingState::Infusing));

        let err = pump.set_rate(5.0, RateUnit::MilliPerHour, Syringe::A).unwrap_err();
        assert!(matches!(err, PumpError::OutOfRange { .. }));
        assert_eq!(pump.state(), Some(OperatingState::Infusing));
    }

    #[test]
    fn test_unknown_status_symbol_is_a_decode_error() {
        let chain = chain(&["\r\n4.0\r\n00#"]);
        let mut pump = Pump::new(&chain, Address::new(0).unwrap(), "p0", &INFUSE_ONLY);
        assert!(matches!(pump.get_state(), Err(PumpError::Decode(_))));
        assert_eq!(pump.state(), None);
    }

    #[test]
    fn test_on_off_parsing() {
        assert!(parse_on_off(" on ").unwrap());
        assert!(!parse_on_off("OFF").unwrap());
        assert!(parse_on_off("MAYBE").is_err());
    }
}
