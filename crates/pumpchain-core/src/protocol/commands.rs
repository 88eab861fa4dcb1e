//! Protocol commands
//!
//! Three-letter mnemonics, pump addresses, and the instruction text that
//! goes on the wire: `address + mnemonic + syringe + value + unit`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{PumpError, Result, LINE_TERMINATOR};
use crate::unit_conversion::RateUnit;

/// Protocol mnemonics understood by at least one firmware family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    /// Start pumping ('RUN')
    Run,
    /// Stop pumping ('STP')
    Stop,
    /// Query or set syringe diameter ('DIA')
    Diameter,
    /// Set syringe diameter on firmware with a separate setter ('MMD')
    SetDiameter,
    /// Query or set flow rate ('RAT')
    Rate,
    /// Set flow rate in a fixed unit ('ULM', 'MLM', 'ULH', 'MLH')
    RateIn(RateUnit),
    /// Query the unit of the current rate ('RNG')
    Range,
    /// Query or set refill rate ('RFR')
    RefillRate,
    /// Query or set operating mode ('MOD')
    Mode,
    /// Query or set pumping direction ('DIR')
    Direction,
    /// Query or set parallel/reciprocal operation ('PAR')
    Parallel,
    /// Firmware version ('VER')
    Version,
    /// Query or set target volume ('TGT')
    Target,
    /// Set target volume in ml ('MLT')
    SetTargetMl,
    /// Query target volume ('TAR')
    TargetQuery,
    /// Clear target volume ('CLT')
    ClearTarget,
    /// Query delivered volume ('DEL')
    Delivered,
    /// Clear delivered volume ('CLD')
    ClearDelivered,
    /// Query accumulated volume ('VOL')
    Volume,
    /// Clear accumulated volume ('CLV')
    ClearVolume,
    /// Query or set autofill ('AF')
    Autofill,
}

impl Mnemonic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mnemonic::Run => "RUN",
            Mnemonic::Stop => "STP",
            Mnemonic::Diameter => "DIA",
            Mnemonic::SetDiameter => "MMD",
            Mnemonic::Rate => "RAT",
            Mnemonic::RateIn(unit) => unit.set_mnemonic(),
            Mnemonic::Range => "RNG",
            Mnemonic::RefillRate => "RFR",
            Mnemonic::Mode => "MOD",
            Mnemonic::Direction => "DIR",
            Mnemonic::Parallel => "PAR",
            Mnemonic::Version => "VER",
            Mnemonic::Target => "TGT",
            Mnemonic::SetTargetMl => "MLT",
            Mnemonic::TargetQuery => "TAR",
            Mnemonic::ClearTarget => "CLT",
            Mnemonic::Delivered => "DEL",
            Mnemonic::ClearDelivered => "CLD",
            Mnemonic::Volume => "VOL",
            Mnemonic::ClearVolume => "CLV",
            Mnemonic::Autofill => "AF",
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-digit pump address on a chain (00-99)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Address(u8);

impl Address {
    pub const MAX: u8 = 99;

    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(PumpError::Addressing(format!(
                "address {} is outside 00-{}",
                value,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = PumpError;

    fn try_from(value: u8) -> Result<Self> {
        Address::new(value)
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> u8 {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// One fully-resolved instruction, ready to frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    text: String,
}

impl Instruction {
    /// Concatenate the fields and trim surrounding whitespace
    pub fn new(
        address: Address,
        mnemonic: Mnemonic,
        selector: &str,
        value: &str,
        unit_suffix: &str,
    ) -> Self {
        let text = format!("{}{}{}{}{}", address, mnemonic, selector, value, unit_suffix);
        Self {
            text: text.trim().to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Instruction bytes plus the line terminator
    pub fn to_frame(&self) -> Vec<u8> {
        let mut bytes = self.text.as_bytes().to_vec();
        bytes.push(LINE_TERMINATOR);
        bytes
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_formatting() {
        assert_eq!(Address::new(0).unwrap().to_string(), "00");
        assert_eq!(Address::new(7).unwrap().to_string(), "07");
        assert_eq!(Address::new(99).unwrap().to_string(), "99");
        assert!(matches!(Address::new(100), Err(PumpError::Addressing(_))));
    }

    #[test]
    fn test_instruction_layout() {
        let addr = Address::new(1).unwrap();
        let cmd = Instruction::new(addr, Mnemonic::Rate, "A", "12.20", "MH");
        assert_eq!(cmd.text(), "01RATA12.20MH");
        assert_eq!(cmd.to_frame(), b"01RATA12.20MH\r".to_vec());
    }

    #[test]
    fn test_instruction_trims_empty_fields() {
        let addr = Address::new(3).unwrap();
        let cmd = Instruction::new(addr, Mnemonic::Mode, "", "", "");
        assert_eq!(cmd.text(), "03MOD");
        let cmd = Instruction::new(addr, Mnemonic::Parallel, "", " ON ", "");
        assert_eq!(cmd.text(), "03PAR ON");
    }

    #[test]
    fn test_unit_named_mnemonics() {
        assert_eq!(Mnemonic::RateIn(RateUnit::MilliPerHour).as_str(), "MLH");
        assert_eq!(Mnemonic::RateIn(RateUnit::MicroPerMinute).as_str(), "ULM");
        assert_eq!(Mnemonic::Autofill.as_str(), "AF");
    }
}
