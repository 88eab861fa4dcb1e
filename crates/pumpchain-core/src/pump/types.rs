//! Pump domain types

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::codec::decode_field;
use crate::protocol::{PumpError, Result};
use crate::unit_conversion::{RateUnit, VolumeUnit};

/// Logical syringe on a pump. Twin-syringe pumps address A and B
/// separately; `Default` sends no selector at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Syringe {
    #[default]
    Default,
    A,
    B,
}

impl Syringe {
    /// Ordinal used by callers: 0 = default, 1 = A, 2 = B
    pub fn index(self) -> u8 {
        match self {
            Syringe::Default => 0,
            Syringe::A => 1,
            Syringe::B => 2,
        }
    }

    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Syringe::Default),
            1 => Ok(Syringe::A),
            2 => Ok(Syringe::B),
            n => Err(PumpError::Addressing(format!("no syringe with index {}", n))),
        }
    }
}

/// Operating state, always decoded from the prompt the pump sent back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingState {
    Idle,
    Infusing,
    Withdrawing,
    Stalled,
    Paused,
    WaitingForTrigger,
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperatingState::Idle => "idle",
            OperatingState::Infusing => "infusing",
            OperatingState::Withdrawing => "withdrawing",
            OperatingState::Stalled => "stalled",
            OperatingState::Paused => "paused",
            OperatingState::WaitingForTrigger => "waiting for trigger",
        };
        f.write_str(s)
    }
}

/// Firmware operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Stop when the syringe reaches its end (AUT)
    AutoStop,
    /// Syringe B follows A at a proportional rate (PRO)
    Proportional,
    /// Reciprocate continuously (CON)
    Continuous,
    /// Run at the set rate until stopped (PMP)
    PumpRate,
    /// Run until the target volume is delivered (VOL)
    VolumeTarget,
    /// Stored-program sequence (PGM), never driven by this crate
    Program,
}

impl Mode {
    pub fn code(self) -> &'static str {
        match self {
            Mode::AutoStop => "AUT",
            Mode::Proportional => "PRO",
            Mode::Continuous => "CON",
            Mode::PumpRate => "PMP",
            Mode::VolumeTarget => "VOL",
            Mode::Program => "PGM",
        }
    }
}

impl FromStr for Mode {
    type Err = PumpError;

    /// Accepts the wire code or any reply that starts with it ("AUTO STOP")
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let code = upper.get(..3).unwrap_or(&upper);
        match code {
            "AUT" => Ok(Mode::AutoStop),
            "PRO" => Ok(Mode::Proportional),
            "CON" => Ok(Mode::Continuous),
            "PMP" | "PUM" => Ok(Mode::PumpRate),
            "VOL" => Ok(Mode::VolumeTarget),
            "PGM" | "PRG" => Ok(Mode::Program),
            _ => Err(PumpError::InvalidArgument(format!("unknown mode {:?}", s))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Pumping direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Infuse,
    Refill,
    /// Flip whatever the current direction is. Only valid as a request.
    Reverse,
}

impl Direction {
    pub fn code(self) -> &'static str {
        match self {
            Direction::Infuse => "INF",
            Direction::Refill => "REF",
            Direction::Reverse => "REV",
        }
    }
}

impl FromStr for Direction {
    type Err = PumpError;

    /// Accepts "INF"/"INFUSE", "REF"/"REFILL", "REV"/"REVERSE"
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        match upper.get(..3).unwrap_or(&upper) {
            "INF" => Ok(Direction::Infuse),
            "REF" | "WIT" => Ok(Direction::Refill),
            "REV" => Ok(Direction::Reverse),
            _ => Err(PumpError::InvalidArgument(format!("unknown direction {:?}", s))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A flow rate as the pump holds it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowRate {
    pub value: f64,
    #[serde(with = "rate_unit_text")]
    pub unit: RateUnit,
}

impl FlowRate {
    pub fn new(value: f64, unit: RateUnit) -> Self {
        Self { value, unit }
    }

    /// Parse a rate reply line: magnitude in columns 0-5, unit after that
    pub fn from_reply_line(line: &str) -> Result<Self> {
        let split = line
            .char_indices()
            .nth(6)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        let (number, unit) = line.split_at(split);
        let value = decode_field(number)?;
        let unit = unit
            .trim()
            .parse::<RateUnit>()
            .map_err(|_| PumpError::Decode(line.to_string()))?;
        Ok(Self { value, unit })
    }
}

impl fmt::Display for FlowRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

mod rate_unit_text {
    use super::RateUnit;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(unit: &RateUnit, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(unit.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RateUnit, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A volume (target or delivered)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume {
    pub value: f64,
    pub unit: VolumeUnit,
}

fn volume_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d+\.?\d*)\s*([mMuUµnNpP][lL])?").ok())
        .as_ref()
}

impl Volume {
    pub fn new(value: f64, unit: VolumeUnit) -> Self {
        Self { value, unit }
    }

    pub fn ml(value: f64) -> Self {
        Self::new(value, VolumeUnit::Milliliter)
    }

    pub fn to_ml(self) -> f64 {
        self.value * self.unit.scale() / VolumeUnit::Milliliter.scale()
    }

    /// Find `<number> [ml|ul|nl|pl]` in a reply line; a bare number is `default`
    pub fn from_reply_line(line: &str, default: VolumeUnit) -> Result<Self> {
        let caps = volume_pattern()
            .and_then(|p| p.captures(line))
            .ok_or_else(|| PumpError::Decode(line.to_string()))?;
        let value = decode_field(&caps[1])?;
        let unit = match caps.get(2) {
            Some(m) => m.as_str().parse()?,
            None => default,
        };
        Ok(Self { value, unit })
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit.as_str())
    }
}
