//! Unit Conversion Functions
//!
//! Flow-rate arithmetic for syringe pumps:
//! - Volume prefixes: ml, µl/ul, nl, pl (µl is the baseline)
//! - Time bases: sec, min, hr (per-minute is the baseline)
//! - The four rate units the firmware accepts, and their two-letter wire codes

use std::fmt;
use std::str::FromStr;

use crate::protocol::PumpError;

/// Volume prefix of a flow unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeUnit {
    Milliliter,
    Microliter,
    Nanoliter,
    Picoliter,
}

impl VolumeUnit {
    /// Size relative to one microlitre
    pub fn scale(self) -> f64 {
        match self {
            VolumeUnit::Milliliter => 1000.0,
            VolumeUnit::Microliter => 1.0,
            VolumeUnit::Nanoliter => 1.0 / 1000.0,
            VolumeUnit::Picoliter => 1.0 / 1e6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VolumeUnit::Milliliter => "ml",
            VolumeUnit::Microliter => "ul",
            VolumeUnit::Nanoliter => "nl",
            VolumeUnit::Picoliter => "pl",
        }
    }
}

impl FromStr for VolumeUnit {
    type Err = PumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ml" | "m" => Ok(VolumeUnit::Milliliter),
            "ul" | "µl" | "u" => Ok(VolumeUnit::Microliter),
            "nl" | "n" => Ok(VolumeUnit::Nanoliter),
            "pl" | "p" => Ok(VolumeUnit::Picoliter),
            other => Err(PumpError::InvalidArgument(format!(
                "unknown volume unit {:?}",
                other
            ))),
        }
    }
}

/// Time base of a flow unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
}

impl TimeUnit {
    /// Factor turning "per this unit" into "per minute"
    pub fn per_minute(self) -> f64 {
        match self {
            TimeUnit::Second => 60.0,
            TimeUnit::Minute => 1.0,
            TimeUnit::Hour => 1.0 / 60.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = PumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "sec" => Ok(TimeUnit::Second),
            "m" | "mn" | "min" => Ok(TimeUnit::Minute),
            "h" | "hr" | "hor" | "hour" => Ok(TimeUnit::Hour),
            other => Err(PumpError::InvalidArgument(format!(
                "unknown time unit {:?}",
                other
            ))),
        }
    }
}

/// Any volume-per-time unit, e.g. `nl/sec`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowUnit {
    pub volume: VolumeUnit,
    pub time: TimeUnit,
}

impl FlowUnit {
    pub const fn new(volume: VolumeUnit, time: TimeUnit) -> Self {
        Self { volume, time }
    }

    /// Size relative to one µl/min
    pub fn scale(self) -> f64 {
        self.volume.scale() * self.time.per_minute()
    }
}

impl FromStr for FlowUnit {
    type Err = PumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (volume, time) = s.split_once('/').ok_or_else(|| {
            PumpError::InvalidArgument(format!("{:?} is not a volume/time unit", s))
        })?;
        Ok(FlowUnit::new(volume.parse()?, time.parse()?))
    }
}

/// Convert a flow rate from one unit to another
pub fn convert(value: f64, from: FlowUnit, to: FlowUnit) -> f64 {
    value * from.scale() / to.scale()
}

/// Convert a flow rate given unit strings such as `"ml/hr"` and `"nl/sec"`
pub fn convert_str(value: f64, from: &str, to: &str) -> Result<f64, PumpError> {
    Ok(convert(value, from.parse()?, to.parse()?))
}

/// The rate units the firmware can be set to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateUnit {
    MicroPerMinute,
    MilliPerMinute,
    MicroPerHour,
    MilliPerHour,
}

impl RateUnit {
    pub const ALL: [RateUnit; 4] = [
        RateUnit::MicroPerMinute,
        RateUnit::MilliPerMinute,
        RateUnit::MicroPerHour,
        RateUnit::MilliPerHour,
    ];

    /// Canonical text, as the pump prints it in rate replies
    pub fn as_str(self) -> &'static str {
        match self {
            RateUnit::MicroPerMinute => "ul/mn",
            RateUnit::MilliPerMinute => "ml/mn",
            RateUnit::MicroPerHour => "ul/hr",
            RateUnit::MilliPerHour => "ml/hr",
        }
    }

    /// Two-letter code appended to rate commands
    pub fn abbreviate(self) -> &'static str {
        match self {
            RateUnit::MicroPerMinute => "UM",
            RateUnit::MilliPerMinute => "MM",
            RateUnit::MicroPerHour => "UH",
            RateUnit::MilliPerHour => "MH",
        }
    }

    /// Inverse of [`RateUnit::abbreviate`]
    pub fn expand(code: &str) -> Result<Self, PumpError> {
        RateUnit::ALL
            .into_iter()
            .find(|u| u.abbreviate().eq_ignore_ascii_case(code.trim()))
            .ok_or_else(|| PumpError::Decode(code.to_string()))
    }

    /// Three-letter command that sets a rate in this unit on firmware
    /// without unit codes
    pub fn set_mnemonic(self) -> &'static str {
        match self {
            RateUnit::MicroPerMinute => "ULM",
            RateUnit::MilliPerMinute => "MLM",
            RateUnit::MicroPerHour => "ULH",
            RateUnit::MilliPerHour => "MLH",
        }
    }

    pub fn flow_unit(self) -> FlowUnit {
        match self {
            RateUnit::MicroPerMinute => FlowUnit::new(VolumeUnit::Microliter, TimeUnit::Minute),
            RateUnit::MilliPerMinute => FlowUnit::new(VolumeUnit::Milliliter, TimeUnit::Minute),
            RateUnit::MicroPerHour => FlowUnit::new(VolumeUnit::Microliter, TimeUnit::Hour),
            RateUnit::MilliPerHour => FlowUnit::new(VolumeUnit::Milliliter, TimeUnit::Hour),
        }
    }
}

impl FromStr for RateUnit {
    type Err = PumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let flow: FlowUnit = s.parse()?;
        RateUnit::ALL
            .into_iter()
            .find(|u| u.flow_unit() == flow)
            .ok_or_else(|| {
                PumpError::InvalidArgument(format!(
                    "unit {:?} is not settable, must be one of ul/mn, ml/mn, ul/hr, ml/hr",
                    s
                ))
            })
    }
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_scaling() {
        assert!((convert_str(1.0, "ml/min", "ul/min").unwrap() - 1000.0).abs() < 1e-9);
        assert!((convert_str(1.0, "ul/min", "nl/min").unwrap() - 1000.0).abs() < 1e-9);
        assert!((convert_str(1.0, "ul/min", "pl/min").unwrap() - 1e6).abs() < 1e-6);
    }

    #[test]
    fn test_time_scaling() {
        assert!((convert_str(1.0, "ul/sec", "ul/min").unwrap() - 60.0).abs() < 1e-9);
        assert!((convert_str(60.0, "ml/hr", "ml/min").unwrap() - 1.0).abs() < 1e-9);
        assert!((convert_str(1.0, "ml/hr", "ul/mn").unwrap() - 1000.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_unit_aliases() {
        assert_eq!("µl/min".parse::<RateUnit>().unwrap(), RateUnit::MicroPerMinute);
        assert_eq!("ul/mn".parse::<RateUnit>().unwrap(), RateUnit::MicroPerMinute);
        assert_eq!("ml/h".parse::<RateUnit>().unwrap(), RateUnit::MilliPerHour);
        assert_eq!("ML/HR".parse::<RateUnit>().unwrap(), RateUnit::MilliPerHour);
        assert!("nl/min".parse::<RateUnit>().is_err());
        assert!("furlongs".parse::<RateUnit>().is_err());
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(RateUnit::MilliPerHour.abbreviate(), "MH");
        assert_eq!(RateUnit::expand("UM").unwrap(), RateUnit::MicroPerMinute);
        assert!(RateUnit::expand("XX").is_err());
    }
}
