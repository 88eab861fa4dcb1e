//! Firmware family definitions.
//!
//! Every supported family is described by a static [`FamilyProfile`]: the
//! syringe selectors it accepts, how its status symbols decode, which
//! states count as running or stopped, its mode vocabulary, its diameter
//! limits, and which optional operations it has at all. The generic
//! [`Pump`](super::Pump) engine reads the profile; no family gets its own
//! copy of the command logic.
//!
//! | Family        | Syringes | Diameter (mm) | Modes       | Direction | Target | Autofill | Stall |
//! |---------------|----------|---------------|-------------|-----------|--------|----------|-------|
//! | Model 33      | -, A, B  | (0.1, 50)     | AUT PRO CON | yes + PAR | no     | no       | yes   |
//! | Infuse-only   | -        | (0.1, 35)     | PMP VOL     | no        | MLT    | no       | yes   |
//! | Infuse/refill | -        | (0.1, 50)     | PMP VOL     | yes       | TGT    | yes      | yes   |

use serde::{Deserialize, Serialize};

use super::types::{Mode, OperatingState, Syringe};
use crate::protocol::Mnemonic;

/// How a family takes its rate unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateEncoding {
    /// `RAT` + value + two-letter unit code; `RAT` answers "value unit"
    UnitCode,
    /// Unit-named mnemonic (`MLH`, `ULM`, ...) + value; `RAT` answers the
    /// magnitude and `RNG` the unit
    UnitMnemonic,
}

/// What to do when a diameter read-back disagrees with what was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiameterCheck {
    /// Log an error and carry on with the reported value
    Log,
    /// Fail the operation
    Fail,
}

/// Mnemonics for a family's volume bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCommands {
    pub set: Mnemonic,
    pub query: Mnemonic,
    pub clear: Option<Mnemonic>,
}

/// Mnemonics for reading and clearing the accumulated volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorCommands {
    pub query: Mnemonic,
    pub clear: Mnemonic,
}

/// Optional operations, checked before any byte is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub direction: bool,
    pub parallel: bool,
    pub autofill: bool,
    pub refill_rate: bool,
    /// Syringe B diameter may only be set in proportional mode
    pub syringe_b_needs_proportional: bool,
}

/// Static description of one firmware family
#[derive(Debug)]
pub struct FamilyProfile {
    pub kind: FamilyKind,
    pub name: &'static str,
    /// Text the `VER` reply should contain
    pub firmware_prefix: Option<&'static str>,
    pub syringes: &'static [(Syringe, &'static str)],
    pub status_symbols: &'static [(char, OperatingState)],
    pub running: &'static [OperatingState],
    pub stopped: &'static [OperatingState],
    pub modes: &'static [Mode],
    /// Exclusive diameter bounds in mm
    pub diameter_range: (f64, f64),
    pub diameter_set: Mnemonic,
    pub diameter_query: Mnemonic,
    pub diameter_check: DiameterCheck,
    pub rate_encoding: RateEncoding,
    /// Cheapest query whose prompt reports the state
    pub state_query: Mnemonic,
    pub target: Option<TargetCommands>,
    pub accumulator: Option<AccumulatorCommands>,
    pub capabilities: Capabilities,
}

impl FamilyProfile {
    pub fn decode_status(&self, symbol: char) -> Option<OperatingState> {
        self.status_symbols
            .iter()
            .find(|(c, _)| *c == symbol)
            .map(|(_, s)| *s)
    }

    pub fn is_running(&self, state: OperatingState) -> bool {
        self.running.contains(&state)
    }

    pub fn is_stopped(&self, state: OperatingState) -> bool {
        self.stopped.contains(&state)
    }

    /// Whether the firmware can report a stall at all. Every built-in
    /// family can; a hand-built profile may not.
    pub fn detects_stall(&self) -> bool {
        self.status_symbols
            .iter()
            .any(|(_, s)| *s == OperatingState::Stalled)
    }

    pub fn is_stalled(&self, state: OperatingState) -> bool {
        state == OperatingState::Stalled
    }

    pub fn supports_mode(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    pub fn diameter_in_range(&self, diameter: f64) -> bool {
        let (lo, hi) = self.diameter_range;
        diameter > lo && diameter < hi
    }
}

/// Selector for a family, as used in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    Model33,
    InfuseOnly,
    InfuseRefill,
}

impl FamilyKind {
    pub fn profile(self) -> &'static FamilyProfile {
        match self {
            FamilyKind::Model33 => &MODEL_33,
            FamilyKind::InfuseOnly => &INFUSE_ONLY,
            FamilyKind::InfuseRefill => &INFUSE_REFILL,
        }
    }
}

const SINGLE_SYRINGE: &[(Syringe, &str)] = &[(Syringe::Default, "")];

const BASIC_STATUS: &[(char, OperatingState)] = &[
    (':', OperatingState::Idle),
    ('>', OperatingState::Infusing),
    ('<', OperatingState::Withdrawing),
    ('*', OperatingState::Stalled),
];

const MOTION: &[OperatingState] = &[OperatingState::Infusing, OperatingState::Withdrawing];

const STOPPED: &[OperatingState] = &[OperatingState::Idle];

/// Twin-syringe pump with parallel/reciprocal operation
pub static MODEL_33: FamilyProfile = FamilyProfile {
    kind: FamilyKind::Model33,
    name: "Model 33",
    firmware_prefix: Some("33"),
    syringes: &[(Syringe::Default, ""), (Syringe::A, "A"), (Syringe::B, "B")],
    status_symbols: BASIC_STATUS,
    running: MOTION,
    stopped: STOPPED,
    modes: &[Mode::AutoStop, Mode::Proportional, Mode::Continuous],
    diameter_range: (0.1, 50.0),
    diameter_set: Mnemonic::Diameter,
    diameter_query: Mnemonic::Diameter,
    diameter_check: DiameterCheck::Log,
    rate_encoding: RateEncoding::UnitCode,
    state_query: Mnemonic::Mode,
    target: None,
    accumulator: None,
    capabilities: Capabilities {
        direction: true,
        parallel: true,
        autofill: false,
        refill_rate: false,
        syringe_b_needs_proportional: true,
    },
};

/// Oldest single-syringe firmware: infuse only, volume bookkeeping in ml
pub static INFUSE_ONLY: FamilyProfile = FamilyProfile {
    kind: FamilyKind::InfuseOnly,
    name: "infuse-only",
    firmware_prefix: Some("PHD"),
    syringes: SINGLE_SYRINGE,
    status_symbols: BASIC_STATUS,
    running: MOTION,
    stopped: STOPPED,
    modes: &[Mode::PumpRate, Mode::VolumeTarget],
    diameter_range: (0.1, 35.0),
    diameter_set: Mnemonic::SetDiameter,
    diameter_query: Mnemonic::Diameter,
    diameter_check: DiameterCheck::Log,
    rate_encoding: RateEncoding::UnitMnemonic,
    state_query: Mnemonic::Version,
    target: Some(TargetCommands {
        set: Mnemonic::SetTargetMl,
        query: Mnemonic::TargetQuery,
        clear: Some(Mnemonic::ClearTarget),
    }),
    accumulator: Some(AccumulatorCommands {
        query: Mnemonic::Volume,
        clear: Mnemonic::ClearVolume,
    }),
    capabilities: Capabilities {
        direction: false,
        parallel: false,
        autofill: false,
        refill_rate: false,
        syringe_b_needs_proportional: false,
    },
};

/// Single-syringe infuse/refill firmware with pause and trigger states
pub static INFUSE_REFILL: FamilyProfile = FamilyProfile {
    kind: FamilyKind::InfuseRefill,
    name: "infuse/refill",
    firmware_prefix: None,
    syringes: SINGLE_SYRINGE,
    status_symbols: &[
        (':', OperatingState::Idle),
        ('>', OperatingState::Infusing),
        ('<', OperatingState::Withdrawing),
        ('*', OperatingState::Stalled),
        ('/', OperatingState::Paused),
        ('^', OperatingState::WaitingForTrigger),
    ],
    running: &[
        OperatingState::Infusing,
        OperatingState::Withdrawing,
        OperatingState::Paused,
        OperatingState::WaitingForTrigger,
    ],
    stopped: STOPPED,
    modes: &[Mode::PumpRate, Mode::VolumeTarget],
    diameter_range: (0.1, 50.0),
    diameter_set: Mnemonic::Diameter,
    diameter_query: Mnemonic::Diameter,
    diameter_check: DiameterCheck::Fail,
    rate_encoding: RateEncoding::UnitCode,
    state_query: Mnemonic::Version,
    target: Some(TargetCommands {
        set: Mnemonic::Target,
        query: Mnemonic::Target,
        clear: None,
    }),
    accumulator: Some(AccumulatorCommands {
        query: Mnemonic::Delivered,
        clear: Mnemonic::ClearDelivered,
    }),
    capabilities: Capabilities {
        direction: true,
        parallel: false,
        autofill: true,
        refill_rate: true,
        syringe_b_needs_proportional: false,
    },
};
