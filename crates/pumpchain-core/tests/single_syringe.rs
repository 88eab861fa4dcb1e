mod common;

use pumpchain_core::protocol::{Address, Chain, MockTransport, PumpError};
use pumpchain_core::pump::{
    Direction, FlowRate, Mode, OperatingState, Pump, Syringe, Volume, INFUSE_ONLY, INFUSE_REFILL,
};
use pumpchain_core::unit_conversion::{RateUnit, VolumeUnit};

fn chain(script: &[(&str, &str)]) -> Chain<MockTransport> {
    let mut mock = MockTransport::new();
    for (request, reply) in script {
        let frame = format!("{}\r", request);
        mock.expect(frame.as_bytes(), reply.as_bytes());
    }
    Chain::new(mock).unwrap()
}

fn sent(chain: &Chain<MockTransport>) -> Vec<String> {
    chain.with_transport(|t| t.sent_instructions()).unwrap()
}

mod infuse_only {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pump(chain: &Chain<MockTransport>) -> Pump<'_, MockTransport> {
        Pump::new(chain, Address::new(0).unwrap(), "old", &INFUSE_ONLY)
    }

    #[test]
    fn test_direction_is_not_supported() {
        let chain = chain(&[]);
        let mut pump = pump(&chain);
        let err = pump.set_direction(Direction::Infuse).unwrap_err();
        match err {
            PumpError::Capability { family, .. } => assert_eq!(family, "infuse-only"),
            other => panic!("expected Capability, got {:?}", other),
        }
        assert!(pump.get_direction().is_err());
        assert!(sent(&chain).is_empty());
    }

    #[test]
    fn test_program_mode_is_refused() {
        let chain = chain(&[]);
        let mut pump = pump(&chain);
        assert!(matches!(
            pump.set_mode(Mode::Program),
            Err(PumpError::Capability { .. })
        ));
        assert!(sent(&chain).is_empty());
    }

    #[test]
    fn test_twin_syringe_selector_is_rejected() {
        let chain = chain(&[]);
        let mut pump = pump(&chain);
        assert!(matches!(
            pump.get_diameter(Syringe::A),
            Err(PumpError::Addressing(_))
        ));
        assert!(sent(&chain).is_empty());
    }

    #[test]
    fn test_set_rate_uses_unit_mnemonic() {
        let chain = chain(&[
            ("00MLH2.500", "\r\n\r\n00:"),
            ("00RAT", "\r\n2.500\r\n00:"),
            ("00RNG", "\r\nML/HR\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        let rate = pump
            .set_rate(2.5, RateUnit::MilliPerHour, Syringe::Default)
            .unwrap();
        assert_eq!(rate, FlowRate::new(2.5, RateUnit::MilliPerHour));
    }

    #[test]
    fn test_set_diameter_uses_separate_setter() {
        let chain = chain(&[
            ("00VER", "\r\nPHD 4.0\r\n00:"),
            ("00MMD10.00", "\r\n\r\n00:"),
            ("00DIA", "\r\n10.00\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        assert_eq!(pump.set_diameter(10.0, Syringe::Default).unwrap(), 10.0);
    }

    #[test]
    fn test_diameter_limit_is_narrower() {
        let chain = chain(&[]);
        let mut pump = pump(&chain);
        assert!(matches!(
            pump.set_diameter(40.0, Syringe::Default),
            Err(PumpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_target_volume() {
        let chain = chain(&[
            ("00MLT1.500", "\r\n\r\n00:"),
            ("00TAR", "\r\n1.500 ml\r\n00:"),
            ("00CLT", "\r\n\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        let target = pump.set_target_volume(Volume::ml(1.5)).unwrap();
        assert_eq!(target, Volume::ml(1.5));
        pump.clear_target_volume().unwrap();
    }

    #[test]
    fn test_target_volume_in_microliters() {
        let chain = chain(&[
            ("00MLT0.250", "\r\n\r\n00:"),
            ("00TAR", "\r\n250.0 ul\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        let target = pump
            .set_target_volume(Volume::new(250.0, VolumeUnit::Microliter))
            .unwrap();
        assert_eq!(target.unit, VolumeUnit::Microliter);
    }

    #[test]
    fn test_accumulated_volume() {
        let chain = chain(&[
            ("00VOL", "\r\n0.350 ml\r\n00>"),
            ("00CLV", "\r\n\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        assert_eq!(pump.delivered_volume().unwrap(), Volume::ml(0.35));
        assert_eq!(pump.state(), Some(OperatingState::Infusing));
        pump.clear_delivered_volume().unwrap();
        assert_eq!(pump.state(), Some(OperatingState::Idle));
    }

    #[test]
    fn test_state_query_uses_version() {
        let chain = chain(&[("00VER", "\r\nPHD 4.0\r\n00<")]);
        let mut pump = pump(&chain);
        assert_eq!(pump.get_state().unwrap(), OperatingState::Withdrawing);
    }

    #[test]
    fn test_stall_symbol_is_reported() {
        let chain = chain(&[("00VER", "\r\nPHD 4.0\r\n00*")]);
        let mut pump = pump(&chain);
        assert_eq!(pump.get_state().unwrap(), OperatingState::Stalled);
        assert_eq!(pump.state(), Some(OperatingState::Stalled));
    }

    #[test]
    fn test_set_diameter_refused_while_stalled() {
        let chain = chain(&[("00VER", "\r\nPHD 4.0\r\n00*")]);
        let mut pump = pump(&chain);
        assert!(matches!(
            pump.set_diameter(10.0, Syringe::Default),
            Err(PumpError::UnexpectedState { .. })
        ));
        assert_eq!(sent(&chain), vec!["00VER"]);
    }

    #[test]
    fn test_identify_accepts_phd_firmware() {
        let chain = chain(&[("00VER", "\r\nPHD 4.0\r\n00:")]);
        let mut pump = pump(&chain);
        let (version, logs) = common::with_captured_warnings(|| pump.identify().unwrap());
        assert_eq!(version, "PHD 4.0");
        assert_eq!(pump.firmware(), Some("PHD 4.0"));
        assert!(!logs.contains("probably not"), "unexpected warning: {}", logs);
    }

    #[test]
    fn test_identify_warns_on_other_firmware() {
        let chain = chain(&[("00VER", "\r\n11 ELITE\r\n00:")]);
        let mut pump = pump(&chain);
        let (version, logs) = common::with_captured_warnings(|| pump.identify().unwrap());
        assert_eq!(version, "11 ELITE");
        assert!(logs.contains("probably not a infuse-only pump"), "logs: {}", logs);
    }

    #[test]
    fn test_no_autofill_or_refill_rate() {
        let chain = chain(&[]);
        let mut pump = pump(&chain);
        assert!(matches!(pump.autofill(), Err(PumpError::Capability { .. })));
        assert!(matches!(pump.refill_rate(), Err(PumpError::Capability { .. })));
        assert!(matches!(pump.parallel(), Err(PumpError::Capability { .. })));
        assert!(sent(&chain).is_empty());
    }
}

mod infuse_refill {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pump(chain: &Chain<MockTransport>) -> Pump<'_, MockTransport> {
        Pump::new(chain, Address::new(0).unwrap(), "refill", &INFUSE_REFILL)
    }

    #[test]
    fn test_paused_counts_as_running() {
        let chain = chain(&[("00RUN", "\r\n\r\n00/"), ("00VER", "\r\nNE1000V3.9\r\n00/")]);
        let mut pump = pump(&chain);
        pump.run().unwrap();
        assert_eq!(pump.state(), Some(OperatingState::Paused));
    }

    #[test]
    fn test_waiting_for_trigger() {
        let chain = chain(&[("00VER", "\r\nNE1000V3.9\r\n00^")]);
        let mut pump = pump(&chain);
        assert_eq!(pump.get_state().unwrap(), OperatingState::WaitingForTrigger);
    }

    #[test]
    fn test_diameter_mismatch_fails() {
        let chain = chain(&[
            ("00VER", "\r\nNE1000V3.9\r\n00:"),
            ("00DIA26.59", "\r\n\r\n00:"),
            ("00DIA", "\r\n26.50\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        assert!(matches!(
            pump.set_diameter(26.59, Syringe::Default),
            Err(PumpError::UnexpectedState { .. })
        ));
    }

    #[test]
    fn test_direction() {
        let chain = chain(&[
            ("00DIR", "\r\nINF\r\n00:"),
            ("00DIRREF", "\r\n\r\n00:"),
            ("00DIR", "\r\nREF\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        assert_eq!(pump.set_direction(Direction::Refill).unwrap(), Direction::Refill);
    }

    #[test]
    fn test_autofill() {
        let chain = chain(&[("00AFON", "\r\n\r\n00:"), ("00AF", "\r\nON\r\n00:")]);
        let mut pump = pump(&chain);
        pump.set_autofill(true).unwrap();
    }

    #[test]
    fn test_refill_rate() {
        let chain = chain(&[
            ("00RFR5.000MM", "\r\n\r\n00:"),
            ("00RFR", "\r\n5.000 ml/mn\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        let rate = pump.set_refill_rate(5.0, RateUnit::MilliPerMinute).unwrap();
        assert_eq!(rate, FlowRate::new(5.0, RateUnit::MilliPerMinute));
    }

    #[test]
    fn test_target_and_delivered_volume() {
        let chain = chain(&[
            ("00TGT1.000", "\r\n\r\n00:"),
            ("00TGT", "\r\n1.000 ml\r\n00:"),
            ("00DEL", "\r\n0.125 ml\r\n00:"),
            ("00CLD", "\r\n\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        assert_eq!(pump.set_target_volume(Volume::ml(1.0)).unwrap(), Volume::ml(1.0));
        assert_eq!(pump.delivered_volume().unwrap(), Volume::ml(0.125));
        pump.clear_delivered_volume().unwrap();
    }

    #[test]
    fn test_target_cannot_be_cleared() {
        let chain = chain(&[]);
        let mut pump = pump(&chain);
        assert!(matches!(
            pump.clear_target_volume(),
            Err(PumpError::Capability { .. })
        ));
    }

    #[test]
    fn test_log_parameters() {
        let chain = chain(&[
            ("00VER", "\r\nNE1000V3.9\r\n00:"),
            ("00MOD", "\r\nPMP\r\n00:"),
            ("00DIR", "\r\nINF\r\n00:"),
            ("00DIA", "\r\n26.59\r\n00:"),
            ("00RAT", "\r\n1.000 ml/hr\r\n00:"),
        ]);
        let mut pump = pump(&chain);
        let snapshot = pump.log_parameters().unwrap();
        assert_eq!(snapshot.mode, Some(Mode::PumpRate));
        assert_eq!(snapshot.direction, Some(Direction::Infuse));
        assert_eq!(snapshot.parallel, None);
    }
}
