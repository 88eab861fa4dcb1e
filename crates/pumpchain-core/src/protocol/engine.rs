//! Command engine
//!
//! Builds address-prefixed instructions, runs one exchange on the chain and
//! classifies the reply. Every pump operation goes through [`CommandEngine::issue`],
//! so firmware error tokens are checked in exactly one place.

use super::commands::{Address, Instruction, Mnemonic};
use super::reply::{Fault, Reply};
use super::transport::{Chain, Transport};
use super::{PumpError, Result, DEFAULT_READ_BUDGET};
use crate::pump::Syringe;

/// Per-pump view of a chain
pub struct CommandEngine<'c, T: Transport> {
    chain: &'c Chain<T>,
    address: Address,
    pump: String,
    selectors: &'static [(Syringe, &'static str)],
    read_budget: usize,
}

impl<'c, T: Transport> CommandEngine<'c, T> {
    pub fn new(
        chain: &'c Chain<T>,
        address: Address,
        pump: impl Into<String>,
        selectors: &'static [(Syringe, &'static str)],
    ) -> Self {
        Self {
            chain,
            address,
            pump: pump.into(),
            selectors,
            read_budget: DEFAULT_READ_BUDGET,
        }
    }

    /// Override how many bytes one reply may occupy
    pub fn with_read_budget(mut self, bytes: usize) -> Self {
        self.read_budget = bytes;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn pump_name(&self) -> &str {
        &self.pump
    }

    pub fn chain(&self) -> &'c Chain<T> {
        self.chain
    }

    /// Wire suffix for `syringe`, if this family defines one
    pub fn selector(&self, syringe: Syringe) -> Result<&'static str> {
        self.selectors
            .iter()
            .find(|(s, _)| *s == syringe)
            .map(|(_, suffix)| *suffix)
            .ok_or_else(|| {
                PumpError::Addressing(format!(
                    "{}: syringe {} is not defined for this pump",
                    self.pump,
                    syringe.index()
                ))
            })
    }

    /// Send one instruction and return the classified reply
    pub fn issue(
        &self,
        mnemonic: Mnemonic,
        value: &str,
        syringe: Syringe,
        unit_suffix: &str,
    ) -> Result<Reply> {
        let selector = self.selector(syringe)?;
        let instruction = Instruction::new(self.address, mnemonic, selector, value, unit_suffix);

        tracing::debug!(pump = %self.pump, "writing command: {}", instruction);
        let raw = self.chain.exchange(&instruction.to_frame(), self.read_budget)?;
        tracing::debug!(pump = %self.pump, "reading response: {:?}", String::from_utf8_lossy(&raw));

        if raw.is_empty() {
            tracing::warn!(pump = %self.pump, "no response to command <{}>", instruction);
            return Err(PumpError::NoResponse {
                pump: self.pump.clone(),
                instruction: instruction.text().to_string(),
            });
        }

        let reply = Reply::from_bytes(&raw);
        if let Some(fault) = reply.fault() {
            let pump = self.pump.clone();
            let instruction = instruction.text().to_string();
            tracing::error!(pump = %pump, "pump reported {:?} when <{}> was issued", fault, instruction);
            return Err(match fault {
                Fault::Syntax => PumpError::Syntax { pump, instruction },
                Fault::NotApplicable => PumpError::NotApplicable { pump, instruction },
                Fault::OutOfRange => PumpError::OutOfRange { pump, instruction },
            });
        }

        if let Some(echoed) = reply.prompt().and_then(|p| p.address) {
            if echoed != self.address.value() {
                return Err(PumpError::Addressing(format!(
                    "{}: reply to <{}> came from address {:02}",
                    self.pump, instruction, echoed
                )));
            }
        }

        Ok(reply)
    }

    /// Issue a bare query with no value on the default syringe
    pub fn query(&self, mnemonic: Mnemonic) -> Result<Reply> {
        self.issue(mnemonic, "", Syringe::Default, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MockTransport;

    const TWIN: &[(Syringe, &str)] = &[(Syringe::Default, ""), (Syringe::A, "A"), (Syringe::B, "B")];
    const SINGLE: &[(Syringe, &str)] = &[(Syringe::Default, "")];

    fn chain_with(replies: &[&[u8]]) -> Chain<MockTransport> {
        let mut mock = MockTransport::new();
        for r in replies {
            mock.push_reply(r);
        }
        Chain::new(mock).unwrap()
    }

    #[test]
    fn test_issue_builds_address_prefixed_frame() {
        let chain = chain_with(&[b"\r\n\r\n01:"]);
        let engine = CommandEngine::new(&chain, Address::new(1).unwrap(), "p1", TWIN);
        engine
            .issue(Mnemonic::Rate, "12.20", Syringe::B, "MH")
            .unwrap();
        let sent = chain.with_transport(|t| t.sent_instructions()).unwrap();
        assert_eq!(sent, vec!["01RATB12.20MH".to_string()]);
    }

    #[test]
    fn test_unknown_syringe_is_an_addressing_error() {
        let chain = chain_with(&[]);
        let engine = CommandEngine::new(&chain, Address::new(1).unwrap(), "p1", SINGLE);
        let err = engine.issue(Mnemonic::Diameter, "", Syringe::A, "").unwrap_err();
        assert!(matches!(err, PumpError::Addressing(_)));
        assert!(chain.with_transport(|t| t.sent_frames().is_empty()).unwrap());
    }

    #[test]
    fn test_silence_is_no_response() {
        let chain = chain_with(&[b""]);
        let engine = CommandEngine::new(&chain, Address::new(2).unwrap(), "p2", SINGLE);
        let err = engine.query(Mnemonic::Version).unwrap_err();
        assert!(matches!(err, PumpError::NoResponse { .. }));
    }

    #[test]
    fn test_error_tokens_are_classified() {
        let chain = chain_with(&[b"\r\n?\r\n00:", b"\r\nNA\r\n00>", b"\r\nOOR\r\n00:"]);
        let engine = CommandEngine::new(&chain, Address::new(0).unwrap(), "p0", SINGLE);
        assert!(matches!(engine.query(Mnemonic::Run), Err(PumpError::Syntax { .. })));
        assert!(matches!(engine.query(Mnemonic::Run), Err(PumpError::NotApplicable { .. })));
        assert!(matches!(engine.query(Mnemonic::Run), Err(PumpError::OutOfRange { .. })));
    }

    #[test]
    fn test_reply_from_other_address_is_rejected() {
        let chain = chain_with(&[b"\r\n33 V1.0\r\n02:"]);
        let engine = CommandEngine::new(&chain, Address::new(1).unwrap(), "p1", TWIN);
        assert!(matches!(
            engine.query(Mnemonic::Version),
            Err(PumpError::Addressing(_))
        ));
    }

    #[test]
    fn test_successful_reply_lines_are_returned() {
        let chain = chain_with(&[b"\r\nPRO\r\n01:"]);
        let engine = CommandEngine::new(&chain, Address::new(1).unwrap(), "p1", TWIN);
        let reply = engine.query(Mnemonic::Mode).unwrap();
        assert_eq!(reply.lines(), &["".to_string(), "PRO".to_string(), "01:".to_string()]);
    }
}
