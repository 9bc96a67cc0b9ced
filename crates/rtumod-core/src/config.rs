//! Runtime configuration for both engines.

use crate::pdu::FunctionCode;

/// What a responder does with an addressed frame whose CRC does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrcFailurePolicy {
    /// Drop the frame without answering; report it to [`crate::SlaveEvents::crc_mismatch`].
    #[default]
    Discard,
    /// Answer with a server-device-failure exception after reporting it.
    RespondWithError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SlaveConfig {
    pub device_id: u8,
    pub crc_failure: CrcFailurePolicy,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            device_id: 1,
            crc_failure: CrcFailurePolicy::Discard,
        }
    }
}

impl SlaveConfig {
    pub fn new(device_id: u8) -> Self {
        Self {
            device_id,
            ..Self::default()
        }
    }

    pub fn with_device_id(mut self, device_id: u8) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_crc_failure(mut self, policy: CrcFailurePolicy) -> Self {
        self.crc_failure = policy;
        self
    }
}

/// Set of function codes, one bit per supported code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionSet(u8);

impl FunctionSet {
    pub const ALL: FunctionSet = FunctionSet(u8::MAX);
    pub const EMPTY: FunctionSet = FunctionSet(0);

    const fn bit(function: FunctionCode) -> u8 {
        1 << match function {
            FunctionCode::ReadCoils => 0,
            FunctionCode::ReadInputStatus => 1,
            FunctionCode::ReadHoldingRegisters => 2,
            FunctionCode::ReadInputRegisters => 3,
            FunctionCode::ForceSingleCoil => 4,
            FunctionCode::PresetSingleRegister => 5,
            FunctionCode::ForceMultipleCoils => 6,
            FunctionCode::PresetMultipleRegisters => 7,
        }
    }

    pub const fn with(self, function: FunctionCode) -> Self {
        Self(self.0 | Self::bit(function))
    }

    pub const fn without(self, function: FunctionCode) -> Self {
        Self(self.0 & !Self::bit(function))
    }

    pub const fn contains(self, function: FunctionCode) -> bool {
        self.0 & Self::bit(function) != 0
    }

    pub fn iter(self) -> impl Iterator<Item = FunctionCode> {
        FunctionCode::ALL
            .into_iter()
            .filter(move |function| self.contains(*function))
    }
}

impl Default for FunctionSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<FunctionCode> for FunctionSet {
    fn from_iter<I: IntoIterator<Item = FunctionCode>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MasterConfig {
    /// Function codes the initiator may send and accept.
    pub enabled: FunctionSet,
}

impl MasterConfig {
    pub fn with_enabled(mut self, enabled: FunctionSet) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn without(mut self, function: FunctionCode) -> Self {
        self.enabled = self.enabled.without(function);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{FunctionSet, MasterConfig, SlaveConfig};
    use crate::pdu::FunctionCode;
    use crate::CrcFailurePolicy;

    #[test]
    fn all_contains_every_function() {
        for function in FunctionCode::ALL {
            assert!(FunctionSet::ALL.contains(function));
            assert!(!FunctionSet::EMPTY.contains(function));
        }
        assert_eq!(FunctionSet::ALL.iter().count(), 8);
    }

    #[test]
    fn builds_sets_from_functions() {
        let set: FunctionSet = [FunctionCode::ReadCoils, FunctionCode::PresetMultipleRegisters]
            .into_iter()
            .collect();
        assert!(set.contains(FunctionCode::ReadCoils));
        assert!(set.contains(FunctionCode::PresetMultipleRegisters));
        assert!(!set.contains(FunctionCode::ReadHoldingRegisters));
        assert!(!set.without(FunctionCode::ReadCoils).contains(FunctionCode::ReadCoils));
    }

    #[test]
    fn defaults() {
        let slave = SlaveConfig::default();
        assert_eq!(slave.device_id, 1);
        assert_eq!(slave.crc_failure, CrcFailurePolicy::Discard);
        assert_eq!(MasterConfig::default().enabled, FunctionSet::ALL);
        let master = MasterConfig::default().without(FunctionCode::ForceSingleCoil);
        assert!(!master.enabled.contains(FunctionCode::ForceSingleCoil));
    }
}
