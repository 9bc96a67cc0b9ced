//! Register bank: the four addressable tables a responder serves.

use crate::pdu::ExceptionCode;

/// The four Modbus data tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterType {
    /// Read/write single bits (coils).
    DiscreteOutputCoils,
    /// Read-only single bits (input status).
    DiscreteInputCoils,
    /// Read-only 16-bit words.
    InputRegisters,
    /// Read/write 16-bit words.
    HoldingRegisters,
}

impl RegisterType {
    pub const ALL: [RegisterType; 4] = [
        Self::DiscreteOutputCoils,
        Self::DiscreteInputCoils,
        Self::InputRegisters,
        Self::HoldingRegisters,
    ];

    pub const fn is_bit(self) -> bool {
        matches!(self, Self::DiscreteOutputCoils | Self::DiscreteInputCoils)
    }
}

/// Storage behind a responder.
///
/// Implementors provide raw slot access; [`get`](Self::get) and
/// [`set`](Self::set) add the bounds check every access goes through. Bit
/// tables store `0` or `1`.
pub trait RegisterStore {
    /// Number of addressable slots. Zero disables the table and every
    /// function code that touches it.
    fn capacity(&self, kind: RegisterType) -> usize;

    /// Reads slot `index`, `None` if it does not exist.
    fn load(&self, kind: RegisterType, index: usize) -> Option<u16>;

    /// Writes slot `index`, returning `false` if it does not exist.
    fn store(&mut self, kind: RegisterType, index: usize, value: u16) -> bool;

    fn is_enabled(&self, kind: RegisterType) -> bool {
        self.capacity(kind) > 0
    }

    fn get(&self, kind: RegisterType, index: u16) -> Result<u16, ExceptionCode> {
        let index = usize::from(index);
        if index >= self.capacity(kind) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        self.load(kind, index)
            .ok_or(ExceptionCode::IllegalDataAddress)
    }

    /// Bit tables coerce any nonzero `value` to `1`.
    fn set(&mut self, kind: RegisterType, index: u16, value: u16) -> Result<(), ExceptionCode> {
        let index = usize::from(index);
        if index >= self.capacity(kind) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let value = if kind.is_bit() { u16::from(value != 0) } else { value };
        if self.store(kind, index, value) {
            Ok(())
        } else {
            Err(ExceptionCode::IllegalDataAddress)
        }
    }
}

/// Fixed-capacity tables sized at compile time; no allocator needed.
///
/// A capacity of `0` disables that table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPointModel<const DO: usize, const DI: usize, const IR: usize, const HR: usize> {
    pub coils: [bool; DO],
    pub discrete_inputs: [bool; DI],
    pub input_registers: [u16; IR],
    pub holding_registers: [u16; HR],
}

impl<const DO: usize, const DI: usize, const IR: usize, const HR: usize> Default
    for StaticPointModel<DO, DI, IR, HR>
{
    fn default() -> Self {
        Self {
            coils: [false; DO],
            discrete_inputs: [false; DI],
            input_registers: [0; IR],
            holding_registers: [0; HR],
        }
    }
}

impl<const DO: usize, const DI: usize, const IR: usize, const HR: usize>
    StaticPointModel<DO, DI, IR, HR>
{
    pub fn new() -> Self {
        Self::default()
    }
}

impl<const DO: usize, const DI: usize, const IR: usize, const HR: usize> RegisterStore
    for StaticPointModel<DO, DI, IR, HR>
{
    fn capacity(&self, kind: RegisterType) -> usize {
        match kind {
            RegisterType::DiscreteOutputCoils => DO,
            RegisterType::DiscreteInputCoils => DI,
            RegisterType::InputRegisters => IR,
            RegisterType::HoldingRegisters => HR,
        }
    }

    fn load(&self, kind: RegisterType, index: usize) -> Option<u16> {
        match kind {
            RegisterType::DiscreteOutputCoils => self.coils.get(index).map(|v| u16::from(*v)),
            RegisterType::DiscreteInputCoils => {
                self.discrete_inputs.get(index).map(|v| u16::from(*v))
            }
            RegisterType::InputRegisters => self.input_registers.get(index).copied(),
            RegisterType::HoldingRegisters => self.holding_registers.get(index).copied(),
        }
    }

    fn store(&mut self, kind: RegisterType, index: usize, value: u16) -> bool {
        match kind {
            RegisterType::DiscreteOutputCoils => put(&mut self.coils, index, value != 0),
            RegisterType::DiscreteInputCoils => put(&mut self.discrete_inputs, index, value != 0),
            RegisterType::InputRegisters => put(&mut self.input_registers, index, value),
            RegisterType::HoldingRegisters => put(&mut self.holding_registers, index, value),
        }
    }
}

fn put<V>(slots: &mut [V], index: usize, value: V) -> bool {
    match slots.get_mut(index) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

#[cfg(feature = "alloc")]
pub use banks::{CoilBank, PointModel, RegisterBank, RegisterConfig};

#[cfg(feature = "alloc")]
mod banks {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::{put, RegisterStore, RegisterType};

    /// Table capacities chosen at runtime.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(default))]
    pub struct RegisterConfig {
        pub discrete_output_coils: usize,
        pub discrete_input_coils: usize,
        pub input_registers: usize,
        pub holding_registers: usize,
    }

    impl RegisterConfig {
        pub fn with_coils(mut self, capacity: usize) -> Self {
            self.discrete_output_coils = capacity;
            self
        }

        pub fn with_discrete_inputs(mut self, capacity: usize) -> Self {
            self.discrete_input_coils = capacity;
            self
        }

        pub fn with_input_registers(mut self, capacity: usize) -> Self {
            self.input_registers = capacity;
            self
        }

        pub fn with_holding_registers(mut self, capacity: usize) -> Self {
            self.holding_registers = capacity;
            self
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CoilBank {
        values: Vec<bool>,
    }

    impl CoilBank {
        pub fn new(size: usize) -> Self {
            Self {
                values: vec![false; size],
            }
        }

        pub fn len(&self) -> usize {
            self.values.len()
        }

        pub fn is_empty(&self) -> bool {
            self.values.is_empty()
        }

        pub fn get(&self, index: usize) -> Option<bool> {
            self.values.get(index).copied()
        }

        pub fn set(&mut self, index: usize, value: bool) -> bool {
            put(&mut self.values, index, value)
        }

        pub fn as_slice(&self) -> &[bool] {
            &self.values
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RegisterBank {
        values: Vec<u16>,
    }

    impl RegisterBank {
        pub fn new(size: usize) -> Self {
            Self {
                values: vec![0u16; size],
            }
        }

        pub fn len(&self) -> usize {
            self.values.len()
        }

        pub fn is_empty(&self) -> bool {
            self.values.is_empty()
        }

        pub fn get(&self, index: usize) -> Option<u16> {
            self.values.get(index).copied()
        }

        pub fn set(&mut self, index: usize, value: u16) -> bool {
            put(&mut self.values, index, value)
        }

        pub fn as_slice(&self) -> &[u16] {
            &self.values
        }
    }

    /// Heap-backed tables sized from a [`RegisterConfig`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PointModel {
        pub coils: CoilBank,
        pub discrete_inputs: CoilBank,
        pub input_registers: RegisterBank,
        pub holding_registers: RegisterBank,
    }

    impl PointModel {
        pub fn new(config: RegisterConfig) -> Self {
            Self {
                coils: CoilBank::new(config.discrete_output_coils),
                discrete_inputs: CoilBank::new(config.discrete_input_coils),
                input_registers: RegisterBank::new(config.input_registers),
                holding_registers: RegisterBank::new(config.holding_registers),
            }
        }

        pub fn config(&self) -> RegisterConfig {
            RegisterConfig {
                discrete_output_coils: self.coils.len(),
                discrete_input_coils: self.discrete_inputs.len(),
                input_registers: self.input_registers.len(),
                holding_registers: self.holding_registers.len(),
            }
        }
    }

    impl RegisterStore for PointModel {
        fn capacity(&self, kind: RegisterType) -> usize {
            match kind {
                RegisterType::DiscreteOutputCoils => self.coils.len(),
                RegisterType::DiscreteInputCoils => self.discrete_inputs.len(),
                RegisterType::InputRegisters => self.input_registers.len(),
                RegisterType::HoldingRegisters => self.holding_registers.len(),
            }
        }

        fn load(&self, kind: RegisterType, index: usize) -> Option<u16> {
            match kind {
                RegisterType::DiscreteOutputCoils => self.coils.get(index).map(u16::from),
                RegisterType::DiscreteInputCoils => self.discrete_inputs.get(index).map(u16::from),
                RegisterType::InputRegisters => self.input_registers.get(index),
                RegisterType::HoldingRegisters => self.holding_registers.get(index),
            }
        }

        fn store(&mut self, kind: RegisterType, index: usize, value: u16) -> bool {
            match kind {
                RegisterType::DiscreteOutputCoils => self.coils.set(index, value != 0),
                RegisterType::DiscreteInputCoils => self.discrete_inputs.set(index, value != 0),
                RegisterType::InputRegisters => self.input_registers.set(index, value),
                RegisterType::HoldingRegisters => self.holding_registers.set(index, value),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RegisterStore, RegisterType, StaticPointModel};
    use crate::pdu::ExceptionCode;

    type Small = StaticPointModel<4, 2, 0, 3>;

    #[test]
    fn last_index_is_addressable() {
        let mut model = Small::new();
        model.set(RegisterType::HoldingRegisters, 2, 0xBEEF).unwrap();
        assert_eq!(model.get(RegisterType::HoldingRegisters, 2), Ok(0xBEEF));
    }

    #[test]
    fn capacity_index_is_illegal_address() {
        let mut model = Small::new();
        assert_eq!(
            model.get(RegisterType::HoldingRegisters, 3),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            model.set(RegisterType::DiscreteOutputCoils, 4, 1),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(model.coils, [false; 4]);
    }

    #[test]
    fn zero_capacity_disables_table() {
        let model = Small::new();
        assert!(!model.is_enabled(RegisterType::InputRegisters));
        assert!(model.is_enabled(RegisterType::DiscreteInputCoils));
        assert_eq!(
            model.get(RegisterType::InputRegisters, 0),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn coil_writes_coerce_nonzero_to_on() {
        let mut model = Small::new();
        model.set(RegisterType::DiscreteOutputCoils, 1, 0x1234).unwrap();
        assert_eq!(model.get(RegisterType::DiscreteOutputCoils, 1), Ok(1));
        assert!(model.coils[1]);
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn point_model_follows_config() {
        use super::{PointModel, RegisterConfig};

        let config = RegisterConfig::default()
            .with_coils(8)
            .with_holding_registers(10);
        let mut model = PointModel::new(config);
        assert_eq!(model.config(), config);
        assert_eq!(model.capacity(RegisterType::DiscreteInputCoils), 0);

        model.set(RegisterType::HoldingRegisters, 9, 7).unwrap();
        assert_eq!(model.holding_registers.get(9), Some(7));
        model.set(RegisterType::DiscreteOutputCoils, 0, 2).unwrap();
        assert_eq!(model.coils.get(0), Some(true));
    }
}
