//! Responder (slave) role: byte-driven request decoder and response builder.

use heapless::Vec;

use crate::config::{CrcFailurePolicy, SlaveConfig};
use crate::encoding::{Reader, Writer};
use crate::frame::rtu::{crc16, encode_frame};
use crate::pdu::{
    encode_read_bits, encode_read_registers, encode_write_echo, DecodedRequest, ExceptionCode,
    ExceptionResponse, FunctionCode, FunctionKind, COIL_OFF, COIL_ON,
};
use crate::registers::RegisterStore;
use crate::transport::Transport;
use crate::{DecodeError, EncodeError, InternalError, MAX_FRAME_LEN, MAX_PDU_LEN};

/// Application hooks invoked synchronously from [`Slave::receive_byte`].
///
/// Implementations must not feed bytes back into the same engine.
pub trait SlaveEvents {
    /// A failure that cannot be answered on the wire.
    fn internal_error(&mut self, _error: InternalError) {}

    /// An addressed frame arrived with a bad checksum.
    fn crc_mismatch(&mut self, _expected: u16, _received: u16) {}
}

impl SlaveEvents for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Stage {
    DeviceId,
    Function,
    RegisterAddress,
    Payload,
    Crc,
}

/// Why a complete request produced no normal response.
enum Rejection {
    Exception(ExceptionCode),
    Encode(EncodeError),
}

impl From<ExceptionCode> for Rejection {
    fn from(code: ExceptionCode) -> Self {
        Self::Exception(code)
    }
}

impl From<EncodeError> for Rejection {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

/// A Modbus RTU responder bound to one bus.
///
/// Feed every received byte to [`receive_byte`](Self::receive_byte). When the
/// last byte of a request addressed to this device arrives the request is
/// validated against the register store, applied, and answered through the
/// transport before the call returns. Call [`reset`](Self::reset) when the
/// line has been silent longer than the inter-frame gap.
pub struct Slave<S, T, H = ()> {
    config: SlaveConfig,
    registers: S,
    transport: T,
    events: H,
    stage: Stage,
    /// Raw bytes of the frame in progress; only filled while `addressed`.
    frame: Vec<u8, MAX_FRAME_LEN>,
    /// Frame targets this device and has not been answered yet.
    addressed: bool,
    function: Option<FunctionCode>,
    address: u16,
    quantity: u16,
    /// Bytes consumed by the current stage.
    counter: usize,
    payload_len: usize,
    word: u16,
    crc: u16,
}

impl<S, T> Slave<S, T, ()>
where
    S: RegisterStore,
    T: Transport,
{
    pub fn new(config: SlaveConfig, registers: S, transport: T) -> Self {
        Self::with_events(config, registers, transport, ())
    }
}

impl<S, T, H> Slave<S, T, H>
where
    S: RegisterStore,
    T: Transport,
    H: SlaveEvents,
{
    pub fn with_events(config: SlaveConfig, registers: S, transport: T, events: H) -> Self {
        Self {
            config,
            registers,
            transport,
            events,
            stage: Stage::DeviceId,
            frame: Vec::new(),
            addressed: false,
            function: None,
            address: 0,
            quantity: 0,
            counter: 0,
            payload_len: 0,
            word: 0,
            crc: 0,
        }
    }

    pub fn config(&self) -> &SlaveConfig {
        &self.config
    }

    pub fn device_id(&self) -> u8 {
        self.config.device_id
    }

    /// Changes the device id this responder answers to and drops any partial frame.
    pub fn set_device_id(&mut self, device_id: u8) {
        self.config.device_id = device_id;
        self.reset();
    }

    pub fn registers(&self) -> &S {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut S {
        &mut self.registers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn events(&self) -> &H {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut H {
        &mut self.events
    }

    pub fn into_parts(self) -> (S, T, H) {
        (self.registers, self.transport, self.events)
    }

    /// True while no frame is partially accumulated.
    pub fn is_idle(&self) -> bool {
        self.stage == Stage::DeviceId
    }

    /// Discards any partially received frame. Never invokes a hook.
    pub fn reset(&mut self) {
        self.stage = Stage::DeviceId;
        self.frame.clear();
        self.addressed = false;
        self.function = None;
        self.address = 0;
        self.quantity = 0;
        self.counter = 0;
        self.payload_len = 0;
        self.word = 0;
        self.crc = 0;
    }

    /// Inter-frame silence expired; same as [`reset`](Self::reset).
    pub fn timeout(&mut self) {
        self.reset();
    }

    /// Consumes one byte from the line.
    pub fn receive_byte(&mut self, byte: u8) {
        if self.stage == Stage::DeviceId {
            self.addressed = byte == self.config.device_id;
        }
        if self.addressed && self.frame.push(byte).is_err() {
            warn!("inbound frame overflows scratch buffer");
            self.events.internal_error(InternalError::FrameOverflow);
            self.reset();
            return;
        }

        match self.stage {
            Stage::DeviceId => self.stage = Stage::Function,
            Stage::Function => self.on_function(byte),
            Stage::RegisterAddress => {
                self.word = (self.word << 8) | u16::from(byte);
                self.counter += 1;
                if self.counter == 2 {
                    self.address = self.word;
                    self.enter(Stage::Payload);
                    if self.addressed {
                        self.check_address();
                    }
                }
            }
            Stage::Payload => self.on_payload(byte),
            Stage::Crc => {
                self.crc |= u16::from(byte) << (8 * self.counter);
                self.counter += 1;
                if self.counter == 2 {
                    self.on_frame_complete();
                }
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.counter = 0;
        self.word = 0;
    }

    fn on_function(&mut self, byte: u8) {
        let function = FunctionCode::from_u8(byte).ok();
        let enabled = function.is_some_and(|f| self.registers.is_enabled(f.register_type()));
        self.function = function;

        match function {
            Some(function) => {
                self.payload_len = match function.kind() {
                    FunctionKind::WriteMultiple => 3,
                    FunctionKind::Read | FunctionKind::WriteSingle => 2,
                };
                self.enter(Stage::RegisterAddress);
                if self.addressed && !enabled {
                    self.reject_early(ExceptionCode::IllegalFunction);
                }
            }
            None if self.addressed => {
                self.reject_early(ExceptionCode::IllegalFunction);
                // Without a known shape the rest of the frame cannot be tracked.
                self.reset();
            }
            None => {
                trace!("unknown function on foreign frame, resynchronizing");
                self.reset();
            }
        }
    }

    fn check_address(&mut self) {
        let Some(function) = self.function else {
            return;
        };
        let capacity = self.registers.capacity(function.register_type());
        if usize::from(self.address) >= capacity {
            self.reject_early(ExceptionCode::IllegalDataAddress);
        }
    }

    fn on_payload(&mut self, byte: u8) {
        self.counter += 1;
        if self.counter <= 2 {
            self.quantity = (self.quantity << 8) | u16::from(byte);
        }

        let Some(function) = self.function else {
            self.reset();
            return;
        };
        let multiple = function.kind() == FunctionKind::WriteMultiple;

        if multiple && self.counter == 3 {
            self.payload_len = 3 + usize::from(byte);
            if self.addressed {
                let expected = function.data_len(self.quantity);
                if let Err(code) = self.check_quantity(function) {
                    self.reject_early(code);
                } else if usize::from(byte) != expected {
                    self.reject_early(ExceptionCode::IllegalDataValue);
                }
            }
        }

        if self.counter == self.payload_len {
            if self.addressed && function.kind() == FunctionKind::Read {
                if let Err(code) = self.check_quantity(function) {
                    self.reject_early(code);
                }
            }
            self.enter(Stage::Crc);
            self.crc = 0;
        }
    }

    fn check_quantity(&self, function: FunctionCode) -> Result<(), ExceptionCode> {
        check_range(&self.registers, function, self.address, self.quantity)
    }

    fn on_frame_complete(&mut self) {
        if !self.addressed {
            trace!("frame for another device discarded");
            self.reset();
            return;
        }

        let body_len = self.frame.len().saturating_sub(2);
        let expected = crc16(&self.frame[..body_len]);
        if expected != self.crc {
            let received = self.crc;
            warn!(
                "crc mismatch: expected {:?}, received {:?}",
                expected, received
            );
            self.events.crc_mismatch(expected, received);
            if self.config.crc_failure == CrcFailurePolicy::RespondWithError {
                let function = self.frame.get(1).copied().unwrap_or_default();
                self.send_exception(function, ExceptionCode::ServerDeviceFailure);
            }
            self.reset();
            return;
        }

        self.process(body_len);
        self.reset();
    }

    /// Validates, applies and answers a complete, checksummed request.
    fn process(&mut self, body_len: usize) {
        let mut pdu = [0u8; MAX_PDU_LEN];
        let function_byte = self.frame.get(1).copied().unwrap_or_default();

        let outcome = {
            let mut reader = Reader::new(self.frame.get(1..body_len).unwrap_or_default());
            match DecodedRequest::decode(&mut reader) {
                Ok(request) => {
                    let mut w = Writer::new(&mut pdu);
                    execute(&mut self.registers, &request, &mut w).map(|()| w.position())
                }
                Err(DecodeError::InvalidFunctionCode) => {
                    Err(Rejection::Exception(ExceptionCode::IllegalFunction))
                }
                Err(_) => Err(Rejection::Exception(ExceptionCode::IllegalDataValue)),
            }
        };

        match outcome {
            Ok(len) => {
                debug!("request {:?} served", function_byte);
                self.send_pdu(&pdu[..len]);
            }
            Err(Rejection::Exception(code)) => {
                debug!("request {:?} rejected: {:?}", function_byte, code);
                self.send_exception(function_byte, code);
            }
            Err(Rejection::Encode(err)) => {
                warn!("response encoding failed: {:?}", err);
                self.events.internal_error(InternalError::Encode(err));
            }
        }
    }

    /// Answers the frame in progress before it is complete, then keeps
    /// tracking its shape without side effects.
    fn reject_early(&mut self, code: ExceptionCode) {
        let function = self.frame.get(1).copied().unwrap_or_default();
        debug!("request {:?} rejected early: {:?}", function, code);
        self.send_exception(function, code);
        self.addressed = false;
        self.frame.clear();
    }

    fn send_exception(&mut self, function: u8, code: ExceptionCode) {
        let mut pdu = [0u8; 2];
        let mut w = Writer::new(&mut pdu);
        match ExceptionResponse::new(function, code).encode(&mut w) {
            Ok(()) => self.send_pdu(&pdu),
            Err(err) => self.events.internal_error(InternalError::Encode(err)),
        }
    }

    fn send_pdu(&mut self, pdu: &[u8]) {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let mut w = Writer::new(&mut buf);
        if let Err(err) = encode_frame(&mut w, self.config.device_id, pdu) {
            self.events.internal_error(InternalError::Encode(err));
            return;
        }
        if let Err(err) = self.transport.send(w.as_written()) {
            warn!("transport refused response: {:?}", err);
            self.events.internal_error(InternalError::Transport(err));
        }
    }
}

/// Checks `quantity` points starting at `address` against the table behind `function`.
fn check_range<S: RegisterStore>(
    registers: &S,
    function: FunctionCode,
    address: u16,
    quantity: u16,
) -> Result<(), ExceptionCode> {
    let capacity = registers.capacity(function.register_type());
    let start = usize::from(address);
    if start >= capacity {
        return Err(ExceptionCode::IllegalDataAddress);
    }
    if function.kind() == FunctionKind::WriteSingle {
        return Ok(());
    }
    let end = start + usize::from(quantity);
    if quantity == 0
        || quantity > function.max_quantity()
        || end > capacity
        || end > usize::from(u16::MAX) + 1
    {
        return Err(ExceptionCode::IllegalDataValue);
    }
    Ok(())
}

fn execute<S: RegisterStore>(
    registers: &mut S,
    request: &DecodedRequest<'_>,
    w: &mut Writer<'_>,
) -> Result<(), Rejection> {
    let function = request.function_code();
    let kind = function.register_type();
    let start = request.start_address();
    let quantity = request.quantity();
    check_range(registers, function, start, quantity)?;

    match request {
        DecodedRequest::Read(_) if kind.is_bit() => {
            let mut fault = None;
            let bits = (0..quantity).map(|i| match registers.get(kind, start + i) {
                Ok(value) => value != 0,
                Err(code) => {
                    fault.get_or_insert(code);
                    false
                }
            });
            encode_read_bits(w, function, quantity, bits)?;
            if let Some(code) = fault {
                return Err(code.into());
            }
        }
        DecodedRequest::Read(_) => {
            let mut fault = None;
            let values = (0..quantity).map(|i| match registers.get(kind, start + i) {
                Ok(value) => value,
                Err(code) => {
                    fault.get_or_insert(code);
                    0
                }
            });
            encode_read_registers(w, function, quantity, values)?;
            if let Some(code) = fault {
                return Err(code.into());
            }
        }
        DecodedRequest::WriteSingleCoil(req) => {
            registers.set(kind, req.address, u16::from(req.value))?;
            let stored = registers.get(kind, req.address)?;
            let echo = if stored != 0 { COIL_ON } else { COIL_OFF };
            encode_write_echo(w, function, req.address, echo)?;
        }
        DecodedRequest::WriteSingleRegister(req) => {
            registers.set(kind, req.address, req.value)?;
            encode_write_echo(w, function, req.address, req.value)?;
        }
        DecodedRequest::WriteMultipleCoils {
            start_address,
            values,
        } => {
            for (i, bit) in values.iter().enumerate() {
                registers.set(kind, start_address + i as u16, u16::from(bit))?;
            }
            encode_write_echo(w, function, *start_address, quantity)?;
        }
        DecodedRequest::WriteMultipleRegisters {
            start_address,
            values,
        } => {
            for (i, value) in values.iter().enumerate() {
                registers.set(kind, start_address + i as u16, value)?;
            }
            encode_write_echo(w, function, *start_address, quantity)?;
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "alloc"))]
mod tests {
    use alloc::vec::Vec;

    use super::{Slave, SlaveEvents};
    use crate::config::{CrcFailurePolicy, SlaveConfig};
    use crate::encoding::Writer;
    use crate::frame::rtu::{decode_frame, encode_frame};
    use crate::registers::{RegisterStore, RegisterType, StaticPointModel};
    use crate::transport::{FrameQueue, NoTransport};
    use crate::InternalError;

    type Model = StaticPointModel<16, 8, 4, 10>;

    #[derive(Default)]
    struct Recorder {
        internal: Vec<InternalError>,
        crc: Vec<(u16, u16)>,
    }

    impl SlaveEvents for Recorder {
        fn internal_error(&mut self, error: InternalError) {
            self.internal.push(error);
        }

        fn crc_mismatch(&mut self, expected: u16, received: u16) {
            self.crc.push((expected, received));
        }
    }

    fn frame(address: u8, pdu: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        encode_frame(&mut w, address, pdu).unwrap();
        w.as_written().to_vec()
    }

    fn slave() -> Slave<Model, FrameQueue, Recorder> {
        Slave::with_events(
            SlaveConfig::new(0x11),
            Model::new(),
            FrameQueue::new(),
            Recorder::default(),
        )
    }

    fn feed<S: RegisterStore, T: crate::Transport, H: SlaveEvents>(
        slave: &mut Slave<S, T, H>,
        bytes: &[u8],
    ) {
        for byte in bytes {
            slave.receive_byte(*byte);
        }
    }

    fn reply(slave: &mut Slave<Model, FrameQueue, Recorder>) -> Vec<u8> {
        let raw = slave.transport_mut().pop().expect("no response sent");
        let (address, pdu) = decode_frame(&raw).unwrap();
        assert_eq!(address, 0x11);
        pdu.to_vec()
    }

    #[test]
    fn reads_holding_registers() {
        let mut slave = slave();
        slave.registers_mut().holding_registers[0] = 6;
        slave.registers_mut().holding_registers[2] = 7;
        feed(&mut slave, &frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x03]));
        assert_eq!(
            reply(&mut slave),
            [0x03, 0x06, 0x00, 0x06, 0x00, 0x00, 0x00, 0x07]
        );
        assert!(slave.is_idle());
    }

    #[test]
    fn reads_coils_packed_from_bit_zero() {
        let mut slave = slave();
        slave.registers_mut().coils[3] = true;
        slave.registers_mut().coils[4] = true;
        feed(&mut slave, &frame(0x11, &[0x01, 0x00, 0x03, 0x00, 0x09]));
        assert_eq!(reply(&mut slave), [0x01, 0x02, 0x03, 0x00]);
    }

    #[test]
    fn writes_single_coil_and_echoes_canonical_value() {
        let mut slave = slave();
        feed(&mut slave, &frame(0x11, &[0x05, 0x00, 0x02, 0x12, 0x34]));
        assert_eq!(reply(&mut slave), [0x05, 0x00, 0x02, 0xFF, 0x00]);
        assert!(slave.registers().coils[2]);
    }

    #[test]
    fn writes_multiple_registers() {
        let mut slave = slave();
        feed(
            &mut slave,
            &frame(0x11, &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]),
        );
        assert_eq!(reply(&mut slave), [0x10, 0x00, 0x01, 0x00, 0x02]);
        assert_eq!(slave.registers().holding_registers[1..3], [0x000A, 0x0102]);
    }

    #[test]
    fn address_at_capacity_is_rejected() {
        let mut slave = slave();
        feed(&mut slave, &frame(0x11, &[0x04, 0x00, 0x04, 0x00, 0x01]));
        assert_eq!(reply(&mut slave), [0x84, 0x02]);
        assert!(slave.transport().is_empty());
        assert!(slave.is_idle());
    }

    #[test]
    fn last_index_is_readable() {
        let mut slave = slave();
        slave.registers_mut().input_registers[3] = 0x55AA;
        feed(&mut slave, &frame(0x11, &[0x04, 0x00, 0x03, 0x00, 0x01]));
        assert_eq!(reply(&mut slave), [0x04, 0x02, 0x55, 0xAA]);
    }

    #[test]
    fn quantity_past_capacity_is_illegal_value() {
        let mut slave = slave();
        feed(&mut slave, &frame(0x11, &[0x03, 0x00, 0x08, 0x00, 0x03]));
        assert_eq!(reply(&mut slave), [0x83, 0x03]);
        assert!(slave.transport().is_empty());
    }

    #[test]
    fn byte_count_mismatch_is_illegal_value() {
        let mut slave = slave();
        feed(
            &mut slave,
            &frame(0x11, &[0x0F, 0x00, 0x00, 0x00, 0x04, 0x02, 0x0A, 0x00]),
        );
        assert_eq!(reply(&mut slave), [0x8F, 0x03]);
        assert_eq!(slave.registers().coils, [false; 16]);
    }

    #[test]
    fn unknown_function_is_answered_immediately() {
        let mut slave = slave();
        feed(&mut slave, &[0x11, 0x2B]);
        assert_eq!(reply(&mut slave), [0xAB, 0x01]);
        assert!(slave.is_idle());
    }

    #[test]
    fn disabled_table_is_illegal_function() {
        let mut slave = Slave::new(
            SlaveConfig::new(0x11),
            StaticPointModel::<0, 0, 0, 4>::new(),
            FrameQueue::new(),
        );
        let request = frame(0x11, &[0x01, 0x00, 0x00, 0x00, 0x01]);
        feed(&mut slave, &request);
        let raw = slave.transport_mut().pop().unwrap();
        assert_eq!(decode_frame(&raw).unwrap().1, [0x81, 0x01]);
        assert!(slave.transport().is_empty());
        assert!(slave.is_idle());
    }

    #[test]
    fn foreign_frames_are_ignored() {
        let mut slave = slave();
        feed(
            &mut slave,
            &frame(0x12, &[0x10, 0x00, 0x00, 0x00, 0x01, 0x02, 0xAB, 0xCD]),
        );
        assert!(slave.transport().is_empty());
        assert!(slave.is_idle());
        assert_eq!(slave.registers().holding_registers[0], 0);

        feed(&mut slave, &frame(0x11, &[0x06, 0x00, 0x00, 0x00, 0x2A]));
        assert_eq!(reply(&mut slave), [0x06, 0x00, 0x00, 0x00, 0x2A]);
    }

    #[test]
    fn crc_mismatch_is_discarded_by_default() {
        let mut slave = slave();
        let mut request = frame(0x11, &[0x06, 0x00, 0x00, 0x00, 0x2A]);
        let last = request.len() - 1;
        request[last] ^= 0xFF;
        feed(&mut slave, &request);
        assert!(slave.transport().is_empty());
        assert_eq!(slave.registers().holding_registers[0], 0);
        assert_eq!(slave.events().crc.len(), 1);
        assert!(slave.is_idle());
    }

    #[test]
    fn crc_mismatch_can_be_answered() {
        let mut slave = Slave::with_events(
            SlaveConfig::new(0x11).with_crc_failure(CrcFailurePolicy::RespondWithError),
            Model::new(),
            FrameQueue::new(),
            Recorder::default(),
        );
        let mut request = frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        request[6] ^= 0x01;
        feed(&mut slave, &request);
        assert_eq!(reply(&mut slave), [0x83, 0x04]);
    }

    #[test]
    fn missing_transport_is_an_internal_error() {
        let mut slave = Slave::with_events(
            SlaveConfig::new(0x11),
            Model::new(),
            NoTransport,
            Recorder::default(),
        );
        feed(&mut slave, &frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]));
        assert_eq!(slave.events().internal.len(), 1);
        assert!(matches!(
            slave.events().internal[0],
            InternalError::Transport(_)
        ));
        assert!(slave.is_idle());
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut slave = slave();
        feed(&mut slave, &[0x11, 0x03, 0x00]);
        assert!(!slave.is_idle());
        slave.reset();
        feed(&mut slave, &frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]));
        assert_eq!(reply(&mut slave), [0x03, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn set_device_id_changes_target() {
        let mut slave = slave();
        slave.set_device_id(0x20);
        feed(&mut slave, &frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]));
        assert!(slave.transport().is_empty());
        feed(&mut slave, &frame(0x20, &[0x03, 0x00, 0x00, 0x00, 0x01]));
        let raw = slave.transport_mut().pop().unwrap();
        assert_eq!(decode_frame(&raw).unwrap().0, 0x20);
    }

    #[test]
    fn register_access_goes_through_store() {
        let mut slave = slave();
        slave
            .registers_mut()
            .set(RegisterType::HoldingRegisters, 9, 99)
            .unwrap();
        assert_eq!(
            slave.registers().get(RegisterType::HoldingRegisters, 9),
            Ok(99)
        );
    }
}
