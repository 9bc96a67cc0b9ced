//! Initiator (master) role: request encoder and byte-driven response decoder.

use heapless::Vec;

use crate::config::MasterConfig;
use crate::encoding::{Reader, Writer};
use crate::frame::rtu::{crc16, encode_frame};
use crate::pdu::{
    ExceptionCode, FunctionCode, FunctionKind, ReadRequest, Request, WriteMultipleCoilsRequest,
    WriteMultipleRegistersRequest, WriteSingleCoilRequest, WriteSingleRegisterRequest,
};
use crate::transport::Transport;
use crate::{InternalError, MAX_FRAME_LEN, MAX_PDU_LEN};

pub use crate::pdu::ResponseData;

/// Outcome of one request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseStatus {
    Ok,
    /// The responder answered with an exception for the function we sent.
    Exception(ExceptionCode),
    /// Function byte differs from the request, or is disabled locally.
    UnexpectedFunction,
    CrcMismatch,
    /// Body does not match the shape the request implies.
    InvalidLength,
}

/// Everything the response handler learns about a completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponsePacket<'a> {
    pub status: ResponseStatus,
    pub device_id: u8,
    /// Function byte as received, error bit included.
    pub function: u8,
    pub data: ResponseData<'a>,
}

impl ResponsePacket<'_> {
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// The request whose response the initiator is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingRequest {
    pub device_id: u8,
    pub function: FunctionCode,
    pub address: u16,
    pub quantity: u16,
}

/// Application hooks invoked synchronously by the initiator.
///
/// Implementations must not feed bytes back into the same engine.
pub trait MasterEvents {
    /// Called exactly once per completed exchange, whatever its status.
    fn response(&mut self, packet: &ResponsePacket<'_>);

    fn internal_error(&mut self, _error: InternalError) {}
}

impl<F> MasterEvents for F
where
    F: FnMut(&ResponsePacket<'_>),
{
    fn response(&mut self, packet: &ResponsePacket<'_>) {
        self(packet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Stage {
    DeviceId,
    Function,
    DataLength,
    RegisterAddress,
    ExceptionCode,
    Payload,
    Crc,
}

/// A Modbus RTU initiator bound to one bus.
///
/// Each request method encodes a frame, hands it to the transport and
/// remembers what it asked for. Bytes of the reply go to
/// [`receive_byte`](Self::receive_byte); the last one triggers
/// [`MasterEvents::response`].
pub struct Master<T, H> {
    config: MasterConfig,
    transport: T,
    events: H,
    stage: Stage,
    /// Raw bytes of a frame that answers the pending request.
    frame: Vec<u8, MAX_FRAME_LEN>,
    /// Frame comes from the device we are waiting on.
    expected: bool,
    counter: usize,
    payload_len: usize,
    crc: u16,
    pending: Option<PendingRequest>,
}

impl<T, H> Master<T, H>
where
    T: Transport,
    H: MasterEvents,
{
    pub fn new(config: MasterConfig, transport: T, events: H) -> Self {
        Self {
            config,
            transport,
            events,
            stage: Stage::DeviceId,
            frame: Vec::new(),
            expected: false,
            counter: 0,
            payload_len: 0,
            crc: 0,
            pending: None,
        }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
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

    pub fn into_parts(self) -> (T, H) {
        (self.transport, self.events)
    }

    /// The request still waiting for its response, if any.
    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::DeviceId
    }

    /// Drops a partially received frame; the pending request stays armed.
    pub fn reset(&mut self) {
        self.stage = Stage::DeviceId;
        self.frame.clear();
        self.expected = false;
        self.counter = 0;
        self.payload_len = 0;
        self.crc = 0;
    }

    /// Gives up on the pending request. No handler is invoked.
    pub fn timeout(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(
                "request {:?} to device {:?} timed out",
                pending.function, pending.device_id
            );
        }
        self.reset();
    }

    pub fn read_coils(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<(), InternalError> {
        self.read(FunctionCode::ReadCoils, device_id, address, quantity)
    }

    pub fn read_input_status(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<(), InternalError> {
        self.read(FunctionCode::ReadInputStatus, device_id, address, quantity)
    }

    pub fn read_holding_registers(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<(), InternalError> {
        self.read(FunctionCode::ReadHoldingRegisters, device_id, address, quantity)
    }

    pub fn read_input_registers(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<(), InternalError> {
        self.read(FunctionCode::ReadInputRegisters, device_id, address, quantity)
    }

    pub fn force_single_coil(
        &mut self,
        device_id: u8,
        address: u16,
        value: bool,
    ) -> Result<(), InternalError> {
        self.send_request(
            device_id,
            &Request::WriteSingleCoil(WriteSingleCoilRequest { address, value }),
        )
    }

    pub fn preset_single_register(
        &mut self,
        device_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), InternalError> {
        self.send_request(
            device_id,
            &Request::WriteSingleRegister(WriteSingleRegisterRequest { address, value }),
        )
    }

    pub fn force_multiple_coils(
        &mut self,
        device_id: u8,
        address: u16,
        values: &[bool],
    ) -> Result<(), InternalError> {
        self.send_request(
            device_id,
            &Request::WriteMultipleCoils(WriteMultipleCoilsRequest {
                start_address: address,
                values,
            }),
        )
    }

    pub fn preset_multiple_registers(
        &mut self,
        device_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), InternalError> {
        self.send_request(
            device_id,
            &Request::WriteMultipleRegisters(WriteMultipleRegistersRequest {
                start_address: address,
                values,
            }),
        )
    }

    fn read(
        &mut self,
        function: FunctionCode,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<(), InternalError> {
        self.send_request(
            device_id,
            &Request::Read(ReadRequest {
                function,
                start_address: address,
                quantity,
            }),
        )
    }

    /// Encodes and sends `request`, replacing any pending one.
    ///
    /// Failures are reported to [`MasterEvents::internal_error`] as well as
    /// returned; nothing is sent in that case.
    pub fn send_request(&mut self, device_id: u8, request: &Request<'_>) -> Result<(), InternalError> {
        let result = self.try_send(device_id, request);
        if let Err(err) = result {
            warn!("request not sent: {:?}", err);
            self.events.internal_error(err);
        }
        result
    }

    fn try_send(&mut self, device_id: u8, request: &Request<'_>) -> Result<(), InternalError> {
        let function = request.function_code();
        if !self.config.enabled.contains(function) {
            return Err(InternalError::FunctionDisabled(function.as_u8()));
        }
        let quantity = request.quantity()?;

        let mut pdu = [0u8; MAX_PDU_LEN];
        let mut w = Writer::new(&mut pdu);
        request.encode(&mut w)?;
        let mut buf = [0u8; MAX_FRAME_LEN];
        let mut frame = Writer::new(&mut buf);
        encode_frame(&mut frame, device_id, w.as_written())?;

        self.pending = Some(PendingRequest {
            device_id,
            function,
            address: request.start_address(),
            quantity,
        });
        self.reset();
        if let Err(err) = self.transport.send(frame.as_written()) {
            self.pending = None;
            return Err(err.into());
        }
        debug!(
            "sent {:?} to device {:?}, {:?} bytes",
            function,
            device_id,
            frame.position()
        );
        Ok(())
    }

    /// Consumes one byte from the line.
    pub fn receive_byte(&mut self, byte: u8) {
        if self.stage == Stage::DeviceId {
            self.expected = self.pending.is_some_and(|p| p.device_id == byte);
        }
        if self.expected && self.frame.push(byte).is_err() {
            warn!("inbound frame overflows scratch buffer");
            self.events.internal_error(InternalError::FrameOverflow);
            self.reset();
            return;
        }

        match self.stage {
            Stage::DeviceId => self.stage = Stage::Function,
            Stage::Function => {
                self.stage = if FunctionCode::is_exception(byte) {
                    Stage::ExceptionCode
                } else {
                    match FunctionCode::from_u8(byte).map(FunctionCode::kind) {
                        Ok(FunctionKind::Read) => Stage::DataLength,
                        Ok(FunctionKind::WriteSingle | FunctionKind::WriteMultiple) => {
                            Stage::RegisterAddress
                        }
                        Err(_) => Stage::ExceptionCode,
                    }
                };
                self.counter = 0;
            }
            Stage::DataLength => {
                self.payload_len = usize::from(byte);
                // id, function, length, data, crc
                if self.expected && 3 + self.payload_len + 2 > MAX_FRAME_LEN {
                    warn!("declared response length {:?} overflows scratch buffer", byte);
                    self.events.internal_error(InternalError::FrameOverflow);
                    self.reset();
                    return;
                }
                self.enter_payload();
            }
            Stage::RegisterAddress => {
                self.counter += 1;
                if self.counter == 2 {
                    self.payload_len = 2;
                    self.enter_payload();
                }
            }
            Stage::ExceptionCode => {
                self.payload_len = 0;
                self.enter_payload();
            }
            Stage::Payload => {
                self.counter += 1;
                if self.counter >= self.payload_len {
                    self.enter_crc();
                }
            }
            Stage::Crc => {
                self.crc |= u16::from(byte) << (8 * self.counter);
                self.counter += 1;
                if self.counter == 2 {
                    self.on_frame_complete();
                }
            }
        }
    }

    fn enter_payload(&mut self) {
        self.counter = 0;
        if self.payload_len == 0 {
            self.enter_crc();
        } else {
            self.stage = Stage::Payload;
        }
    }

    fn enter_crc(&mut self) {
        self.stage = Stage::Crc;
        self.counter = 0;
        self.crc = 0;
    }

    fn on_frame_complete(&mut self) {
        let pending = match self.pending {
            Some(pending) if self.expected => pending,
            _ => {
                trace!("unsolicited or foreign response discarded");
                self.reset();
                return;
            }
        };

        let body_len = self.frame.len().saturating_sub(2);
        let function = self.frame.get(1).copied().unwrap_or_default();
        let body = self.frame.get(2..body_len).unwrap_or_default();
        let (status, data) = classify(&self.config, pending, function, body)
            .and_then(|()| {
                let expected = crc16(&self.frame[..body_len]);
                if expected == self.crc {
                    Ok(())
                } else {
                    warn!(
                        "crc mismatch: expected {:?}, received {:?}",
                        expected, self.crc
                    );
                    Err(ResponseStatus::CrcMismatch)
                }
            })
            .and_then(|()| {
                let mut r = Reader::new(body);
                ResponseData::decode(pending.function, pending.quantity, &mut r)
                    .map_err(|_| ResponseStatus::InvalidLength)
            })
            .map_or_else(|status| (status, ResponseData::None), |data| (ResponseStatus::Ok, data));

        let packet = ResponsePacket {
            status,
            device_id: pending.device_id,
            function,
            data,
        };
        debug!(
            "response from device {:?}: {:?}",
            packet.device_id, packet.status
        );
        self.events.response(&packet);
        self.pending = None;
        self.reset();
    }
}

/// Checks the function byte of a response against what was asked for.
fn classify(
    config: &MasterConfig,
    pending: PendingRequest,
    function: u8,
    body: &[u8],
) -> Result<(), ResponseStatus> {
    if FunctionCode::is_exception(function) {
        if function & 0x7F != pending.function.as_u8() {
            return Err(ResponseStatus::UnexpectedFunction);
        }
        let code = body.first().copied().unwrap_or_default();
        return Err(ResponseStatus::Exception(ExceptionCode::from_u8(code)));
    }
    match FunctionCode::from_u8(function) {
        Ok(received) if received == pending.function && config.enabled.contains(received) => {
            Ok(())
        }
        _ => Err(ResponseStatus::UnexpectedFunction),
    }
}
