use crate::DataLinkError;
use rtumod_core::master::PendingRequest;
use rtumod_core::transport::FrameQueue;
use rtumod_core::{
    InternalError, Master, MasterConfig, MasterEvents, ResponseData, ResponsePacket,
    ResponseStatus,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::{debug, trace, warn};

/// Bits per character on the line: start, 8 data, parity or second stop, stop.
const BITS_PER_CHAR: u32 = 11;

/// Inter-frame gap for `baud_rate`: 3.5 character times, fixed at 1.75 ms
/// above 19200 baud.
pub fn silence_for_baud(baud_rate: u32) -> Duration {
    if baud_rate == 0 || baud_rate > 19_200 {
        return Duration::from_micros(1_750);
    }
    let micros = u64::from(BITS_PER_CHAR) * 3_500_000 / u64::from(baud_rate);
    Duration::from_micros(micros)
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub baud_rate: u32,
    /// Line silence after which a partial frame is dropped.
    pub silence_timeout: Duration,
    /// How long an initiator waits for a complete response.
    pub response_timeout: Duration,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9_600,
            silence_timeout: silence_for_baud(9_600),
            response_timeout: Duration::from_millis(500),
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl LinkConfig {
    /// Sets the baud rate and derives the matching silence timeout.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self.silence_timeout = silence_for_baud(baud_rate);
        self
    }

    pub fn with_silence_timeout(mut self, silence_timeout: Duration) -> Self {
        self.silence_timeout = silence_timeout;
        self
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }
}

/// Opens `path` with the line settings from `config`.
pub fn open_serial(path: &str, config: &LinkConfig) -> Result<SerialStream, DataLinkError> {
    let builder = tokio_serial::new(path, config.baud_rate)
        .parity(config.parity)
        .data_bits(config.data_bits)
        .stop_bits(config.stop_bits)
        .flow_control(config.flow_control);
    builder.open_native_async().map_err(|err| {
        DataLinkError::Io(std::io::Error::other(format!(
            "failed to open serial port '{path}': {err}"
        )))
    })
}

/// Owned copy of a [`ResponsePacket`], kept until the caller collects it.
#[derive(Debug)]
enum Reply {
    Bits(Vec<bool>),
    Registers(Vec<u16>),
    Echo { address: u16, value: u16 },
    Failed(DataLinkError),
}

/// [`MasterEvents`] sink that parks the last completed exchange.
#[derive(Debug, Default)]
struct ResponseSlot {
    reply: Option<Reply>,
    internal: Option<InternalError>,
}

impl ResponseSlot {
    fn take(&mut self) -> Option<Result<Reply, DataLinkError>> {
        if let Some(err) = self.internal.take() {
            return Some(Err(err.into()));
        }
        self.reply.take().map(|reply| match reply {
            Reply::Failed(err) => Err(err),
            other => Ok(other),
        })
    }
}

impl MasterEvents for ResponseSlot {
    fn response(&mut self, packet: &ResponsePacket<'_>) {
        let reply = match packet.status {
            ResponseStatus::Ok => match packet.data {
                ResponseData::Bits(bits) => Reply::Bits(bits.to_vec()),
                ResponseData::Registers(regs) => Reply::Registers(regs.to_vec()),
                ResponseData::Echo { address, value } => Reply::Echo { address, value },
                ResponseData::None => Reply::Failed(DataLinkError::InvalidLength),
            },
            ResponseStatus::Exception(code) => Reply::Failed(DataLinkError::Exception(code)),
            ResponseStatus::UnexpectedFunction => {
                Reply::Failed(DataLinkError::UnexpectedFunction(packet.function))
            }
            ResponseStatus::CrcMismatch => Reply::Failed(DataLinkError::CrcMismatch),
            ResponseStatus::InvalidLength => Reply::Failed(DataLinkError::InvalidLength),
        };
        self.reply = Some(reply);
    }

    fn internal_error(&mut self, error: InternalError) {
        warn!(%error, "modbus rtu master internal error");
        self.internal = Some(error);
    }
}

/// Initiator side of a serial line: one request at a time, each awaited
/// until its response completes or the response timeout expires.
pub struct RtuMasterLink<IO> {
    io: IO,
    master: Master<FrameQueue, ResponseSlot>,
    config: LinkConfig,
}

impl RtuMasterLink<SerialStream> {
    pub fn open(path: &str, config: LinkConfig) -> Result<Self, DataLinkError> {
        let stream = open_serial(path, &config)?;
        Ok(Self::new(stream, MasterConfig::default(), config))
    }
}

impl<IO> RtuMasterLink<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: IO, master_config: MasterConfig, config: LinkConfig) -> Self {
        Self {
            io,
            master: Master::new(master_config, FrameQueue::new(), ResponseSlot::default()),
            config,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    pub async fn read_coils(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, DataLinkError> {
        let reply = self
            .exchange(|m| m.read_coils(device_id, address, quantity))
            .await?;
        expect_bits(reply)
    }

    pub async fn read_input_status(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, DataLinkError> {
        let reply = self
            .exchange(|m| m.read_input_status(device_id, address, quantity))
            .await?;
        expect_bits(reply)
    }

    pub async fn read_holding_registers(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, DataLinkError> {
        let reply = self
            .exchange(|m| m.read_holding_registers(device_id, address, quantity))
            .await?;
        expect_registers(reply)
    }

    pub async fn read_input_registers(
        &mut self,
        device_id: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, DataLinkError> {
        let reply = self
            .exchange(|m| m.read_input_registers(device_id, address, quantity))
            .await?;
        expect_registers(reply)
    }

    pub async fn force_single_coil(
        &mut self,
        device_id: u8,
        address: u16,
        value: bool,
    ) -> Result<(), DataLinkError> {
        let reply = self
            .exchange(|m| m.force_single_coil(device_id, address, value))
            .await?;
        expect_echo(reply)
    }

    pub async fn preset_single_register(
        &mut self,
        device_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), DataLinkError> {
        let reply = self
            .exchange(|m| m.preset_single_register(device_id, address, value))
            .await?;
        expect_echo(reply)
    }

    pub async fn force_multiple_coils(
        &mut self,
        device_id: u8,
        address: u16,
        values: &[bool],
    ) -> Result<(), DataLinkError> {
        let reply = self
            .exchange(|m| m.force_multiple_coils(device_id, address, values))
            .await?;
        expect_echo(reply)
    }

    pub async fn preset_multiple_registers(
        &mut self,
        device_id: u8,
        address: u16,
        values: &[u16],
    ) -> Result<(), DataLinkError> {
        let reply = self
            .exchange(|m| m.preset_multiple_registers(device_id, address, values))
            .await?;
        expect_echo(reply)
    }

    async fn exchange<F>(&mut self, send: F) -> Result<Reply, DataLinkError>
    where
        F: FnOnce(&mut Master<FrameQueue, ResponseSlot>) -> Result<(), InternalError>,
    {
        self.master.timeout();
        let _ = self.master.events_mut().take();
        let queued = send(&mut self.master);
        // The slot already holds the same error; drop it so the next call starts clean.
        let _ = self.master.events_mut().take();
        queued?;

        let frames: Vec<Vec<u8>> = self.master.transport_mut().drain().collect();
        for frame in &frames {
            trace!(frame_len = frame.len(), "sending modbus rtu request");
            self.io.write_all(frame).await?;
        }
        self.io.flush().await?;

        let pending = self.master.pending();
        let deadline = Instant::now() + self.config.response_timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(reply) = self.master.events_mut().take() {
                return reply;
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(self.abandon(pending));
            };
            let wait = if self.master.is_idle() {
                remaining
            } else {
                remaining.min(self.config.silence_timeout)
            };

            match timeout(wait, self.io.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    self.master.timeout();
                    return Err(DataLinkError::ConnectionClosed);
                }
                Ok(Ok(n)) => {
                    for byte in &buf[..n] {
                        self.master.receive_byte(*byte);
                    }
                }
                Ok(Err(err)) => {
                    self.master.timeout();
                    return Err(DataLinkError::Io(err));
                }
                Err(_) if !self.master.is_idle() => {
                    trace!("line silent mid-frame, dropping partial response");
                    self.master.reset();
                }
                Err(_) => {}
            }
        }
    }

    fn abandon(&mut self, pending: Option<PendingRequest>) -> DataLinkError {
        if let Some(pending) = pending {
            debug!(
                device_id = pending.device_id,
                function = pending.function.as_u8(),
                "modbus rtu request timed out"
            );
        }
        self.master.timeout();
        DataLinkError::Timeout
    }
}

fn expect_bits(reply: Reply) -> Result<Vec<bool>, DataLinkError> {
    match reply {
        Reply::Bits(bits) => Ok(bits),
        _ => Err(DataLinkError::InvalidLength),
    }
}

fn expect_registers(reply: Reply) -> Result<Vec<u16>, DataLinkError> {
    match reply {
        Reply::Registers(values) => Ok(values),
        _ => Err(DataLinkError::InvalidLength),
    }
}

fn expect_echo(reply: Reply) -> Result<(), DataLinkError> {
    match reply {
        Reply::Echo { address, value } => {
            trace!(address, value, "write acknowledged");
            Ok(())
        }
        _ => Err(DataLinkError::InvalidLength),
    }
}
