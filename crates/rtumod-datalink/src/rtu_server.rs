use crate::rtu::{open_serial, LinkConfig};
use crate::DataLinkError;
use rtumod_core::registers::RegisterStore;
use rtumod_core::transport::FrameQueue;
use rtumod_core::{Slave, SlaveConfig, SlaveEvents};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::SerialStream;
use tracing::{debug, trace, warn};

/// Responder side of a serial line.
pub struct RtuSlaveServer<IO, S, H = ()> {
    io: IO,
    slave: Slave<S, FrameQueue, H>,
    config: LinkConfig,
}

impl<S: RegisterStore> RtuSlaveServer<SerialStream, S, ()> {
    pub fn open(
        path: &str,
        slave_config: SlaveConfig,
        registers: S,
        config: LinkConfig,
    ) -> Result<Self, DataLinkError> {
        let stream = open_serial(path, &config)?;
        let slave = Slave::new(slave_config, registers, FrameQueue::new());
        Ok(Self::from_stream(stream, slave, config))
    }
}

impl<IO, S, H> RtuSlaveServer<IO, S, H>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    S: RegisterStore,
    H: SlaveEvents,
{
    pub fn from_stream(io: IO, slave: Slave<S, FrameQueue, H>, config: LinkConfig) -> Self {
        Self { io, slave, config }
    }

    pub fn slave(&self) -> &Slave<S, FrameQueue, H> {
        &self.slave
    }

    pub fn slave_mut(&mut self) -> &mut Slave<S, FrameQueue, H> {
        &mut self.slave
    }

    /// Serves requests until the stream reaches end of file.
    pub async fn run(mut self) -> Result<Slave<S, FrameQueue, H>, DataLinkError> {
        let device_id = self.slave.device_id();
        debug!(device_id, "modbus rtu slave serving");
        if let Err(err) = serve_rtu_io(&mut self.io, &mut self.slave, self.config.silence_timeout).await
        {
            warn!(error = %err, "modbus rtu slave ended with error");
            return Err(err);
        }
        Ok(self.slave)
    }
}

/// Pumps bytes from `io` into `slave` and writes back every queued response.
///
/// A gap longer than `silence` in the middle of a frame resets the decoder.
/// Returns when `io` reaches end of file.
pub async fn serve_rtu_io<IO, S, H>(
    io: &mut IO,
    slave: &mut Slave<S, FrameQueue, H>,
    silence: Duration,
) -> Result<(), DataLinkError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    S: RegisterStore,
    H: SlaveEvents,
{
    let mut buf = [0u8; 256];
    loop {
        let read = if slave.is_idle() {
            io.read(&mut buf).await
        } else {
            match timeout(silence, io.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    trace!("line silent mid-frame, dropping partial request");
                    slave.reset();
                    continue;
                }
            }
        };

        let n = read?;
        if n == 0 {
            return Ok(());
        }
        for byte in &buf[..n] {
            slave.receive_byte(*byte);
        }

        let responses: Vec<Vec<u8>> = slave.transport_mut().drain().collect();
        for frame in responses {
            trace!(frame_len = frame.len(), "sending modbus rtu response");
            io.write_all(&frame).await?;
        }
        io.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::{serve_rtu_io, RtuSlaveServer};
    use crate::rtu::LinkConfig;
    use crate::SharedRegisters;
    use rtumod_core::encoding::Writer;
    use rtumod_core::frame::rtu as rtu_frame;
    use rtumod_core::registers::{
        PointModel, RegisterConfig, RegisterStore, RegisterType, StaticPointModel,
    };
    use rtumod_core::transport::FrameQueue;
    use rtumod_core::{Slave, SlaveConfig};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn frame(address: u8, pdu: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        rtu_frame::encode_frame(&mut w, address, pdu).unwrap();
        w.as_written().to_vec()
    }

    #[tokio::test]
    async fn slave_server_handles_read_request() {
        let (mut client, server_side) = duplex(256);
        let mut model = StaticPointModel::<0, 0, 0, 4>::new();
        model.holding_registers[0] = 0x002A;
        let slave = Slave::new(SlaveConfig::new(1), model, FrameQueue::new());
        let task = tokio::spawn(
            RtuSlaveServer::from_stream(server_side, slave, LinkConfig::default()).run(),
        );

        client
            .write_all(&frame(1, &[0x03, 0x00, 0x00, 0x00, 0x01]))
            .await
            .unwrap();

        let mut response = [0u8; 7];
        client.read_exact(&mut response).await.unwrap();
        let (device_id, pdu) = rtu_frame::decode_frame(&response).unwrap();
        assert_eq!(device_id, 1);
        assert_eq!(pdu, &[0x03, 0x02, 0x00, 0x2A]);

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn slave_server_answers_bad_byte_count_with_exception() {
        let (mut client, server_side) = duplex(256);
        let slave = Slave::new(
            SlaveConfig::new(1),
            StaticPointModel::<0, 0, 0, 8>::new(),
            FrameQueue::new(),
        );
        let task = tokio::spawn(
            RtuSlaveServer::from_stream(server_side, slave, LinkConfig::default()).run(),
        );

        client
            .write_all(&frame(
                1,
                &[0x10, 0x00, 0x00, 0x00, 0x02, 0x03, 0x12, 0x34, 0x56],
            ))
            .await
            .unwrap();

        let mut response = [0u8; 5];
        client.read_exact(&mut response).await.unwrap();
        let (device_id, pdu) = rtu_frame::decode_frame(&response).unwrap();
        assert_eq!(device_id, 1);
        assert_eq!(pdu, &[0x90, 0x03]);

        drop(client);
        let slave = task.await.unwrap().unwrap();
        assert_eq!(slave.registers().holding_registers, [0; 8]);
    }

    #[tokio::test]
    async fn silence_mid_frame_resets_decoder() {
        let (mut client, mut server_side) = duplex(256);
        let registers = SharedRegisters::new(PointModel::new(
            RegisterConfig::default().with_holding_registers(2),
        ));
        let observer = registers.clone();
        let task = tokio::spawn(async move {
            let mut slave = Slave::new(SlaveConfig::new(3), registers, FrameQueue::new());
            serve_rtu_io(&mut server_side, &mut slave, Duration::from_millis(5)).await
        });

        // A truncated frame followed by a gap must not swallow the next request.
        client.write_all(&[0x03, 0x06, 0x00]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let request = frame(3, &[0x06, 0x00, 0x01, 0x12, 0x34]);
        client.write_all(&request).await.unwrap();

        let mut response = [0u8; 8];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response.as_slice(), request.as_slice());
        assert_eq!(
            observer.get(RegisterType::HoldingRegisters, 1),
            Ok(0x1234)
        );

        drop(client);
        task.await.unwrap().unwrap();
    }
}
