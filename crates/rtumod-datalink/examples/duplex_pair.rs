use rtumod_core::registers::{PointModel, RegisterConfig};
use rtumod_core::transport::FrameQueue;
use rtumod_core::{MasterConfig, Slave, SlaveConfig};
use rtumod_datalink::{LinkConfig, RtuMasterLink, RtuSlaveServer, SharedRegisters};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (master_side, slave_side) = tokio::io::duplex(512);

    let registers = SharedRegisters::new(PointModel::new(
        RegisterConfig::default().with_holding_registers(16),
    ));
    registers.write().holding_registers.set(0, 1234);

    let slave = Slave::new(SlaveConfig::new(1), registers.clone(), FrameQueue::new());
    let server = tokio::spawn(
        RtuSlaveServer::from_stream(slave_side, slave, LinkConfig::default()).run(),
    );

    let mut link = RtuMasterLink::new(master_side, MasterConfig::default(), LinkConfig::default());
    let values = link.read_holding_registers(1, 0, 2).await?;
    println!("holding[0..2] = {values:?}");

    link.preset_single_register(1, 1, 42).await?;
    println!("holding[1] after write = {:?}", registers.read().holding_registers.get(1));

    drop(link);
    server.await??;
    Ok(())
}
