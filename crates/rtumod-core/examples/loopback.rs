use rtumod_core::registers::{RegisterConfig, PointModel};
use rtumod_core::transport::FrameQueue;
use rtumod_core::{Master, MasterConfig, ResponsePacket, Slave, SlaveConfig};

fn main() {
    let registers = PointModel::new(
        RegisterConfig::default()
            .with_coils(8)
            .with_holding_registers(4),
    );
    let mut slave = Slave::new(SlaveConfig::new(0x11), registers, FrameQueue::new());
    let mut master = Master::new(
        MasterConfig::default(),
        FrameQueue::new(),
        |packet: &ResponsePacket<'_>| {
            println!(
                "device {} function {:#04x}: {:?} {:?}",
                packet.device_id, packet.function, packet.status, packet.data
            );
        },
    );

    master
        .preset_multiple_registers(0x11, 0, &[0x002A, 0x0064])
        .expect("valid request");
    exchange(&mut master, &mut slave);

    master
        .read_holding_registers(0x11, 0, 4)
        .expect("valid request");
    exchange(&mut master, &mut slave);

    master.read_coils(0x11, 6, 4).expect("valid request");
    exchange(&mut master, &mut slave);
}

fn exchange<H: rtumod_core::MasterEvents>(
    master: &mut Master<FrameQueue, H>,
    slave: &mut Slave<PointModel, FrameQueue>,
) {
    while let Some(request) = master.transport_mut().pop() {
        println!("request  {request:02X?}");
        request.iter().for_each(|byte| slave.receive_byte(*byte));
    }
    while let Some(response) = slave.transport_mut().pop() {
        println!("response {response:02X?}");
        response.iter().for_each(|byte| master.receive_byte(*byte));
    }
}
