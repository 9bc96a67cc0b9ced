use clap::Parser;
use rtumod_core::registers::{PointModel, RegisterConfig};
use rtumod_core::transport::FrameQueue;
use rtumod_core::{CrcFailurePolicy, InternalError, Slave, SlaveConfig, SlaveEvents};
use rtumod_datalink::RtuSlaveServer;
use rtumod_tools::common::{init_tracing, open_port, SerialArgs};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "rtu-serve", about = "Serve an in-memory register bank on a serial line")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=247))]
    device_id: u8,
    #[arg(long, default_value_t = 64)]
    coils: usize,
    #[arg(long, default_value_t = 64)]
    discrete_inputs: usize,
    #[arg(long, default_value_t = 64)]
    input_registers: usize,
    #[arg(long, default_value_t = 64)]
    holding_registers: usize,
    /// Answer checksum failures with a server device failure exception.
    #[arg(long)]
    reply_on_crc_error: bool,
}

#[derive(Debug, Default)]
struct LineStats {
    crc_mismatches: u64,
}

impl SlaveEvents for LineStats {
    fn internal_error(&mut self, error: InternalError) {
        warn!(error = %error, "responder internal error");
    }

    fn crc_mismatch(&mut self, expected: u16, received: u16) {
        self.crc_mismatches += 1;
        warn!(
            expected,
            received,
            total = self.crc_mismatches,
            "request checksum mismatch"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let registers = PointModel::new(
        RegisterConfig::default()
            .with_coils(args.coils)
            .with_discrete_inputs(args.discrete_inputs)
            .with_input_registers(args.input_registers)
            .with_holding_registers(args.holding_registers),
    );
    let crc_failure = if args.reply_on_crc_error {
        CrcFailurePolicy::RespondWithError
    } else {
        CrcFailurePolicy::Discard
    };
    let slave = Slave::with_events(
        SlaveConfig::new(args.device_id).with_crc_failure(crc_failure),
        registers,
        FrameQueue::new(),
        LineStats::default(),
    );

    let stream = open_port(&args.serial)?;
    info!(port = %args.serial.port, device_id = args.device_id, "serving");
    let slave = RtuSlaveServer::from_stream(stream, slave, args.serial.link_config())
        .run()
        .await?;
    println!(
        "line closed after {} checksum mismatch(es)",
        slave.events().crc_mismatches
    );
    Ok(())
}
