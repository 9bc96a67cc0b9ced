use clap::Parser;
use rtumod_tools::common::{build_link, init_tracing, SerialArgs};

#[derive(Debug, Parser)]
#[command(
    name = "rtu-readholding",
    about = "Read holding registers (FC03) or input registers (FC04)"
)]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    device_id: u8,
    #[arg(long)]
    start: u16,
    #[arg(long)]
    quantity: u16,
    /// Read input registers instead of holding registers.
    #[arg(long)]
    input: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut link = build_link(&args.serial)?;

    let values = if args.input {
        link.read_input_registers(args.device_id, args.start, args.quantity)
            .await?
    } else {
        link.read_holding_registers(args.device_id, args.start, args.quantity)
            .await?
    };

    for (idx, value) in values.iter().enumerate() {
        println!(
            "addr={} value={} (0x{:04X})",
            u32::from(args.start) + idx as u32,
            value,
            value
        );
    }
    Ok(())
}
