use clap::Parser;
use rtumod_tools::common::{build_link, init_tracing, SerialArgs};

#[derive(Debug, Parser)]
#[command(name = "rtu-readcoils", about = "Read coils (FC01) or discrete inputs (FC02)")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    device_id: u8,
    #[arg(long)]
    start: u16,
    #[arg(long)]
    quantity: u16,
    /// Read discrete inputs instead of coils.
    #[arg(long)]
    inputs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut link = build_link(&args.serial)?;

    let (label, values) = if args.inputs {
        let values = link
            .read_input_status(args.device_id, args.start, args.quantity)
            .await?;
        ("input", values)
    } else {
        let values = link
            .read_coils(args.device_id, args.start, args.quantity)
            .await?;
        ("coil", values)
    };

    for (idx, value) in values.iter().enumerate() {
        println!("{label}={} value={}", u32::from(args.start) + idx as u32, value);
    }
    Ok(())
}
