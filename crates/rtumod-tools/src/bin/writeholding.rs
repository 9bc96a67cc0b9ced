use clap::Parser;
use rtumod_tools::common::{build_link, init_tracing, SerialArgs};

#[derive(Debug, Parser)]
#[command(
    name = "rtu-writeholding",
    about = "Preset one holding register (FC06) or several (FC10)"
)]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    device_id: u8,
    #[arg(long)]
    address: u16,
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    values: Vec<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut link = build_link(&args.serial)?;

    if let [value] = args.values.as_slice() {
        link.preset_single_register(args.device_id, args.address, *value)
            .await?;
        println!("wrote register {} => {}", args.address, value);
    } else {
        link.preset_multiple_registers(args.device_id, args.address, &args.values)
            .await?;
        println!(
            "wrote {} register(s) starting at {}",
            args.values.len(),
            args.address
        );
    }
    Ok(())
}
