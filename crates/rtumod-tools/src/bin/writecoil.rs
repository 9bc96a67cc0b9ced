use clap::Parser;
use rtumod_tools::common::{build_link, init_tracing, parse_bool, SerialArgs};

#[derive(Debug, Parser)]
#[command(
    name = "rtu-writecoil",
    about = "Force one coil (FC05) or several consecutive coils (FC0F)"
)]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    device_id: u8,
    #[arg(long)]
    address: u16,
    #[arg(long, value_parser = parse_bool, value_delimiter = ',', num_args = 1..)]
    values: Vec<bool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut link = build_link(&args.serial)?;

    if let [value] = args.values.as_slice() {
        link.force_single_coil(args.device_id, args.address, *value)
            .await?;
        println!("wrote coil {} => {}", args.address, value);
    } else {
        link.force_multiple_coils(args.device_id, args.address, &args.values)
            .await?;
        println!(
            "wrote {} coil(s) starting at {}",
            args.values.len(),
            args.address
        );
    }
    Ok(())
}
