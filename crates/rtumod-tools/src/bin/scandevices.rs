use clap::Parser;
use rtumod_datalink::DataLinkError;
use rtumod_tools::common::{build_link, init_tracing, SerialArgs};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "rtu-scan", about = "Probe a range of device ids on a serial line")]
struct Args {
    #[command(flatten)]
    serial: SerialArgs,
    #[arg(long, default_value_t = 1)]
    first: u8,
    #[arg(long, default_value_t = 247)]
    last: u8,
    /// Holding register read as the probe.
    #[arg(long, default_value_t = 0)]
    probe_address: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let mut link = build_link(&args.serial)?;

    let mut found = Vec::new();
    for device_id in args.first..=args.last {
        match link
            .read_holding_registers(device_id, args.probe_address, 1)
            .await
        {
            // An exception still proves a device answered at this id.
            Ok(_) | Err(DataLinkError::Exception(_)) => {
                println!("device {device_id} responded");
                found.push(device_id);
            }
            Err(DataLinkError::Timeout) => {}
            Err(DataLinkError::Io(err)) => return Err(err.into()),
            Err(err) => debug!(device_id, error = %err, "probe failed"),
        }
    }

    if found.is_empty() {
        println!("no responding devices found");
    } else {
        println!("found {} device(s): {:?}", found.len(), found);
    }
    Ok(())
}
