use clap::{Args, ValueEnum};
use rtumod_datalink::{open_serial, DataLinkError, LinkConfig, RtuMasterLink};
use std::time::Duration;
use tokio_serial::{Parity, SerialStream, StopBits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

impl From<ParityArg> for Parity {
    fn from(value: ParityArg) -> Self {
        match value {
            ParityArg::None => Parity::None,
            ParityArg::Even => Parity::Even,
            ParityArg::Odd => Parity::Odd,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SerialArgs {
    /// Serial device, e.g. /dev/ttyUSB0 or COM3.
    #[arg(long)]
    pub port: String,
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    #[arg(long, value_enum, default_value_t = ParityArg::None)]
    pub parity: ParityArg,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub stop_bits: u8,
    /// Response timeout in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub timeout: u64,
    /// Override the inter-frame silence in microseconds (derived from baud by default).
    #[arg(long)]
    pub silence_us: Option<u64>,
}

impl SerialArgs {
    pub fn link_config(&self) -> LinkConfig {
        let mut config = LinkConfig::default()
            .with_baud_rate(self.baud)
            .with_parity(self.parity.into())
            .with_stop_bits(if self.stop_bits == 2 {
                StopBits::Two
            } else {
                StopBits::One
            })
            .with_response_timeout(Duration::from_millis(self.timeout));
        if let Some(micros) = self.silence_us {
            config = config.with_silence_timeout(Duration::from_micros(micros));
        }
        config
    }
}

pub fn open_port(args: &SerialArgs) -> Result<SerialStream, DataLinkError> {
    open_serial(&args.port, &args.link_config())
}

pub fn build_link(args: &SerialArgs) -> Result<RtuMasterLink<SerialStream>, DataLinkError> {
    RtuMasterLink::open(&args.port, args.link_config())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

pub fn parse_bool(input: &str) -> Result<bool, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(format!("invalid bool value: {input}")),
    }
}
