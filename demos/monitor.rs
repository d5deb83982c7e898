//! Connect to a shade positioner and print everything it reports.
//!
//! ```text
//! cargo run --example monitor --features ble -- --name Shade --command manual
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use shadelink::device::{
    adjustment, monitoring, status, BuildDate, ErrorFlags, FirmwareVersion, LastTarget,
    MainsState, MotionStatus, Parameter, Target,
};
use shadelink::transport::BleTransport;
use shadelink::{Client, ConnectionState, LinkConfig, MessageType};

#[derive(Parser, Debug)]
#[command(name = "monitor", about = "Shade positioner monitor")]
struct Args {
    /// Advertised device name to connect to.
    #[arg(short, long)]
    name: Option<String>,

    /// JSON link configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fixed command to send once connected (save, revert, manual, auto, up, down).
    #[arg(long)]
    command: Option<String>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "shadelink=debug" } else { "shadelink=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &args.config {
        Some(path) => LinkConfig::from_json_file(path)?,
        None => LinkConfig::default(),
    };

    let mut builder = Client::builder(BleTransport::new().await?).config(config);
    let last_target = Arc::new(LastTarget::default());
    let seen_target = last_target.clone();

    builder = builder
        .handle(MessageType::Status, status::VERSION, |raw| {
            println!("firmware   {}", FirmwareVersion::from_raw(raw));
        })
        .handle(MessageType::Status, status::BUILD_DATE, |raw| {
            println!("built      {}", BuildDate::from_raw(raw));
        })
        .handle(MessageType::Status, status::TARGET, move |raw| {
            seen_target.record(raw);
            println!("target     {}", Target::from_raw(raw));
        })
        .handle(MessageType::Status, status::CURRENT, move |raw| {
            println!("status     {}", MotionStatus::from_raw(raw).describe(last_target.get()));
        })
        .handle(MessageType::Status, status::MANUAL_MODE, |raw| {
            println!("mode       {}", if raw != 0 { "manual" } else { "auto" });
        })
        .handle(MessageType::Status, status::ERRORS, |raw| {
            println!("errors     {}", ErrorFlags::from_raw(raw));
        })
        .handle(MessageType::Adjustment, adjustment::MODIFIED, |raw| {
            if raw != 0 {
                println!("adjustments modified, not saved");
            }
        });

    for parameter in Parameter::ALL {
        builder = builder.handle(MessageType::Adjustment, parameter.tag(), move |raw| {
            println!("{:<10} {}", format!("{:?}", parameter), parameter.logical(raw));
        });
    }

    let client = builder
        .handle(MessageType::Monitoring, monitoring::POWER_MV, |mv| {
            println!("power      {:.2} V", mv as f64 / 1000.0);
        })
        .handle(MessageType::Monitoring, monitoring::MOTOR_CURRENT_MA, |ma| {
            println!("motor      {} mA", ma);
        })
        .handle(MessageType::Monitoring, monitoring::MCU_TEMP, |t| {
            println!("mcu temp   {} C", t);
        })
        .handle(MessageType::Monitoring, monitoring::MAINS, |raw| {
            println!("mains      {}", MainsState::from_raw(raw));
        })
        .build();

    client.connect(args.name.as_deref()).await?;
    client.wait_for_state(ConnectionState::Connected).await?;

    if let Some(command) = &args.command {
        client.send_fixed_command(command)?;
    }

    tokio::signal::ctrl_c().await?;
    client.disconnect().await;
    Ok(())
}
