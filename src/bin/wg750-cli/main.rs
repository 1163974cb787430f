use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};

use wg750::settings::PollingConfig;
use wg750::{Hub, HubConfig};

/// Connect to a 750-series controller, list the module chain and optionally
/// watch the process image for changes.
#[derive(Parser)]
#[command(name = "wg750-cli")]
struct Args {
    /// Controller hostname or IP address
    host: String,

    /// Modbus TCP port
    #[arg(long, default_value_t = 502)]
    port: u16,

    /// Poll interval for all regions in milliseconds
    #[arg(long)]
    interval: Option<u64>,

    /// Poll interval for the input registers in milliseconds
    #[arg(long)]
    input_interval: Option<u64>,

    /// Poll interval for the holding registers in milliseconds
    #[arg(long)]
    holding_interval: Option<u64>,

    /// Poll interval for the discrete inputs in milliseconds
    #[arg(long)]
    discrete_interval: Option<u64>,

    /// Poll interval for the coils in milliseconds
    #[arg(long)]
    coil_interval: Option<u64>,

    /// Keep polling and print every channel change
    #[arg(long)]
    watch: bool,
}

fn main() -> Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env() // Overwrite from RUST_LOG env var
        .init();

    let args = Args::parse();

    let mut config = HubConfig::new(args.host.clone());
    config.port = args.port;
    config.polling = PollingConfig {
        global: args.interval,
        input: args.input_interval,
        holding: args.holding_interval,
        discrete: args.discrete_interval,
        coil: args.coil_interval,
    };

    info!("Connecting to {}:{}...", config.host, config.port);
    let hub = Hub::connect(config)?;

    if let Some(controller) = hub.info() {
        println!("Controller: {}", controller);
        println!("Firmware:   {}", controller.firmware_info);
    }
    println!(
        "Process image (bits): holding {}, input {}, coil {}, discrete {}",
        hub.process_state_width().holding,
        hub.process_state_width().input,
        hub.process_state_width().coil,
        hub.process_state_width().discrete
    );
    println!("Modules ({}):", hub.modules.len());
    for module in &hub.modules {
        println!(
            "  [{}] {} ({}), base {:?}",
            module.index,
            module.descriptor.display_name,
            module.identifier,
            module.base
        );
        for channel in &module.channels {
            match channel.read() {
                Ok(value) => println!("      {} = {}", channel.name(), value),
                Err(err) => println!("      {} (unreadable: {})", channel.name(), err),
            }
        }
    }

    if !args.watch {
        return Ok(());
    }

    for module in &hub.modules {
        for channel in &module.channels {
            let name = channel.name();
            channel.on_change(move |value, cell| {
                println!("{} ({}) -> {}", name, cell, value);
            });
        }
    }
    hub.start_polling()?;
    info!("Watching for changes, press Ctrl-C to exit");

    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
