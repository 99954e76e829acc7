// xpl-monitor -- command-line dataref monitor.
//
// Discovers the simulator on the local network (or dials a given address),
// subscribes to one dataref, and prints each changed value until Ctrl-C.
// With --set it writes a value instead of watching.
//
// Usage:
//   xpl-monitor
//   xpl-monitor sim/flightmodel/position/indicated_airspeed --frequency 5
//   xpl-monitor --address 192.168.1.20 --port 49000
//   xpl-monitor --set 11880 sim/cockpit2/radios/actuators/com2_standby_frequency_hz

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xpl_client::{DatarefSession, SessionConfig};
use xpl_discover::DiscoveryConfig;

const DEFAULT_DATAREF: &str = "sim/cockpit2/radios/actuators/com2_standby_frequency_hz";

/// Watch or write one simulator dataref from the command line.
#[derive(Parser)]
#[command(name = "xpl-monitor", version, about)]
struct Cli {
    /// Dataref to watch (or write with --set)
    #[arg(default_value = DEFAULT_DATAREF)]
    dataref: String,

    /// Simulator address; skips discovery when given
    #[arg(long)]
    address: Option<IpAddr>,

    /// Simulator dataref port, used together with --address
    #[arg(long, default_value_t = 49000)]
    port: u16,

    /// Requested updates per second
    #[arg(long, default_value_t = 20)]
    frequency: i32,

    /// How many seconds discovery may wait for a primary beacon
    #[arg(long, default_value_t = 30)]
    discovery_timeout: u64,

    /// Write this value to the dataref and exit instead of watching
    #[arg(long)]
    set: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "xpl_monitor=info,xpl_protocol=info,xpl_discover=info,xpl_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting xpl-monitor");

    let cli = Cli::parse();

    let config = SessionConfig {
        remote: cli.address.map(|ip| SocketAddr::new(ip, cli.port)),
        discovery: DiscoveryConfig {
            timeout: Duration::from_secs(cli.discovery_timeout),
            ..Default::default()
        },
        ..Default::default()
    };

    let session = DatarefSession::connect(config).await?;
    println!("Simulator at {}", session.remote_addr());

    if let Some(value) = cli.set {
        session.publish(&cli.dataref, value).await?;
        println!("{} <- {}", cli.dataref, value);
        session.close().await?;
        return Ok(());
    }

    // print only on change; streaming datarefs repeat their value at the
    // subscription frequency
    let dataref = cli.dataref.clone();
    let mut last: Option<f32> = None;
    session
        .subscribe(&cli.dataref, cli.frequency, move |value| {
            if last != Some(value) {
                println!("{dataref}: {value}");
                last = Some(value);
            }
        })
        .await?;

    tokio::select! {
        result = session.run_forever() => result?,
        _ = tokio::signal::ctrl_c() => println!("\nStopping..."),
    }

    session.close().await?;
    Ok(())
}
