use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use simlan::{scenarios, Config, Result};

#[derive(Parser)]
#[command(name = "simlan")]
#[command(author, version, about = "A discrete-event LAN simulator with DHCP allocation", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "simlan.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write a JSON packet trace of the run to this path.
    #[arg(short, long)]
    trace: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the DHCP allocation scenario (bus, routers, dynamic clients).
    Dhcp,
    /// Run the plain bus scenario (point-to-point pair plus shared segment).
    Bus {
        /// Write node positions for animation to this path.
        #[arg(long)]
        layout: Option<PathBuf>,
    },
    /// Run the star scenario (hub sink, on/off spokes).
    Star,
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config)?;
    let trace = cli.trace.as_deref();

    match cli.command.unwrap_or(Commands::Dhcp) {
        Commands::Dhcp => {
            info!("running DHCP scenario with config {:?}", cli.config);
            let report = scenarios::dhcp::run(&config.dhcp, trace)?;
            println!(
                "{:<12} {:<12} {:<16}",
                "Client", "State", "Address"
            );
            println!("{}", "-".repeat(40));
            for summary in &report.clients {
                println!(
                    "{:<12} {:<12} {:<16}",
                    summary.client.to_string(),
                    summary.state.to_string(),
                    summary
                        .addr
                        .map_or_else(|| "-".to_string(), |a| a.to_string())
                );
            }
            println!(
                "{} grants on record, {} addresses still free, echo {}/{}",
                report.grants.len(),
                report.free_addresses,
                report.echo_received,
                report.echo_sent
            );
            Ok(())
        }
        Commands::Bus { layout } => {
            info!("running bus scenario with config {:?}", cli.config);
            let report = scenarios::bus::run(&config.bus, trace, layout.as_deref())?;
            println!(
                "echo: {} sent, {} replies ({} answered by the server)",
                report.echo_sent, report.echo_received, report.server_replied
            );
            Ok(())
        }
        Commands::Star => {
            info!("running star scenario with config {:?}", cli.config);
            let report = scenarios::star::run(&config.star, trace)?;
            for (i, spoke) in report.spokes.iter().enumerate() {
                println!(
                    "spoke{i}: {} packets, {} bytes",
                    spoke.sent_packets, spoke.sent_bytes
                );
            }
            println!(
                "sink: {} packets, {} bytes",
                report.sink_packets, report.sink_bytes
            );
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
