use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;

use discovery_mesh::config::ResilienceConfig;
use discovery_mesh::discovery::{Registrar, RegistryClient};
use discovery_mesh::lifecycle::{spawn_signal_handler, Shutdown};
use discovery_mesh::observability::logging;
use discovery_mesh::registry::RegisterRequest;

#[derive(Parser)]
#[command(name = "discovery-cli")]
#[command(about = "Management CLI for the service registry", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8761")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check registry health
    Health,
    /// List every application and its instances
    Apps,
    /// List the instances of one application
    App { app_id: String },
    /// Remove an instance from the registry
    Deregister { app_id: String, instance_id: String },
    /// Register an instance and keep it alive until Ctrl+C
    Announce {
        app_id: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        ip: String,
        #[arg(long)]
        port: u16,
        #[arg(long)]
        instance_id: Option<String>,
        #[arg(long, default_value_t = 30)]
        heartbeat_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = RegistryClient::new(&cli.url, &ResilienceConfig::default())?;

    match cli.command {
        Commands::Health => {
            let status = client.health().await?;
            println!("{}", status);
        }
        Commands::Apps => {
            print_json(&client.applications().await?)?;
        }
        Commands::App { app_id } => {
            print_json(&client.instances(&app_id).await?)?;
        }
        Commands::Deregister { app_id, instance_id } => {
            client.deregister(&app_id, &instance_id).await?;
            println!("Deregistered {}/{}", app_id, instance_id);
        }
        Commands::Announce {
            app_id,
            host,
            ip,
            port,
            instance_id,
            heartbeat_secs,
        } => {
            logging::init_logging("info")?;
            let request = RegisterRequest {
                instance_id,
                host_name: host,
                ip_addr: ip,
                port,
                status: None,
            };
            let registrar = Registrar::new(client, app_id, request, Duration::from_secs(heartbeat_secs.max(1)));
            println!("Announcing {}/{}", registrar.app_id(), registrar.instance_id());

            let shutdown = Shutdown::new();
            let handle = registrar.spawn(shutdown.subscribe());
            spawn_signal_handler(shutdown);
            handle.await??;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
