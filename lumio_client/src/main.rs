use anyhow::Result;
use clap::{Parser, Subcommand};
use lumio_client::address;
use lumio_client::cli;
use lumio_client::client::LumioClient;
use lumio_client::config::LumioConfig;
use lumio_client::media;
use lumio_client::telemetry;
use lumio_client::utils;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Lumio social client shell and tools")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interactive shell against an in-process forum
    Shell,
    /// Print the canonical hex form of a hex or SS58 address
    Normalize { address: String },
    /// Print the gateway URL for a stored media reference
    MediaUrl { reference: String },
    /// Pin a file and print its ipfs:// reference
    Upload { path: PathBuf },
    /// Show vibes earned by an account on this device
    Vibes { account: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = Args::parse();
    let config = LumioConfig::from_env()?;

    match args.command.unwrap_or(Command::Shell) {
        Command::Normalize { address } => {
            println!("{}", address::canonicalize(&address)?);
            Ok(())
        }
        Command::MediaUrl { reference } => {
            println!("{}", media::gateway_url(&config.media.gateway, &reference));
            Ok(())
        }
        command => {
            utils::print_banner();
            let client = LumioClient::open_local(config)?;
            match command {
                Command::Upload { path } => {
                    let reference = client.upload_media(&path).await?;
                    println!("{reference}");
                    println!("{}", client.media().gateway_url(&reference));
                    Ok(())
                }
                Command::Vibes { account } => {
                    let account = address::parse_account(&account)?;
                    let summary = client.vibes_summary(&account).await?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                    Ok(())
                }
                _ => cli::run_shell(client).await,
            }
        }
    }
}
