use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use mail_connectivity::types::ErrorResponse;
use mail_connectivity::{ConnectRequest, SendRequest};

#[derive(Parser)]
#[command(name = "mail-connectivity")]
#[command(about = "Discover mail servers, fetch messages and send mail", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (overrides the default lookup)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch messages for the account described by a JSON request
    Connect {
        /// Request file; stdin when omitted
        #[arg(value_name = "REQUEST")]
        input: Option<PathBuf>,
    },
    /// Send a message described by a JSON request
    Send {
        /// Request file; stdin when omitted
        #[arg(value_name = "REQUEST")]
        input: Option<PathBuf>,
    },
}

async fn read_input(input: Option<&PathBuf>) -> std::io::Result<String> {
    match input {
        Some(path) => tokio::fs::read_to_string(path).await,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            Ok(buf)
        }
    }
}

/// Still answer with a structured failure when the request is unusable
fn reject(err: &serde_json::Error) -> ExitCode {
    if let Ok(json) = serde_json::to_string_pretty(&ErrorResponse::invalid_request(err)) {
        println!("{}", json);
    }
    ExitCode::from(2)
}

#[tokio::main]
async fn main() -> ExitCode {
    mail_connectivity::init_tracing();
    let cli = Cli::parse();

    let facade = match mail_connectivity::init(cli.config.as_deref()) {
        Ok(facade) => facade,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let input = match &cli.command {
        Command::Connect { input } | Command::Send { input } => input.as_ref(),
    };
    let raw = match read_input(input).await {
        Ok(raw) => raw,
        Err(e) => {
            error!("Failed to read request: {}", e);
            return ExitCode::from(2);
        }
    };

    let response = match cli.command {
        Command::Connect { .. } => match serde_json::from_str::<ConnectRequest>(&raw) {
            Ok(request) => serde_json::to_string_pretty(&facade.connect(request).await),
            Err(e) => {
                error!("Invalid connect request: {}", e);
                return reject(&e);
            }
        },
        Command::Send { .. } => match serde_json::from_str::<SendRequest>(&raw) {
            Ok(request) => serde_json::to_string_pretty(&facade.send(request).await),
            Err(e) => {
                error!("Invalid send request: {}", e);
                return reject(&e);
            }
        },
    };

    match response {
        Ok(json) => {
            println!("{}", json);
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            ExitCode::FAILURE
        }
    }
}
