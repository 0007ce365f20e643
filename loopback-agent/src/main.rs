//! Loopback Agent Binary Entry Point

use anyhow::Result;
use clap::Parser;
use loopback_agent::{load_config, logging, logging_config, mk_payload, run_agent, Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let serve = match args.command {
        Command::MkPayload(payload_args) => {
            print!("{}", mk_payload(&payload_args)?);
            return Ok(());
        }
        Command::Serve(serve) => serve,
    };

    let config = load_config(&serve)?;
    let _log_guard = logging::init_logging(&logging_config(&serve, &config))?;

    tokio::select! {
        result = run_agent(config) => {
            if let Err(e) = result {
                tracing::error!("Agent failed: {:#}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping agent...");
        }
    }

    Ok(())
}
