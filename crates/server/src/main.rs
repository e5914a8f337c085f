//! bsn-server: live telemetry viewer, historical series queries and
//! acquisition worker control for body-sensor campaigns.

mod api;
mod campaigns;
mod db;
mod router;
mod startup;
mod state;
mod store;

use clap::{Parser, Subcommand};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bsn-server", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default).
    Serve {
        /// Do not connect to the MQTT broker even if enabled in config.
        #[arg(long)]
        no_mqtt: bool,
    },
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bsn_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = bsn_core::Config::from_env();

    match cli.command.unwrap_or(Command::Serve { no_mqtt: false }) {
        Command::Serve { no_mqtt } => startup::serve(config, no_mqtt).await,
    }
}
