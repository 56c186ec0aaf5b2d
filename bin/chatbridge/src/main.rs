mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "chatbridge")]
#[command(about = "HTTP bridge to a browser-hosted chat assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the browser and serve the HTTP API (long-running)
    Serve {
        /// Host to bind to (overrides config gateway.host / HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config gateway.port / PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Show the browser window even if headless is configured
        #[arg(long)]
        headed: bool,
    },

    /// Send a single prompt and print the reply
    Ask {
        /// Prompt text
        prompt: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        context_id: Option<String>,
    },

    /// Run environment diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { host, port, headed } => {
            commands::serve::run(host, port, headed).await?;
        }
        Commands::Ask { prompt, context_id } => {
            commands::ask::run(prompt, context_id).await?;
        }
        Commands::Doctor => {
            commands::doctor::run().await?;
        }
    }

    Ok(())
}
