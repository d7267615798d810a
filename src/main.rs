//! `FixEmbed` CLI - run the relay or resolve a single URL

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fixembed::{Config, Relay};

#[derive(Parser)]
#[command(name = "fixembed")]
#[command(about = "Embed-fixing relay for Twitter, Instagram, Reddit and more")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP relay
    Serve {
        /// Bind address (overrides FIXEMBED_BIND_ADDR)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Resolve one URL and print the handler result as JSON
    Resolve {
        /// Post URL to resolve
        url: String,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },

    /// List supported platforms in dispatch order
    Platforms,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `resolve` output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = Config::from_env()?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            cmd::serve::cmd_serve(Relay::new(config)?).await?;
        }
        Commands::Resolve { url, pretty } => {
            let relay = Relay::new(Config::from_env()?)?;
            cmd::resolve::cmd_resolve(&relay, &url, pretty).await?;
        }
        Commands::Platforms => {
            cmd::platforms::cmd_platforms();
        }
    }

    Ok(())
}
