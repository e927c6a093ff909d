//! `tandem` binary.

use std::{io, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use tandem_cli::{
    CliError, DemoSettings, PlaySettings, ProtocolArgs, SharedWriter, demo, play,
};
use tokio::io::BufReader;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tandem", about = "Truth-or-dare rooms that survive losing their host", version)]
struct Cli {
    #[command(flatten)]
    protocol: ProtocolArgs,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run a scripted room over the in-process network and drop its host
    Demo {
        /// Name of the first host
        #[arg(long, default_value = "Hana")]
        host: String,

        /// Followers, comma separated
        #[arg(long, value_delimiter = ',', default_values_t = ["Ana".to_owned(), "Bo".to_owned(), "Cy".to_owned()])]
        followers: Vec<String>,

        /// Turns to play before the host drops
        #[arg(long, default_value_t = 4)]
        turns: usize,
    },
    /// Play on this device, passing it around between players
    Play {
        /// Your name
        #[arg(long, default_value = "Host")]
        name: String,

        /// Starting category
        #[arg(long)]
        category: Option<String>,

        /// Players sharing this device, comma separated
        #[arg(long, value_delimiter = ',')]
        players: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "tandem failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.protocol.config()?;
    let catalog = Arc::new(cli.protocol.catalog()?);
    let out = SharedWriter::new(io::stdout());

    match cli.command {
        Mode::Demo { host, followers, turns } => {
            demo(DemoSettings { host, followers, turns, config }, catalog, out).await?;
        },
        Mode::Play { name, category, players } => {
            let input = BufReader::new(tokio::io::stdin());
            play(PlaySettings { name, category, locals: players, config }, catalog, input, out).await?;
        },
    }
    Ok(())
}
