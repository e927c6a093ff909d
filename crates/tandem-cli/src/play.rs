//! Pass-the-device play.
//!
//! One coordinator on this machine plus any number of local players, driven
//! by slash commands read line by line.

use std::{io::Write, sync::Arc};

use tandem_app::{MemoryNetwork, Runtime, SessionHandle};
use tandem_core::{Catalog, ProtocolConfig, SystemEnv};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::{
    commands::{self, Command, HELP},
    error::CliError,
    render::{self, SharedWriter, TerminalPresentation},
};

/// What to play.
#[derive(Debug, Clone)]
pub struct PlaySettings {
    /// Name of the player at the keyboard.
    pub name: String,
    /// Starting category, the catalog's first one if `None`.
    pub category: Option<String>,
    /// Players sharing this device, added before the first prompt.
    pub locals: Vec<String>,
    /// Protocol tuning.
    pub config: ProtocolConfig,
}

enum Flow {
    Continue,
    Quit,
}

/// Host a room and play it from `input` until `/quit` or end of input.
///
/// Command errors are reported on `out` and play goes on.
pub async fn play<R, W>(
    settings: PlaySettings,
    catalog: Arc<Catalog>,
    input: R,
    out: SharedWriter<W>,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send + 'static,
{
    let category =
        settings.category.unwrap_or_else(|| catalog.default_category().to_owned());
    let runtime =
        Runtime::new(Arc::new(MemoryNetwork::new()), SystemEnv, settings.config, catalog);
    let session = runtime
        .host(&settings.name, &category, Box::new(TerminalPresentation::new(None, out.clone())))
        .await?;

    for name in settings.locals {
        session.add_local_player(name).await?;
    }
    writeln!(out.lock(), "{HELP}")?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match apply(&session, commands::parse(&line), &out).await {
            Ok(Flow::Continue) => {},
            Ok(Flow::Quit) => break,
            Err(error) => writeln!(out.lock(), "error: {error}")?,
        }
    }

    debug!("leaving play");
    session.shutdown();
    Ok(())
}

async fn apply<W: Write>(
    session: &SessionHandle,
    command: Command,
    out: &SharedWriter<W>,
) -> Result<Flow, CliError> {
    match command {
        Command::Add { name } => session.add_local_player(name).await?,
        Command::Start => session.start_session().await?,
        Command::Next => session.advance_turn().await?,
        Command::Forfeit => session.choose_forfeit().await?,
        Command::Kick { name } => {
            let snapshot = session.snapshot().await?;
            let id = snapshot
                .state
                .iter()
                .flat_map(|s| s.players.iter())
                .find(|p| p.name.eq_ignore_ascii_case(&name))
                .map(|p| p.id.clone())
                .ok_or(CliError::NoSuchPlayer(name))?;
            session.kick(id).await?;
        },
        Command::Category { name } => session.select_category(name).await?,
        Command::Players => {
            let snapshot = session.snapshot().await?;
            let players = snapshot.state.map(|s| render::players(&s.players)).unwrap_or_default();
            writeln!(out.lock(), "players: {players}")?;
        },
        Command::Help => writeln!(out.lock(), "{HELP}")?,
        Command::Quit => return Ok(Flow::Quit),
        Command::Unknown { input } => writeln!(out.lock(), "unknown command {input:?}; try /help")?,
        Command::InvalidArgs { error, .. } => writeln!(out.lock(), "{error}")?,
    }
    Ok(Flow::Continue)
}
