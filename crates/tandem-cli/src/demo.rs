//! Scripted demo over the in-process network.
//!
//! A host and a few followers play some turns, then the host drops off the
//! network and the rest of the room migrates to a new host.

use std::{io::Write, sync::Arc, time::Duration};

use tandem_app::{MemoryNetwork, Runtime, SessionHandle};
use tandem_core::{Catalog, MigrationState, PeerSnapshot, ProtocolConfig, RoleKind, SystemEnv};
use tandem_proto::GameState;
use tracing::info;

use crate::{
    error::CliError,
    render::{self, SharedWriter, TerminalPresentation},
};

/// How often the demo checks on the room.
const POLL: Duration = Duration::from_millis(50);

/// Extra time allowed on top of protocol timeouts.
const SLACK: Duration = Duration::from_secs(2);

/// Who plays and for how long.
#[derive(Debug, Clone)]
pub struct DemoSettings {
    /// Name of the first host.
    pub host: String,
    /// Followers, in joining order.
    pub followers: Vec<String>,
    /// Turns played before the host drops.
    pub turns: usize,
    /// Protocol tuning.
    pub config: ProtocolConfig,
}

/// Run the demo. Returns the state the room converged on after migration.
pub async fn demo<W>(
    settings: DemoSettings,
    catalog: Arc<Catalog>,
    out: SharedWriter<W>,
) -> Result<GameState, CliError>
where
    W: Write + Send + 'static,
{
    let net = Arc::new(MemoryNetwork::new());
    let runtime = Runtime::new(Arc::clone(&net), SystemEnv, settings.config.clone(), catalog.clone());
    let sink = |name: &str| Box::new(TerminalPresentation::new(Some(name.to_owned()), out.clone()));

    let host = runtime.host(&settings.host, catalog.default_category(), sink(&settings.host)).await?;
    let code = host.room().cloned().ok_or(CliError::NoRoomCode)?;
    writeln!(out.lock(), "room {code} is open")?;

    let mut followers = Vec::new();
    for name in &settings.followers {
        followers.push(runtime.join(&code, name, sink(name)).await?);
    }
    let everyone = settings.followers.len() + 1;
    wait_for(&host, SLACK, "everyone to join", |s| {
        s.state.as_ref().is_some_and(|st| st.players.len() == everyone)
    })
    .await?;

    host.start_session().await?;
    for turn in 0..settings.turns {
        if turn % 2 == 1 {
            host.choose_forfeit().await?;
        }
        host.advance_turn().await?;
        tokio::time::sleep(POLL).await;
    }

    info!(room = %code, "dropping the host");
    writeln!(out.lock(), "{} drops off the network", settings.host)?;
    net.crash(&code.to_address());
    host.shutdown();

    let settle = settings.config.rejoin_window() + SLACK;
    for follower in &followers {
        wait_for(follower, settle, "the room to migrate", |s| {
            s.role == RoleKind::Coordinator
                || (s.migration == Some(MigrationState::Attached)
                    && s.state.as_ref().is_some_and(|st| st.players.len() == followers.len()))
        })
        .await?;
    }

    let state = coordinator_state(&followers).await?;
    writeln!(out.lock(), "now playing: {}", render::state(&state))?;

    for follower in &followers {
        follower.shutdown();
    }
    Ok(state)
}

async fn coordinator_state(handles: &[SessionHandle]) -> Result<GameState, CliError> {
    for handle in handles {
        let snapshot = handle.snapshot().await?;
        if snapshot.role == RoleKind::Coordinator {
            return snapshot.state.ok_or(CliError::Timeout("a new host"));
        }
    }
    Err(CliError::Timeout("a new host"))
}

/// Poll `handle` until `check` holds or `limit` passes.
async fn wait_for(
    handle: &SessionHandle,
    limit: Duration,
    what: &'static str,
    check: impl Fn(&PeerSnapshot) -> bool,
) -> Result<PeerSnapshot, CliError> {
    let poll = async {
        loop {
            let snapshot = handle.snapshot().await?;
            if check(&snapshot) {
                return Ok::<_, CliError>(snapshot);
            }
            tokio::time::sleep(POLL).await;
        }
    };
    tokio::time::timeout(limit, poll).await.map_err(|_| CliError::Timeout(what))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::BUILTIN_CATALOG;

    #[tokio::test(start_paused = true)]
    async fn room_survives_losing_its_host() {
        let out = SharedWriter::new(Vec::new());
        let settings = DemoSettings {
            host: "Hana".into(),
            followers: vec!["Ana".into(), "Bo".into()],
            turns: 3,
            config: ProtocolConfig::default(),
        };
        let catalog = Arc::new(Catalog::from_json(BUILTIN_CATALOG).unwrap());

        let state = demo(settings, catalog, out.clone()).await.unwrap();

        let names: Vec<&str> = state.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Ana", "Bo"]);
        assert!(state.is_started());

        let text = String::from_utf8(out.lock().clone()).unwrap();
        assert!(text.contains("Hana drops off the network"), "{text}");
        assert!(text.contains("[Ana] the host left; you are hosting now"), "{text}");
        assert!(text.contains("[Bo] back in the game, now hosted by Ana"), "{text}");
    }
}
