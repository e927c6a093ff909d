//! Plain-text rendering of session events.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tandem_core::{Notice, Presentation, RemovalReason};
use tandem_proto::{GameState, Participant, Phase};
use tracing::debug;

/// Player list on one line. Local players are marked.
pub fn players(players: &[Participant]) -> String {
    if players.is_empty() {
        return "nobody".to_owned();
    }
    players
        .iter()
        .map(|p| if p.is_local() { format!("{} (local)", p.name) } else { p.name.clone() })
        .collect::<Vec<_>>()
        .join(", ")
}

/// The table as the current player sees it.
pub fn state(state: &GameState) -> String {
    let card = match state.phase {
        Phase::Idle => return format!("lobby [{}]: {}", state.category, players(&state.players)),
        Phase::Prompt => "prompt",
        Phase::Forfeit => "forfeit",
    };
    let name = state.current_player().map_or("?", |p| p.name.as_str());
    let content = state.current_content.as_deref().unwrap_or("");
    format!("{name}'s turn [{}] {card}: {content}", state.category)
}

/// Writer shared by a session task and the input loop. Clones write to the
/// same place.
pub struct SharedWriter<W>(Arc<Mutex<W>>);

impl<W> SharedWriter<W> {
    /// Share `out`.
    pub fn new(out: W) -> Self {
        Self(Arc::new(Mutex::new(out)))
    }

    /// Exclusive access to the underlying writer.
    pub fn lock(&self) -> MutexGuard<'_, W> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W> Clone for SharedWriter<W> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<W: Write> Write for SharedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

/// Writes every presentation event as a line of text.
pub struct TerminalPresentation<W> {
    label: Option<String>,
    out: W,
}

impl<W: Write + Send> TerminalPresentation<W> {
    /// Lines are prefixed with `[label]` when several peers share a terminal.
    pub fn new(label: Option<String>, out: W) -> Self {
        Self { label, out }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        let result = match &self.label {
            Some(label) => writeln!(self.out, "[{label}] {text}"),
            None => writeln!(self.out, "{text}"),
        };
        if let Err(error) = result {
            debug!(%error, "terminal write failed");
        }
    }
}

impl<W: Write + Send> Presentation for TerminalPresentation<W> {
    fn on_state_changed(&mut self, game: &GameState) {
        if game.is_started() {
            self.line(&state(game));
        }
    }

    fn on_membership_changed(&mut self, list: &[Participant]) {
        self.line(&format!("players: {}", players(list)));
    }

    fn on_notice(&mut self, notice: &Notice) {
        self.line(&notice.to_string());
    }

    fn on_removed(&mut self, reason: RemovalReason) {
        self.line(&format!("session over: {reason}"));
    }
}

#[cfg(test)]
mod tests {
    use tandem_proto::{ContentColor, ParticipantId, PeerAddr};

    use super::*;

    fn table() -> GameState {
        let mut state = GameState::new("party");
        state.players = vec![
            Participant::remote(PeerAddr::new("tandem-room-ABCD"), "Hana"),
            Participant::local(ParticipantId::new("local-aaaaaaaaa"), "Lou"),
            Participant::remote(PeerAddr::new("tandem-peer-x"), "Bo"),
        ];
        state
    }

    #[test]
    fn lobby_lists_players() {
        insta::assert_snapshot!(state(&table()), @"lobby [party]: Hana, Lou (local), Bo");
    }

    #[test]
    fn turn_shows_current_card() {
        let mut game = table();
        game.phase = Phase::Forfeit;
        game.current_player_index = 1;
        game.current_content = Some("Dance for thirty seconds".into());
        game.content_color = ContentColor::Forfeit;
        insta::assert_snapshot!(state(&game), @"Lou's turn [party] forfeit: Dance for thirty seconds");
    }

    #[test]
    fn presentation_writes_labelled_lines() {
        let mut sink = TerminalPresentation::new(Some("Ana".into()), Vec::new());
        sink.on_membership_changed(&table().players);
        sink.on_state_changed(&table());
        sink.on_notice(&Notice::BecameCoordinator);
        sink.on_removed(RemovalReason::NoSuccessor);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        insta::assert_snapshot!(text.trim_end(), @r"
        [Ana] players: Hana, Lou (local), Bo
        [Ana] the host left; you are hosting now
        [Ana] session over: session ended
        ");
    }
}
