//! Command parsing for pass-the-device play.
//!
//! This module parses input lines into structured [`Command`] values. Names
//! are resolved against the player list later, by the caller.

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a player sharing this device.
    Add {
        /// Display name.
        name: String,
    },

    /// Leave the lobby and draw the first prompt.
    Start,

    /// End the current turn. A bare Enter does the same.
    Next,

    /// Swap the prompt for a forfeit.
    Forfeit,

    /// Remove a player by display name.
    Kick {
        /// Display name.
        name: String,
    },

    /// Switch content category.
    Category {
        /// Category name, or `mix`.
        name: String,
    },

    /// Show the player list.
    Players,

    /// Show the available commands.
    Help,

    /// Quit the application.
    Quit,

    /// Unknown or invalid command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// One-line summary of every command.
pub const HELP: &str =
    "/add <name>  /start  /next (or Enter)  /forfeit  /kick <name>  /category <name>  /players  /quit";

/// Parse a user input string into a command.
///
/// Commands start with `/`. An empty line ends the turn.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Next;
    }

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Unknown { input: input.to_string() };
    };

    let (command, rest) = match cmd_str.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (cmd_str, ""),
    };

    match command {
        "add" => with_name("add", rest, |name| Command::Add { name }),
        "start" => Command::Start,
        "next" | "n" => Command::Next,
        "forfeit" | "f" => Command::Forfeit,
        "kick" => with_name("kick", rest, |name| Command::Kick { name }),
        "category" | "cat" => with_name("category", rest, |name| Command::Category { name }),
        "players" | "p" => Command::Players,
        "help" | "h" => Command::Help,
        "quit" | "q" => Command::Quit,
        _ => Command::Unknown { input: input.to_string() },
    }
}

/// Commands taking a name keep inner spaces, so `/add Mary Jane` works.
fn with_name(command: &str, rest: &str, build: impl FnOnce(String) -> Command) -> Command {
    if rest.is_empty() {
        Command::InvalidArgs { command: command.into(), error: format!("Usage: /{command} <name>") }
    } else {
        build(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_add_keeps_full_name() {
        assert_eq!(parse("/add Mary Jane"), Command::Add { name: "Mary Jane".into() });
    }

    #[test]
    fn parse_add_missing_name() {
        assert!(matches!(parse("/add"), Command::InvalidArgs { command, .. } if command == "add"));
        assert!(matches!(parse("/add   "), Command::InvalidArgs { .. }));
    }

    #[test]
    fn parse_turn_commands() {
        assert_eq!(parse("/start"), Command::Start);
        assert_eq!(parse("/next"), Command::Next);
        assert_eq!(parse(""), Command::Next);
        assert_eq!(parse("/f"), Command::Forfeit);
    }

    #[test]
    fn parse_kick_and_category() {
        assert_eq!(parse("/kick Bo"), Command::Kick { name: "Bo".into() });
        assert_eq!(parse("/cat mix"), Command::Category { name: "mix".into() });
    }

    #[test]
    fn parse_quit() {
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/q"), Command::Quit);
    }

    #[test]
    fn parse_unknown() {
        assert!(matches!(parse("/dance"), Command::Unknown { .. }));
        assert!(matches!(parse("hello"), Command::Unknown { .. }));
    }
}
