//! Command-line options shared by every subcommand.

use std::{path::PathBuf, time::Duration};

use clap::Args;
use tandem_core::{Catalog, ProtocolConfig};

use crate::error::CliError;

/// Catalog bundled with the binary.
pub const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.json");

/// Protocol tuning. Every option defaults to [`ProtocolConfig::default`].
#[derive(Args, Debug, Clone, Default)]
pub struct ProtocolArgs {
    /// Players needed to start a session.
    #[arg(long, value_name = "N")]
    pub min_players: Option<usize>,

    /// Grace before a kicked player's channel is closed.
    #[arg(long, value_name = "MS")]
    pub kick_grace_ms: Option<u64>,

    /// Shortest wait before reconnecting to a new host.
    #[arg(long, value_name = "MS")]
    pub rejoin_delay_min_ms: Option<u64>,

    /// Longest wait before reconnecting to a new host.
    #[arg(long, value_name = "MS")]
    pub rejoin_delay_max_ms: Option<u64>,

    /// Extra time a new host waits for players to come back.
    #[arg(long, value_name = "MS")]
    pub rejoin_window_slack_ms: Option<u64>,

    /// Only accept turn commands from the current player.
    #[arg(long)]
    pub enforce_turn_order: bool,

    /// Room codes to try before giving up.
    #[arg(long, value_name = "N")]
    pub room_code_attempts: Option<u32>,

    /// JSON catalog of categories with questions and dares.
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<PathBuf>,
}

impl ProtocolArgs {
    /// Defaults with every given option applied, validated.
    pub fn config(&self) -> Result<ProtocolConfig, CliError> {
        let mut config = ProtocolConfig::default();
        let ms = Duration::from_millis;
        if let Some(n) = self.min_players {
            config.min_players = n;
        }
        if let Some(v) = self.kick_grace_ms {
            config.kick_grace = ms(v);
        }
        if let Some(v) = self.rejoin_delay_min_ms {
            config.rejoin_delay_min = ms(v);
        }
        if let Some(v) = self.rejoin_delay_max_ms {
            config.rejoin_delay_max = ms(v);
        }
        if let Some(v) = self.rejoin_window_slack_ms {
            config.rejoin_window_slack = ms(v);
        }
        if let Some(n) = self.room_code_attempts {
            config.room_code_attempts = n;
        }
        config.enforce_turn_order = self.enforce_turn_order;
        config.validate()?;
        Ok(config)
    }

    /// The `--catalog` file, or the bundled catalog.
    pub fn catalog(&self) -> Result<Catalog, CliError> {
        let Some(path) = &self.catalog else {
            return Ok(Catalog::from_json(BUILTIN_CATALOG)?);
        };
        let json = std::fs::read_to_string(path)
            .map_err(|source| CliError::CatalogFile { path: path.clone(), source })?;
        Ok(Catalog::from_json(&json)?)
    }
}
