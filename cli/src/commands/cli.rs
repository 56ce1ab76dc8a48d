use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lifeline", version, about = "Application lifecycle state machine driver")]
pub struct Args {
    /// Explicit config file; skips ~/.lifeline/config.toml and ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SimulateArgs {
    /// Reject the first login attempt.
    #[arg(long)]
    pub fail_login: bool,

    /// Add a background task that ignores stop requests.
    #[arg(long)]
    pub stubborn_task: bool,

    /// Per-task wait during shutdown cleanup (overrides config).
    #[arg(long)]
    pub cleanup_timeout_ms: Option<u64>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Text,
    Json,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TableArgs {
    #[arg(long, value_enum, default_value_t = TableFormat::Text)]
    pub format: TableFormat,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CheckArgs {
    /// Event names, e.g. INIT_COMPLETE SPLASH_DONE (case-insensitive).
    #[arg(required = true)]
    pub events: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a full lifecycle with background tasks, then shut down.
    Simulate(SimulateArgs),
    /// Print the transition table.
    Table(TableArgs),
    /// Replay events on a fresh machine and report each result.
    Check(CheckArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_flags() {
        let args = Args::try_parse_from([
            "lifeline",
            "--config",
            "custom.toml",
            "simulate",
            "--fail-login",
            "--cleanup-timeout-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(args.config.as_deref(), Some("custom.toml"));
        let Commands::Simulate(sim) = args.command else {
            panic!("expected simulate");
        };
        assert!(sim.fail_login);
        assert!(!sim.stubborn_task);
        assert_eq!(sim.cleanup_timeout_ms, Some(250));
    }

    #[test]
    fn check_requires_events() {
        assert!(Args::try_parse_from(["lifeline", "check"]).is_err());
    }

    #[test]
    fn table_format_defaults_to_text() {
        let args = Args::try_parse_from(["lifeline", "table"]).unwrap();
        let Commands::Table(table) = args.command else {
            panic!("expected table");
        };
        assert_eq!(table.format, TableFormat::Text);
    }
}
