use clap::Parser;
use lifeline_cli::app;
use lifeline_cli::commands::{check, cli, table};
use lifeline_core::api::{AppConfig, AppContext, CliError, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = match args.config.as_deref() {
        Some(path) => lifeline_core::config::load_from_path(path),
        None => lifeline_core::config::load_default(),
    }
    .map_err(|e| CliError::Config(format!("{e:#}")))?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    dispatch(args.command, cfg).await
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 1: `check` saw a rejected event (returned as a normal exit code)
    // 11: config error
    // 20: runtime / IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Lifecycle(_) => 20,
        CliError::Task(_) => 20,
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(cmd: cli::Commands, mut cfg: AppConfig) -> Result<i32, CliError> {
    match cmd {
        cli::Commands::Simulate(sim_args) => {
            if let Some(ms) = sim_args.cleanup_timeout_ms {
                cfg.tasks.cleanup_timeout_ms = ms;
            }
            let reporter = lifeline_plugins::factory::build_crash_reporter(&cfg)
                .await
                .map_err(|e| CliError::Config(format!("{e:#}")))?;
            let ctx = AppContext::new(cfg, reporter);
            ctx.install_panic_hook();

            let summary = app::run_simulate(&ctx, &sim_args).await?;
            print!("{}", summary.to_jsonl()?);
            Ok(0)
        }
        cli::Commands::Table(table_args) => {
            print!("{}", table::render_table(table_args.format)?);
            Ok(0)
        }
        cli::Commands::Check(check_args) => {
            let steps = check::check_sequence(&check_args.events)?;
            print!("{}", check::render_steps(&steps));
            Ok(if steps.iter().all(|s| s.accepted) { 0 } else { 1 })
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("lifeline"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("lifeline.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    // stdout carries command output; logs go to stderr.
    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
