use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use conversion_reporter_lib::config::{Settings, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use conversion_reporter_lib::cycle::CycleConfig;
use conversion_reporter_lib::db::SqlItemStore;
use conversion_reporter_lib::logging::{self, LOG_TARGET};
use conversion_reporter_lib::looper::LoopExit;
use conversion_reporter_lib::mailer::SmtpMailer;
use conversion_reporter_lib::{run_reporter, signal};

#[derive(Debug, Parser)]
#[command(
    name = "conversion-reporter",
    about = "Report documents the converter failed on",
    version
)]
struct Cli {
    /// Settings file (JSON).
    #[arg(long, value_name = "PATH", env = CONFIG_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run a single cycle and ignore the control file.
    #[arg(long)]
    once: bool,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("load settings from {}", cli.config.display()))?;
    let _log_guard = logging::init(settings.log_dir.as_deref()).context("initialize logging")?;

    let store = SqlItemStore::new(
        settings.conn_string.clone(),
        settings.table_name()?,
        settings.statement_mode,
    );
    let mailer = SmtpMailer::from_settings(&settings)?;
    let cycle_config = CycleConfig::from(&settings);
    let control = if cli.once {
        None
    } else {
        settings.looper_path.clone()
    };

    tracing::info!(
        target: LOG_TARGET,
        event = "reporter_start",
        error_dir = %settings.error_dir_path.display(),
        table = %store.table(),
        looping = control.is_some()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    let exit = runtime.block_on(async {
        let shutdown = CancellationToken::new();
        signal::cancel_on_signal(shutdown.clone());
        run_reporter(
            &cycle_config,
            &store,
            &mailer,
            control.as_deref(),
            settings.poll_interval(),
            shutdown,
        )
        .await
    });

    match &exit {
        LoopExit::ControlFileUnreadable(err) => {
            tracing::error!(target: LOG_TARGET, event = "reporter_exit", reason = "control_file_unreadable", error = %err);
        }
        other => {
            tracing::info!(target: LOG_TARGET, event = "reporter_exit", reason = ?other);
        }
    }
    Ok(exit.exit_code())
}
