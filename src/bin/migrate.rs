//! `fastcms-migrate`: run schema migrations through the configured tool.

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use fastcms::logging::setup_logging;
use fastcms::migrate::{load_env_file, run_cli, ProcessRunner, DEFAULT_ENV_FILE};
use fastcms::Settings;

#[derive(Parser)]
#[command(name = "fastcms-migrate")]
#[command(about = "Run FastCMS database migrations", version)]
struct Cli {
    /// Migration tool to invoke [env: FASTCMS_MIGRATION_TOOL, default: alembic]
    #[arg(long)]
    tool: Option<String>,

    /// Env file loaded before running
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Log level [env: FASTCMS_LOG_LEVEL, default: WARNING]
    #[arg(long)]
    log_level: Option<String>,

    /// migrate | migration "message" | downgrade | history
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Variables from the env file take part in every lookup below
    let env_loaded = load_env_file(&cli.env_file);

    let settings = Settings::for_migrations(|key| std::env::var(key).ok(), cli.tool, cli.log_level)
        .context("Invalid FASTCMS_* environment")?;

    setup_logging(&settings.logging).context("Failed to set up logging")?;
    if env_loaded {
        tracing::debug!("Loaded environment from {}", cli.env_file.display());
    }

    let code = run_cli(
        &cli.args,
        &settings.migration.tool,
        &ProcessRunner,
        &mut io::stdout(),
        &mut io::stderr(),
    );
    std::process::exit(code);
}
