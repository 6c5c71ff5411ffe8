mod api;
mod cli;
mod config;
mod onboarding;

use anyhow::Result;
use clap::Parser;

use cli::commands::{diff, edit, submit};
use cli::{Cli, Commands};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = Config::load(cli.config.as_deref())?;
    log::debug!(
        "Backend {} as '{}'",
        config.backend.base_url,
        config.audit.actor
    );

    match cli.command {
        Commands::Submit(args) => submit::handle_submit_command(args, &config).await,
        Commands::Edit(args) => edit::handle_edit_command(args, &config).await,
        Commands::Diff(args) => diff::handle_diff_command(args, &config),
    }
}
