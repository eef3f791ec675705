mod api;
mod app;
mod config;
mod event;
mod logging;
mod mutation;
mod query;
mod store;
mod ui;
mod validation;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "codebook")]
#[command(about = "A terminal UI for managing expense categories and expense codes")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/codebook/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend origin, e.g. http://localhost:8001
  #[arg(short, long)]
  api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line wins over file and environment
  if let Some(url) = args.api_url {
    config.api.url = url;
  }

  tracing::info!(log_dir = %logging::log_dir().display(), "Logging initialized");

  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}
