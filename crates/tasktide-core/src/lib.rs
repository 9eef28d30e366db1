pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod datetime;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod render;
pub mod stats;
pub mod store;
pub mod task;
pub mod validate;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::{
  Error,
  Result,
  exit_code
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args);
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasktide"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  if let Some(dir) = &cli.data {
    cfg.set(
      "data.location",
      dir.to_string_lossy()
    );
  }

  let backend =
    gateway::open_backend(&cfg)
      .context(
        "failed to open task backend"
      )?;
  let renderer =
    render::Renderer::new(&cfg)?;

  commands::dispatch(
    backend,
    renderer,
    cli.command.unwrap_or_default()
  )?;

  info!("done");
  Ok(())
}
