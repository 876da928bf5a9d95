pub mod analytics;
pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod model;
pub mod notify;
pub mod recurrence;
pub mod render;
pub mod state;
pub mod sync;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
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
    "starting dayplan CLI"
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

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let mut store =
    datastore::FileStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open data store at \
         {}",
        data_dir.display()
      )
    })?;

  let tz = *datetime::project_timezone();
  let mut renderer =
    render::Renderer::new(&cfg, tz)?;
  let notifier =
    cfg.notify_mode()?.notifier();
  let user = cli
    .user
    .clone()
    .unwrap_or_else(|| cfg.user());
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    commands::Session {
      store: &mut store,
      cfg: &cfg,
      renderer: &mut renderer,
      notifier: notifier.as_ref(),
      user,
      tz,
      now: Utc::now()
    },
    inv
  )?;

  info!("done");
  Ok(())
}
