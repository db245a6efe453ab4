pub mod api;
pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod datetime;
pub mod filter;
pub mod index;
pub mod intent;
pub mod model;
pub mod notify;
pub mod patch;
pub mod render;
pub mod snapshot;
pub mod sort;
pub mod store;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::cli::Command;
use crate::coordinator::Coordinator;
use crate::datetime::BoardClock;
use crate::notify::TerminalNotifier;
use crate::snapshot::SnapshotApi;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre = cli::preprocess_args(&raw_args);
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
    "starting corkboard CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
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
  let board_path =
    config::board_file(&cfg, &data_dir);
  let api = SnapshotApi::open(
    &board_path
  )
  .with_context(|| {
    format!(
      "failed to open board file {}",
      board_path.display()
    )
  })?;

  let board_id = cfg.board_id()?;
  let clock =
    BoardClock::new(cfg.board_timezone());
  let renderer =
    render::Renderer::new(&cfg)?;
  let command = match cli.command {
    | Some(command) => command,
    | None => {
      let name = cfg
        .get("default.command")
        .unwrap_or("board");
      debug!(command = name, "no explicit command, using default");
      Command::from_default(name)?
    }
  };

  let coordinator = Coordinator::new(
    api,
    TerminalNotifier,
    clock
  );

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  runtime.block_on(async {
    coordinator
      .load_board(board_id)
      .await?;
    commands::dispatch(
      &coordinator,
      &cfg,
      &renderer,
      command
    )
    .await
  })?;

  info!("done");
  Ok(())
}
