pub mod cascade;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod intent;
pub mod model;
pub mod paging;
pub mod render;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod workspace;

use std::ffi::OsString;
use std::io::{
  self,
  IsTerminal
};

use anyhow::Context;
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
    "starting trackline"
  );
  debug!(
    overrides = pre.rc_overrides.len(),
    "preprocessed rc overrides"
  );

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
  if let Some(url) = cli.base_url {
    cfg.set("api.base_url", url);
  }

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let workspace =
    workspace::Workspace::connect(&cfg)
      .context(
        "failed to set up service \
         connection"
      )?;
  let renderer =
    render::Renderer::new(&cfg)?;
  let mut shell = cli::Shell::new(
    &runtime, workspace, renderer
  );

  let stdout = io::stdout();
  let mut out = stdout.lock();

  if let (Some(email), Some(password)) =
    (cli.email, cli.password)
  {
    shell.sign_in(
      &mut out, &email, &password
    )?;
  }

  if !cli.rest.is_empty() {
    let line = cli
      .rest
      .iter()
      .map(|arg| arg.to_string_lossy())
      .collect::<Vec<_>>()
      .join(" ");
    debug!("running one-shot command");
    shell.run_line(&mut out, &line)?;
  } else {
    let stdin = io::stdin();
    let prompt = stdin.is_terminal();
    shell.run(stdin.lock(), &mut out, prompt)?;
  }

  info!("done");
  Ok(())
}
