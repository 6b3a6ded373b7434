#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod constants;
mod error;
mod log;

use crate::{
  config::{build_settings, parse_opts, ConfigToml, Opts, Settings},
  constants::THREAD_NAME,
  error::{anyhow, Context},
  log::*,
};
use acmebot_lib::{CertificateIssuer, CertificateIssuerBuilder, DirJournalStore, RunId};
use std::sync::Arc;

fn main() {
  init_logger();

  let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name(THREAD_NAME);
  let runtime = match runtime_builder.build() {
    Ok(runtime) => runtime,
    Err(e) => {
      error!("Failed to build runtime: {e}");
      std::process::exit(1);
    }
  };

  runtime.block_on(async {
    // Initially load options
    let Ok(parsed_opts) = parse_opts() else {
      error!("Invalid command line options");
      std::process::exit(1);
    };

    if let Err(e) = acmebot_service(&parsed_opts).await {
      error!("acmebot exited: {e:#}");
      std::process::exit(1);
    }
  });
}

async fn acmebot_service(opts: &Opts) -> Result<(), anyhow::Error> {
  let config_toml =
    ConfigToml::new(&opts.config_file_path).with_context(|| format!("Invalid toml file {}", opts.config_file_path))?;
  let settings = build_settings(&config_toml).context("Invalid configuration")?;
  let issuer = build_issuer(&settings)?;

  if opts.inspect {
    return inspect_runs(&issuer).await;
  }

  // Ctrl-C stops every run without terminating it, the next trigger continues from the journal
  let shutdown_issuer = issuer.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("Interrupted, stop all runs. They are resumed on the next trigger");
      shutdown_issuer.shutdown();
    }
  });

  if let Some(run_id) = opts.resume.as_ref() {
    let run_id = run_id.parse::<RunId>()?;
    let certificate = issuer.resume(&run_id).await?;
    info!("[{run_id}] Certificate {} deployed", certificate.name);
    return Ok(());
  }

  let requests = match opts.request.as_ref() {
    Some(name) => {
      let request = settings
        .requests
        .iter()
        .find(|(request_name, _)| request_name == name)
        .ok_or(anyhow!("Unknown request: {name}"))?;
      vec![request.clone()]
    }
    None => settings.requests.clone(),
  };

  info!("Start acmebot for {} issuance request(s)", requests.len());
  let handles = requests
    .into_iter()
    .map(|(name, input)| {
      let issuer = issuer.clone();
      let handle = tokio::spawn(async move { issuer.issue(&input).await });
      (name, handle)
    })
    .collect::<Vec<_>>();

  let mut failed = 0;
  for (name, handle) in handles {
    match handle.await {
      Ok(Ok(certificate)) => info!("Request {name}: certificate {} deployed", certificate.name),
      Ok(Err(e)) => {
        error!("Request {name} failed: {e}");
        failed += 1;
      }
      Err(e) => {
        error!("Request {name} aborted: {e}");
        failed += 1;
      }
    }
  }

  if failed > 0 {
    return Err(anyhow!("{failed} issuance request(s) failed"));
  }
  Ok(())
}

fn build_issuer(settings: &Settings) -> Result<CertificateIssuer, anyhow::Error> {
  let (missing_cleanups, missing_hooks): (Vec<_>, Vec<_>) = settings
    .activities
    .missing_hooks()
    .into_iter()
    .partition(|activity| activity.is_cleanup());
  if !missing_hooks.is_empty() {
    warn!("No hook configured for {missing_hooks:?}, runs invoking them will fail");
  }
  if !missing_cleanups.is_empty() {
    info!("No hook configured for {missing_cleanups:?}, challenges are not cleaned up");
  }
  info!("Journal directory: {}", settings.journal_dir.display());

  let issuer = CertificateIssuerBuilder::default()
    .activities(Arc::new(settings.activities.clone()))
    .store(Arc::new(DirJournalStore::new(&settings.journal_dir)))
    .options(settings.options.clone())
    .build()?;
  Ok(issuer)
}

async fn inspect_runs(issuer: &CertificateIssuer) -> Result<(), anyhow::Error> {
  let summaries = issuer.inspect_all().await?;
  if summaries.is_empty() {
    info!("No recorded run");
  }
  for summary in summaries.iter() {
    let steps = summary
      .steps
      .iter()
      .map(|step| format!("{step:?}"))
      .collect::<Vec<_>>()
      .join(" -> ");
    info!(
      "[{}] {:?}, {} step(s): {steps}",
      summary.run_id,
      summary.status,
      summary.steps.len()
    );
  }
  Ok(())
}
