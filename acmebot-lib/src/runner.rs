use crate::{
  activity::ActivityCapability,
  engine::{JournalStore, RunId, RunSummary, WorkflowRuntime},
  error::AcmebotResult,
  log::*,
  models::Certificate,
  orchestrator::{IssueCertificate, IssueCertificateInput, OrchestratorOptions},
};
use derive_builder::Builder;
use rustc_hash::FxHashMap as HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Builder, Clone)]
/// Entry point of issuance runs: picks the run of a request, starts or resumes it, and inspects journals
pub struct CertificateIssuer {
  #[builder(setter(custom))]
  /// Activity capability injected into every run
  activities: Arc<dyn ActivityCapability>,

  #[builder(setter(custom))]
  /// Journal store of the runs
  store: Arc<dyn JournalStore>,

  #[builder(default)]
  options: OrchestratorOptions,

  #[builder(default)]
  /// Cancelling this token revokes every run driven by the issuer
  cancel_token: CancellationToken,

  #[builder(default)]
  /// Cancelling this token stops every run driven by the issuer, leaving them resumable
  shutdown_token: CancellationToken,

  #[builder(default, setter(skip))]
  /// One lock per run key: runs of the same key are driven one at a time
  run_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CertificateIssuerBuilder {
  pub fn activities<T: ActivityCapability + 'static>(&mut self, v: Arc<T>) -> &mut Self {
    self.activities = Some(v);
    self
  }
  pub fn store<T: JournalStore + 'static>(&mut self, v: Arc<T>) -> &mut Self {
    self.store = Some(v);
    self
  }
}

impl CertificateIssuer {
  fn runtime(&self) -> WorkflowRuntime {
    WorkflowRuntime::with_cancel_token(self.store.clone(), self.cancel_token.clone())
      .with_shutdown_token(self.shutdown_token.clone())
  }

  async fn run_lock(&self, key: &str) -> Arc<Mutex<()>> {
    self.run_locks.lock().await.entry(key.to_string()).or_default().clone()
  }

  fn workflow(&self) -> IssueCertificate {
    IssueCertificate::new(self.activities.clone(), self.options.clone())
  }

  /// Run serving an issuance request: the unfinished run of the request if any, otherwise a new generation.
  pub async fn run_id_for(&self, input: &IssueCertificateInput) -> AcmebotResult<RunId> {
    let first = RunId::first_for(input)?;
    let latest = self
      .store
      .list_runs()
      .await?
      .into_iter()
      .filter(|run_id| run_id.key() == first.key())
      .max_by_key(|run_id| run_id.generation());

    let Some(latest) = latest else {
      return Ok(first);
    };
    let summary = self.runtime().inspect(&latest).await?;
    if summary.status.is_terminal() {
      debug!("[{latest}] Latest run is {:?}, start next generation", summary.status);
      Ok(latest.next_generation())
    } else {
      Ok(latest)
    }
  }

  /// Issue a certificate, resuming the unfinished run of the same request if any.
  /// Concurrent calls for the same request are driven one after another.
  pub async fn issue(&self, input: &IssueCertificateInput) -> AcmebotResult<Certificate> {
    let lock = self.run_lock(&RunId::key_for(input)?).await;
    let _guard = lock.lock().await;

    let run_id = self.run_id_for(input).await?;
    let certificate = self.runtime().start(&self.workflow(), &run_id, input).await?;
    info!(
      "[{run_id}] Certificate {} ({}) issued, expires on {}",
      certificate.name, certificate.thumbprint, certificate.expires_on
    );
    Ok(certificate)
  }

  /// Resume a recorded run
  pub async fn resume(&self, run_id: &RunId) -> AcmebotResult<Certificate> {
    let lock = self.run_lock(run_id.key()).await;
    let _guard = lock.lock().await;
    self.runtime().resume(&self.workflow(), run_id).await
  }

  pub async fn inspect(&self, run_id: &RunId) -> AcmebotResult<RunSummary> {
    self.runtime().inspect(run_id).await
  }

  /// Summaries of every recorded run
  pub async fn inspect_all(&self) -> AcmebotResult<Vec<RunSummary>> {
    let runtime = self.runtime();
    let mut run_ids = runtime.list_runs().await?;
    run_ids.sort();
    let mut summaries = Vec::with_capacity(run_ids.len());
    for run_id in run_ids.iter() {
      summaries.push(runtime.inspect(run_id).await?);
    }
    Ok(summaries)
  }

  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel_token.clone()
  }

  /// Cancel every run driven by the issuer
  pub fn cancel(&self) {
    self.cancel_token.cancel();
  }

  /// Stop every run driven by the issuer without terminating them, e.g., on process shutdown
  pub fn shutdown(&self) {
    self.shutdown_token.cancel();
  }
}
