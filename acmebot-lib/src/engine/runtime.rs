use super::{
  context::WorkflowContext,
  journal::{Journal, JournalEvent, RunSummary},
  run_id::RunId,
  store::JournalStore,
};
use crate::{
  error::{AcmebotError, AcmebotResult},
  log::*,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
/// Deterministic workflow body.
/// Every side effect must go through the context so that a re-evaluation against the journal
/// produces the same step sequence.
pub trait Workflow: Send + Sync {
  type Input: Serialize + DeserializeOwned + Send + Sync;
  type Output: Serialize + DeserializeOwned + Send;

  async fn run(&self, ctx: &mut WorkflowContext, input: &Self::Input) -> AcmebotResult<Self::Output>;
}

/// Drives workflow runs against a journal store
pub struct WorkflowRuntime {
  store: Arc<dyn JournalStore>,
  cancel_token: CancellationToken,
  shutdown_token: CancellationToken,
}

impl WorkflowRuntime {
  pub fn new(store: Arc<dyn JournalStore>) -> Self {
    Self::with_cancel_token(store, CancellationToken::new())
  }

  pub fn with_cancel_token(store: Arc<dyn JournalStore>, cancel_token: CancellationToken) -> Self {
    Self {
      store,
      cancel_token,
      shutdown_token: CancellationToken::new(),
    }
  }

  /// Share a shutdown token, see [`WorkflowRuntime::shutdown`]
  pub fn with_shutdown_token(mut self, shutdown_token: CancellationToken) -> Self {
    self.shutdown_token = shutdown_token;
    self
  }

  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel_token.clone()
  }

  /// Cancel every run driven by this runtime. Pending timers are revoked and the runs are recorded as cancelled.
  pub fn cancel(&self) {
    self.cancel_token.cancel();
  }

  /// Stop every run driven by this runtime without terminating them: nothing is recorded,
  /// and the runs continue from their journal on the next trigger.
  pub fn shutdown(&self) {
    self.shutdown_token.cancel();
  }

  /// Start a run, or continue it if it has already been started with the same input
  pub async fn start<W>(&self, workflow: &W, run_id: &RunId, input: &W::Input) -> AcmebotResult<W::Output>
  where
    W: Workflow,
  {
    let input_value = serde_json::to_value(input)?;
    let journal = match self.store.load(run_id).await? {
      Some(events) if !events.is_empty() => {
        let journal = Journal::from_events(events)?;
        if journal.input() != Some(&input_value) {
          error!("[{run_id}] Run already exists with a different input");
          return Err(AcmebotError::InputMismatch(run_id.clone()));
        }
        info!("[{run_id}] Run already exists, continuing it");
        journal
      }
      Some(_) => {
        warn!("[{run_id}] Journal has no event, the start of the run was interrupted. Start it again");
        let event = JournalEvent::RunStarted { input: input_value };
        self.store.append(run_id, &event).await?;
        Journal::from_events(vec![event])?
      }
      None => {
        let event = JournalEvent::RunStarted { input: input_value };
        if !self.store.create(run_id, &event).await? {
          error!("[{run_id}] Run has been started concurrently");
          return Err(AcmebotError::ConcurrentStart(run_id.clone()));
        }
        info!("[{run_id}] Start run");
        Journal::from_events(vec![event])?
      }
    };
    self.evaluate(workflow, run_id, journal, input).await
  }

  /// Resume a run from its journal. The input is the one recorded at start.
  pub async fn resume<W>(&self, workflow: &W, run_id: &RunId) -> AcmebotResult<W::Output>
  where
    W: Workflow,
  {
    let journal = self.load_journal(run_id).await?;
    let input_value = journal
      .input()
      .cloned()
      .ok_or_else(|| AcmebotError::CorruptedJournal(format!("run {run_id} has no input")))?;
    let input: W::Input = serde_json::from_value(input_value)?;
    info!("[{run_id}] Resume run");
    self.evaluate(workflow, run_id, journal, &input).await
  }

  /// Summary of a recorded run
  pub async fn inspect(&self, run_id: &RunId) -> AcmebotResult<RunSummary> {
    let journal = self.load_journal(run_id).await?;
    Ok(journal.summary(run_id))
  }

  /// Ids of every recorded run
  pub async fn list_runs(&self) -> AcmebotResult<Vec<RunId>> {
    self.store.list_runs().await
  }

  async fn load_journal(&self, run_id: &RunId) -> AcmebotResult<Journal> {
    let Some(events) = self.store.load(run_id).await? else {
      return Err(AcmebotError::RunNotFound(run_id.clone()));
    };
    Journal::from_events(events)
  }

  async fn evaluate<W>(&self, workflow: &W, run_id: &RunId, journal: Journal, input: &W::Input) -> AcmebotResult<W::Output>
  where
    W: Workflow,
  {
    if let Some(terminal) = journal.terminal() {
      debug!("[{run_id}] Run already terminated, replaying its result");
      return match terminal {
        JournalEvent::RunCompleted { output } => Ok(serde_json::from_value(output.clone())?),
        JournalEvent::RunFailed { reason } => Err(AcmebotError::RunFailed {
          run_id: run_id.clone(),
          reason: reason.clone(),
        }),
        JournalEvent::RunCancelled => Err(AcmebotError::Cancelled),
        _ => Err(AcmebotError::CorruptedJournal(format!("run {run_id} has an invalid terminal event"))),
      };
    }

    let mut ctx = WorkflowContext::new(run_id.clone(), journal, self.store.clone(), self.cancel_token.clone())
      .with_shutdown_token(self.shutdown_token.clone());
    let res = workflow.run(&mut ctx, input).await;

    match res {
      Ok(output) => {
        let value = serde_json::to_value(&output)?;
        self.store.append(run_id, &JournalEvent::RunCompleted { output: value }).await?;
        info!("[{run_id}] Run completed");
        Ok(output)
      }
      Err(AcmebotError::Cancelled) => {
        self.store.append(run_id, &JournalEvent::RunCancelled).await?;
        warn!("[{run_id}] Run cancelled");
        Err(AcmebotError::Cancelled)
      }
      Err(e) if e.is_activity_failure() => {
        self
          .store
          .append(run_id, &JournalEvent::RunFailed { reason: e.to_string() })
          .await?;
        error!("[{run_id}] Run failed: {e}");
        Err(e)
      }
      Err(AcmebotError::Interrupted) => {
        warn!("[{run_id}] Run stopped by shutdown, it can be resumed");
        Err(AcmebotError::Interrupted)
      }
      Err(e) => {
        error!("[{run_id}] Run interrupted, it can be resumed: {e}");
        Err(e)
      }
    }
  }
}
