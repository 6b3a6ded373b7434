use super::{
  journal::{Journal, JournalEvent, RecordedStep},
  run_id::RunId,
  store::JournalStore,
};
use crate::{
  activity::{ActivityName, ActivityResult},
  error::{AcmebotError, AcmebotResult},
  log::*,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Execution context of one evaluation of a workflow body.
///
/// The body is evaluated from the start on every resumption. Each step consumes the next step id:
/// steps already in the journal are replayed from their recorded outcome, and only the first
/// unrecorded step is actually executed.
pub struct WorkflowContext {
  run_id: RunId,
  journal: Journal,
  store: Arc<dyn JournalStore>,
  cancel_token: CancellationToken,
  shutdown_token: CancellationToken,
  cursor: usize,
}

impl WorkflowContext {
  pub(crate) fn new(run_id: RunId, journal: Journal, store: Arc<dyn JournalStore>, cancel_token: CancellationToken) -> Self {
    Self {
      run_id,
      journal,
      store,
      cancel_token,
      shutdown_token: CancellationToken::new(),
      cursor: 0,
    }
  }

  /// Shutdown stops the evaluation like a cancellation, but yields `Interrupted` so that the run stays resumable
  pub(crate) fn with_shutdown_token(mut self, shutdown_token: CancellationToken) -> Self {
    self.shutdown_token = shutdown_token;
    self
  }

  pub fn run_id(&self) -> &RunId {
    &self.run_id
  }

  /// Returns true while the body is replaying recorded steps
  pub fn is_replaying(&self) -> bool {
    self.journal.step(self.cursor).is_some()
  }

  /// Invoke an activity at-least-once, or replay its recorded outcome
  pub async fn activity<T, F, Fut>(&mut self, activity: ActivityName, invoke: F) -> AcmebotResult<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ActivityResult<T>>,
  {
    let seq = self.next_seq();
    match self.journal.step(seq).cloned() {
      Some(RecordedStep::Activity {
        activity: recorded,
        outcome,
      }) => {
        if recorded != activity {
          return Err(self.mismatch(seq, activity.as_str(), recorded.as_str()));
        }
        match outcome {
          Some(Ok(output)) => {
            debug!("[{}] Replay step {seq}: {activity} completed", self.run_id);
            return Ok(serde_json::from_value(output)?);
          }
          Some(Err(error)) => {
            debug!("[{}] Replay step {seq}: {activity} failed", self.run_id);
            return Err(AcmebotError::from_activity(activity, error));
          }
          None => {
            self.ensure_not_cancelled()?;
            warn!(
              "[{}] Step {seq}: {activity} was scheduled without recorded outcome, invoking it again",
              self.run_id
            );
          }
        }
      }
      Some(RecordedStep::Timer { .. }) => return Err(self.mismatch(seq, activity.as_str(), "timer")),
      None => {
        self.ensure_not_cancelled()?;
        self.record(JournalEvent::ActivityScheduled { seq, activity }).await?;
      }
    }

    info!("[{}] Step {seq}: invoke {activity}", self.run_id);
    let outcome = tokio::select! {
      outcome = invoke() => outcome,
      e = self.stopped() => {
        info!("[{}] Step {seq}: {activity} interrupted: {e}", self.run_id);
        return Err(e);
      }
    };

    match outcome {
      Ok(output) => {
        let value = serde_json::to_value(&output)?;
        self
          .record(JournalEvent::ActivityCompleted {
            seq,
            activity,
            output: value,
          })
          .await?;
        Ok(output)
      }
      Err(error) => {
        warn!("[{}] Step {seq}: {activity} failed: {error}", self.run_id);
        self
          .record(JournalEvent::ActivityFailed {
            seq,
            activity,
            error: error.clone(),
          })
          .await?;
        Err(AcmebotError::from_activity(activity, error))
      }
    }
  }

  /// Durable timer: the firing time is recorded once, and a resumed run only waits for the rest of it.
  /// Cancellation revokes the timer.
  pub async fn timer(&mut self, delay: Duration) -> AcmebotResult<()> {
    let seq = self.next_seq();
    let fire_at = match self.journal.step(seq).cloned() {
      Some(RecordedStep::Timer { fired: true, .. }) => {
        debug!("[{}] Replay step {seq}: timer fired", self.run_id);
        return Ok(());
      }
      Some(RecordedStep::Timer { fire_at, .. }) => fire_at,
      Some(RecordedStep::Activity { activity, .. }) => return Err(self.mismatch(seq, "timer", activity.as_str())),
      None => {
        self.ensure_not_cancelled()?;
        let delay_delta = chrono::Duration::from_std(delay)
          .map_err(|e| AcmebotError::InvalidInput(format!("Invalid timer delay: {e}")))?;
        let fire_at = Utc::now() + delay_delta;
        self
          .record(JournalEvent::TimerCreated {
            seq,
            delay_ms: delay.as_millis() as u64,
            fire_at,
          })
          .await?;
        fire_at
      }
    };

    let remaining = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    info!("[{}] Step {seq}: timer, {}ms remaining", self.run_id, remaining.as_millis());
    tokio::select! {
      _ = tokio::time::sleep(remaining) => {}
      e = self.stopped() => {
        info!("[{}] Step {seq}: timer revoked: {e}", self.run_id);
        return Err(e);
      }
    }
    self.record(JournalEvent::TimerFired { seq }).await
  }

  fn next_seq(&mut self) -> usize {
    let seq = self.cursor;
    self.cursor += 1;
    seq
  }

  fn ensure_not_cancelled(&self) -> AcmebotResult<()> {
    if self.shutdown_token.is_cancelled() {
      return Err(AcmebotError::Interrupted);
    }
    if self.cancel_token.is_cancelled() {
      return Err(AcmebotError::Cancelled);
    }
    Ok(())
  }

  /// Resolves with the error stopping the evaluation, once cancelled or shut down
  async fn stopped(&self) -> AcmebotError {
    tokio::select! {
      biased;
      _ = self.shutdown_token.cancelled() => AcmebotError::Interrupted,
      _ = self.cancel_token.cancelled() => AcmebotError::Cancelled,
    }
  }

  fn mismatch(&self, seq: usize, expected: &str, recorded: &str) -> AcmebotError {
    error!(
      "[{}] Step {seq}: workflow requested {expected} but the journal has {recorded}",
      self.run_id
    );
    AcmebotError::NonDeterministicReplay {
      seq,
      expected: expected.to_string(),
      recorded: recorded.to_string(),
    }
  }

  async fn record(&mut self, event: JournalEvent) -> AcmebotResult<()> {
    self.store.append(&self.run_id, &event).await?;
    self.journal.push(event)
  }
}
