use super::run_id::RunId;
use crate::{
  activity::{ActivityError, ActivityName},
  error::{AcmebotError, AcmebotResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
/// Append-only journal entry of a run. `seq` is the step id, i.e., the position of the step
/// in the execution order of the workflow body.
pub enum JournalEvent {
  RunStarted {
    input: Value,
  },
  ActivityScheduled {
    seq: usize,
    activity: ActivityName,
  },
  ActivityCompleted {
    seq: usize,
    activity: ActivityName,
    output: Value,
  },
  ActivityFailed {
    seq: usize,
    activity: ActivityName,
    error: ActivityError,
  },
  TimerCreated {
    seq: usize,
    delay_ms: u64,
    fire_at: DateTime<Utc>,
  },
  TimerFired {
    seq: usize,
  },
  RunCompleted {
    output: Value,
  },
  RunFailed {
    reason: String,
  },
  RunCancelled,
}

impl JournalEvent {
  /// Returns true if the event terminates the run
  pub fn terminates_run(&self) -> bool {
    matches!(
      self,
      JournalEvent::RunCompleted { .. } | JournalEvent::RunFailed { .. } | JournalEvent::RunCancelled
    )
  }
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Kind of a journaled step
pub enum StepKind {
  Activity(ActivityName),
  Timer { delay_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  /// Started and not terminated yet, i.e., resumable
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl RunStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, RunStatus::Running)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Summary of a persisted run
pub struct RunSummary {
  pub run_id: RunId,
  pub status: RunStatus,
  pub steps: Vec<StepKind>,
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq)]
/// Recorded state of a single step
pub(crate) enum RecordedStep {
  Activity {
    activity: ActivityName,
    outcome: Option<Result<Value, ActivityError>>,
  },
  Timer {
    delay_ms: u64,
    fire_at: DateTime<Utc>,
    fired: bool,
  },
}

#[derive(Debug, Clone, Default)]
/// In-memory view of a run journal, indexed by step id
pub(crate) struct Journal {
  input: Option<Value>,
  steps: Vec<RecordedStep>,
  terminal: Option<JournalEvent>,
}

impl Journal {
  pub(crate) fn from_events(events: Vec<JournalEvent>) -> AcmebotResult<Self> {
    let mut journal = Self::default();
    for event in events {
      journal.push(event)?;
    }
    Ok(journal)
  }

  /// Apply a new event. Events must arrive in the order they were produced.
  pub(crate) fn push(&mut self, event: JournalEvent) -> AcmebotResult<()> {
    if self.terminal.is_some() {
      return Err(AcmebotError::CorruptedJournal("event after run termination".to_string()));
    }
    match event {
      JournalEvent::RunStarted { input } => {
        if self.input.is_some() {
          return Err(AcmebotError::CorruptedJournal("run started twice".to_string()));
        }
        self.input = Some(input);
      }
      JournalEvent::ActivityScheduled { seq, activity } => {
        self.ensure_started()?;
        self.ensure_next(seq)?;
        self.steps.push(RecordedStep::Activity { activity, outcome: None });
      }
      JournalEvent::ActivityCompleted { seq, activity, output } => {
        self.complete_activity(seq, activity, Ok(output))?;
      }
      JournalEvent::ActivityFailed { seq, activity, error } => {
        self.complete_activity(seq, activity, Err(error))?;
      }
      JournalEvent::TimerCreated { seq, delay_ms, fire_at } => {
        self.ensure_started()?;
        self.ensure_next(seq)?;
        self.steps.push(RecordedStep::Timer {
          delay_ms,
          fire_at,
          fired: false,
        });
      }
      JournalEvent::TimerFired { seq } => match self.steps.get_mut(seq) {
        Some(RecordedStep::Timer { fired, .. }) if !*fired => *fired = true,
        _ => return Err(AcmebotError::CorruptedJournal(format!("unexpected timer firing at step {seq}"))),
      },
      terminal => {
        self.ensure_started()?;
        self.terminal = Some(terminal);
      }
    }
    Ok(())
  }

  fn ensure_started(&self) -> AcmebotResult<()> {
    if self.input.is_none() {
      return Err(AcmebotError::CorruptedJournal("run has not been started".to_string()));
    }
    Ok(())
  }

  fn ensure_next(&self, seq: usize) -> AcmebotResult<()> {
    if seq != self.steps.len() {
      return Err(AcmebotError::CorruptedJournal(format!(
        "step {seq} recorded while {} steps are known",
        self.steps.len()
      )));
    }
    Ok(())
  }

  fn complete_activity(
    &mut self,
    seq: usize,
    completed: ActivityName,
    result: Result<Value, ActivityError>,
  ) -> AcmebotResult<()> {
    match self.steps.get_mut(seq) {
      Some(RecordedStep::Activity { activity, outcome }) if *activity == completed && outcome.is_none() => {
        *outcome = Some(result);
        Ok(())
      }
      _ => Err(AcmebotError::CorruptedJournal(format!(
        "unexpected completion of {completed} at step {seq}"
      ))),
    }
  }

  pub(crate) fn input(&self) -> Option<&Value> {
    self.input.as_ref()
  }

  pub(crate) fn step(&self, seq: usize) -> Option<&RecordedStep> {
    self.steps.get(seq)
  }

  pub(crate) fn terminal(&self) -> Option<&JournalEvent> {
    self.terminal.as_ref()
  }

  pub(crate) fn status(&self) -> RunStatus {
    match self.terminal {
      None => RunStatus::Running,
      Some(JournalEvent::RunCompleted { .. }) => RunStatus::Completed,
      Some(JournalEvent::RunCancelled) => RunStatus::Cancelled,
      Some(_) => RunStatus::Failed,
    }
  }

  pub(crate) fn steps(&self) -> Vec<StepKind> {
    self
      .steps
      .iter()
      .map(|step| match step {
        RecordedStep::Activity { activity, .. } => StepKind::Activity(*activity),
        RecordedStep::Timer { delay_ms, .. } => StepKind::Timer { delay_ms: *delay_ms },
      })
      .collect()
  }

  pub(crate) fn summary(&self, run_id: &RunId) -> RunSummary {
    RunSummary {
      run_id: run_id.clone(),
      status: self.status(),
      steps: self.steps(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn started() -> JournalEvent {
    JournalEvent::RunStarted { input: json!({"k": 1}) }
  }

  #[test]
  fn journal_indexes_steps() {
    let journal = Journal::from_events(vec![
      started(),
      JournalEvent::ActivityScheduled {
        seq: 0,
        activity: ActivityName::Order,
      },
      JournalEvent::ActivityCompleted {
        seq: 0,
        activity: ActivityName::Order,
        output: json!("done"),
      },
      JournalEvent::TimerCreated {
        seq: 1,
        delay_ms: 10_000,
        fire_at: Utc::now(),
      },
    ])
    .unwrap();
    assert_eq!(journal.status(), RunStatus::Running);
    assert_eq!(
      journal.steps(),
      vec![StepKind::Activity(ActivityName::Order), StepKind::Timer { delay_ms: 10_000 }]
    );
    assert!(matches!(
      journal.step(0),
      Some(RecordedStep::Activity { outcome: Some(Ok(_)), .. })
    ));
    assert!(matches!(journal.step(1), Some(RecordedStep::Timer { fired: false, .. })));
  }

  #[test]
  fn journal_rejects_out_of_order_events() {
    let gap = Journal::from_events(vec![
      started(),
      JournalEvent::ActivityScheduled {
        seq: 1,
        activity: ActivityName::Order,
      },
    ]);
    assert!(matches!(gap, Err(AcmebotError::CorruptedJournal(_))));

    let wrong_activity = Journal::from_events(vec![
      started(),
      JournalEvent::ActivityScheduled {
        seq: 0,
        activity: ActivityName::Order,
      },
      JournalEvent::ActivityCompleted {
        seq: 0,
        activity: ActivityName::FinalizeOrder,
        output: Value::Null,
      },
    ]);
    assert!(matches!(wrong_activity, Err(AcmebotError::CorruptedJournal(_))));

    let not_started = Journal::from_events(vec![JournalEvent::RunCancelled]);
    assert!(matches!(not_started, Err(AcmebotError::CorruptedJournal(_))));
  }

  #[test]
  fn journal_status_follows_terminal_event() {
    let journal = Journal::from_events(vec![
      started(),
      JournalEvent::RunFailed {
        reason: "boom".to_string(),
      },
    ])
    .unwrap();
    assert_eq!(journal.status(), RunStatus::Failed);
    assert!(journal.status().is_terminal());
    assert!(journal.terminal().unwrap().terminates_run());
  }

  #[test]
  fn journal_event_json_is_tagged() {
    let event = JournalEvent::ActivityScheduled {
      seq: 3,
      activity: ActivityName::CheckIsReady,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json, json!({"event": "activity_scheduled", "seq": 3, "activity": "CheckIsReady"}));
  }
}
