mod context;
mod journal;
mod run_id;
mod runtime;
mod store;

pub use {
  context::WorkflowContext,
  journal::{JournalEvent, RunStatus, RunSummary, StepKind},
  run_id::RunId,
  runtime::{Workflow, WorkflowRuntime},
  store::{DirJournalStore, JournalStore, MemoryJournalStore},
};

pub(crate) use journal::Journal;
