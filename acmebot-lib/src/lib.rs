mod activity;
mod constants;
mod engine;
mod error;
mod models;
mod orchestrator;
mod runner;
mod strategy;
#[cfg(test)]
mod testing;

#[allow(unused_imports)]
mod log {
  pub(super) use tracing::{debug, error, info, warn};
}

pub use crate::{
  activity::{ActivityCapability, ActivityError, ActivityName, ActivityResult},
  constants::{CHECK_INTERVAL_SECS, CHECK_TIMEOUT_SECS, DNS_PROPAGATION_DELAY_SECS, JOURNAL_DIR_PATH, RESERVED_DOMAIN_MARKERS},
  engine::{
    DirJournalStore, JournalEvent, JournalStore, MemoryJournalStore, RunId, RunStatus, RunSummary, StepKind, Workflow,
    WorkflowContext, WorkflowRuntime,
  },
  error::{AcmebotError, AcmebotResult},
  models::{
    Certificate, ChallengeProof, ChallengeResult, DomainNameSet, FinalizeInfo, FinalizeOutput, KeyParams, Order, OrderStatus,
    Site,
  },
  orchestrator::{
    issue_certificate, IssueCertificate, IssueCertificateInput, OrchestratorOptions, OrchestratorOptionsBuilder,
    OrchestratorOptionsBuilderError,
  },
  runner::{CertificateIssuer, CertificateIssuerBuilder, CertificateIssuerBuilderError},
  strategy::{select_strategy, AuthorizationMode, StrategySelection},
};
